//! Mesh input implementation
use super::Mesh;
use crate::Error;
use nalgebra::{Point3, Vector3};
use std::io::{BufRead, BufReader, Read};

impl Mesh {
    /// Reads vertices and faces from a Wavefront OBJ stream
    ///
    /// Only `v` and `f` records are used; other records (normals, texture
    /// coordinates, groups, materials) are ignored.  Faces with more than three
    /// corners are fan-triangulated, and negative (relative) indexes are
    /// resolved against the vertices read so far.
    pub fn read_obj<R: Read>(r: R) -> Result<Self, Error> {
        let reader = BufReader::new(r);
        let mut out = Mesh::new();

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let line_number = i + 1;
            let bad = |reason: String| Error::BadObjRecord {
                line: line_number,
                reason,
            };
            let mut iter = line.split_whitespace();
            match iter.next() {
                Some("v") => {
                    let mut pos = [0.0; 3];
                    for p in &mut pos {
                        let txt = iter
                            .next()
                            .ok_or_else(|| bad("too few coordinates".into()))?;
                        *p = txt.parse().map_err(|e| {
                            bad(format!("`{txt}` is not a number: {e}"))
                        })?;
                    }
                    out.vertices.push(Point3::from(pos));
                }
                Some("f") => {
                    let corners = iter
                        .map(|c| resolve_index(c, out.vertices.len()))
                        .collect::<Result<Vec<usize>, String>>()
                        .map_err(bad)?;
                    if corners.len() < 3 {
                        return Err(bad("face has fewer than 3 corners".into()));
                    }
                    for w in corners[1..].windows(2) {
                        out.triangles.push(Vector3::new(corners[0], w[0], w[1]));
                    }
                }
                _ => continue,
            }
        }
        Ok(out)
    }
}

/// Converts a face corner (`7`, `7/1`, `7//3`, `-1`) to a zero-based index
fn resolve_index(corner: &str, vertex_count: usize) -> Result<usize, String> {
    let txt = corner.split('/').next().unwrap_or(corner);
    let i: i64 = txt
        .parse()
        .map_err(|e| format!("`{corner}` is not a vertex index: {e}"))?;
    let resolved = if i > 0 {
        i - 1
    } else {
        vertex_count as i64 + i
    };
    if i == 0 || resolved < 0 || resolved >= vertex_count as i64 {
        return Err(format!(
            "vertex index {i} is out of range ({vertex_count} vertices)"
        ));
    }
    Ok(resolved as usize)
}

#[cfg(test)]
mod test {
    use super::*;

    const QUAD: &str = "\
# a unit quad
o quad
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vn 0 0 1
f 1//1 2//1 3//1 4//1
";

    #[test]
    fn read_quad() {
        let mesh = Mesh::read_obj(QUAD.as_bytes()).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(
            mesh.triangles,
            vec![Vector3::new(0, 1, 2), Vector3::new(0, 2, 3)]
        );
        assert!(mesh.normals.is_empty());
    }

    #[test]
    fn relative_indexes() {
        let txt = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n";
        let mesh = Mesh::read_obj(txt.as_bytes()).unwrap();
        assert_eq!(mesh.triangles, vec![Vector3::new(0, 1, 2)]);
    }

    #[test]
    fn bad_records() {
        let r = Mesh::read_obj("v 0 0\n".as_bytes());
        assert!(matches!(r, Err(Error::BadObjRecord { line: 1, .. })));

        let r = Mesh::read_obj("v 0 0 0\nf 1 2 3\n".as_bytes());
        assert!(matches!(r, Err(Error::BadObjRecord { line: 2, .. })));
    }
}
