//! Indexed triangle meshes
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

mod input;
mod output;

/// An indexed 3D mesh
///
/// `normals` is either empty or has one entry per vertex.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    /// Triangles, as indexes into [`Mesh::vertices`]
    pub triangles: Vec<Vector3<usize>>,
    /// Vertex positions
    pub vertices: Vec<Point3<f64>>,
    /// Per-vertex normals
    pub normals: Vec<Vector3<f64>>,
}

impl Mesh {
    /// Builds a new empty mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a mesh from vertices and triangles, without normals
    pub fn from_parts(
        vertices: Vec<Point3<f64>>,
        triangles: Vec<Vector3<usize>>,
    ) -> Self {
        Self {
            triangles,
            vertices,
            normals: vec![],
        }
    }

    /// Checks whether both meshes have the same vertex count and triangles
    ///
    /// Vertex positions are not compared.
    pub fn same_topology(&self, other: &Mesh) -> bool {
        self.vertices.len() == other.vertices.len()
            && self.triangles == other.triangles
    }

    /// Recomputes per-vertex normals from the current triangle geometry
    ///
    /// Each vertex normal is the normalized sum of the (area-weighted) normals
    /// of its incident triangles; vertices without any incident triangle get
    /// a zero normal.
    pub fn recalculate_normals(&mut self) {
        let mut normals = vec![Vector3::zeros(); self.vertices.len()];
        for t in &self.triangles {
            let (Some(a), Some(b), Some(c)) = (
                self.vertices.get(t.x),
                self.vertices.get(t.y),
                self.vertices.get(t.z),
            ) else {
                continue;
            };
            let n = (b - a).cross(&(c - a));
            for i in t.iter() {
                normals[*i] += n;
            }
        }
        for n in &mut normals {
            *n = n.try_normalize(1e-12).unwrap_or_else(Vector3::zeros);
        }
        self.normals = normals;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    pub(crate) fn tetrahedron() -> Mesh {
        Mesh::from_parts(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(0.0, 0.0, 1.0),
            ],
            vec![
                Vector3::new(0, 2, 1),
                Vector3::new(0, 1, 3),
                Vector3::new(0, 3, 2),
                Vector3::new(1, 2, 3),
            ],
        )
    }

    #[test]
    fn flat_normals() {
        let mut mesh = Mesh::from_parts(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(5.0, 5.0, 5.0),
            ],
            vec![Vector3::new(0, 1, 2)],
        );
        mesh.recalculate_normals();
        for n in &mesh.normals[..3] {
            assert_relative_eq!(*n, Vector3::z(), epsilon = 1e-12);
        }
        assert_eq!(mesh.normals[3], Vector3::zeros());
    }

    #[test]
    fn tetrahedron_normals_point_outwards() {
        let mut mesh = tetrahedron();
        mesh.recalculate_normals();
        let center = Point3::new(0.25, 0.25, 0.25);
        for (v, n) in mesh.vertices.iter().zip(&mesh.normals) {
            assert!((v - center).dot(n) > 0.0, "{v:?} has normal {n:?}");
        }
    }

    #[test]
    fn topology() {
        let a = tetrahedron();
        let mut b = a.clone();
        b.vertices[0] = Point3::new(-1.0, -1.0, -1.0);
        assert!(a.same_topology(&b));
        b.triangles.pop();
        assert!(!a.same_topology(&b));
    }
}
