//! Mesh output implementation
use super::Mesh;
use nalgebra::Vector3;
use std::io::{BufWriter, Write};

impl Mesh {
    /// Writes a binary STL to the given output
    ///
    /// STL is single-precision, so positions are narrowed to `f32`.  Facet
    /// normals are computed from the triangle winding.
    ///
    /// Returns [`Error::BadTriangle`](crate::Error::BadTriangle) without
    /// writing anything if a triangle refers to a missing vertex.
    pub fn write_stl<F: std::io::Write>(
        &self,
        out: &mut F,
    ) -> Result<(), crate::Error> {
        let count = self.vertices.len();
        for (triangle, t) in self.triangles.iter().enumerate() {
            if let Some(&vertex) = t.iter().find(|&&v| v >= count) {
                return Err(crate::Error::BadTriangle {
                    triangle,
                    vertex,
                    count,
                });
            }
        }

        // We're going to do many small writes and will typically be writing to
        // a file, so using a `BufWriter` saves excessive syscalls.
        let mut out = BufWriter::new(out);
        const HEADER: &[u8] = b"This is a binary STL file exported by tpswarp";
        static_assertions::const_assert!(HEADER.len() <= 80);
        out.write_all(HEADER)?;
        out.write_all(&[0u8; 80 - HEADER.len()])?;
        out.write_all(&(self.triangles.len() as u32).to_le_bytes())?;
        for t in &self.triangles {
            let a = self.vertices[t.x];
            let b = self.vertices[t.y];
            let c = self.vertices[t.z];
            let normal = (b - a)
                .cross(&(c - a))
                .try_normalize(1e-12)
                .unwrap_or_else(Vector3::zeros);
            for p in normal.iter() {
                out.write_all(&(*p as f32).to_le_bytes())?;
            }
            for v in t.iter() {
                for p in self.vertices[*v].coords.iter() {
                    out.write_all(&(*p as f32).to_le_bytes())?;
                }
            }
            out.write_all(&[0u8; std::mem::size_of::<u16>()])?; // attributes
        }
        out.flush()?;
        Ok(())
    }
}
