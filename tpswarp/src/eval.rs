//! Warp evaluation, for single points and in-place batches
use crate::{
    mesh::Mesh,
    solver::{SolvedWarp, radial_basis},
    types::Normalized,
};
use nalgebra::Point3;
use rayon::prelude::*;

/// Smallest batch handed to a single worker
const MIN_CHUNK_SIZE: usize = 8192;

/// Thread pool to use for batch evaluation
///
/// Most users will use the global Rayon pool, but it's possible to provide your
/// own as well.
#[derive(Debug)]
pub enum ThreadPool {
    /// User-provided pool
    Custom(rayon::ThreadPool),
    /// Global Rayon pool
    Global,
}

impl ThreadPool {
    /// Builds a custom pool with the given number of threads
    pub fn with_threads(n: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(n).build()?;
        Ok(Self::Custom(pool))
    }

    /// Runs a function across the thread pool
    pub fn run<F: FnOnce() -> V + Send, V: Send>(&self, f: F) -> V {
        match self {
            ThreadPool::Custom(p) => p.install(f),
            ThreadPool::Global => f(),
        }
    }

    /// Returns the number of threads in the pool
    pub fn thread_count(&self) -> usize {
        match self {
            ThreadPool::Custom(p) => p.current_num_threads(),
            ThreadPool::Global => rayon::current_num_threads(),
        }
    }
}

impl SolvedWarp {
    /// Evaluates the full warp at a point
    pub fn warp_point(&self, p: Point3<f64>) -> Point3<f64> {
        let a = self.affine();
        let mut out = a.row(0).transpose()
            + a.row(1).transpose() * p.x
            + a.row(2).transpose() * p.y
            + a.row(3).transpose() * p.z;
        for (c, w) in self
            .control_points()
            .iter()
            .zip(self.radial_coefficients().row_iter())
        {
            out += w.transpose() * radial_basis(c, &p);
        }
        Point3::from(out)
    }
}

/// Evaluates the warp at a point, blending from the original location
///
/// A blend of `0` returns `p` unchanged and a blend of `1` returns the full
/// warp.
pub fn evaluate(
    warp: &SolvedWarp,
    p: Point3<f64>,
    blend: Normalized,
) -> Point3<f64> {
    let t = blend.get();
    if t == 0.0 {
        return p;
    }
    let w = warp.warp_point(p);
    if t == 1.0 {
        w
    } else {
        Point3::from(p.coords.lerp(&w.coords, t))
    }
}

/// Warps every point in a buffer, in place
///
/// Each point is computed independently with [`evaluate`], so the result does
/// not depend on the pool or its thread count.
pub fn warp_points_in_place(
    warp: &SolvedWarp,
    points: &mut [Point3<f64>],
    blend: Normalized,
    pool: Option<&ThreadPool>,
) {
    if blend.get() == 0.0 {
        return;
    }
    let f = |p: &mut Point3<f64>| *p = evaluate(warp, *p, blend);
    match pool {
        Some(pool) if points.len() > MIN_CHUNK_SIZE => {
            let chunk_size = points
                .len()
                .div_ceil(pool.thread_count().max(1))
                .max(MIN_CHUNK_SIZE);
            pool.run(|| {
                points
                    .par_chunks_mut(chunk_size)
                    .for_each(|chunk| chunk.iter_mut().for_each(f))
            })
        }
        _ => points.iter_mut().for_each(f),
    }
}

/// A solved warp, bundled with how it should be applied
#[derive(Copy, Clone, Debug)]
pub struct Evaluator<'a> {
    warp: &'a SolvedWarp,
    blend: Normalized,
    recalculate_normals: bool,
    threads: Option<&'a ThreadPool>,
}

impl<'a> Evaluator<'a> {
    /// Builds a single-threaded evaluator that applies the full warp
    pub fn new(warp: &'a SolvedWarp) -> Self {
        Self {
            warp,
            blend: Normalized::ONE,
            recalculate_normals: false,
            threads: None,
        }
    }

    /// Sets the blending factor
    pub fn with_blend(self, blend: Normalized) -> Self {
        Self { blend, ..self }
    }

    /// Sets whether warped meshes get fresh normals
    pub fn with_recalculate_normals(self, recalculate_normals: bool) -> Self {
        Self {
            recalculate_normals,
            ..self
        }
    }

    /// Sets the thread pool used for batches
    pub fn with_threads(self, threads: Option<&'a ThreadPool>) -> Self {
        Self { threads, ..self }
    }

    /// Returns the underlying coefficients
    pub fn warp(&self) -> &'a SolvedWarp {
        self.warp
    }

    /// Returns the blending factor
    pub fn blend(&self) -> Normalized {
        self.blend
    }

    /// Warps a single point
    pub fn point(&self, p: Point3<f64>) -> Point3<f64> {
        evaluate(self.warp, p, self.blend)
    }

    /// Warps a buffer of points in place
    pub fn points_in_place(&self, points: &mut [Point3<f64>]) {
        warp_points_in_place(self.warp, points, self.blend, self.threads)
    }

    /// Returns a warped copy of a mesh
    ///
    /// Topology is unchanged.  Normals are recomputed from the warped faces if
    /// requested, and are otherwise carried over.
    pub fn mesh(&self, mesh: &Mesh) -> Mesh {
        let mut out = mesh.clone();
        self.points_in_place(&mut out.vertices);
        if self.recalculate_normals {
            out.recalculate_normals();
        }
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::solver::{SolverInputs, solve};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn bumpy_warp() -> SolvedWarp {
        let src = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
        ];
        let pairs = src
            .iter()
            .enumerate()
            .map(|(i, p)| (*p, p + Vector3::new(0.1 * i as f64, 0.0, 0.2)))
            .collect();
        solve(&SolverInputs::new(pairs)).unwrap()
    }

    fn grid(n: usize) -> Vec<Point3<f64>> {
        (0..n)
            .map(|i| {
                let f = i as f64 / n as f64;
                Point3::new(f, (f * 7.0).sin(), (f * 3.0).cos())
            })
            .collect()
    }

    #[test]
    fn blend_zero_is_identity() {
        let w = bumpy_warp();
        for p in grid(100) {
            assert_eq!(evaluate(&w, p, Normalized::ZERO), p);
        }
        let mut pts = grid(100);
        warp_points_in_place(&w, &mut pts, Normalized::ZERO, None);
        assert_eq!(pts, grid(100));
    }

    #[test]
    fn blend_is_linear() {
        let w = bumpy_warp();
        let p = Point3::new(0.3, 0.4, 0.5);
        let full = evaluate(&w, p, Normalized::ONE);
        let half = evaluate(&w, p, Normalized::new(0.5));
        assert_relative_eq!(half, p + (full - p) * 0.5, epsilon = 1e-12);
    }

    #[test]
    fn batch_matches_single() {
        let w = bumpy_warp();
        let blend = Normalized::new(0.75);
        let expected = grid(50_000)
            .into_iter()
            .map(|p| evaluate(&w, p, blend))
            .collect::<Vec<_>>();

        let mut serial = grid(50_000);
        warp_points_in_place(&w, &mut serial, blend, None);
        assert_eq!(serial, expected);

        for threads in [
            ThreadPool::Global,
            ThreadPool::with_threads(1).unwrap(),
            ThreadPool::with_threads(3).unwrap(),
        ] {
            let mut pts = grid(50_000);
            warp_points_in_place(&w, &mut pts, blend, Some(&threads));
            assert_eq!(pts, expected);
        }
    }

    #[test]
    fn evaluator_mesh() {
        let w = bumpy_warp();
        let mesh = Mesh::from_parts(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            vec![Vector3::new(0, 1, 2)],
        );
        let out = Evaluator::new(&w).mesh(&mesh);
        assert!(mesh.same_topology(&out));
        assert!(out.normals.is_empty());
        assert_relative_eq!(
            out.vertices[0],
            Point3::new(0.0, 0.0, 0.2),
            epsilon = 1e-9
        );

        let out = Evaluator::new(&w)
            .with_recalculate_normals(true)
            .mesh(&mesh);
        assert_eq!(out.normals.len(), 3);
    }
}
