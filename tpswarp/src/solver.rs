//! Thin-plate spline coefficient solver
//!
//! Given `N` landmark pairs `(s_i, d_i)`, the solver finds the function
//!
//! ```text
//! f(p) = a1 + a2 * p.x + a3 * p.y + a4 * p.z + sum_i w_i * U(|p - s_i|)
//! ```
//!
//! with `U(r) = r`, such that `f(s_i) = d_i` for every pair.  The coefficients
//! come from the `(N + 4) x (N + 4)` linear system
//!
//! ```text
//! | K   P | | w |   | d |
//! | P^T 0 | | a | = | 0 |
//! ```
//!
//! where `K[i, j] = U(|s_i - s_j|)` and row `i` of `P` is `[1, s_i.x, s_i.y,
//! s_i.z]`.  All three output dimensions share one factorization.
use crate::Error;
use nalgebra::{DMatrix, Matrix4x3, MatrixXx3, Point3, Vector3};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Smallest number of pairs that determines the affine part of the warp
pub const MIN_PAIRS: usize = 4;

/// Relative singular value below which control points are considered to be
/// affinely dependent (e.g. coplanar)
const SINGULAR_VALUE_CUTOFF_RELATIVE: f64 = 1e-9;

/// Which parts of a solved warp are kept
///
/// Disabling a part post-processes the solved coefficients; the interpolation
/// property no longer holds once anything is disabled.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AffineFlags {
    /// Keep the translation term `a1`
    pub translation: bool,
    /// Keep the magnitude of `a2`, `a3`, and `a4`
    pub scale: bool,
    /// Keep the direction of `a2`, `a3`, and `a4`
    pub rotation: bool,
    /// Keep the radial (non-affine) terms
    pub non_affine: bool,
}

impl Default for AffineFlags {
    fn default() -> Self {
        Self {
            translation: true,
            scale: true,
            rotation: true,
            non_affine: true,
        }
    }
}

impl AffineFlags {
    /// Checks whether at least one part of the warp is kept
    pub fn any(&self) -> bool {
        self.translation || self.scale || self.rotation || self.non_affine
    }
}

/// Everything needed to solve for a warp
#[derive(Clone, Debug, PartialEq)]
pub struct SolverInputs {
    /// Complete landmark pairs, as `(source, destination)`
    pub pairs: Vec<(Point3<f64>, Point3<f64>)>,
    /// Post-processing of the solved coefficients
    pub flags: AffineFlags,
    /// Multiplier applied to every source landmark before solving
    pub source_prescale: f64,
    /// Multiplier applied to every destination landmark before solving
    pub destination_prescale: f64,
}

impl SolverInputs {
    /// Builds inputs with default flags and unit prescale
    pub fn new(pairs: Vec<(Point3<f64>, Point3<f64>)>) -> Self {
        Self {
            pairs,
            flags: AffineFlags::default(),
            source_prescale: 1.0,
            destination_prescale: 1.0,
        }
    }
}

/// Solved thin-plate spline coefficients
///
/// Row 0 of the affine block is the translation `a1`; rows 1, 2, and 3 are the
/// coefficients `a2`, `a3`, and `a4` applied to `x`, `y`, and `z`.  Row `i` of
/// the radial block is the weight of `control_points[i]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolvedWarp {
    affine: Matrix4x3<f64>,
    radial_coefficients: MatrixXx3<f64>,
    control_points: Vec<Point3<f64>>,
}

impl SolvedWarp {
    /// Returns a warp that maps every point to itself
    pub fn identity() -> Self {
        let mut affine = Matrix4x3::zeros();
        for i in 0..3 {
            affine[(i + 1, i)] = 1.0;
        }
        Self {
            affine,
            radial_coefficients: MatrixXx3::zeros(0),
            control_points: vec![],
        }
    }

    /// Returns the affine block (`a1` to `a4`, one per row)
    pub fn affine(&self) -> &Matrix4x3<f64> {
        &self.affine
    }

    /// Returns the translation term `a1`
    pub fn translation(&self) -> Vector3<f64> {
        self.affine.row(0).transpose()
    }

    /// Returns the radial weights, one row per control point
    pub fn radial_coefficients(&self) -> &MatrixXx3<f64> {
        &self.radial_coefficients
    }

    /// Returns the control points (prescaled source landmarks)
    pub fn control_points(&self) -> &[Point3<f64>] {
        &self.control_points
    }

    fn apply_flags(&mut self, flags: AffineFlags) {
        if !flags.translation {
            self.affine.row_mut(0).fill(0.0);
        }
        if !flags.scale {
            for i in 1..4 {
                let row = self.affine.row(i).transpose();
                if let Some(n) = row.try_normalize(f64::EPSILON) {
                    self.affine.set_row(i, &n.transpose());
                }
            }
        }
        if !flags.rotation {
            for i in 1..4 {
                let norm = self.affine.row(i).norm();
                self.affine.row_mut(i).fill(0.0);
                self.affine[(i, i - 1)] = norm;
            }
        }
        if !flags.non_affine {
            self.radial_coefficients = MatrixXx3::zeros(0);
            self.control_points.clear();
        }
    }
}

/// Radial basis function, `U(r) = r`
#[inline]
pub fn radial_basis(a: &Point3<f64>, b: &Point3<f64>) -> f64 {
    (a - b).norm()
}

/// Solves for the warp that maps every source landmark to its destination
///
/// Fails with [`Error::SingularSystem`] if there are fewer than
/// [`MIN_PAIRS`] pairs, if any landmark (after prescaling) is not finite, or
/// if the source landmarks are affinely dependent, and
/// with [`Error::DuplicateControlPoint`] if two source landmarks coincide.
pub fn solve(inputs: &SolverInputs) -> Result<SolvedWarp, Error> {
    let n = inputs.pairs.len();
    if n < MIN_PAIRS {
        return Err(Error::SingularSystem("fewer than four landmark pairs"));
    }
    let control = inputs
        .pairs
        .iter()
        .map(|(s, _)| s * inputs.source_prescale)
        .collect::<Vec<_>>();
    let target = inputs
        .pairs
        .iter()
        .map(|(_, d)| d * inputs.destination_prescale)
        .collect::<Vec<_>>();

    // NaN input never converges in the SVD below
    if control.iter().chain(&target).any(|p| !p.iter().all(|v| v.is_finite())) {
        return Err(Error::SingularSystem("landmarks are not finite"));
    }
    check_duplicates(&control)?;
    check_affine_rank(&control)?;

    let mut l = DMatrix::<f64>::zeros(n + 4, n + 4);
    for (i, a) in control.iter().enumerate() {
        for (j, b) in control.iter().enumerate().skip(i + 1) {
            let u = radial_basis(a, b);
            l[(i, j)] = u;
            l[(j, i)] = u;
        }
        let row = [1.0, a.x, a.y, a.z];
        for (k, v) in row.into_iter().enumerate() {
            l[(i, n + k)] = v;
            l[(n + k, i)] = v;
        }
    }

    let mut rhs = DMatrix::<f64>::zeros(n + 4, 3);
    for (i, d) in target.iter().enumerate() {
        for k in 0..3 {
            rhs[(i, k)] = d[k];
        }
    }

    let sol = l
        .lu()
        .solve(&rhs)
        .ok_or(Error::SingularSystem("LU decomposition failed"))?;
    if sol.iter().any(|v| !v.is_finite()) {
        return Err(Error::SingularSystem("solution is not finite"));
    }

    let mut out = SolvedWarp {
        affine: Matrix4x3::from_fn(|r, c| sol[(n + r, c)]),
        radial_coefficients: MatrixXx3::from_fn(n, |r, c| sol[(r, c)]),
        control_points: control,
    };
    out.apply_flags(inputs.flags);
    log::debug!("solved thin-plate spline with {n} control points");
    Ok(out)
}

fn check_duplicates(control: &[Point3<f64>]) -> Result<(), Error> {
    let mut seen = HashMap::with_capacity(control.len());
    for (i, p) in control.iter().enumerate() {
        let key = [p.x, p.y, p.z].map(OrderedFloat);
        if let Some(j) = seen.insert(key, i) {
            return Err(Error::DuplicateControlPoint(j, i));
        }
    }
    Ok(())
}

/// Checks that the control points span 3D space
///
/// Points are centered first, which makes the constant column of `P`
/// orthogonal to the others; the system is then degenerate exactly when the
/// centered `N x 3` block loses rank.
fn check_affine_rank(control: &[Point3<f64>]) -> Result<(), Error> {
    let n = control.len() as f64;
    let center = control
        .iter()
        .fold(Vector3::zeros(), |acc, p| acc + p.coords)
        / n;
    let centered = DMatrix::from_fn(control.len(), 3, |r, c| {
        control[r][c] - center[c]
    });
    let svd = centered.svd(false, false);
    let max = svd.singular_values.max();
    let min = svd.singular_values.min();
    if max.is_nan() || max <= 0.0 || min < max * SINGULAR_VALUE_CUTOFF_RELATIVE
    {
        return Err(Error::SingularSystem("control points are coplanar"));
    }
    Ok(())
}

/// Strategy for turning solver inputs into coefficients
///
/// The cached orchestrator goes through this trait, so callers may substitute
/// their own solver (e.g. to count or cache solves).
pub trait CoefficientSolver: Send + Sync {
    /// Solves for a warp
    fn solve(&self, inputs: &SolverInputs) -> Result<SolvedWarp, Error>;
}

/// Default solver, which calls [`solve`]
#[derive(Copy, Clone, Debug, Default)]
pub struct ThinPlateSolver;

impl CoefficientSolver for ThinPlateSolver {
    fn solve(&self, inputs: &SolverInputs) -> Result<SolvedWarp, Error> {
        solve(inputs)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    fn corners() -> Vec<Point3<f64>> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
        ]
    }

    #[test]
    fn z_translation_is_affine_only() {
        let pairs = corners()
            .into_iter()
            .map(|p| (p, p + Vector3::z()))
            .collect();
        let w = solve(&SolverInputs::new(pairs)).unwrap();
        assert_relative_eq!(
            w.translation(),
            Vector3::new(0.0, 0.0, 1.0),
            epsilon = 1e-9
        );
        for i in 0..3 {
            let mut expected = Vector3::zeros();
            expected[i] = 1.0;
            assert_relative_eq!(
                w.affine().row(i + 1).transpose(),
                expected,
                epsilon = 1e-9
            );
        }
        assert_relative_eq!(
            *w.radial_coefficients(),
            MatrixXx3::zeros(5),
            epsilon = 1e-9
        );
    }

    #[test]
    fn interpolates_landmarks() {
        let src = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.1),
            Point3::new(0.0, 3.0, -0.4),
            Point3::new(0.5, 0.2, 1.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(-1.0, 0.5, 2.0),
        ];
        let dst = vec![
            Point3::new(0.1, 0.0, 0.0),
            Point3::new(2.5, -0.2, 0.0),
            Point3::new(0.0, 2.5, 0.0),
            Point3::new(0.3, 0.1, 1.4),
            Point3::new(0.9, 1.3, 1.1),
            Point3::new(-1.2, 0.6, 1.7),
        ];
        let pairs = src.iter().cloned().zip(dst.iter().cloned()).collect();
        let w = solve(&SolverInputs::new(pairs)).unwrap();
        for (s, d) in src.iter().zip(&dst) {
            assert_relative_eq!(w.warp_point(*s), *d, epsilon = 1e-9);
        }
    }

    #[test]
    fn too_few_pairs() {
        let pairs = corners()[..3].iter().map(|p| (*p, *p)).collect();
        assert!(matches!(
            solve(&SolverInputs::new(pairs)),
            Err(Error::SingularSystem(..))
        ));
        assert!(matches!(
            solve(&SolverInputs::new(vec![])),
            Err(Error::SingularSystem(..))
        ));
    }

    #[test]
    fn duplicate_control_points() {
        let mut src = corners();
        src.push(src[1]);
        let pairs = src.iter().map(|p| (*p, *p)).collect();
        assert!(matches!(
            solve(&SolverInputs::new(pairs)),
            Err(Error::DuplicateControlPoint(1, 5))
        ));
    }

    #[test]
    fn non_finite_landmarks() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let mut src = corners();
            src.push(Point3::new(bad, 0.5, 0.5));
            let pairs = src.iter().map(|p| (*p, *p)).collect();
            assert!(matches!(
                solve(&SolverInputs::new(pairs)),
                Err(Error::SingularSystem("landmarks are not finite"))
            ));

            let mut pairs: Vec<_> = corners().into_iter().map(|p| (p, p)).collect();
            pairs[2].1.z = bad;
            assert!(matches!(
                solve(&SolverInputs::new(pairs)),
                Err(Error::SingularSystem("landmarks are not finite"))
            ));
        }

        let pairs = corners().into_iter().map(|p| (p, p)).collect();
        let mut inputs = SolverInputs::new(pairs);
        inputs.source_prescale = f64::INFINITY;
        assert!(matches!(
            solve(&inputs),
            Err(Error::SingularSystem("landmarks are not finite"))
        ));
    }

    #[test]
    fn coplanar_control_points() {
        let pairs = (0..6)
            .map(|i| {
                let p = Point3::new(i as f64, (i * i) as f64, 2.0);
                (p, p)
            })
            .collect();
        assert!(matches!(
            solve(&SolverInputs::new(pairs)),
            Err(Error::SingularSystem(..))
        ));
    }

    #[test]
    fn prescale() {
        let pairs = corners().into_iter().map(|p| (p, p)).collect();
        let mut inputs = SolverInputs::new(pairs);
        inputs.destination_prescale = 2.0;
        let w = solve(&inputs).unwrap();
        assert_relative_eq!(
            w.warp_point(Point3::new(0.5, 0.5, 0.5)),
            Point3::new(1.0, 1.0, 1.0),
            epsilon = 1e-9
        );

        inputs.source_prescale = 2.0;
        let w = solve(&inputs).unwrap();
        assert_relative_eq!(
            w.control_points()[4],
            Point3::new(2.0, 2.0, 2.0),
            epsilon = 1e-12
        );
        assert_relative_eq!(
            w.warp_point(Point3::new(0.5, 0.5, 0.5)),
            Point3::new(0.5, 0.5, 0.5),
            epsilon = 1e-9
        );
    }

    #[test]
    fn flags() {
        // Scale by 2 along x, rotate 90 degrees about z, then translate
        let f = |p: Point3<f64>| Point3::new(-p.y, 2.0 * p.x, p.z) + Vector3::x();
        let pairs = corners().into_iter().map(|p| (p, f(p))).collect();
        let mut inputs = SolverInputs::new(pairs);

        inputs.flags.translation = false;
        let w = solve(&inputs).unwrap();
        assert_relative_eq!(w.translation(), Vector3::zeros(), epsilon = 1e-12);

        inputs.flags.scale = false;
        let w = solve(&inputs).unwrap();
        for i in 1..4 {
            assert_relative_eq!(w.affine().row(i).norm(), 1.0, epsilon = 1e-9);
        }

        inputs.flags.scale = true;
        inputs.flags.rotation = false;
        let w = solve(&inputs).unwrap();
        let expected =
            Matrix4x3::new(0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(*w.affine(), expected, epsilon = 1e-9);

        inputs.flags.non_affine = false;
        let w = solve(&inputs).unwrap();
        assert!(w.control_points().is_empty());
        assert_eq!(w.radial_coefficients().nrows(), 0);
        assert!(inputs.flags.any());
        assert!(!AffineFlags {
            translation: false,
            scale: false,
            rotation: false,
            non_affine: false
        }
        .any());
    }

    #[test]
    fn identity() {
        let w = SolvedWarp::identity();
        let p = Point3::new(1.0, -2.0, 3.0);
        assert_eq!(w.warp_point(p), p);
    }

    #[test]
    fn trait_solver() {
        let pairs = corners().into_iter().map(|p| (p, p)).collect();
        let inputs = SolverInputs::new(pairs);
        let solver: &dyn CoefficientSolver = &ThinPlateSolver;
        assert_eq!(solver.solve(&inputs).unwrap(), solve(&inputs).unwrap());
    }
}
