use criterion::{
    BenchmarkId, Criterion, black_box, criterion_group, criterion_main,
};
use nalgebra::{Point3, Vector3};
use tpswarp::{
    eval::{ThreadPool, warp_points_in_place},
    solver::{SolverInputs, solve},
    types::Normalized,
};

/// Landmarks scattered on a bumpy sphere, displaced outwards
fn landmarks(n: usize) -> SolverInputs {
    let pairs = (0..n)
        .map(|i| {
            let t = i as f64 / n as f64;
            let theta = t * std::f64::consts::TAU * 7.0;
            let phi = (1.0 - 2.0 * t).acos();
            let p = Point3::new(
                phi.sin() * theta.cos(),
                phi.sin() * theta.sin(),
                phi.cos(),
            );
            let bump = 1.0 + 0.1 * (theta * 3.0).sin();
            (p, p * bump + Vector3::new(0.0, 0.0, 0.2))
        })
        .collect();
    SolverInputs::new(pairs)
}

fn points(n: usize) -> Vec<Point3<f64>> {
    (0..n)
        .map(|i| {
            let f = i as f64 / n as f64;
            Point3::new(f.sin(), (f * 5.0).cos(), f)
        })
        .collect()
}

pub fn solve_vs_landmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("solve vs landmark count");
    for n in [16, 64, 256] {
        let inputs = &landmarks(n);
        group.bench_function(BenchmarkId::new("solve", n), move |b| {
            b.iter(|| black_box(solve(inputs).unwrap()))
        });
    }
}

pub fn warp_vs_threads(c: &mut Criterion) {
    let warp = &solve(&landmarks(64)).unwrap();
    let base = &points(200_000);

    let mut group = c.benchmark_group("speed vs threads (200k points)");
    for threads in [1, 2, 4, 8] {
        let pool = &ThreadPool::with_threads(threads).unwrap();
        group.bench_function(BenchmarkId::new("warp", threads), move |b| {
            b.iter(|| {
                let mut pts = base.clone();
                warp_points_in_place(warp, &mut pts, Normalized::ONE, Some(pool));
                black_box(pts)
            })
        });
    }
}

criterion_group!(benches, solve_vs_landmarks, warp_vs_threads);
criterion_main!(benches);
