//! Benchmarks for `voro_surge` incremental diagram construction.
//!
//! Run with: `cargo bench --bench diagram_benchmarks`
//!
//! These benchmarks test:
//! - Point-site insertion throughput at increasing diagram sizes
//! - Segment insertion (endpoints plus the line site)
//! - Full diagram validation (`check`)

use divan::{Bencher, black_box};
use glam::DVec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use voro_surge::VoronoiDiagram;

fn main() {
    divan::main();
}

/// Seeded random points inside half the working radius.
fn random_points(count: usize, seed: u64) -> Vec<DVec2> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            DVec2::new(
                rng.random_range(-50.0..50.0),
                rng.random_range(-50.0..50.0),
            )
        })
        .collect()
}

/// Disjoint short horizontal segments arranged in rows.
fn segment_rows(count: usize) -> Vec<(DVec2, DVec2)> {
    (0..count)
        .map(|i| {
            let row = (i / 4) as f64;
            let col = (i % 4) as f64;
            let x0 = -40.0 + col * 20.0;
            let y = -30.0 + row * 15.0;
            (DVec2::new(x0, y), DVec2::new(x0 + 12.0, y))
        })
        .collect()
}

#[divan::bench(args = [10, 50, 200])]
fn insert_points(bencher: Bencher, count: usize) {
    let points = random_points(count, 7);
    bencher.bench(|| {
        let mut vd = VoronoiDiagram::new(100.0, 16);
        for &p in &points {
            vd.insert_point_site(black_box(p)).unwrap();
        }
        vd.num_vertices()
    });
}

#[divan::bench(args = [4, 8])]
fn insert_segments(bencher: Bencher, count: usize) {
    let segments = segment_rows(count);
    bencher.bench(|| {
        let mut vd = VoronoiDiagram::new(100.0, 16);
        for &(p, q) in &segments {
            let a = vd.insert_point_site(black_box(p)).unwrap();
            let b = vd.insert_point_site(black_box(q)).unwrap();
            vd.insert_line_site(a, b).unwrap();
        }
        vd.num_edges()
    });
}

#[divan::bench]
fn check_diagram(bencher: Bencher) {
    let mut vd = VoronoiDiagram::new(100.0, 16);
    for &p in &random_points(100, 11) {
        vd.insert_point_site(p).unwrap();
    }
    bencher.bench(|| black_box(&vd).check());
}
