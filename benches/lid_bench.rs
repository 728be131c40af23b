//! Performance benchmarks for the LID estimator
//!
//! Measures exact k-NN LID over small uniform datasets and the per-point MLE

use adasweep::lid::{exact_lid, mle_lid};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;

fn uniform(points: usize, dim: usize) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..points * dim).map(|_| rng.random_range(0.0..1.0)).collect()
}

fn bench_exact_lid(c: &mut Criterion) {
    let mut group = c.benchmark_group("exact_lid");
    group.sample_size(10);
    for points in [1_000, 4_000] {
        let data = uniform(points, 16);
        group.bench_with_input(BenchmarkId::from_parameter(points), &data, |b, data| {
            b.iter(|| black_box(exact_lid(black_box(data), 16, 20)));
        });
    }
    group.finish();
}

fn bench_mle(c: &mut Criterion) {
    c.bench_function("mle_lid_k100", |b| {
        let distances: Vec<f32> = (1..=100).map(|i| i as f32 * 0.01).collect();
        b.iter(|| black_box(mle_lid(black_box(&distances))));
    });
}

criterion_group!(benches, bench_exact_lid, bench_mle);
criterion_main!(benches);
