//! Change log benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use strata_bench::{change_log_of, generate_subtree};

/// Benchmark staging additions.
fn bench_stage(c: &mut Criterion) {
    let mut group = c.benchmark_group("stage");

    for count in [10, 100, 1000].iter() {
        let items = generate_subtree(*count, 16);
        group.throughput(Throughput::Elements(items.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &items, |b, items| {
            b.iter(|| black_box(change_log_of(items)));
        });
    }
    group.finish();
}

/// Benchmark merging two logs where half of the second cancels the first.
fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");

    for count in [10, 100, 1000].iter() {
        let items = generate_subtree(*count, 16);
        group.throughput(Throughput::Elements(items.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &items, |b, items| {
            b.iter(|| {
                let mut first = change_log_of(items);
                let mut second = change_log_of(&[]);
                for item in items.iter().step_by(2) {
                    second.delete(item.clone());
                }
                first.merge(second);
                black_box(first.len());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_stage, bench_merge);
criterion_main!(benches);
