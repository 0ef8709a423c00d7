//! Update protocol benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use strata_bench::{change_log_of, generate_subtree, workspace};
use strata_core::{
    ChangeLog, ItemId, ItemStateManager, PropertyId, PropertyState, TransactionCoordinator, Value,
    XaItemStateManager, ROOT_NODE_ID,
};

/// Benchmark single-phase updates of growing size.
fn bench_single_phase(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_phase_update");

    for count in [1, 10, 100].iter() {
        group.throughput(Throughput::Elements(*count as u64 * 2));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let local = workspace();
            b.iter(|| {
                let mut log = change_log_of(&generate_subtree(count, 64));
                local.update(black_box(&mut log)).unwrap();
            });
        });
    }
    group.finish();
}

/// Benchmark a full prepare/commit cycle.
fn bench_two_phase(c: &mut Criterion) {
    let mut group = c.benchmark_group("two_phase_commit");

    for count in [1, 10, 100].iter() {
        group.throughput(Throughput::Elements(*count as u64 * 2));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let xa = Arc::new(XaItemStateManager::new(workspace()));
            let coordinator = TransactionCoordinator::new();
            b.iter(|| {
                let ctx = coordinator.begin();
                ctx.enlist(xa.clone()).unwrap();
                let mut log = change_log_of(&generate_subtree(count, 64));
                xa.update(&mut log).unwrap();
                ctx.prepare_and_commit().unwrap();
            });
        });
    }
    group.finish();
}

/// Benchmark updates that add references to one hot target.
fn bench_reference_fan_in(c: &mut Criterion) {
    let mut group = c.benchmark_group("reference_fan_in");

    group.bench_function("add_reference", |b| {
        let local = workspace();
        let target = generate_subtree(1, 0).remove(0);
        let target_id = target.as_node().map(|n| n.id()).unwrap();
        let mut log = change_log_of(&[target]);
        local.update(&mut log).unwrap();

        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            let prop = PropertyState::new(
                PropertyId::new(ROOT_NODE_ID, format!("ref{i}")),
                Value::Reference(target_id),
            );
            let mut log = ChangeLog::new();
            log.add(prop.into());
            local.update(&mut log).unwrap();
        });
    });
    group.finish();
}

/// Benchmark reads through the overlay stack.
fn bench_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("read");

    let local = workspace();
    let items = generate_subtree(1000, 64);
    let ids: Vec<ItemId> = items.iter().map(|s| s.id()).collect();
    local.update(&mut change_log_of(&items)).unwrap();

    group.throughput(Throughput::Elements(ids.len() as u64));
    group.bench_function("get_item_state", |b| {
        b.iter(|| {
            for id in &ids {
                black_box(local.get_item_state(id).unwrap());
            }
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_single_phase,
    bench_two_phase,
    bench_reference_fan_in,
    bench_read,
);

criterion_main!(benches);
