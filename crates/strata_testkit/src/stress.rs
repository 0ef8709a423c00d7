//! Stress tests for Strata.
//!
//! These helpers run many transactions against one repository, sequentially
//! or from several threads.

use crate::fixtures::{TestRepository, TEST_NODE_TYPE};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use strata_core::{
    ChangeLog, CoreError, ItemId, ItemStateManager, NodeId, NodeState, ROOT_NODE_ID,
};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total transactions attempted.
    pub total_ops: usize,
    /// Committed transactions.
    pub successful_ops: usize,
    /// Failed transactions.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Transactions per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total transactions: {}", self.total_ops);
        println!("Committed: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} txn/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of transactions per thread.
    pub transactions: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Nodes created by each transaction.
    pub nodes_per_transaction: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            transactions: 100,
            threads: 4,
            nodes_per_transaction: 4,
        }
    }
}

fn new_nodes(count: usize) -> (ChangeLog, Vec<NodeId>) {
    let mut log = ChangeLog::new();
    let mut ids = Vec::with_capacity(count);
    for _ in 0..count {
        let node = NodeState::new(NodeId::new(), Some(ROOT_NODE_ID), TEST_NODE_TYPE);
        ids.push(node.id());
        log.add(node.into());
    }
    (log, ids)
}

/// Runs transactions with disjoint write sets from several threads.
///
/// Every thread checks that the nodes of its open transaction are invisible
/// to a manager outside the transaction. A visibility leak counts as a
/// failure.
pub fn stress_concurrent_transactions(
    repo: &Arc<TestRepository>,
    config: &StressConfig,
) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|_| {
            let repo = Arc::clone(repo);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let config = config.clone();
            thread::spawn(move || {
                let xa = repo.xa();
                let outsider = repo.local();
                for _ in 0..config.transactions {
                    let ctx = repo.begin(&[&xa]);
                    let (mut log, ids) = new_nodes(config.nodes_per_transaction);
                    let staged = xa.update(&mut log);

                    let leaked = ids.iter().any(|id| {
                        outsider
                            .has_item_state(&ItemId::Node(*id))
                            .unwrap_or(true)
                    });
                    match staged.and_then(|()| ctx.prepare_and_commit()) {
                        Ok(()) if !leaked => successful.fetch_add(1, Ordering::Relaxed),
                        _ => failed.fetch_add(1, Ordering::Relaxed),
                    };
                    xa.disassociate();
                }
            })
        })
        .collect();

    for handle in handles {
        if handle.join().is_err() {
            failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Repeatedly adds and removes a reference to one target. The target's
/// reference record must be gone at the end.
pub fn stress_reference_churn(repo: &TestRepository, rounds: usize) -> StressTestResult {
    let target = repo.create_node(ROOT_NODE_ID).id();
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..rounds {
        let prop = repo.create_reference(ROOT_NODE_ID, &format!("ref{i}"), target);
        let local = repo.local();
        let mut log = ChangeLog::new();
        log.delete(prop.into());
        match local.update(&mut log) {
            Ok(()) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    let dangling = repo.has_node_references(target).unwrap_or(true);
    if dangling {
        failed += 1;
    }
    StressTestResult::new(successful, failed, start.elapsed())
}

/// Runs `attempts` concurrent modifications of one node and returns how many
/// hit a stale state. Each attempt re-reads the node before writing.
pub fn stress_stale_conflicts(
    repo: &Arc<TestRepository>,
    threads: usize,
    attempts: usize,
) -> (usize, usize) {
    let node = repo.create_node(ROOT_NODE_ID).id();
    let committed = Arc::new(AtomicUsize::new(0));
    let stale = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let repo = Arc::clone(repo);
            let committed = Arc::clone(&committed);
            let stale = Arc::clone(&stale);
            thread::spawn(move || {
                let local = repo.local();
                for i in 0..attempts {
                    let mut state = repo.node(node);
                    state.add_mixin(format!("mix:t{t}i{i}"));
                    let mut log = ChangeLog::new();
                    log.modify(state.into());
                    match local.update(&mut log) {
                        Ok(()) => committed.fetch_add(1, Ordering::Relaxed),
                        Err(e) if e.is_stale() => stale.fetch_add(1, Ordering::Relaxed),
                        Err(CoreError::UpdateLockTimeout { .. }) => 0,
                        Err(e) => panic!("unexpected error: {e}"),
                    };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Stress thread panicked");
    }
    (committed.load(Ordering::Relaxed), stale.load(Ordering::Relaxed))
}
