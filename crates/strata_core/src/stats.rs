//! Update statistics.
//!
//! # Usage
//!
//! ```rust,ignore
//! let stats = shared.stats().snapshot();
//! println!("committed: {}", stats.updates_committed);
//! println!("stale: {}", stats.stale_conflicts);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters of the shared manager's update protocol.
///
/// All counters are atomic and can be read while updates are in progress.
#[derive(Debug, Default)]
pub struct UpdateStats {
    updates_begun: AtomicU64,
    updates_committed: AtomicU64,
    updates_cancelled: AtomicU64,
    updates_failed: AtomicU64,
    stale_conflicts: AtomicU64,
    integrity_violations: AtomicU64,
    items_added: AtomicU64,
    items_modified: AtomicU64,
    items_deleted: AtomicU64,
}

impl UpdateStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_begin(&self) {
        self.updates_begun.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self, added: usize, modified: usize, deleted: usize) {
        self.updates_committed.fetch_add(1, Ordering::Relaxed);
        self.items_added.fetch_add(added as u64, Ordering::Relaxed);
        self.items_modified
            .fetch_add(modified as u64, Ordering::Relaxed);
        self.items_deleted.fetch_add(deleted as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_cancel(&self) {
        self.updates_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.updates_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stale(&self) {
        self.stale_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_integrity_violation(&self) {
        self.integrity_violations.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            updates_begun: self.updates_begun.load(Ordering::Relaxed),
            updates_committed: self.updates_committed.load(Ordering::Relaxed),
            updates_cancelled: self.updates_cancelled.load(Ordering::Relaxed),
            updates_failed: self.updates_failed.load(Ordering::Relaxed),
            stale_conflicts: self.stale_conflicts.load(Ordering::Relaxed),
            integrity_violations: self.integrity_violations.load(Ordering::Relaxed),
            items_added: self.items_added.load(Ordering::Relaxed),
            items_modified: self.items_modified.load(Ordering::Relaxed),
            items_deleted: self.items_deleted.load(Ordering::Relaxed),
        }
    }
}

/// A copy of [`UpdateStats`] at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Updates that passed validation.
    pub updates_begun: u64,
    /// Updates durably applied.
    pub updates_committed: u64,
    /// Updates cancelled before being applied.
    pub updates_cancelled: u64,
    /// Updates rejected by validation or failed while applying.
    pub updates_failed: u64,
    /// Stale-state conflicts detected.
    pub stale_conflicts: u64,
    /// Referential integrity violations detected.
    pub integrity_violations: u64,
    /// Items created by committed updates.
    pub items_added: u64,
    /// Items modified by committed updates.
    pub items_modified: u64,
    /// Items deleted by committed updates.
    pub items_deleted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = UpdateStats::new();
        stats.record_begin();
        stats.record_commit(2, 1, 0);
        stats.record_begin();
        stats.record_cancel();
        stats.record_stale();
        stats.record_failure();

        let snap = stats.snapshot();
        assert_eq!(snap.updates_begun, 2);
        assert_eq!(snap.updates_committed, 1);
        assert_eq!(snap.updates_cancelled, 1);
        assert_eq!(snap.updates_failed, 1);
        assert_eq!(snap.stale_conflicts, 1);
        assert_eq!(snap.items_added, 2);
        assert_eq!(snap.items_modified, 1);
        assert_eq!(snap.integrity_violations, 0);
    }
}
