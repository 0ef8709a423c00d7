//! Transaction ID allocation.

use super::TransactionContext;
use crate::types::TransactionId;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Hands out transaction contexts with unique IDs.
#[derive(Debug)]
pub struct TransactionCoordinator {
    next_txid: AtomicU64,
}

impl TransactionCoordinator {
    /// Creates a coordinator whose first transaction gets ID 1.
    #[must_use]
    pub fn new() -> Self {
        Self::with_next_id(1)
    }

    /// Creates a coordinator continuing from a known ID.
    #[must_use]
    pub fn with_next_id(next_txid: u64) -> Self {
        Self {
            next_txid: AtomicU64::new(next_txid),
        }
    }

    /// Starts a new transaction.
    pub fn begin(&self) -> TransactionContext {
        let id = TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst));
        debug!(txn = %id, "transaction started");
        TransactionContext::new(id)
    }
}

impl Default for TransactionCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_increasing() {
        let coordinator = TransactionCoordinator::new();
        let a = coordinator.begin();
        let b = coordinator.begin();
        assert_eq!(a.id(), TransactionId::new(1));
        assert_eq!(b.id(), TransactionId::new(2));

        let resumed = TransactionCoordinator::with_next_id(42);
        assert_eq!(resumed.begin().id().as_u64(), 42);
    }
}
