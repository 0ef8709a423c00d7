//! Error types for Strata core.

use crate::item::{ItemId, NodeId};
use crate::types::Version;
use std::fmt;
use std::time::Duration;
use strata_storage::StorageError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Phase of the two-phase commit protocol in which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionPhase {
    /// `prepare`
    Prepare,
    /// `commit`
    Commit,
}

impl fmt::Display for TransactionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prepare => f.write_str("prepare"),
            Self::Commit => f.write_str("commit"),
        }
    }
}

/// Errors that can occur in Strata core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Record store error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A record could not be encoded or decoded.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// No state exists for the item.
    ///
    /// This is a normal negative lookup, not a failure of the layer.
    #[error("no such item state: {id}")]
    NoSuchItemState {
        /// The item that was looked up.
        id: ItemId,
    },

    /// No reference record exists for the node.
    #[error("no references to node {target}")]
    NoSuchNodeReferences {
        /// The target node that was looked up.
        target: NodeId,
    },

    /// The item was modified by someone else since it was read.
    ///
    /// `None` means "did not exist".
    #[error("stale item state {id}: expected {expected:?}, found {actual:?}")]
    StaleState {
        /// The conflicting item.
        id: ItemId,
        /// Version the change was based on.
        expected: Option<Version>,
        /// Version currently persisted.
        actual: Option<Version>,
    },

    /// A change would leave a REFERENCE pointing at a missing node.
    #[error("referential integrity violation on node {target}: {reason}")]
    ReferentialIntegrity {
        /// The referenced node.
        target: NodeId,
        /// Why the change was rejected.
        reason: String,
    },

    /// A two-phase commit step failed.
    #[error("unable to {phase} transaction: {source}")]
    TransactionFailure {
        /// Phase that failed.
        phase: TransactionPhase,
        /// The underlying failure.
        #[source]
        source: Box<CoreError>,
    },

    /// Another update held the update slot for too long.
    #[error("timed out after {timeout:?} waiting for the update lock")]
    UpdateLockTimeout {
        /// How long the caller waited.
        timeout: Duration,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a no-such-item error.
    pub fn no_such_item(id: impl Into<ItemId>) -> Self {
        Self::NoSuchItemState { id: id.into() }
    }

    /// Creates a referential integrity error.
    pub fn referential_integrity(target: NodeId, reason: impl Into<String>) -> Self {
        Self::ReferentialIntegrity {
            target,
            reason: reason.into(),
        }
    }

    /// Wraps an error as a failure of the given commit phase.
    pub fn transaction_failure(phase: TransactionPhase, source: CoreError) -> Self {
        Self::TransactionFailure {
            phase,
            source: Box::new(source),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns the innermost error, looking through transaction failures.
    #[must_use]
    pub fn root_cause(&self) -> &CoreError {
        match self {
            Self::TransactionFailure { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Returns `true` for a negative lookup.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NoSuchItemState { .. } | Self::NoSuchNodeReferences { .. }
        )
    }

    /// Returns `true` if the failure is a concurrent modification that the
    /// caller may retry after re-reading.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        matches!(
            self.root_cause(),
            Self::StaleState { .. } | Self::Storage(StorageError::VersionConflict { .. })
        )
    }

    /// Returns `true` if the failure is a referential integrity violation.
    #[must_use]
    pub fn is_referential_integrity(&self) -> bool {
        matches!(self.root_cause(), Self::ReferentialIntegrity { .. })
    }

    /// Returns the failed phase if this is a transaction failure.
    #[must_use]
    pub fn phase(&self) -> Option<TransactionPhase> {
        match self {
            Self::TransactionFailure { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_failure_sees_through() {
        let target = NodeId::new();
        let err = CoreError::transaction_failure(
            TransactionPhase::Prepare,
            CoreError::referential_integrity(target, "still referenced"),
        );
        assert!(err.is_referential_integrity());
        assert!(!err.is_stale());
        assert_eq!(err.phase(), Some(TransactionPhase::Prepare));
        assert!(err.to_string().starts_with("unable to prepare transaction"));
    }

    #[test]
    fn store_conflict_counts_as_stale() {
        let err = CoreError::from(StorageError::VersionConflict {
            key: strata_storage::RecordKey::new(vec![1]),
            expected: Some(1),
            actual: Some(2),
        });
        assert!(err.is_stale());
    }

    #[test]
    fn not_found_is_distinct() {
        let err = CoreError::no_such_item(NodeId::new());
        assert!(err.is_not_found());
        assert!(!err.is_stale());
        assert!(err.phase().is_none());
    }
}
