//! Error types for storage operations.

use crate::store::RecordKey;
use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A batch operation expected a different record version.
    ///
    /// `None` on either side means "no record".
    #[error("version conflict on {key}: expected {expected:?}, found {actual:?}")]
    VersionConflict {
        /// Key of the conflicting record.
        key: RecordKey,
        /// Version the batch expected to replace.
        expected: Option<u64>,
        /// Version currently stored.
        actual: Option<u64>,
    },

    /// The same key appears more than once in a batch.
    #[error("duplicate key in batch: {0}")]
    DuplicateKey(RecordKey),

    /// The store contents are corrupted.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// The store is closed.
    #[error("storage is closed")]
    Closed,
}
