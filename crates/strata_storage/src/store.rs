//! Record store trait definition.

use crate::batch::WriteBatch;
use crate::error::StorageResult;
use std::fmt;

/// Key of a record in a [`RecordStore`].
///
/// Keys are opaque byte strings. Callers are responsible for namespacing.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey(Vec<u8>);

impl RecordKey {
    /// Creates a key from raw bytes.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordKey({self})")
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<Vec<u8>> for RecordKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

/// A stored record: a payload plus the version the store assigned to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Store-assigned version. The first write of a key yields version 1 and
    /// every later write increments it.
    pub version: u64,
    /// Opaque payload bytes.
    pub payload: Vec<u8>,
}

/// A persistent, versioned record store.
///
/// Record stores are **opaque**. They keep `key -> (version, payload)`
/// entries and know nothing about items, references, or change logs.
///
/// # Invariants
///
/// - `apply` is atomic: either every operation of the batch takes effect or
///   none does
/// - `apply` fails with [`crate::StorageError::VersionConflict`] when any
///   operation's expected version differs from the stored one
/// - Versions strictly increase per key while the key exists
/// - Stores must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryRecordStore`] - For testing
pub trait RecordStore: Send + Sync {
    /// Reads the record stored under `key`.
    ///
    /// Returns `Ok(None)` if no record exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get(&self, key: &RecordKey) -> StorageResult<Option<Record>>;

    /// Checks whether a record exists under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn contains(&self, key: &RecordKey) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Applies a batch of writes atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Any expected version does not match the stored version
    /// - The batch names the same key twice
    /// - An I/O error occurs
    fn apply(&self, batch: &WriteBatch) -> StorageResult<()>;

    /// Returns the number of stored records.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn len(&self) -> StorageResult<usize>;

    /// Returns `true` if the store holds no records.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }
}
