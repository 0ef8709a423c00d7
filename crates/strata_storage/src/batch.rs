//! Atomic write batches.

use crate::store::RecordKey;

/// A single operation of a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Write `payload` under `key`.
    ///
    /// `expected` is the version being replaced, or `None` if the key must
    /// not exist yet.
    Put {
        /// Target key.
        key: RecordKey,
        /// Version expected to be stored right now.
        expected: Option<u64>,
        /// New payload.
        payload: Vec<u8>,
    },
    /// Remove the record under `key`, which must currently have version
    /// `expected`.
    Delete {
        /// Target key.
        key: RecordKey,
        /// Version expected to be stored right now.
        expected: u64,
    },
}

impl BatchOp {
    /// Returns the key this operation touches.
    #[must_use]
    pub fn key(&self) -> &RecordKey {
        match self {
            Self::Put { key, .. } | Self::Delete { key, .. } => key,
        }
    }

    /// Returns the version this operation expects to find.
    #[must_use]
    pub fn expected(&self) -> Option<u64> {
        match self {
            Self::Put { expected, .. } => *expected,
            Self::Delete { expected, .. } => Some(*expected),
        }
    }
}

/// An ordered set of operations applied all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a write of a key that must not exist yet.
    pub fn insert(&mut self, key: RecordKey, payload: Vec<u8>) {
        self.ops.push(BatchOp::Put {
            key,
            expected: None,
            payload,
        });
    }

    /// Adds a write replacing the record at version `expected`.
    pub fn update(&mut self, key: RecordKey, expected: u64, payload: Vec<u8>) {
        self.ops.push(BatchOp::Put {
            key,
            expected: Some(expected),
            payload,
        });
    }

    /// Adds a write with an explicit expectation.
    pub fn put(&mut self, key: RecordKey, expected: Option<u64>, payload: Vec<u8>) {
        self.ops.push(BatchOp::Put {
            key,
            expected,
            payload,
        });
    }

    /// Adds a removal of the record at version `expected`.
    pub fn delete(&mut self, key: RecordKey, expected: u64) {
        self.ops.push(BatchOp::Delete { key, expected });
    }

    /// Returns the operations in insertion order.
    #[must_use]
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Returns the number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns `true` if the batch has no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
