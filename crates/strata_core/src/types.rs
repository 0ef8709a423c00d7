//! Core type definitions for Strata.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a transaction.
///
/// Transaction IDs are monotonically increasing and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Version of a persisted item or reference record.
///
/// The record store assigns version 1 on creation and increments it on every
/// update. [`Version::NEW`] marks a state that has never been persisted.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Version(pub u64);

impl Version {
    /// Version of a state that was never persisted.
    pub const NEW: Self = Self(0);

    /// Creates a version from its raw value.
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    /// Returns the raw version value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns `true` if this is [`Version::NEW`].
    #[must_use]
    pub const fn is_new(self) -> bool {
        self.0 == 0
    }

    /// Returns the version as a store expectation (`None` for new states).
    #[must_use]
    pub const fn expected(self) -> Option<u64> {
        if self.is_new() {
            None
        } else {
            Some(self.0)
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_id_ordering() {
        let t1 = TransactionId::new(1);
        let t2 = TransactionId::new(2);
        assert!(t1 < t2);
        assert_eq!(format!("{t2}"), "txn:2");
    }

    #[test]
    fn new_version_has_no_expectation() {
        assert!(Version::NEW.is_new());
        assert_eq!(Version::NEW.expected(), None);
        assert_eq!(Version::new(3).expected(), Some(3));
        assert_eq!(Version::default(), Version::NEW);
    }
}
