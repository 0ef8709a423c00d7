//! # Strata Storage
//!
//! Versioned record store trait and implementations for Strata.
//!
//! This crate provides the lowest-level persistence abstraction for Strata.
//! Record stores are **opaque**: they map a key to a version and a byte
//! payload and do not interpret the payload.
//!
//! ## Design Principles
//!
//! - Every record carries a version assigned by the store
//! - Writes arrive as a [`WriteBatch`] applied all-or-nothing
//! - Each batch operation states the version it expects to replace, so
//!   concurrent modification is detected at apply time
//! - Stores must be `Send + Sync` for concurrent access
//!
//! ## Available Stores
//!
//! - [`InMemoryRecordStore`] - For testing and ephemeral repositories
//!
//! ## Example
//!
//! ```rust
//! use strata_storage::{InMemoryRecordStore, RecordKey, RecordStore, WriteBatch};
//!
//! let store = InMemoryRecordStore::new();
//! let key = RecordKey::new(b"item-1".to_vec());
//!
//! let mut batch = WriteBatch::new();
//! batch.insert(key.clone(), b"hello".to_vec());
//! store.apply(&batch).unwrap();
//!
//! let record = store.get(&key).unwrap().unwrap();
//! assert_eq!(record.version, 1);
//! assert_eq!(record.payload, b"hello");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod error;
mod memory;
mod store;

pub use batch::{BatchOp, WriteBatch};
pub use error::{StorageError, StorageResult};
pub use memory::InMemoryRecordStore;
pub use store::{Record, RecordKey, RecordStore};
