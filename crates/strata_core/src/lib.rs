//! # Strata Core
//!
//! Transactional item-state layer for the Strata content repository.
//!
//! This crate provides:
//! - [`ChangeLog`] staging of item creations, modifications and deletions
//!   together with their reference deltas
//! - [`SharedItemStateManager`], the canonical view with its
//!   begin/end/cancel update protocol
//! - [`LocalItemStateManager`], the single-phase per-workspace overlay
//! - [`XaItemStateManager`], the per-transaction overlay taking part in
//!   two-phase commit through an explicit [`TransactionContext`]
//! - Reference tracking across persisted and virtual items
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use strata_core::{
//!     ChangeLog, Config, ItemId, ItemStateManager, LocalItemStateManager, NodeId, NodeState,
//!     ObservationDispatcher, SharedItemStateManager, ROOT_NODE_ID,
//! };
//! use strata_storage::InMemoryRecordStore;
//!
//! let store = Arc::new(InMemoryRecordStore::new());
//! let shared = Arc::new(SharedItemStateManager::new(store, Config::default()).unwrap());
//! let local = LocalItemStateManager::new(shared.clone(), Arc::new(ObservationDispatcher::new()));
//!
//! let node = NodeState::new(NodeId::new(), Some(ROOT_NODE_ID), "nt:unstructured");
//! let id = ItemId::Node(node.id());
//! let mut changes = ChangeLog::new();
//! changes.add(node.into());
//! local.update(&mut changes).unwrap();
//!
//! assert!(shared.has_item_state(&id).unwrap());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change_log;
mod config;
mod error;
mod item;
mod local;
mod manager;
mod observation;
pub mod record;
mod references;
mod shared;
mod stats;
mod transaction;
mod types;
mod virtual_provider;

pub use change_log::{ChangeLog, ReferenceDelta, StagedState, VirtualDelta, VirtualDeltaKind};
pub use config::Config;
pub use error::{CoreError, CoreResult, TransactionPhase};
pub use item::{
    ChildNodeEntry, ItemId, ItemState, NodeId, NodeState, PropertyId, PropertyState,
    PropertyType, Value, ROOT_NODE_ID,
};
pub use local::LocalItemStateManager;
pub use manager::ItemStateManager;
pub use observation::{
    EventBundle, EventStateCollection, EventStateCollectionFactory, EventType, ItemEvent,
    ObservationDispatcher,
};
pub use references::NodeReferences;
pub use shared::{SharedItemStateManager, Update, ROOT_NODE_TYPE};
pub use stats::{StatsSnapshot, UpdateStats};
pub use transaction::{
    BranchStatus, TransactionBranch, TransactionContext, TransactionCoordinator,
    XaItemStateManager, XaResource,
};
pub use types::{TransactionId, Version};
pub use virtual_provider::{InMemoryVirtualProvider, VirtualItemStateProvider};
