//! Benchmark utilities.

use rand::Rng;
use std::sync::Arc;
use strata_core::{
    ChangeLog, Config, ItemState, LocalItemStateManager, NodeId, NodeState,
    ObservationDispatcher, PropertyId, PropertyState, SharedItemStateManager, Value,
    ROOT_NODE_ID,
};
use strata_storage::InMemoryRecordStore;

/// Generate random binary data of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Create a workspace manager over a fresh in-memory store.
pub fn workspace() -> LocalItemStateManager {
    let store = Arc::new(InMemoryRecordStore::new());
    let shared = Arc::new(
        SharedItemStateManager::new(store, Config::default()).expect("Failed to create manager"),
    );
    LocalItemStateManager::new(shared, Arc::new(ObservationDispatcher::new()))
}

/// Generate `count` new nodes under the root, each with a binary property of
/// `payload_size` bytes.
pub fn generate_subtree(count: usize, payload_size: usize) -> Vec<ItemState> {
    let mut items = Vec::with_capacity(count * 2);
    for _ in 0..count {
        let node = NodeState::new(NodeId::new(), Some(ROOT_NODE_ID), "nt:unstructured");
        let prop = PropertyState::new(
            PropertyId::new(node.id(), "data"),
            Value::Binary(random_data(payload_size)),
        );
        items.push(node.into());
        items.push(prop.into());
    }
    items
}

/// Build a change log adding every item.
pub fn change_log_of(items: &[ItemState]) -> ChangeLog {
    let mut log = ChangeLog::new();
    for item in items {
        log.add(item.clone());
    }
    log
}
