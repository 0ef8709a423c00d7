//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random items and change sequences.

use proptest::prelude::*;
use strata_core::{ChangeLog, ItemState, NodeId, NodeState, PropertyId, PropertyState, Value};

/// Strategy for generating node IDs.
pub fn node_id_strategy() -> impl Strategy<Value = NodeId> {
    prop::array::uniform16(any::<u8>()).prop_map(NodeId::from_bytes)
}

/// Strategy for generating valid item names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-zA-Z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for generating non-reference property values.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        ".{0,32}".prop_map(Value::String),
        prop::collection::vec(any::<u8>(), 0..64).prop_map(Value::Binary),
        any::<i64>().prop_map(Value::Long),
        any::<bool>().prop_map(Value::Boolean),
        (-1.0e9f64..1.0e9).prop_map(Value::Double),
    ]
}

/// Strategy for generating a property under `parent`.
pub fn property_strategy(parent: NodeId) -> impl Strategy<Value = PropertyState> {
    (name_strategy(), value_strategy())
        .prop_map(move |(name, value)| PropertyState::new(PropertyId::new(parent, name), value))
}

/// A staging operation on a pool of items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOp {
    /// Stage the addition of the item at this index.
    Add(usize),
    /// Stage a modification of the item at this index.
    Modify(usize),
    /// Stage the deletion of the item at this index.
    Delete(usize),
}

/// Strategy for generating operation sequences over `pool_size` items.
pub fn change_ops_strategy(pool_size: usize, max_ops: usize) -> impl Strategy<Value = Vec<ChangeOp>> {
    let op = prop_oneof![
        (0..pool_size).prop_map(ChangeOp::Add),
        (0..pool_size).prop_map(ChangeOp::Modify),
        (0..pool_size).prop_map(ChangeOp::Delete),
    ];
    prop::collection::vec(op, 0..max_ops)
}

/// Creates `count` fresh, never persisted nodes under `parent`.
pub fn node_pool(parent: NodeId, count: usize) -> Vec<ItemState> {
    (0..count)
        .map(|_| NodeState::new(NodeId::new(), Some(parent), "nt:unstructured").into())
        .collect()
}

/// Applies `ops` to `log`, drawing states from `pool`.
pub fn apply_ops(log: &mut ChangeLog, pool: &[ItemState], ops: &[ChangeOp]) {
    for op in ops {
        match *op {
            ChangeOp::Add(i) => log.add(pool[i].clone()),
            ChangeOp::Modify(i) => log.modify(pool[i].clone()),
            ChangeOp::Delete(i) => log.delete(pool[i].clone()),
        }
    }
}
