//! Item states.
//!
//! A state is a snapshot of one item as seen by a particular layer. States
//! carry the [`Version`] of the persisted record they were read from, which
//! is what staleness checks compare against.

use crate::item::{ItemId, NodeId, PropertyId, PropertyType, Value};
use crate::types::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// An entry in a node's ordered child list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildNodeEntry {
    /// Name of the child under its parent.
    pub name: String,
    /// ID of the child node.
    pub id: NodeId,
}

/// State of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    id: NodeId,
    parent: Option<NodeId>,
    node_type: String,
    mixins: BTreeSet<String>,
    child_nodes: Vec<ChildNodeEntry>,
    property_names: BTreeSet<String>,
    #[serde(skip)]
    version: Version,
}

impl NodeState {
    /// Creates a new, never persisted node state.
    #[must_use]
    pub fn new(id: NodeId, parent: Option<NodeId>, node_type: impl Into<String>) -> Self {
        Self {
            id,
            parent,
            node_type: node_type.into(),
            mixins: BTreeSet::new(),
            child_nodes: Vec::new(),
            property_names: BTreeSet::new(),
            version: Version::NEW,
        }
    }

    /// Returns the node ID.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Returns the parent node ID, `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Returns the primary node type name.
    #[must_use]
    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    /// Returns the mixin type names.
    #[must_use]
    pub fn mixins(&self) -> &BTreeSet<String> {
        &self.mixins
    }

    /// Adds a mixin type name.
    pub fn add_mixin(&mut self, mixin: impl Into<String>) {
        self.mixins.insert(mixin.into());
    }

    /// Returns the ordered child list.
    #[must_use]
    pub fn child_nodes(&self) -> &[ChildNodeEntry] {
        &self.child_nodes
    }

    /// Returns the entry for the child with the given name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&ChildNodeEntry> {
        self.child_nodes.iter().find(|e| e.name == name)
    }

    /// Appends a child entry.
    pub fn add_child(&mut self, name: impl Into<String>, id: NodeId) {
        self.child_nodes.push(ChildNodeEntry {
            name: name.into(),
            id,
        });
    }

    /// Removes the child entry pointing at `id`. Returns `true` if one existed.
    pub fn remove_child(&mut self, id: NodeId) -> bool {
        let before = self.child_nodes.len();
        self.child_nodes.retain(|e| e.id != id);
        self.child_nodes.len() != before
    }

    /// Returns the names of the node's properties.
    #[must_use]
    pub fn property_names(&self) -> &BTreeSet<String> {
        &self.property_names
    }

    /// Returns `true` if the node has a property with this name.
    #[must_use]
    pub fn has_property_name(&self, name: &str) -> bool {
        self.property_names.contains(name)
    }

    /// Records a property name.
    pub fn add_property_name(&mut self, name: impl Into<String>) {
        self.property_names.insert(name.into());
    }

    /// Forgets a property name. Returns `true` if it was present.
    pub fn remove_property_name(&mut self, name: &str) -> bool {
        self.property_names.remove(name)
    }

    /// Returns the persisted version this state was read from.
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    pub(crate) fn set_version(&mut self, version: Version) {
        self.version = version;
    }
}

/// State of a property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyState {
    id: PropertyId,
    property_type: PropertyType,
    values: Vec<Value>,
    multi_valued: bool,
    #[serde(skip)]
    version: Version,
}

impl PropertyState {
    /// Creates a new, never persisted single-valued property state.
    #[must_use]
    pub fn new(id: PropertyId, value: Value) -> Self {
        Self {
            id,
            property_type: value.property_type(),
            values: vec![value],
            multi_valued: false,
            version: Version::NEW,
        }
    }

    /// Creates a new, never persisted multi-valued property state.
    #[must_use]
    pub fn multi(id: PropertyId, property_type: PropertyType, values: Vec<Value>) -> Self {
        Self {
            id,
            property_type,
            values,
            multi_valued: true,
            version: Version::NEW,
        }
    }

    /// Returns the property ID.
    #[must_use]
    pub fn id(&self) -> &PropertyId {
        &self.id
    }

    /// Returns the type tag.
    #[must_use]
    pub fn property_type(&self) -> PropertyType {
        self.property_type
    }

    /// Returns the values.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Returns `true` if the property holds a value list.
    #[must_use]
    pub fn is_multi_valued(&self) -> bool {
        self.multi_valued
    }

    /// Replaces the values, retyping the property after the first value.
    pub fn set_values(&mut self, values: Vec<Value>) {
        if let Some(first) = values.first() {
            self.property_type = first.property_type();
        }
        self.values = values;
    }

    /// Replaces the value with a single value.
    pub fn set_value(&mut self, value: Value) {
        self.property_type = value.property_type();
        self.values = vec![value];
        self.multi_valued = false;
    }

    /// Returns `true` if this is a REFERENCE property.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        self.property_type == PropertyType::Reference
    }

    /// Returns the target nodes of a REFERENCE property.
    ///
    /// Empty for any other property type.
    pub fn reference_targets(&self) -> impl Iterator<Item = NodeId> + '_ {
        let values: &[Value] = if self.is_reference() {
            &self.values
        } else {
            &[]
        };
        values.iter().filter_map(Value::as_reference)
    }

    /// Returns the persisted version this state was read from.
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    pub(crate) fn set_version(&mut self, version: Version) {
        self.version = version;
    }
}

/// State of any item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ItemState {
    /// A node.
    Node(NodeState),
    /// A property.
    Property(PropertyState),
}

impl ItemState {
    /// Returns the item ID.
    #[must_use]
    pub fn id(&self) -> ItemId {
        match self {
            Self::Node(n) => ItemId::Node(n.id()),
            Self::Property(p) => ItemId::Property(p.id().clone()),
        }
    }

    /// Returns `true` for node states.
    #[must_use]
    pub fn is_node(&self) -> bool {
        matches!(self, Self::Node(_))
    }

    /// Returns the node state, if this is one.
    #[must_use]
    pub fn as_node(&self) -> Option<&NodeState> {
        match self {
            Self::Node(n) => Some(n),
            Self::Property(_) => None,
        }
    }

    /// Returns the property state, if this is one.
    #[must_use]
    pub fn as_property(&self) -> Option<&PropertyState> {
        match self {
            Self::Node(_) => None,
            Self::Property(p) => Some(p),
        }
    }

    /// Consumes the state, returning the node state if this is one.
    #[must_use]
    pub fn into_node(self) -> Option<NodeState> {
        match self {
            Self::Node(n) => Some(n),
            Self::Property(_) => None,
        }
    }

    /// Consumes the state, returning the property state if this is one.
    #[must_use]
    pub fn into_property(self) -> Option<PropertyState> {
        match self {
            Self::Node(_) => None,
            Self::Property(p) => Some(p),
        }
    }

    /// Returns the ID of the node owning this item, `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        match self {
            Self::Node(n) => n.parent(),
            Self::Property(p) => Some(p.id().parent()),
        }
    }

    /// Returns the persisted version this state was read from.
    #[must_use]
    pub fn version(&self) -> Version {
        match self {
            Self::Node(n) => n.version(),
            Self::Property(p) => p.version(),
        }
    }

    pub(crate) fn set_version(&mut self, version: Version) {
        match self {
            Self::Node(n) => n.set_version(version),
            Self::Property(p) => p.set_version(version),
        }
    }
}

impl From<NodeState> for ItemState {
    fn from(state: NodeState) -> Self {
        Self::Node(state)
    }
}

impl From<PropertyState> for ItemState {
    fn from(state: PropertyState) -> Self {
        Self::Property(state)
    }
}
