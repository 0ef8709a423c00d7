//! Inbound reference bookkeeping.

use crate::item::{NodeId, PropertyId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The set of REFERENCE properties currently pointing at one node.
///
/// Sources are tracked individually rather than counted so that removals can
/// be undone and dependents enumerated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeReferences {
    target: NodeId,
    sources: BTreeSet<PropertyId>,
}

impl NodeReferences {
    /// Creates an empty record for `target`.
    #[must_use]
    pub fn new(target: NodeId) -> Self {
        Self {
            target,
            sources: BTreeSet::new(),
        }
    }

    /// Returns the referenced node.
    #[must_use]
    pub fn target(&self) -> NodeId {
        self.target
    }

    /// Adds a source property. Returns `true` if it was not present.
    pub fn add_reference(&mut self, source: PropertyId) -> bool {
        self.sources.insert(source)
    }

    /// Removes a source property. Returns `true` if it was present.
    pub fn remove_reference(&mut self, source: &PropertyId) -> bool {
        self.sources.remove(source)
    }

    /// Returns `true` if `source` currently references the target.
    #[must_use]
    pub fn contains(&self, source: &PropertyId) -> bool {
        self.sources.contains(source)
    }

    /// Returns the source properties in sorted order.
    pub fn references(&self) -> impl Iterator<Item = &PropertyId> {
        self.sources.iter()
    }

    /// Returns `true` if at least one source remains.
    #[must_use]
    pub fn has_references(&self) -> bool {
        !self.sources.is_empty()
    }

    /// Returns the number of sources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Returns `true` if no source remains.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
