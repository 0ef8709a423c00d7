//! The read contract shared by every state-manager layer.

use crate::error::CoreResult;
use crate::item::{ItemId, ItemState, NodeId};
use crate::references::NodeReferences;

/// Read access to item states and reference records.
///
/// Implemented by the shared canonical manager, the local and transactional
/// overlays, and virtual providers. Overlays answer from their own pending
/// changes first and delegate everything else to the layer beneath.
pub trait ItemStateManager: Send + Sync {
    /// Returns the state of an item.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::NoSuchItemState`] if the item does not
    /// exist in this view, or another error if the lookup itself failed.
    fn get_item_state(&self, id: &ItemId) -> CoreResult<ItemState>;

    /// Checks whether an item exists in this view.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup itself failed.
    fn has_item_state(&self, id: &ItemId) -> CoreResult<bool>;

    /// Returns the reference record of a target node.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::NoSuchNodeReferences`] if no record exists,
    /// or another error if the lookup itself failed.
    fn get_node_references(&self, target: NodeId) -> CoreResult<NodeReferences>;

    /// Checks whether a reference record exists for a target node.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup itself failed.
    fn has_node_references(&self, target: NodeId) -> CoreResult<bool>;
}
