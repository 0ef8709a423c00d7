//! Virtual item state providers.
//!
//! A virtual provider supplies items that are not persisted by the canonical
//! store, such as generated or mounted subtrees. Its items take part in
//! reference tracking, but its writes are applied eagerly and are never
//! staged by the update protocol. Whoever changes a provider is responsible
//! for undoing the change.

use crate::change_log::{ChangeLog, ReferenceDelta, VirtualDeltaKind};
use crate::error::{CoreError, CoreResult};
use crate::item::{ItemId, ItemState, NodeId, PropertyState};
use crate::manager::ItemStateManager;
use crate::references::NodeReferences;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// A pluggable source of virtual items.
pub trait VirtualItemStateProvider: ItemStateManager {
    /// Stores an updated reference record for a virtual target.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be stored.
    fn set_node_references(&self, refs: NodeReferences) -> CoreResult<()>;
}

/// A virtual subtree held in memory.
///
/// # Example
///
/// ```rust
/// use strata_core::{
///     InMemoryVirtualProvider, ItemId, ItemStateManager, NodeId, NodeState,
/// };
///
/// let provider = InMemoryVirtualProvider::new();
/// let id = NodeId::new();
/// provider.insert_item(NodeState::new(id, None, "nt:versionHistory").into());
/// assert!(provider.has_item_state(&ItemId::Node(id)).unwrap());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVirtualProvider {
    items: RwLock<HashMap<ItemId, ItemState>>,
    references: RwLock<HashMap<NodeId, NodeReferences>>,
}

impl InMemoryVirtualProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mounts an item into the virtual subtree.
    pub fn insert_item(&self, state: ItemState) {
        self.items.write().insert(state.id(), state);
    }

    /// Unmounts an item. Returns the removed state, if any.
    pub fn remove_item(&self, id: &ItemId) -> Option<ItemState> {
        self.items.write().remove(id)
    }

    /// Returns the number of mounted items.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.items.read().len()
    }
}

impl ItemStateManager for InMemoryVirtualProvider {
    fn get_item_state(&self, id: &ItemId) -> CoreResult<ItemState> {
        self.items
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::no_such_item(id.clone()))
    }

    fn has_item_state(&self, id: &ItemId) -> CoreResult<bool> {
        Ok(self.items.read().contains_key(id))
    }

    fn get_node_references(&self, target: NodeId) -> CoreResult<NodeReferences> {
        self.references
            .read()
            .get(&target)
            .cloned()
            .ok_or(CoreError::NoSuchNodeReferences { target })
    }

    fn has_node_references(&self, target: NodeId) -> CoreResult<bool> {
        Ok(self.references.read().contains_key(&target))
    }
}

impl VirtualItemStateProvider for InMemoryVirtualProvider {
    fn set_node_references(&self, refs: NodeReferences) -> CoreResult<()> {
        // Virtual targets may keep an empty record
        self.references.write().insert(refs.target(), refs);
        Ok(())
    }
}

/// Pushes the log's REFERENCE changes on virtual targets to `provider` right
/// away, recording each effective change in the log so that
/// [`ChangeLog::undo`] can revert it.
///
/// Items are walked added, then modified, then deleted. A modified property
/// first loses the references of its `canonical` value and then gains those
/// of its new value. Targets outside the provider's domain are left to the
/// update protocol.
pub(crate) fn update_virtual_references(
    changes: &mut ChangeLog,
    provider: &dyn VirtualItemStateProvider,
    canonical: &dyn ItemStateManager,
) -> CoreResult<()> {
    let mut ops = Vec::new();
    let push = |ops: &mut Vec<(VirtualDeltaKind, ReferenceDelta)>,
                kind: VirtualDeltaKind,
                prop: &PropertyState| {
        for target in prop.reference_targets() {
            ops.push((kind, ReferenceDelta::new(prop.id().clone(), target)));
        }
    };

    for prop in changes.added_states().filter_map(ItemState::as_property) {
        push(&mut ops, VirtualDeltaKind::Added, prop);
    }
    for prop in changes.modified_states().filter_map(ItemState::as_property) {
        if let Some(old) = canonical_property(canonical, prop)? {
            push(&mut ops, VirtualDeltaKind::Removed, &old);
        }
        push(&mut ops, VirtualDeltaKind::Added, prop);
    }
    for prop in changes.deleted_states().filter_map(ItemState::as_property) {
        let old = canonical_property(canonical, prop)?;
        push(&mut ops, VirtualDeltaKind::Removed, old.as_ref().unwrap_or(prop));
    }

    for (kind, delta) in ops {
        if !provider.has_item_state(&ItemId::Node(delta.target))? {
            continue;
        }
        let mut refs = if provider.has_node_references(delta.target)? {
            provider.get_node_references(delta.target)?
        } else {
            NodeReferences::new(delta.target)
        };
        let changed = match kind {
            VirtualDeltaKind::Added => refs.add_reference(delta.source.clone()),
            VirtualDeltaKind::Removed => refs.remove_reference(&delta.source),
        };
        if changed {
            provider.set_node_references(refs)?;
            debug!(source = %delta.source, target = %delta.target, ?kind, "virtual reference updated");
            changes.record_virtual_delta(kind, delta);
        }
    }
    Ok(())
}

fn canonical_property(
    canonical: &dyn ItemStateManager,
    prop: &PropertyState,
) -> CoreResult<Option<PropertyState>> {
    let id = ItemId::Property(prop.id().clone());
    if !canonical.has_item_state(&id)? {
        return Ok(None);
    }
    Ok(canonical.get_item_state(&id)?.into_property())
}
