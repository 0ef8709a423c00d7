//! Staged item changes.
//!
//! A [`ChangeLog`] collects the creations, modifications and deletions of one
//! unit of work together with the reference deltas they imply. Every id is in
//! at most one of the added, modified and deleted sets at any time; adding and
//! then deleting the same item cancels out instead of leaving a deletion.

use crate::item::{ItemId, ItemState, NodeId, PropertyId};
use crate::references::NodeReferences;
use crate::virtual_provider::VirtualItemStateProvider;
use crate::CoreResult;
use std::collections::HashMap;
use tracing::{debug, warn};

/// A (source property, target node) reference pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferenceDelta {
    /// The REFERENCE property.
    pub source: PropertyId,
    /// The node it points at.
    pub target: NodeId,
}

impl ReferenceDelta {
    /// Creates a reference pair.
    #[must_use]
    pub fn new(source: PropertyId, target: NodeId) -> Self {
        Self { source, target }
    }
}

/// Direction of a reference delta applied to a virtual provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtualDeltaKind {
    /// The source was added to the target's references.
    Added,
    /// The source was removed from the target's references.
    Removed,
}

/// A reference delta already applied to a virtual provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualDelta {
    /// What was done.
    pub kind: VirtualDeltaKind,
    /// The pair it was done to.
    pub delta: ReferenceDelta,
}

/// Result of looking an item up in a [`ChangeLog`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StagedState<'a> {
    /// The item was added or modified; this is its pending state.
    Present(&'a ItemState),
    /// The item is staged for deletion.
    Deleted,
    /// The log does not know the item. Ask the layer below.
    NotStaged,
}

/// Insertion-ordered set of states keyed by item id.
#[derive(Debug, Clone, Default)]
struct StateSet {
    order: Vec<ItemId>,
    states: HashMap<ItemId, ItemState>,
}

impl StateSet {
    /// Inserts or replaces a state. Replacing keeps the original position.
    fn insert(&mut self, state: ItemState) {
        let id = state.id();
        if self.states.insert(id.clone(), state).is_none() {
            self.order.push(id);
        }
    }

    fn remove(&mut self, id: &ItemId) -> Option<ItemState> {
        let state = self.states.remove(id)?;
        self.order.retain(|i| i != id);
        Some(state)
    }

    fn get(&self, id: &ItemId) -> Option<&ItemState> {
        self.states.get(id)
    }

    fn contains(&self, id: &ItemId) -> bool {
        self.states.contains_key(id)
    }

    fn iter(&self) -> impl Iterator<Item = &ItemState> {
        self.order.iter().filter_map(move |id| self.states.get(id))
    }

    fn into_ordered(mut self) -> impl Iterator<Item = ItemState> {
        let order = std::mem::take(&mut self.order);
        order.into_iter().filter_map(move |id| self.states.remove(&id))
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    fn clear(&mut self) {
        self.order.clear();
        self.states.clear();
    }
}

/// Staging area for one unit of work.
///
/// The iteration methods ([`ChangeLog::added_states`] and friends) yield
/// states in insertion order and can be restarted by calling them again.
#[derive(Debug, Clone, Default)]
pub struct ChangeLog {
    added: StateSet,
    modified: StateSet,
    deleted: StateSet,
    added_refs: Vec<ReferenceDelta>,
    removed_refs: Vec<ReferenceDelta>,
    virtual_deltas: Vec<VirtualDelta>,
}

impl ChangeLog {
    /// Creates an empty change log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the creation of an item.
    ///
    /// Re-adding an item that is staged for deletion turns both operations
    /// into a single modification based on the deleted state's version. An
    /// item already staged as modified stays a modification of the same
    /// version.
    pub fn add(&mut self, mut state: ItemState) {
        let id = state.id();
        if let Some(deleted) = self.deleted.remove(&id) {
            state.set_version(deleted.version());
            self.modified.insert(state);
        } else if let Some(modified) = self.modified.get(&id) {
            // Keep the version the modification was based on
            state.set_version(modified.version());
            self.modified.insert(state);
        } else {
            self.added.insert(state);
        }
    }

    /// Records the modification of an item.
    ///
    /// A modification of an item added in this log keeps it in the added set.
    pub fn modify(&mut self, state: ItemState) {
        let id = state.id();
        if self.added.contains(&id) {
            self.added.insert(state);
        } else {
            self.deleted.remove(&id);
            self.modified.insert(state);
        }
    }

    /// Records the deletion of an item.
    ///
    /// Deleting an item added in this log cancels the addition and leaves no
    /// trace of either operation.
    pub fn delete(&mut self, state: ItemState) {
        let id = state.id();
        if self.added.remove(&id).is_some() {
            return;
        }
        let state = match self.modified.remove(&id) {
            // Keep the version the modification was based on
            Some(modified) => {
                let mut state = state;
                state.set_version(modified.version());
                state
            }
            None => state,
        };
        self.deleted.insert(state);
    }

    /// Records that `source` now references `target`.
    ///
    /// Cancels a pending removal of the same pair.
    pub fn add_reference(&mut self, delta: ReferenceDelta) {
        if let Some(pos) = self.removed_refs.iter().position(|d| *d == delta) {
            self.removed_refs.remove(pos);
        } else if !self.added_refs.contains(&delta) {
            self.added_refs.push(delta);
        }
    }

    /// Records that `source` no longer references `target`.
    ///
    /// Cancels a pending addition of the same pair.
    pub fn remove_reference(&mut self, delta: ReferenceDelta) {
        if let Some(pos) = self.added_refs.iter().position(|d| *d == delta) {
            self.added_refs.remove(pos);
        } else if !self.removed_refs.contains(&delta) {
            self.removed_refs.push(delta);
        }
    }

    /// Drops the reference delta sets.
    pub fn clear_reference_deltas(&mut self) {
        self.added_refs.clear();
        self.removed_refs.clear();
    }

    /// Records a reference delta that was applied eagerly to a virtual
    /// provider, so that [`ChangeLog::undo`] can reverse it.
    pub fn record_virtual_delta(&mut self, kind: VirtualDeltaKind, delta: ReferenceDelta) {
        self.virtual_deltas.push(VirtualDelta { kind, delta });
    }

    /// Folds `other` into this log, operation by operation, applying the same
    /// cancellation rules as the individual calls.
    pub fn merge(&mut self, other: ChangeLog) {
        let ChangeLog {
            added,
            modified,
            deleted,
            added_refs,
            removed_refs,
            virtual_deltas,
        } = other;

        for state in added.into_ordered() {
            self.add(state);
        }
        for state in modified.into_ordered() {
            self.modify(state);
        }
        for state in deleted.into_ordered() {
            self.delete(state);
        }
        for delta in added_refs {
            self.add_reference(delta);
        }
        for delta in removed_refs {
            self.remove_reference(delta);
        }
        self.virtual_deltas.extend(virtual_deltas);
    }

    /// Looks up the staged state of an item.
    #[must_use]
    pub fn get(&self, id: &ItemId) -> StagedState<'_> {
        if self.deleted.contains(id) {
            return StagedState::Deleted;
        }
        match self.added.get(id).or_else(|| self.modified.get(id)) {
            Some(state) => StagedState::Present(state),
            None => StagedState::NotStaged,
        }
    }

    /// Returns `true` if this log holds reference deltas for `target`.
    #[must_use]
    pub fn touches_references(&self, target: NodeId) -> bool {
        self.added_refs
            .iter()
            .chain(&self.removed_refs)
            .any(|d| d.target == target)
    }

    /// Returns the staged reference record of `target`: `base` with this
    /// log's deltas applied, or `None` if the log has no deltas for it.
    #[must_use]
    pub fn references(
        &self,
        target: NodeId,
        base: Option<NodeReferences>,
    ) -> Option<NodeReferences> {
        if !self.touches_references(target) {
            return None;
        }
        let mut refs = base.unwrap_or_else(|| NodeReferences::new(target));
        for delta in self.removed_refs.iter().filter(|d| d.target == target) {
            refs.remove_reference(&delta.source);
        }
        for delta in self.added_refs.iter().filter(|d| d.target == target) {
            refs.add_reference(delta.source.clone());
        }
        Some(refs)
    }

    /// Returns the added states in insertion order.
    pub fn added_states(&self) -> impl Iterator<Item = &ItemState> {
        self.added.iter()
    }

    /// Returns the modified states in insertion order.
    pub fn modified_states(&self) -> impl Iterator<Item = &ItemState> {
        self.modified.iter()
    }

    /// Returns the deleted states in insertion order.
    pub fn deleted_states(&self) -> impl Iterator<Item = &ItemState> {
        self.deleted.iter()
    }

    /// Returns the pending reference additions.
    #[must_use]
    pub fn added_references(&self) -> &[ReferenceDelta] {
        &self.added_refs
    }

    /// Returns the pending reference removals.
    #[must_use]
    pub fn removed_references(&self) -> &[ReferenceDelta] {
        &self.removed_refs
    }

    /// Returns the virtual-provider deltas applied on behalf of this log.
    #[must_use]
    pub fn virtual_deltas(&self) -> &[VirtualDelta] {
        &self.virtual_deltas
    }

    /// Returns the number of staged item operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.deleted.len()
    }

    /// Returns `true` if nothing at all is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
            && self.added_refs.is_empty()
            && self.removed_refs.is_empty()
            && self.virtual_deltas.is_empty()
    }

    /// Clears all sets. Called once the log has been committed.
    pub fn reset(&mut self) {
        self.added.clear();
        self.modified.clear();
        self.deleted.clear();
        self.added_refs.clear();
        self.removed_refs.clear();
        self.virtual_deltas.clear();
    }

    /// Discards the log after a failed or rolled back unit of work.
    ///
    /// Staged item operations never reached the canonical store, so they are
    /// simply dropped. Reference deltas already pushed to the virtual
    /// provider are reverted in reverse order. A revert that fails is logged
    /// and skipped so the remaining deltas are still reverted.
    pub fn undo(&mut self, provider: Option<&dyn VirtualItemStateProvider>) {
        let deltas = std::mem::take(&mut self.virtual_deltas);
        match provider {
            Some(provider) => {
                for applied in deltas.iter().rev() {
                    if let Err(e) = revert_virtual_delta(provider, applied) {
                        warn!(
                            source = %applied.delta.source,
                            target = %applied.delta.target,
                            error = %e,
                            "failed to revert virtual reference"
                        );
                    }
                }
            }
            None if !deltas.is_empty() => {
                warn!(
                    count = deltas.len(),
                    "virtual reference deltas dropped without a provider"
                );
            }
            None => {}
        }
        debug!(items = self.len(), "change log undone");
        self.reset();
    }
}

fn revert_virtual_delta(
    provider: &dyn VirtualItemStateProvider,
    applied: &VirtualDelta,
) -> CoreResult<()> {
    let target = applied.delta.target;
    let mut refs = if provider.has_node_references(target)? {
        provider.get_node_references(target)?
    } else {
        NodeReferences::new(target)
    };
    match applied.kind {
        VirtualDeltaKind::Added => {
            refs.remove_reference(&applied.delta.source);
        }
        VirtualDeltaKind::Removed => {
            refs.add_reference(applied.delta.source.clone());
        }
    }
    provider.set_node_references(refs)
}
