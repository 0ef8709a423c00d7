//! Per-workspace item-state manager.
//!
//! [`LocalItemStateManager`] is the single-phase overlay used outside of
//! transactions. Writes push their virtual reference changes to the
//! provider, then go through [`SharedItemStateManager::begin_update`]
//! followed immediately by [`Update::end`]. Reads are
//! answered from the virtual provider, then the pending edit log, then the
//! shared manager.

use crate::change_log::{ChangeLog, StagedState};
use crate::error::{CoreError, CoreResult};
use crate::item::{ItemId, ItemState, NodeId, NodeState, PropertyId, PropertyState, Value};
use crate::manager::ItemStateManager;
use crate::observation::EventStateCollectionFactory;
use crate::references::NodeReferences;
use crate::shared::{SharedItemStateManager, Update};
use crate::virtual_provider::{update_virtual_references, VirtualItemStateProvider};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Single-phase overlay over the shared manager.
pub struct LocalItemStateManager {
    shared: Arc<SharedItemStateManager>,
    factory: Arc<dyn EventStateCollectionFactory>,
    provider: Option<Arc<dyn VirtualItemStateProvider>>,
    /// `None` outside of edit mode.
    edit_log: Mutex<Option<ChangeLog>>,
}

impl LocalItemStateManager {
    /// Creates a workspace manager.
    pub fn new(
        shared: Arc<SharedItemStateManager>,
        factory: Arc<dyn EventStateCollectionFactory>,
    ) -> Self {
        Self {
            shared,
            factory,
            provider: None,
            edit_log: Mutex::new(None),
        }
    }

    /// Attaches a virtual provider.
    #[must_use]
    pub fn with_virtual_provider(mut self, provider: Arc<dyn VirtualItemStateProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Returns the shared manager.
    #[must_use]
    pub fn shared(&self) -> &Arc<SharedItemStateManager> {
        &self.shared
    }

    /// Returns the event factory handed to every update.
    #[must_use]
    pub fn event_factory(&self) -> &Arc<dyn EventStateCollectionFactory> {
        &self.factory
    }

    /// Returns the virtual provider, if any.
    #[must_use]
    pub fn virtual_provider(&self) -> Option<&dyn VirtualItemStateProvider> {
        self.provider.as_deref()
    }

    /// Enters edit mode with an empty edit log.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if already in edit mode.
    pub fn start_edit(&self) -> CoreResult<()> {
        let mut edit_log = self.edit_log.lock();
        if edit_log.is_some() {
            return Err(CoreError::invalid_operation("already in edit mode"));
        }
        *edit_log = Some(ChangeLog::new());
        Ok(())
    }

    /// Returns `true` while in edit mode.
    #[must_use]
    pub fn in_edit_mode(&self) -> bool {
        self.edit_log.lock().is_some()
    }

    /// Creates a new, unsaved node. Call [`store`](Self::store) to stage it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] outside of edit mode.
    pub fn create_node(
        &self,
        parent: Option<NodeId>,
        node_type: impl Into<String>,
    ) -> CoreResult<NodeState> {
        self.require_edit_mode()?;
        Ok(NodeState::new(NodeId::new(), parent, node_type))
    }

    /// Creates a new, unsaved single-valued property.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] outside of edit mode.
    pub fn create_property(
        &self,
        parent: NodeId,
        name: impl Into<String>,
        value: Value,
    ) -> CoreResult<PropertyState> {
        self.require_edit_mode()?;
        Ok(PropertyState::new(PropertyId::new(parent, name), value))
    }

    /// Stages a state: an addition if it was never persisted, a modification
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] outside of edit mode.
    pub fn store(&self, state: impl Into<ItemState>) -> CoreResult<()> {
        let state = state.into();
        self.with_edit_log(|log| {
            if state.version().is_new() {
                log.add(state);
            } else {
                log.modify(state);
            }
        })
    }

    /// Stages the deletion of a state.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] outside of edit mode.
    pub fn destroy(&self, state: impl Into<ItemState>) -> CoreResult<()> {
        let state = state.into();
        self.with_edit_log(|log| log.delete(state))
    }

    /// Leaves edit mode and discards the edit log.
    pub fn cancel_edit(&self) {
        if let Some(mut log) = self.edit_log.lock().take() {
            log.undo(self.virtual_provider());
            debug!("edit cancelled");
        }
    }

    /// Leaves edit mode and returns the edit log.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] outside of edit mode.
    pub fn take_edit_log(&self) -> CoreResult<ChangeLog> {
        self.edit_log
            .lock()
            .take()
            .ok_or_else(|| CoreError::invalid_operation("not in edit mode"))
    }

    /// Leaves edit mode and writes the edit log through to the shared
    /// manager.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] outside of edit mode, or any
    /// error of [`update`](Self::update).
    pub fn save(&self) -> CoreResult<()> {
        let mut log = self.take_edit_log()?;
        self.update(&mut log)
    }

    /// Applies `changes` to the shared manager in a single phase.
    ///
    /// On success the change log is reset. On failure it is undone.
    ///
    /// # Errors
    ///
    /// Returns any error of the shared manager's update protocol.
    pub fn update(&self, changes: &mut ChangeLog) -> CoreResult<()> {
        match self.begin(changes).and_then(Update::end) {
            Ok(()) => {
                changes.reset();
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "single-phase update failed");
                changes.undo(self.virtual_provider());
                Err(e)
            }
        }
    }

    /// Pushes virtual reference changes to the provider and begins an update
    /// of the shared manager.
    ///
    /// On failure the virtual changes already applied are recorded in
    /// `changes` and must be reverted with [`ChangeLog::undo`].
    pub(crate) fn begin(&self, changes: &mut ChangeLog) -> CoreResult<Update> {
        let provider = self.virtual_provider();
        if let Some(provider) = provider {
            update_virtual_references(changes, provider, &*self.shared)?;
        }
        self.shared
            .begin_update(changes, Arc::clone(&self.factory), provider)
    }

    fn require_edit_mode(&self) -> CoreResult<()> {
        if self.in_edit_mode() {
            Ok(())
        } else {
            Err(CoreError::invalid_operation("not in edit mode"))
        }
    }

    fn with_edit_log(&self, f: impl FnOnce(&mut ChangeLog)) -> CoreResult<()> {
        match self.edit_log.lock().as_mut() {
            Some(log) => {
                f(log);
                Ok(())
            }
            None => Err(CoreError::invalid_operation("not in edit mode")),
        }
    }

    /// Looks `id` up in the edit log, if in edit mode.
    pub(crate) fn staged_item_state(&self, id: &ItemId) -> Option<CoreResult<ItemState>> {
        self.edit_log.lock().as_ref().and_then(|log| lookup(log, id))
    }
}

/// Answers an item lookup from a change log, or `None` if the log does not
/// know the item.
pub(crate) fn lookup(log: &ChangeLog, id: &ItemId) -> Option<CoreResult<ItemState>> {
    match log.get(id) {
        StagedState::Present(state) => Some(Ok(state.clone())),
        StagedState::Deleted => Some(Err(CoreError::no_such_item(id.clone()))),
        StagedState::NotStaged => None,
    }
}

/// Answers an existence check from a change log.
pub(crate) fn contains(log: &ChangeLog, id: &ItemId) -> Option<bool> {
    match log.get(id) {
        StagedState::Present(_) => Some(true),
        StagedState::Deleted => Some(false),
        StagedState::NotStaged => None,
    }
}

/// Answers a reference lookup from a change log's pending deltas on top of
/// the manager below.
pub(crate) fn staged_references(
    log: &ChangeLog,
    target: NodeId,
    below: &dyn ItemStateManager,
) -> Option<CoreResult<NodeReferences>> {
    if !log.touches_references(target) {
        return None;
    }
    let base = match below.has_node_references(target) {
        Ok(true) => match below.get_node_references(target) {
            Ok(refs) => Some(refs),
            Err(e) => return Some(Err(e)),
        },
        Ok(false) => None,
        Err(e) => return Some(Err(e)),
    };
    log.references(target, base).map(Ok)
}

/// Returns the virtual provider if `id` is in its domain.
pub(crate) fn virtual_owner<'a>(
    provider: Option<&'a dyn VirtualItemStateProvider>,
    id: &ItemId,
) -> CoreResult<Option<&'a dyn VirtualItemStateProvider>> {
    match provider {
        Some(p) if p.has_item_state(id)? => Ok(Some(p)),
        _ => Ok(None),
    }
}

impl ItemStateManager for LocalItemStateManager {
    fn get_item_state(&self, id: &ItemId) -> CoreResult<ItemState> {
        if let Some(provider) = virtual_owner(self.virtual_provider(), id)? {
            return provider.get_item_state(id);
        }
        if let Some(result) = self.staged_item_state(id) {
            return result;
        }
        self.shared.get_item_state(id)
    }

    fn has_item_state(&self, id: &ItemId) -> CoreResult<bool> {
        if virtual_owner(self.virtual_provider(), id)?.is_some() {
            return Ok(true);
        }
        let staged = self.edit_log.lock().as_ref().and_then(|log| contains(log, id));
        match staged {
            Some(found) => Ok(found),
            None => self.shared.has_item_state(id),
        }
    }

    fn get_node_references(&self, target: NodeId) -> CoreResult<NodeReferences> {
        if let Some(provider) = self.virtual_provider() {
            if provider.has_node_references(target)? {
                return provider.get_node_references(target);
            }
        }
        let staged = self
            .edit_log
            .lock()
            .as_ref()
            .and_then(|log| staged_references(log, target, self.shared.as_ref()));
        match staged {
            Some(refs) => refs,
            None => self.shared.get_node_references(target),
        }
    }

    fn has_node_references(&self, target: NodeId) -> CoreResult<bool> {
        match self.get_node_references(target) {
            Ok(refs) => Ok(refs.has_references()),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for LocalItemStateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalItemStateManager")
            .field("in_edit_mode", &self.in_edit_mode())
            .field("has_virtual_provider", &self.provider.is_some())
            .finish_non_exhaustive()
    }
}
