//! The shared, canonical item-state manager.
//!
//! [`SharedItemStateManager`] owns the persisted view of the content graph.
//! It is only ever mutated through an [`Update`]:
//!
//! 1. [`SharedItemStateManager::begin_update`] takes the update slot,
//!    validates the change log against the canonical state and stages the
//!    resulting record writes
//! 2. [`Update::end`] applies the staged writes atomically and then
//!    dispatches the change notifications
//! 3. [`Update::cancel`] drops the staged writes without touching the store
//!
//! Only one update can be in progress at a time, so staleness and
//! referential integrity are always checked against a consistent snapshot.
//! Reads never wait for the update slot.

use crate::change_log::{ChangeLog, ReferenceDelta, StagedState};
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::item::{ItemId, ItemState, NodeId, NodeState, PropertyId, ROOT_NODE_ID};
use crate::manager::ItemStateManager;
use crate::observation::{EventStateCollection, EventStateCollectionFactory};
use crate::record::{decode_item, decode_references, encode_item, encode_references, item_key, references_key};
use crate::references::NodeReferences;
use crate::stats::UpdateStats;
use crate::types::Version;
use crate::virtual_provider::VirtualItemStateProvider;
use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use strata_storage::{RecordStore, StorageError, WriteBatch};
use tracing::{debug, error, warn};

/// Node type of the repository root.
pub const ROOT_NODE_TYPE: &str = "rep:root";

/// Owns the canonical, persisted view of the content graph.
pub struct SharedItemStateManager {
    /// Persisted records.
    store: Arc<dyn RecordStore>,
    /// The update slot - only one update at a time.
    update_lock: Arc<Mutex<()>>,
    /// Configuration.
    config: Config,
    /// Update protocol counters.
    stats: Arc<UpdateStats>,
}

impl SharedItemStateManager {
    /// Creates a manager over `store`, creating the root node if the store
    /// does not hold it yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or the root cannot be
    /// written.
    pub fn new(store: Arc<dyn RecordStore>, config: Config) -> CoreResult<Self> {
        let manager = Self {
            store,
            update_lock: Arc::new(Mutex::new(())),
            config,
            stats: Arc::new(UpdateStats::new()),
        };
        manager.ensure_root()?;
        Ok(manager)
    }

    fn ensure_root(&self) -> CoreResult<()> {
        let key = item_key(&ItemId::Node(ROOT_NODE_ID));
        if self.store.contains(&key)? {
            return Ok(());
        }
        let root = ItemState::Node(NodeState::new(ROOT_NODE_ID, None, ROOT_NODE_TYPE));
        let mut batch = WriteBatch::new();
        batch.insert(key, encode_item(&root)?);
        match self.store.apply(&batch) {
            Ok(()) => {
                debug!(root = %ROOT_NODE_ID, "created root node");
                Ok(())
            }
            // Someone else created it first
            Err(StorageError::VersionConflict { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the ID of the root node.
    #[must_use]
    pub fn root_id(&self) -> NodeId {
        ROOT_NODE_ID
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the update protocol counters.
    #[must_use]
    pub fn stats(&self) -> &UpdateStats {
        &self.stats
    }

    /// Validates `changes` against the canonical state and stages them.
    ///
    /// On success the returned [`Update`] holds the update slot until it is
    /// ended, cancelled or dropped. The change log's reference delta sets
    /// are recomputed from the canonical values as part of validation.
    ///
    /// # Errors
    ///
    /// - [`CoreError::UpdateLockTimeout`] if another update holds the slot
    ///   for longer than the configured timeout
    /// - [`CoreError::StaleState`] if an item was changed since it was read
    /// - [`CoreError::ReferentialIntegrity`] if a still-referenced node would
    ///   be deleted or a reference points at a missing node
    ///
    /// Validation failures are never retried here. The caller must undo the
    /// change log.
    pub fn begin_update(
        &self,
        changes: &mut ChangeLog,
        factory: Arc<dyn EventStateCollectionFactory>,
        virtual_provider: Option<&dyn VirtualItemStateProvider>,
    ) -> CoreResult<Update> {
        let timeout = self.config.update_lock_timeout;
        let guard = self
            .update_lock
            .try_lock_arc_for(timeout)
            .ok_or(CoreError::UpdateLockTimeout { timeout })?;

        let batch = match self.stage(changes, virtual_provider) {
            Ok(batch) => batch,
            Err(e) => {
                self.stats.record_failure();
                if e.is_stale() {
                    self.stats.record_stale();
                } else if e.is_referential_integrity() {
                    self.stats.record_integrity_violation();
                }
                return Err(e);
            }
        };

        let events = factory.create_event_state_collection(changes);
        let counts = ItemCounts {
            added: changes.added_states().count(),
            modified: changes.modified_states().count(),
            deleted: changes.deleted_states().count(),
        };
        self.stats.record_begin();
        debug!(
            added = counts.added,
            modified = counts.modified,
            deleted = counts.deleted,
            writes = batch.len(),
            "update begun"
        );

        Ok(Update {
            batch,
            events,
            factory,
            store: Arc::clone(&self.store),
            stats: Arc::clone(&self.stats),
            counts,
            guard,
        })
    }

    /// Begins and immediately ends an update.
    ///
    /// # Errors
    ///
    /// Returns any error of [`SharedItemStateManager::begin_update`] or
    /// [`Update::end`].
    pub fn update(
        &self,
        changes: &mut ChangeLog,
        factory: Arc<dyn EventStateCollectionFactory>,
        virtual_provider: Option<&dyn VirtualItemStateProvider>,
    ) -> CoreResult<()> {
        self.begin_update(changes, factory, virtual_provider)?.end()
    }

    /// Validates the change log and turns it into record writes.
    fn stage(
        &self,
        changes: &mut ChangeLog,
        provider: Option<&dyn VirtualItemStateProvider>,
    ) -> CoreResult<WriteBatch> {
        let previous = self.check_staleness(changes)?;
        self.compute_reference_deltas(changes, &previous);

        let references = self.stage_references(changes, provider)?;
        let references = self.check_deleted_targets(changes, provider, references)?;
        if self.config.check_referential_integrity {
            self.check_added_references(changes, provider)?;
        }

        let mut batch = WriteBatch::new();
        for state in changes.added_states() {
            batch.insert(item_key(&state.id()), encode_item(state)?);
        }
        for state in changes.modified_states() {
            batch.update(
                item_key(&state.id()),
                state.version().as_u64(),
                encode_item(state)?,
            );
        }
        for state in changes.deleted_states() {
            batch.delete(item_key(&state.id()), state.version().as_u64());
        }
        for (target, staged) in references {
            let key = references_key(target);
            match (staged.version, staged.refs.has_references()) {
                (_, true) => batch.put(key, staged.version, encode_references(&staged.refs)?),
                (Some(version), false) => batch.delete(key, version),
                // Never persist an empty record
                (None, false) => {}
            }
        }
        Ok(batch)
    }

    /// Checks every staged state against the persisted version and returns
    /// the persisted states of modified and deleted properties.
    fn check_staleness(&self, changes: &ChangeLog) -> CoreResult<HashMap<ItemId, ItemState>> {
        for state in changes.added_states() {
            let id = state.id();
            if let Some(record) = self.store.get(&item_key(&id))? {
                let actual = Some(Version::new(record.version));
                warn!(item = %id, "added item already exists");
                return Err(CoreError::StaleState {
                    id,
                    expected: None,
                    actual,
                });
            }
        }

        let mut previous = HashMap::new();
        for state in changes.modified_states().chain(changes.deleted_states()) {
            let id = state.id();
            let record = self.store.get(&item_key(&id))?;
            let actual = record.as_ref().map(|r| Version::new(r.version));
            if actual != Some(state.version()) {
                warn!(item = %id, expected = %state.version(), "stale item state");
                return Err(CoreError::StaleState {
                    id,
                    expected: Some(state.version()),
                    actual,
                });
            }
            if let (false, Some(record)) = (state.is_node(), record) {
                previous.insert(id.clone(), decode_item(&id, &record)?);
            }
        }
        Ok(previous)
    }

    /// Rebuilds the change log's reference deltas from the REFERENCE
    /// properties it adds, modifies and deletes.
    fn compute_reference_deltas(&self, changes: &mut ChangeLog, previous: &HashMap<ItemId, ItemState>) {
        let mut ops: Vec<(bool, ReferenceDelta)> = Vec::new();

        for prop in changes.added_states().filter_map(ItemState::as_property) {
            for target in prop.reference_targets() {
                ops.push((true, ReferenceDelta::new(prop.id().clone(), target)));
            }
        }
        for state in changes.modified_states() {
            let Some(prop) = state.as_property() else {
                continue;
            };
            if let Some(old) = previous.get(&state.id()).and_then(ItemState::as_property) {
                for target in old.reference_targets() {
                    ops.push((false, ReferenceDelta::new(old.id().clone(), target)));
                }
            }
            for target in prop.reference_targets() {
                ops.push((true, ReferenceDelta::new(prop.id().clone(), target)));
            }
        }
        for state in changes.deleted_states() {
            let Some(prop) = state.as_property() else {
                continue;
            };
            let old = previous
                .get(&state.id())
                .and_then(ItemState::as_property)
                .unwrap_or(prop);
            for target in old.reference_targets() {
                ops.push((false, ReferenceDelta::new(old.id().clone(), target)));
            }
        }

        changes.clear_reference_deltas();
        for (add, delta) in ops {
            if add {
                changes.add_reference(delta);
            } else {
                changes.remove_reference(delta);
            }
        }
    }

    /// Computes the new reference record of every persisted target the
    /// change log touches. Virtual targets are left to the provider.
    fn stage_references(
        &self,
        changes: &ChangeLog,
        provider: Option<&dyn VirtualItemStateProvider>,
    ) -> CoreResult<BTreeMap<NodeId, StagedReferences>> {
        let mut targets: Vec<NodeId> = changes
            .added_references()
            .iter()
            .chain(changes.removed_references())
            .map(|d| d.target)
            .collect();
        targets.sort();
        targets.dedup();

        let mut staged = BTreeMap::new();
        for target in targets {
            if is_virtual(provider, &ItemId::Node(target))? {
                continue;
            }
            let record = self.store.get(&references_key(target))?;
            let version = record.as_ref().map(|r| r.version);
            let base = record.as_ref().map(decode_references).transpose()?;
            if let Some(refs) = changes.references(target, base) {
                staged.insert(target, StagedReferences { version, refs });
            }
        }
        Ok(staged)
    }

    /// Rejects deletion of nodes that persisted properties still reference,
    /// and schedules removal of the reference records of deleted nodes.
    fn check_deleted_targets(
        &self,
        changes: &ChangeLog,
        provider: Option<&dyn VirtualItemStateProvider>,
        mut staged: BTreeMap<NodeId, StagedReferences>,
    ) -> CoreResult<BTreeMap<NodeId, StagedReferences>> {
        for node in changes.deleted_states().filter_map(ItemState::as_node) {
            let target = node.id();
            let (version, refs) = match staged.get(&target) {
                Some(s) => (s.version, s.refs.clone()),
                None => match self.store.get(&references_key(target))? {
                    Some(record) => (Some(record.version), decode_references(&record)?),
                    None => continue,
                },
            };

            if self.config.check_referential_integrity {
                let mut blocking: Vec<&PropertyId> = Vec::new();
                for source in refs.references() {
                    // Virtual sources are rebuilt outside the persisted boundary
                    if !is_virtual(provider, &ItemId::Property(source.clone()))? {
                        blocking.push(source);
                    }
                }
                if let Some(first) = blocking.first() {
                    warn!(node = %target, referrers = blocking.len(), "delete of referenced node");
                    return Err(CoreError::referential_integrity(
                        target,
                        format!(
                            "node is still referenced by {} propert{}, including {first}",
                            blocking.len(),
                            if blocking.len() == 1 { "y" } else { "ies" }
                        ),
                    ));
                }
            }

            // The record goes away with its target
            staged.insert(
                target,
                StagedReferences {
                    version,
                    refs: NodeReferences::new(target),
                },
            );
        }
        Ok(staged)
    }

    /// Rejects references to nodes that exist in no layer.
    fn check_added_references(
        &self,
        changes: &ChangeLog,
        provider: Option<&dyn VirtualItemStateProvider>,
    ) -> CoreResult<()> {
        for delta in changes.added_references() {
            let id = ItemId::Node(delta.target);
            let exists = match changes.get(&id) {
                StagedState::Present(_) => true,
                StagedState::Deleted => false,
                StagedState::NotStaged => {
                    self.store.contains(&item_key(&id))? || is_virtual(provider, &id)?
                }
            };
            if !exists {
                warn!(source = %delta.source, target = %delta.target, "dangling reference");
                return Err(CoreError::referential_integrity(
                    delta.target,
                    format!("{} references a node that does not exist", delta.source),
                ));
            }
        }
        Ok(())
    }
}

impl ItemStateManager for SharedItemStateManager {
    fn get_item_state(&self, id: &ItemId) -> CoreResult<ItemState> {
        match self.store.get(&item_key(id))? {
            Some(record) => decode_item(id, &record),
            None => Err(CoreError::no_such_item(id.clone())),
        }
    }

    fn has_item_state(&self, id: &ItemId) -> CoreResult<bool> {
        Ok(self.store.contains(&item_key(id))?)
    }

    fn get_node_references(&self, target: NodeId) -> CoreResult<NodeReferences> {
        match self.store.get(&references_key(target))? {
            Some(record) => decode_references(&record),
            None => Err(CoreError::NoSuchNodeReferences { target }),
        }
    }

    fn has_node_references(&self, target: NodeId) -> CoreResult<bool> {
        Ok(self.store.contains(&references_key(target))?)
    }
}

impl std::fmt::Debug for SharedItemStateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedItemStateManager")
            .field("config", &self.config)
            .field("update_in_progress", &self.update_lock.is_locked())
            .finish_non_exhaustive()
    }
}

fn is_virtual(provider: Option<&dyn VirtualItemStateProvider>, id: &ItemId) -> CoreResult<bool> {
    match provider {
        Some(provider) => provider.has_item_state(id),
        None => Ok(false),
    }
}

/// A reference record about to be written, with the version it replaces.
struct StagedReferences {
    version: Option<u64>,
    refs: NodeReferences,
}

#[derive(Debug, Clone, Copy)]
struct ItemCounts {
    added: usize,
    modified: usize,
    deleted: usize,
}

/// An update that passed validation and waits to be applied.
///
/// The update holds the shared manager's update slot until it is ended,
/// cancelled or dropped. Dropping it has the same effect on the store as
/// cancelling.
#[must_use = "an update holds the update slot until it is ended or cancelled"]
pub struct Update {
    batch: WriteBatch,
    events: EventStateCollection,
    factory: Arc<dyn EventStateCollectionFactory>,
    store: Arc<dyn RecordStore>,
    stats: Arc<UpdateStats>,
    counts: ItemCounts,
    guard: ArcMutexGuard<RawMutex, ()>,
}

impl Update {
    /// Applies every staged write as a single atomic unit, then dispatches
    /// the change notifications.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the batch. The store is left
    /// unchanged and no notification is dispatched.
    pub fn end(self) -> CoreResult<()> {
        let Update {
            batch,
            events,
            factory,
            store,
            stats,
            counts,
            guard,
        } = self;

        if let Err(e) = store.apply(&batch) {
            stats.record_failure();
            if matches!(e, StorageError::VersionConflict { .. }) {
                stats.record_stale();
            }
            error!(error = %e, writes = batch.len(), "failed to apply update");
            return Err(e.into());
        }
        stats.record_commit(counts.added, counts.modified, counts.deleted);

        // Still inside the update slot so bundles go out in commit order
        factory.dispatch(events);
        drop(guard);

        debug!(writes = batch.len(), "update ended");
        Ok(())
    }

    /// Discards the staged writes without touching the store.
    pub fn cancel(self) {
        self.stats.record_cancel();
        debug!(writes = self.batch.len(), "update cancelled");
    }

    /// Returns the number of record writes this update will apply.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.batch.len()
    }
}

impl std::fmt::Debug for Update {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Update")
            .field("writes", &self.batch.len())
            .field("events", &self.events.events().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{PropertyState, Value};
    use crate::observation::ObservationDispatcher;
    use crate::virtual_provider::InMemoryVirtualProvider;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use strata_storage::{InMemoryRecordStore, Record, RecordKey, StorageResult};

    fn manager() -> (Arc<InMemoryRecordStore>, SharedItemStateManager) {
        let store = Arc::new(InMemoryRecordStore::new());
        let shared = SharedItemStateManager::new(store.clone(), Config::default()).unwrap();
        (store, shared)
    }

    fn dispatcher() -> Arc<ObservationDispatcher> {
        Arc::new(ObservationDispatcher::new())
    }

    fn child_node(parent: NodeId) -> NodeState {
        NodeState::new(NodeId::new(), Some(parent), "nt:unstructured")
    }

    fn commit(shared: &SharedItemStateManager, log: &mut ChangeLog) -> CoreResult<()> {
        shared.update(log, dispatcher(), None)
    }

    fn create(shared: &SharedItemStateManager, state: impl Into<ItemState>) -> ItemState {
        let state = state.into();
        let id = state.id();
        let mut log = ChangeLog::new();
        log.add(state);
        commit(shared, &mut log).unwrap();
        shared.get_item_state(&id).unwrap()
    }

    fn reference(parent: NodeId, name: &str, target: NodeId) -> PropertyState {
        PropertyState::new(PropertyId::new(parent, name), Value::Reference(target))
    }

    /// Store that can be told to reject every batch.
    struct FlakyStore {
        inner: InMemoryRecordStore,
        fail: AtomicBool,
    }

    impl RecordStore for FlakyStore {
        fn get(&self, key: &RecordKey) -> StorageResult<Option<Record>> {
            self.inner.get(key)
        }

        fn apply(&self, batch: &WriteBatch) -> StorageResult<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StorageError::Io(std::io::Error::other("disk full")));
            }
            self.inner.apply(batch)
        }

        fn len(&self) -> StorageResult<usize> {
            self.inner.len()
        }
    }

    #[test]
    fn new_creates_root_once() {
        let (store, shared) = manager();
        let root = shared.get_item_state(&ItemId::Node(ROOT_NODE_ID)).unwrap();
        assert_eq!(root.as_node().unwrap().node_type(), ROOT_NODE_TYPE);
        assert_eq!(root.version(), Version::new(1));

        let again = SharedItemStateManager::new(store.clone(), Config::default()).unwrap();
        assert_eq!(
            again.get_item_state(&ItemId::Node(ROOT_NODE_ID)).unwrap().version(),
            Version::new(1)
        );
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn missing_item_is_not_found() {
        let (_, shared) = manager();
        let id = ItemId::Node(NodeId::new());
        assert!(!shared.has_item_state(&id).unwrap());
        assert!(shared.get_item_state(&id).unwrap_err().is_not_found());
        assert!(shared.get_node_references(NodeId::new()).unwrap_err().is_not_found());
    }

    #[test]
    fn update_persists_added_items() {
        let (_, shared) = manager();
        let node = child_node(ROOT_NODE_ID);
        let stored = create(&shared, node.clone());

        assert_eq!(stored.version(), Version::new(1));
        assert_eq!(stored.as_node().unwrap().parent(), Some(ROOT_NODE_ID));
        let stats = shared.stats().snapshot();
        assert_eq!(stats.updates_committed, 1);
        assert_eq!(stats.items_added, 1);
    }

    #[test]
    fn modify_bumps_version() {
        let (_, shared) = manager();
        let mut node = create(&shared, child_node(ROOT_NODE_ID)).into_node().unwrap();
        node.add_mixin("mix:referenceable");

        let mut log = ChangeLog::new();
        log.modify(node.clone().into());
        commit(&shared, &mut log).unwrap();

        let stored = shared.get_item_state(&ItemId::Node(node.id())).unwrap();
        assert_eq!(stored.version(), Version::new(2));
        assert!(stored.as_node().unwrap().mixins().contains("mix:referenceable"));
    }

    #[test]
    fn stale_modification_is_rejected() {
        let (store, shared) = manager();
        let node = create(&shared, child_node(ROOT_NODE_ID));

        let mut first = ChangeLog::new();
        first.modify(node.clone());
        commit(&shared, &mut first).unwrap();

        let before = store.snapshot();
        let mut second = ChangeLog::new();
        second.modify(node.clone());
        let err = commit(&shared, &mut second).unwrap_err();
        assert!(err.is_stale());
        assert_eq!(store.snapshot(), before);
        assert_eq!(shared.stats().snapshot().stale_conflicts, 1);
    }

    #[test]
    fn adding_existing_item_is_stale() {
        let (_, shared) = manager();
        let node = child_node(ROOT_NODE_ID);
        create(&shared, node.clone());

        let mut log = ChangeLog::new();
        log.add(node.into());
        assert!(commit(&shared, &mut log).unwrap_err().is_stale());
    }

    #[test]
    fn reference_record_tracks_sources() {
        let (_, shared) = manager();
        let target = create(&shared, child_node(ROOT_NODE_ID)).as_node().unwrap().id();
        let prop = reference(ROOT_NODE_ID, "link", target);

        let mut log = ChangeLog::new();
        log.add(prop.clone().into());
        commit(&shared, &mut log).unwrap();

        let refs = shared.get_node_references(target).unwrap();
        assert!(refs.contains(prop.id()));
        assert_eq!(log.added_references().len(), 1);

        // Delete the source: the record must disappear, not linger empty
        let stored = shared.get_item_state(&prop.id().clone().into()).unwrap();
        let mut log = ChangeLog::new();
        log.delete(stored);
        commit(&shared, &mut log).unwrap();
        assert!(!shared.has_node_references(target).unwrap());
    }

    #[test]
    fn retargeting_moves_reference() {
        let (_, shared) = manager();
        let a = create(&shared, child_node(ROOT_NODE_ID)).as_node().unwrap().id();
        let b = create(&shared, child_node(ROOT_NODE_ID)).as_node().unwrap().id();
        let prop = create(&shared, reference(ROOT_NODE_ID, "link", a))
            .into_property()
            .unwrap();

        let mut changed = prop.clone();
        changed.set_value(Value::Reference(b));
        let mut log = ChangeLog::new();
        log.modify(changed.into());
        commit(&shared, &mut log).unwrap();

        assert!(!shared.has_node_references(a).unwrap());
        assert!(shared.get_node_references(b).unwrap().contains(prop.id()));
        assert_eq!(log.removed_references(), &[ReferenceDelta::new(prop.id().clone(), a)]);
    }

    #[test]
    fn deleting_referenced_node_violates_integrity() {
        let (store, shared) = manager();
        let target = create(&shared, child_node(ROOT_NODE_ID));
        let target_id = target.as_node().unwrap().id();
        create(&shared, reference(ROOT_NODE_ID, "link", target_id));

        let before = store.snapshot();
        let mut log = ChangeLog::new();
        log.delete(target);
        let err = commit(&shared, &mut log).unwrap_err();

        assert!(err.is_referential_integrity());
        assert_eq!(store.snapshot(), before);
        assert_eq!(shared.stats().snapshot().integrity_violations, 1);
    }

    #[test]
    fn deleting_node_with_its_referrer_succeeds() {
        let (_, shared) = manager();
        let target = create(&shared, child_node(ROOT_NODE_ID));
        let target_id = target.as_node().unwrap().id();
        let prop = create(&shared, reference(ROOT_NODE_ID, "link", target_id));

        let mut log = ChangeLog::new();
        log.delete(prop);
        log.delete(target);
        commit(&shared, &mut log).unwrap();

        assert!(!shared.has_item_state(&ItemId::Node(target_id)).unwrap());
        assert!(!shared.has_node_references(target_id).unwrap());
    }

    #[test]
    fn integrity_check_can_be_disabled() {
        let store = Arc::new(InMemoryRecordStore::new());
        let config = Config::default().check_referential_integrity(false);
        let shared = SharedItemStateManager::new(store, config).unwrap();

        let mut log = ChangeLog::new();
        log.add(reference(ROOT_NODE_ID, "link", NodeId::new()).into());
        commit(&shared, &mut log).unwrap();
    }

    #[test]
    fn dangling_reference_is_rejected() {
        let (_, shared) = manager();
        let mut log = ChangeLog::new();
        log.add(reference(ROOT_NODE_ID, "link", NodeId::new()).into());
        assert!(commit(&shared, &mut log).unwrap_err().is_referential_integrity());
    }

    #[test]
    fn reference_to_node_added_in_same_log() {
        let (_, shared) = manager();
        let node = child_node(ROOT_NODE_ID);
        let mut log = ChangeLog::new();
        log.add(node.clone().into());
        log.add(reference(ROOT_NODE_ID, "link", node.id()).into());
        commit(&shared, &mut log).unwrap();
        assert_eq!(shared.get_node_references(node.id()).unwrap().len(), 1);
    }

    #[test]
    fn virtual_targets_are_left_to_the_provider() {
        let (_, shared) = manager();
        let provider = InMemoryVirtualProvider::new();
        let target = NodeId::new();
        provider.insert_item(NodeState::new(target, None, "nt:frozenNode").into());

        let mut log = ChangeLog::new();
        log.add(reference(ROOT_NODE_ID, "link", target).into());
        shared.update(&mut log, dispatcher(), Some(&provider)).unwrap();

        assert!(!shared.has_node_references(target).unwrap());
    }

    #[test]
    fn cancel_leaves_store_untouched() {
        let (store, shared) = manager();
        let before = store.snapshot();

        let mut log = ChangeLog::new();
        log.add(child_node(ROOT_NODE_ID).into());
        let update = shared.begin_update(&mut log, dispatcher(), None).unwrap();
        assert_eq!(update.write_count(), 1);
        update.cancel();

        assert_eq!(store.snapshot(), before);
        assert_eq!(shared.stats().snapshot().updates_cancelled, 1);
    }

    #[test]
    fn events_dispatched_only_on_end() {
        let (_, shared) = manager();
        let events = dispatcher();
        let rx = events.subscribe();

        let mut log = ChangeLog::new();
        log.add(child_node(ROOT_NODE_ID).into());
        let update = shared.begin_update(&mut log, events.clone(), None).unwrap();
        assert!(rx.try_recv().is_err());

        update.end().unwrap();
        let bundle = rx.try_recv().unwrap();
        assert_eq!(bundle.events.len(), 1);
    }

    #[test]
    fn second_update_waits_for_the_slot() {
        let store = Arc::new(InMemoryRecordStore::new());
        let config = Config::default().update_lock_timeout(Duration::from_millis(20));
        let shared = SharedItemStateManager::new(store, config).unwrap();

        let mut first = ChangeLog::new();
        first.add(child_node(ROOT_NODE_ID).into());
        let update = shared.begin_update(&mut first, dispatcher(), None).unwrap();

        let mut second = ChangeLog::new();
        second.add(child_node(ROOT_NODE_ID).into());
        let err = shared.begin_update(&mut second, dispatcher(), None).unwrap_err();
        assert!(matches!(err, CoreError::UpdateLockTimeout { .. }));

        update.end().unwrap();
        shared.update(&mut second, dispatcher(), None).unwrap();
    }

    #[test]
    fn failed_end_leaves_store_unchanged() {
        let store = Arc::new(FlakyStore {
            inner: InMemoryRecordStore::new(),
            fail: AtomicBool::new(false),
        });
        let shared = SharedItemStateManager::new(store.clone(), Config::default()).unwrap();
        let events = dispatcher();
        let rx = events.subscribe();

        let mut log = ChangeLog::new();
        log.add(child_node(ROOT_NODE_ID).into());
        let update = shared.begin_update(&mut log, events, None).unwrap();
        store.fail.store(true, Ordering::SeqCst);

        assert!(matches!(update.end(), Err(CoreError::Storage(_))));
        assert_eq!(store.inner.len().unwrap(), 1);
        assert!(rx.try_recv().is_err());
        assert_eq!(shared.stats().snapshot().updates_failed, 1);
    }
}
