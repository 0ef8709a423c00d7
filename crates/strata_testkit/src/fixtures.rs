//! Test fixtures and repository helpers.
//!
//! Provides a fully wired repository over an in-memory store, with a virtual
//! provider and an observation dispatcher attached.

use std::collections::BTreeMap;
use std::sync::Arc;
use strata_core::{
    ChangeLog, Config, InMemoryVirtualProvider, ItemId, ItemState, ItemStateManager,
    LocalItemStateManager, NodeId, NodeState, ObservationDispatcher, PropertyId, PropertyState,
    SharedItemStateManager, TransactionContext, TransactionCoordinator, Value,
    XaItemStateManager,
};
use strata_storage::{InMemoryRecordStore, Record, RecordKey};
use tracing_subscriber::EnvFilter;

/// Node type used for fixture nodes.
pub const TEST_NODE_TYPE: &str = "nt:unstructured";

/// A repository over an in-memory store.
pub struct TestRepository {
    /// The record store.
    pub store: Arc<InMemoryRecordStore>,
    /// The canonical manager.
    pub shared: Arc<SharedItemStateManager>,
    /// A virtual subtree attached to every workspace manager.
    pub provider: Arc<InMemoryVirtualProvider>,
    /// Observation dispatcher handed to every update.
    pub events: Arc<ObservationDispatcher>,
    coordinator: TransactionCoordinator,
}

impl TestRepository {
    /// Creates a repository with the default configuration.
    pub fn memory() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a repository with a custom configuration.
    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(InMemoryRecordStore::new());
        let events = Arc::new(ObservationDispatcher::with_max_history(
            config.observation_history,
        ));
        let shared = Arc::new(
            SharedItemStateManager::new(store.clone(), config)
                .expect("Failed to create shared manager"),
        );
        Self {
            store,
            shared,
            provider: Arc::new(InMemoryVirtualProvider::new()),
            events,
            coordinator: TransactionCoordinator::new(),
        }
    }

    /// Creates a workspace manager.
    pub fn local(&self) -> LocalItemStateManager {
        LocalItemStateManager::new(self.shared.clone(), self.events.clone())
            .with_virtual_provider(self.provider.clone())
    }

    /// Creates a transactional workspace manager.
    pub fn xa(&self) -> Arc<XaItemStateManager> {
        Arc::new(XaItemStateManager::new(self.local()))
    }

    /// Creates a transactional workspace manager with its own branch
    /// attribute.
    pub fn xa_with_attribute(&self, attribute: &str) -> Arc<XaItemStateManager> {
        Arc::new(XaItemStateManager::with_attribute(self.local(), attribute))
    }

    /// Starts a transaction with `managers` enlisted.
    pub fn begin(&self, managers: &[&Arc<XaItemStateManager>]) -> TransactionContext {
        let ctx = self.coordinator.begin();
        for manager in managers {
            let manager: Arc<XaItemStateManager> = Arc::clone(manager);
            ctx.enlist(manager).expect("Failed to enlist manager");
        }
        ctx
    }

    /// Creates and persists a node under `parent`.
    pub fn create_node(&self, parent: NodeId) -> NodeState {
        let node = NodeState::new(NodeId::new(), Some(parent), TEST_NODE_TYPE);
        self.commit(|log| log.add(node.clone().into()));
        self.node(node.id())
    }

    /// Creates and persists a REFERENCE property `parent/name -> target`.
    pub fn create_reference(&self, parent: NodeId, name: &str, target: NodeId) -> PropertyState {
        let prop = PropertyState::new(PropertyId::new(parent, name), Value::Reference(target));
        self.commit(|log| log.add(prop.clone().into()));
        self.property(prop.id())
    }

    /// Adds a node to the virtual subtree.
    pub fn create_virtual_node(&self) -> NodeId {
        let id = NodeId::new();
        self.provider
            .insert_item(NodeState::new(id, None, "nt:versionHistory").into());
        id
    }

    /// Builds a change log with `f` and writes it through a workspace
    /// manager.
    pub fn commit(&self, f: impl FnOnce(&mut ChangeLog)) {
        let mut log = ChangeLog::new();
        f(&mut log);
        self.local().update(&mut log).expect("Failed to commit change log");
    }

    /// Reads a persisted node.
    pub fn node(&self, id: NodeId) -> NodeState {
        self.item(ItemId::Node(id))
            .into_node()
            .expect("Item is not a node")
    }

    /// Reads a persisted property.
    pub fn property(&self, id: &PropertyId) -> PropertyState {
        self.item(ItemId::Property(id.clone()))
            .into_property()
            .expect("Item is not a property")
    }

    /// Reads a persisted item.
    pub fn item(&self, id: ItemId) -> ItemState {
        self.shared.get_item_state(&id).expect("Failed to read item")
    }

    /// Returns `true` if the canonical store holds `id`.
    pub fn exists(&self, id: impl Into<ItemId>) -> bool {
        self.shared
            .has_item_state(&id.into())
            .expect("Failed to check item")
    }

    /// Returns a copy of every record in the store.
    pub fn snapshot(&self) -> BTreeMap<RecordKey, Record> {
        self.store.snapshot()
    }
}

impl std::ops::Deref for TestRepository {
    type Target = SharedItemStateManager;

    fn deref(&self) -> &Self::Target {
        &self.shared
    }
}

/// Runs a test with a fresh in-memory repository.
///
/// # Example
///
/// ```rust,ignore
/// use strata_testkit::with_repository;
///
/// #[test]
/// fn my_test() {
///     with_repository(|repo| {
///         let node = repo.create_node(ROOT_NODE_ID);
///         assert!(repo.exists(node.id()));
///     });
/// }
/// ```
pub fn with_repository<F, R>(f: F) -> R
where
    F: FnOnce(&TestRepository) -> R,
{
    let repo = TestRepository::memory();
    f(&repo)
}

/// Installs a test log subscriber honouring `RUST_LOG`. Safe to call from
/// every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
