//! The transactional item-state manager.

use super::{BranchStatus, TransactionBranch, TransactionContext, XaResource};
use crate::change_log::ChangeLog;
use crate::error::{CoreError, CoreResult, TransactionPhase};
use crate::item::{ItemId, ItemState, NodeId};
use crate::local::{self, LocalItemStateManager};
use crate::manager::ItemStateManager;
use crate::references::NodeReferences;
use crate::shared::Update;
use crate::virtual_provider::VirtualItemStateProvider;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

type Branch = Arc<Mutex<TransactionBranch>>;

/// Per-workspace manager that takes part in two-phase commit.
///
/// Outside of a transaction it behaves like its [`LocalItemStateManager`].
/// Once associated with a [`TransactionContext`], [`update`](Self::update)
/// only merges into the transaction's pending change log, and nothing
/// reaches the shared manager until the coordinator commits.
///
/// Reads consult, in order: the virtual provider for ids in its domain, the
/// in-flight log exposed by [`XaResource::before_operation`], the bound
/// transaction's pending log, and finally the local overlay.
pub struct XaItemStateManager {
    local: LocalItemStateManager,
    /// Key of this manager's branch in a transaction context.
    attribute: String,
    /// Branch of the associated transaction.
    tx_branch: RwLock<Option<Branch>>,
    /// Snapshot of the log being prepared or committed.
    in_flight: RwLock<Option<Arc<ChangeLog>>>,
}

impl XaItemStateManager {
    /// Wraps a workspace manager, keeping its branch under the configured
    /// change log attribute.
    pub fn new(local: LocalItemStateManager) -> Self {
        let attribute = local.shared().config().change_log_attribute.clone();
        Self::with_attribute(local, attribute)
    }

    /// Wraps a workspace manager, keeping its branch under `attribute`.
    pub fn with_attribute(local: LocalItemStateManager, attribute: impl Into<String>) -> Self {
        Self {
            local,
            attribute: attribute.into(),
            tx_branch: RwLock::new(None),
            in_flight: RwLock::new(None),
        }
    }

    /// Returns the wrapped workspace manager.
    #[must_use]
    pub fn local(&self) -> &LocalItemStateManager {
        &self.local
    }

    /// Returns the attribute this manager's branch is stored under.
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Returns `true` while bound to a transaction.
    #[must_use]
    pub fn is_associated(&self) -> bool {
        self.tx_branch.read().is_some()
    }

    /// Unbinds the manager from its transaction. Later writes go straight to
    /// the shared manager again.
    pub fn disassociate(&self) {
        *self.tx_branch.write() = None;
    }

    fn provider(&self) -> Option<&dyn VirtualItemStateProvider> {
        self.local.virtual_provider()
    }

    /// Stages `changes`.
    ///
    /// When bound to a transaction the log is merged into the transaction's
    /// pending log and `changes` is left empty. Otherwise it is written
    /// through in a single phase.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if the bound branch is being
    /// prepared or is prepared, or any error of
    /// [`LocalItemStateManager::update`].
    pub fn update(&self, changes: &mut ChangeLog) -> CoreResult<()> {
        let Some(branch) = self.tx_branch.read().clone() else {
            return self.local.update(changes);
        };
        let mut branch = branch.lock();
        match branch.status {
            BranchStatus::Preparing | BranchStatus::Prepared => {
                return Err(CoreError::invalid_operation(format!(
                    "transaction branch is {}",
                    branch.status
                )));
            }
            BranchStatus::Committed | BranchStatus::RolledBack => {
                branch.status = BranchStatus::Active;
            }
            BranchStatus::Active => {}
        }
        branch.changes.merge(std::mem::take(changes));
        debug!(pending = branch.changes.len(), "changes merged into transaction");
        Ok(())
    }

    /// Leaves edit mode and stages the edit log through
    /// [`update`](Self::update).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] outside of edit mode, or any
    /// error of [`update`](Self::update).
    pub fn save(&self) -> CoreResult<()> {
        let mut log = self.local.take_edit_log()?;
        self.update(&mut log)
    }

    fn begin(&self, changes: &mut ChangeLog) -> CoreResult<Update> {
        self.local.begin(changes)
    }

    /// Reads the bound transaction's pending log.
    fn bound_log<T>(&self, f: impl FnOnce(&ChangeLog) -> Option<T>) -> Option<T> {
        let branch = self.tx_branch.read().clone()?;
        let branch = branch.lock();
        f(&branch.changes)
    }

    fn in_flight_log(&self) -> Option<Arc<ChangeLog>> {
        self.in_flight.read().clone()
    }
}

impl XaResource for XaItemStateManager {
    fn associate(&self, ctx: &TransactionContext) -> CoreResult<()> {
        let branch = ctx.branch_or_create(&self.attribute);
        *self.tx_branch.write() = Some(branch);
        debug!(txn = %ctx.id(), attribute = %self.attribute, "associated");
        Ok(())
    }

    fn before_operation(&self, ctx: &TransactionContext) {
        if let Some(branch) = ctx.branch(&self.attribute) {
            let snapshot = branch.lock().changes.clone();
            *self.in_flight.write() = Some(Arc::new(snapshot));
        }
    }

    fn prepare(&self, ctx: &TransactionContext) -> CoreResult<()> {
        let Some(branch) = ctx.branch(&self.attribute) else {
            return Ok(());
        };

        let mut changes = {
            let mut b = branch.lock();
            match b.status {
                BranchStatus::Active => {}
                BranchStatus::Prepared => return Ok(()),
                status => {
                    return Err(CoreError::transaction_failure(
                        TransactionPhase::Prepare,
                        CoreError::invalid_operation(format!("transaction branch is {status}")),
                    ));
                }
            }
            b.status = BranchStatus::Preparing;
            std::mem::take(&mut b.changes)
        };

        // The branch lock is not held while calling out so that re-entrant
        // reads cannot deadlock. Writers are held off by the Preparing status,
        // and a rollback arriving meanwhile marks the branch RolledBack.
        match self.begin(&mut changes) {
            Ok(update) => {
                let mut b = branch.lock();
                if b.status == BranchStatus::Preparing {
                    b.changes = changes;
                    b.update = Some(update);
                    b.status = BranchStatus::Prepared;
                    debug!(txn = %ctx.id(), items = b.changes.len(), "branch prepared");
                    return Ok(());
                }
                drop(b);

                update.cancel();
                changes.undo(self.provider());
                warn!(txn = %ctx.id(), "branch rolled back while preparing");
                Err(CoreError::transaction_failure(
                    TransactionPhase::Prepare,
                    CoreError::invalid_operation(
                        "transaction branch was rolled back while preparing",
                    ),
                ))
            }
            Err(e) => {
                changes.undo(self.provider());
                let mut b = branch.lock();
                if b.status == BranchStatus::Preparing {
                    b.status = BranchStatus::RolledBack;
                }
                error!(txn = %ctx.id(), error = %e, "unable to prepare transaction");
                Err(CoreError::transaction_failure(TransactionPhase::Prepare, e))
            }
        }
    }

    fn commit(&self, ctx: &TransactionContext) -> CoreResult<()> {
        let Some(branch) = ctx.branch(&self.attribute) else {
            return Ok(());
        };

        let (update, mut changes) = {
            let mut b = branch.lock();
            match b.status {
                BranchStatus::Prepared => {}
                BranchStatus::Committed => return Ok(()),
                status => {
                    return Err(CoreError::transaction_failure(
                        TransactionPhase::Commit,
                        CoreError::invalid_operation(format!("transaction branch is {status}")),
                    ));
                }
            }
            (b.update.take(), std::mem::take(&mut b.changes))
        };

        match update.map_or(Ok(()), Update::end) {
            Ok(()) => {
                let items = changes.len();
                changes.reset();
                let mut b = branch.lock();
                b.changes = changes;
                b.status = BranchStatus::Committed;
                info!(txn = %ctx.id(), items, "transaction committed");
                Ok(())
            }
            Err(e) => {
                changes.undo(self.provider());
                let mut b = branch.lock();
                b.changes = changes;
                b.status = BranchStatus::RolledBack;
                error!(txn = %ctx.id(), error = %e, "unable to commit transaction");
                Err(CoreError::transaction_failure(TransactionPhase::Commit, e))
            }
        }
    }

    fn rollback(&self, ctx: &TransactionContext) -> CoreResult<()> {
        let Some(branch) = ctx.branch(&self.attribute) else {
            return Ok(());
        };

        let (update, mut changes) = {
            let mut b = branch.lock();
            if b.status == BranchStatus::Preparing {
                // The preparing call still owns the log and reverts it itself
                debug!(txn = %ctx.id(), "rollback requested while preparing");
            }
            b.status = BranchStatus::RolledBack;
            (b.update.take(), std::mem::take(&mut b.changes))
        };

        if let Some(update) = update {
            update.cancel();
        }
        changes.undo(self.provider());
        debug!(txn = %ctx.id(), "branch rolled back");
        Ok(())
    }

    fn after_operation(&self, _ctx: &TransactionContext) {
        *self.in_flight.write() = None;
    }
}

impl ItemStateManager for XaItemStateManager {
    fn get_item_state(&self, id: &ItemId) -> CoreResult<ItemState> {
        if let Some(provider) = local::virtual_owner(self.provider(), id)? {
            return provider.get_item_state(id);
        }
        if let Some(log) = self.in_flight_log() {
            if let Some(result) = local::lookup(&log, id) {
                return result;
            }
        }
        if let Some(result) = self.bound_log(|log| local::lookup(log, id)) {
            return result;
        }
        self.local.get_item_state(id)
    }

    fn has_item_state(&self, id: &ItemId) -> CoreResult<bool> {
        if local::virtual_owner(self.provider(), id)?.is_some() {
            return Ok(true);
        }
        if let Some(log) = self.in_flight_log() {
            if let Some(found) = local::contains(&log, id) {
                return Ok(found);
            }
        }
        if let Some(found) = self.bound_log(|log| local::contains(log, id)) {
            return Ok(found);
        }
        self.local.has_item_state(id)
    }

    fn get_node_references(&self, target: NodeId) -> CoreResult<NodeReferences> {
        if let Some(provider) = self.provider() {
            if provider.has_node_references(target)? {
                return provider.get_node_references(target);
            }
        }
        if let Some(log) = self.in_flight_log() {
            if let Some(refs) = local::staged_references(&log, target, &self.local) {
                return refs;
            }
        }
        if let Some(refs) =
            self.bound_log(|log| local::staged_references(log, target, &self.local))
        {
            return refs;
        }
        self.local.get_node_references(target)
    }

    fn has_node_references(&self, target: NodeId) -> CoreResult<bool> {
        match self.get_node_references(target) {
            Ok(refs) => Ok(refs.has_references()),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for XaItemStateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XaItemStateManager")
            .field("attribute", &self.attribute)
            .field("associated", &self.is_associated())
            .field("in_flight", &self.in_flight.read().is_some())
            .finish_non_exhaustive()
    }
}
