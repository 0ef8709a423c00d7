//! Transaction context and per-resource branches.

use super::XaResource;
use crate::change_log::ChangeLog;
use crate::error::CoreResult;
use crate::shared::Update;
use crate::types::TransactionId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Status of one resource's branch of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchStatus {
    /// Accepting work.
    Active,
    /// Being validated.
    Preparing,
    /// Validated; the update slot is held until commit or rollback.
    Prepared,
    /// Applied. New work reopens the branch.
    Committed,
    /// Discarded. New work reopens the branch.
    RolledBack,
}

impl BranchStatus {
    /// Returns `true` for `Committed` and `RolledBack`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }
}

impl fmt::Display for BranchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Active => "active",
            Self::Preparing => "preparing",
            Self::Prepared => "prepared",
            Self::Committed => "committed",
            Self::RolledBack => "rolled back",
        };
        f.write_str(name)
    }
}

/// One resource's share of a transaction: its pending change log, its
/// status and, once prepared, the update waiting to be ended.
#[derive(Debug)]
pub struct TransactionBranch {
    pub(crate) changes: ChangeLog,
    pub(crate) status: BranchStatus,
    pub(crate) update: Option<Update>,
}

impl TransactionBranch {
    fn new() -> Self {
        Self {
            changes: ChangeLog::new(),
            status: BranchStatus::Active,
            update: None,
        }
    }

    /// Returns the pending change log.
    #[must_use]
    pub fn changes(&self) -> &ChangeLog {
        &self.changes
    }

    /// Returns the branch status.
    #[must_use]
    pub fn status(&self) -> BranchStatus {
        self.status
    }

    /// Returns `true` while a prepared update holds the update slot.
    #[must_use]
    pub fn has_pending_update(&self) -> bool {
        self.update.is_some()
    }
}

/// The caller-scoped state of one logical transaction.
///
/// The context is passed explicitly through every transactional call. It is
/// not tied to a thread.
pub struct TransactionContext {
    id: TransactionId,
    branches: Mutex<HashMap<String, Arc<Mutex<TransactionBranch>>>>,
    resources: Mutex<Vec<Arc<dyn XaResource>>>,
}

impl TransactionContext {
    /// Creates a context with no branches.
    #[must_use]
    pub fn new(id: TransactionId) -> Self {
        Self {
            id,
            branches: Mutex::new(HashMap::new()),
            resources: Mutex::new(Vec::new()),
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the branch stored under `attribute`, if any.
    #[must_use]
    pub fn branch(&self, attribute: &str) -> Option<Arc<Mutex<TransactionBranch>>> {
        self.branches.lock().get(attribute).cloned()
    }

    /// Returns the branch stored under `attribute`, creating an empty one.
    pub fn branch_or_create(&self, attribute: &str) -> Arc<Mutex<TransactionBranch>> {
        let mut branches = self.branches.lock();
        let branch = branches.entry(attribute.to_owned()).or_insert_with(|| {
            debug!(txn = %self.id, attribute, "branch created");
            Arc::new(Mutex::new(TransactionBranch::new()))
        });
        Arc::clone(branch)
    }

    /// Returns the status of the branch under `attribute`, or `None` if the
    /// transaction has no such branch.
    #[must_use]
    pub fn status(&self, attribute: &str) -> Option<BranchStatus> {
        self.branch(attribute).map(|b| b.lock().status)
    }

    /// Returns the number of pending item operations under `attribute`.
    #[must_use]
    pub fn pending_changes(&self, attribute: &str) -> usize {
        self.branch(attribute).map_or(0, |b| b.lock().changes.len())
    }

    /// Associates `resource` with this transaction and enlists it in the
    /// commit protocol.
    ///
    /// # Errors
    ///
    /// Returns any error of [`XaResource::associate`].
    pub fn enlist(&self, resource: Arc<dyn XaResource>) -> CoreResult<()> {
        resource.associate(self)?;
        self.resources.lock().push(resource);
        Ok(())
    }

    /// Returns the number of enlisted resources.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.resources.lock().len()
    }

    fn enlisted(&self) -> Vec<Arc<dyn XaResource>> {
        self.resources.lock().clone()
    }

    /// Prepares every enlisted resource. If one fails, all are rolled back.
    ///
    /// # Errors
    ///
    /// Returns the first preparation failure.
    pub fn prepare(&self) -> CoreResult<()> {
        for resource in self.enlisted() {
            resource.before_operation(self);
            let result = resource.prepare(self);
            resource.after_operation(self);
            if let Err(e) = result {
                warn!(txn = %self.id, error = %e, "prepare failed, rolling back");
                self.rollback_quietly();
                return Err(e);
            }
        }
        debug!(txn = %self.id, "prepared");
        Ok(())
    }

    /// Commits every enlisted resource. If one fails, the remaining ones are
    /// rolled back.
    ///
    /// # Errors
    ///
    /// Returns the first commit failure.
    pub fn commit(&self) -> CoreResult<()> {
        let resources = self.enlisted();
        for (i, resource) in resources.iter().enumerate() {
            resource.before_operation(self);
            let result = resource.commit(self);
            resource.after_operation(self);
            if let Err(e) = result {
                warn!(txn = %self.id, error = %e, "commit failed, rolling back the rest");
                for rest in &resources[i + 1..] {
                    if let Err(e) = rest.rollback(self) {
                        warn!(txn = %self.id, error = %e, "rollback failed");
                    }
                }
                return Err(e);
            }
        }
        debug!(txn = %self.id, "committed");
        Ok(())
    }

    /// Prepares and then commits every enlisted resource.
    ///
    /// # Errors
    ///
    /// Returns the first failure of either phase.
    pub fn prepare_and_commit(&self) -> CoreResult<()> {
        self.prepare()?;
        self.commit()
    }

    /// Rolls back every enlisted resource.
    ///
    /// # Errors
    ///
    /// Returns the first rollback failure. Every resource is still asked to
    /// roll back.
    pub fn rollback(&self) -> CoreResult<()> {
        let mut first = None;
        for resource in self.enlisted() {
            resource.before_operation(self);
            let result = resource.rollback(self);
            resource.after_operation(self);
            if let Err(e) = result {
                warn!(txn = %self.id, error = %e, "rollback failed");
                first.get_or_insert(e);
            }
        }
        debug!(txn = %self.id, "rolled back");
        first.map_or(Ok(()), Err)
    }

    fn rollback_quietly(&self) {
        // Failures were already logged
        let _ = self.rollback();
    }
}

impl fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("id", &self.id)
            .field("branches", &self.branches.lock().len())
            .field("resources", &self.resource_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CoreError, TransactionPhase};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records the calls it receives and optionally fails prepare.
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<&'static str>>,
        fail_prepare: bool,
        rollbacks: AtomicUsize,
    }

    impl XaResource for Recorder {
        fn associate(&self, ctx: &TransactionContext) -> CoreResult<()> {
            ctx.branch_or_create("recorder");
            self.calls.lock().push("associate");
            Ok(())
        }

        fn before_operation(&self, _ctx: &TransactionContext) {
            self.calls.lock().push("before");
        }

        fn prepare(&self, _ctx: &TransactionContext) -> CoreResult<()> {
            self.calls.lock().push("prepare");
            if self.fail_prepare {
                return Err(CoreError::transaction_failure(
                    TransactionPhase::Prepare,
                    CoreError::invalid_operation("boom"),
                ));
            }
            Ok(())
        }

        fn commit(&self, _ctx: &TransactionContext) -> CoreResult<()> {
            self.calls.lock().push("commit");
            Ok(())
        }

        fn rollback(&self, _ctx: &TransactionContext) -> CoreResult<()> {
            self.rollbacks.fetch_add(1, Ordering::SeqCst);
            self.calls.lock().push("rollback");
            Ok(())
        }

        fn after_operation(&self, _ctx: &TransactionContext) {
            self.calls.lock().push("after");
        }
    }

    #[test]
    fn call_order_on_commit() {
        let ctx = TransactionContext::new(TransactionId::new(1));
        let recorder = Arc::new(Recorder::default());
        ctx.enlist(recorder.clone()).unwrap();

        ctx.prepare_and_commit().unwrap();
        assert_eq!(
            *recorder.calls.lock(),
            vec!["associate", "before", "prepare", "after", "before", "commit", "after"]
        );
        assert_eq!(ctx.status("recorder"), Some(BranchStatus::Active));
    }

    #[test]
    fn failed_prepare_rolls_back_everyone() {
        let ctx = TransactionContext::new(TransactionId::new(2));
        let good = Arc::new(Recorder::default());
        let bad = Arc::new(Recorder {
            fail_prepare: true,
            ..Recorder::default()
        });
        ctx.enlist(good.clone()).unwrap();
        ctx.enlist(bad.clone()).unwrap();

        let err = ctx.prepare().unwrap_err();
        assert_eq!(err.phase(), Some(TransactionPhase::Prepare));
        assert_eq!(good.rollbacks.load(Ordering::SeqCst), 1);
        assert_eq!(bad.rollbacks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn branches_are_keyed_by_attribute() {
        let ctx = TransactionContext::new(TransactionId::new(3));
        assert!(ctx.branch("a").is_none());
        assert_eq!(ctx.status("a"), None);
        assert_eq!(ctx.pending_changes("a"), 0);

        let a = ctx.branch_or_create("a");
        let again = ctx.branch_or_create("a");
        assert!(Arc::ptr_eq(&a, &again));
        assert!(!Arc::ptr_eq(&a, &ctx.branch_or_create("b")));
        assert_eq!(ctx.status("a"), Some(BranchStatus::Active));
    }

    #[test]
    fn terminal_statuses() {
        assert!(BranchStatus::Committed.is_terminal());
        assert!(BranchStatus::RolledBack.is_terminal());
        assert!(!BranchStatus::Prepared.is_terminal());
        assert_eq!(BranchStatus::RolledBack.to_string(), "rolled back");
    }
}
