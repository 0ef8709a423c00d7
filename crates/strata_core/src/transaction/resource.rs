//! The two-phase commit resource interface.

use super::TransactionContext;
use crate::error::CoreResult;

/// A participant in a two-phase commit.
///
/// The coordinator calls `associate` once per resource and transaction, and
/// then for every unit of work `before_operation`, `prepare`, `commit` or
/// `rollback`, and `after_operation`, in that relative order.
pub trait XaResource: Send + Sync {
    /// Binds the resource to the transaction, creating its branch on first
    /// use.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource cannot take part in the transaction.
    fn associate(&self, ctx: &TransactionContext) -> CoreResult<()>;

    /// Called on entering an operation under the transaction.
    fn before_operation(&self, ctx: &TransactionContext);

    /// Validates and stages the branch.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TransactionFailure`](crate::CoreError::TransactionFailure)
    /// if the branch cannot be committed. The branch is rolled back.
    fn prepare(&self, ctx: &TransactionContext) -> CoreResult<()>;

    /// Durably applies a prepared branch.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TransactionFailure`](crate::CoreError::TransactionFailure)
    /// if the branch could not be applied. The branch is rolled back.
    fn commit(&self, ctx: &TransactionContext) -> CoreResult<()>;

    /// Discards the branch. Valid whether or not it was prepared.
    ///
    /// # Errors
    ///
    /// Returns an error only if the resource is unusable.
    fn rollback(&self, ctx: &TransactionContext) -> CoreResult<()>;

    /// Called on leaving an operation under the transaction.
    fn after_operation(&self, ctx: &TransactionContext);
}
