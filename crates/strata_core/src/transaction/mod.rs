//! Two-phase commit over the item-state layer.
//!
//! A [`TransactionContext`] is passed explicitly to every transactional
//! call. It owns one [`TransactionBranch`] per participating resource, keyed
//! by the resource's change log attribute, and drives the enlisted
//! [`XaResource`]s through prepare and commit or rollback:
//!
//! ```text
//! associate -> before_operation -> prepare -> after_operation -> commit
//!                                          \-> rollback
//! ```

mod context;
mod coordinator;
mod resource;
mod xa;

pub use context::{BranchStatus, TransactionBranch, TransactionContext};
pub use coordinator::TransactionCoordinator;
pub use resource::XaResource;
pub use xa::XaItemStateManager;
