//! Branched-mutation concurrency core.
//!
//! Every write runs on its own ephemeral branch forked from a base version:
//! fully parallel while branch-local, serialized only for the short window
//! where a branch is folded back into the trunk. The store's merge algorithm
//! is the conflict detector; this module adds lifecycle, serialization and
//! cleanup.

/// Ephemeral branch lifecycle (create, checkout, delete).
pub mod branch;
/// Error taxonomy for branched mutations.
pub mod error;
/// Serialized merge-to-trunk coordination.
pub mod merge;
/// The public mutation entry point.
pub mod orchestrator;
/// Startup cleanup of branches left behind by crashed processes.
pub mod sweeper;

pub use branch::BranchLifecycle;
pub use error::MutationError;
pub use merge::{MergeCoordinator, MergeOutcome, MERGE_LOCK_NAME};
pub use orchestrator::{MutationOutcome, Orchestrator, UnitOfWork};
pub use sweeper::sweep_orphans;
