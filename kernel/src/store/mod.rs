//! Versioned store client.
//!
//! The kernel does not implement version control itself. It drives an
//! external store with Git-like semantics (branch, checkout, commit, merge)
//! through the [`VersionedStore`] trait. [`DoltStore`] talks to a Dolt SQL
//! server over a pooled connection; [`MemoryStore`] provides the same
//! semantics in-process for tests and local development.

/// Dolt-backed store client.
pub mod dolt;
/// In-memory store with branch and merge semantics.
pub mod memory;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

pub use dolt::DoltStore;
pub use memory::{MemorySession, MemoryStore};

/// Name of the trunk line. Merges converge here and plain reads default to it.
pub const TRUNK: &str = "main";

/// A commit identifier in the underlying store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommitId(String);

impl CommitId {
    /// Wrap a raw commit reference.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw reference string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CommitId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Result of one merge attempt.
#[derive(Debug, Clone)]
pub struct MergeReport {
    /// Number of row/column conflicts the store detected.
    pub conflicts: u64,
    /// The resulting commit, present when the merge applied cleanly.
    pub commit: Option<CommitId>,
}

impl MergeReport {
    /// Whether the merge applied without conflicts.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.conflicts == 0
    }
}

/// Errors surfaced by the store client.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database-level failure.
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    /// Branch name already taken.
    #[error("branch already exists: {0}")]
    BranchExists(String),
    /// Branch missing where one was required.
    #[error("branch not found: {0}")]
    BranchNotFound(String),
    /// The base commit to fork from does not exist.
    #[error("base version not found: {0}")]
    BaseNotFound(String),
    /// The store returned a result shape we do not understand.
    #[error("unexpected store response: {0}")]
    Protocol(String),
}

/// Client interface to the external version-controlled store.
///
/// A `Session` is one dedicated logical connection. Branch state (the
/// checked-out line, uncommitted writes, an in-progress merge) lives on the
/// session, so a session must stay with one logical operation until its
/// branch has been torn down. Dropping a session releases it, along with any
/// advisory locks it still holds.
#[async_trait]
pub trait VersionedStore: Send + Sync + 'static {
    /// Dedicated session handle. Exclusively owned by one in-flight
    /// operation; never shared across concurrent tasks.
    type Session: Send;

    /// Take a dedicated session out of the pool.
    async fn acquire_session(&self) -> Result<Self::Session, StoreError>;

    /// Create branch `name` forked from the commit `base`.
    ///
    /// Fails with [`StoreError::BranchExists`] on a name collision and
    /// [`StoreError::BaseNotFound`] when the base commit is unknown.
    async fn create_branch(
        &self,
        session: &mut Self::Session,
        name: &str,
        base: &CommitId,
    ) -> Result<(), StoreError>;

    /// Switch the session onto `branch`.
    async fn checkout(&self, session: &mut Self::Session, branch: &str) -> Result<(), StoreError>;

    /// Stage all pending changes on the session and commit them.
    async fn commit_all(
        &self,
        session: &mut Self::Session,
        message: &str,
    ) -> Result<CommitId, StoreError>;

    /// Merge `branch` into the line the session currently has checked out.
    async fn merge(
        &self,
        session: &mut Self::Session,
        branch: &str,
    ) -> Result<MergeReport, StoreError>;

    /// Abort an in-progress merge, restoring the pre-merge state.
    async fn abort_merge(&self, session: &mut Self::Session) -> Result<(), StoreError>;

    /// Delete `branch`. A branch that is already gone is a no-op.
    async fn delete_branch(
        &self,
        session: &mut Self::Session,
        branch: &str,
    ) -> Result<(), StoreError>;

    /// Acquire the named advisory lock, waiting up to `timeout`.
    ///
    /// Returns `false` when the lock could not be acquired within the bound.
    async fn try_advisory_lock(
        &self,
        session: &mut Self::Session,
        name: &str,
        timeout: Duration,
    ) -> Result<bool, StoreError>;

    /// Release the named advisory lock held by this session.
    async fn release_advisory_lock(
        &self,
        session: &mut Self::Session,
        name: &str,
    ) -> Result<(), StoreError>;

    /// Current head commit of the line the session has checked out.
    async fn head(&self, session: &mut Self::Session) -> Result<CommitId, StoreError>;

    /// List branch names starting with `prefix`.
    async fn list_branches(
        &self,
        session: &mut Self::Session,
        prefix: &str,
    ) -> Result<Vec<String>, StoreError>;
}
