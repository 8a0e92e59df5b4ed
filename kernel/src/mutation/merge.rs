//! Serialized merge-to-trunk coordination.

use std::sync::Arc;
use std::time::Duration;

use tracing::{instrument, warn};

use super::error::MutationError;
use crate::store::{CommitId, VersionedStore};

/// Store-wide advisory lock guarding the trunk merge window.
pub const MERGE_LOCK_NAME: &str = "strata.trunk_merge";

/// Outcome of one merge attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Zero conflicts; the trunk now points at this head.
    Clean(CommitId),
    /// Overlapping changes were detected and the merge was aborted.
    Conflicted {
        /// Conflict count reported by the store.
        conflicts: u64,
    },
}

/// Serializes convergence of mutation branches into the trunk.
///
/// The advisory lock is the single serialization point of the whole design:
/// branch-local work never holds it, and arrival order at the lock decides
/// merge order. Two mutations off the same stale base can merge in either
/// order; whichever merges second sees the first's changes on the trunk and
/// conflicts only on a true overlap.
pub struct MergeCoordinator<S> {
    store: Arc<S>,
    lock_timeout: Duration,
}

impl<S: VersionedStore> MergeCoordinator<S> {
    /// Coordinator with the given bound on lock acquisition.
    pub fn new(store: Arc<S>, lock_timeout: Duration) -> Self {
        Self {
            store,
            lock_timeout,
        }
    }

    /// The configured lock bound.
    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Fold `branch` into the trunk.
    ///
    /// The caller must already have the session checked out on the trunk.
    /// Failing to take the lock within the bound is
    /// [`MutationError::LockTimeout`], distinct from a conflict: the branch
    /// commit is not lost, convergence just did not happen on this attempt.
    #[instrument(skip(self, session))]
    pub async fn merge_to_trunk(
        &self,
        session: &mut S::Session,
        branch: &str,
    ) -> Result<MergeOutcome, MutationError> {
        let acquired = self
            .store
            .try_advisory_lock(session, MERGE_LOCK_NAME, self.lock_timeout)
            .await?;
        if !acquired {
            return Err(MutationError::LockTimeout {
                timeout_ms: u64::try_from(self.lock_timeout.as_millis()).unwrap_or(u64::MAX),
            });
        }

        let outcome = self.merge_locked(session, branch).await;

        // Release happens whether the merge succeeded, conflicted or threw.
        if let Err(err) = self
            .store
            .release_advisory_lock(session, MERGE_LOCK_NAME)
            .await
        {
            warn!(branch, error = %err, "failed to release merge lock");
        }
        outcome
    }

    async fn merge_locked(
        &self,
        session: &mut S::Session,
        branch: &str,
    ) -> Result<MergeOutcome, MutationError> {
        let report = self.store.merge(session, branch).await?;
        if report.is_clean() {
            let head = match report.commit {
                Some(commit) => commit,
                None => self.store.head(session).await?,
            };
            Ok(MergeOutcome::Clean(head))
        } else {
            // A half-merged trunk must never be left behind.
            self.store.abort_merge(session).await?;
            Ok(MergeOutcome::Conflicted {
                conflicts: report.conflicts,
            })
        }
    }
}
