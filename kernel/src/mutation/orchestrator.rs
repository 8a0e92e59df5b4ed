//! The public mutation entry point.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use metrics::counter;
use tracing::{instrument, warn};

use super::branch::BranchLifecycle;
use super::error::MutationError;
use super::merge::{MergeCoordinator, MergeOutcome};
use crate::infrastructure::audit::{log_audit, AuditEvent};
use crate::store::{CommitId, VersionedStore};

/// Future returned by a unit of work, borrowing the dedicated session for
/// its whole execution.
pub type UnitOfWork<'s, T> = BoxFuture<'s, Result<T, MutationError>>;

/// Successful result of a branched mutation.
#[derive(Debug, Clone)]
pub struct MutationOutcome<T> {
    /// Whatever the unit of work returned.
    pub result: T,
    /// The trunk head after the clean merge.
    pub new_version: CommitId,
}

/// Drives one mutation through fork, isolated execution, commit, serialized
/// merge and cleanup.
///
/// One invocation owns one dedicated session and one mutation branch for its
/// whole lifetime: `Idle → SessionAcquired → Branched → MutationApplied →
/// CommittedOnBranch → MergeAttempted → {Merged | Aborted}`, with cleanup
/// reachable from every state past `Branched`.
pub struct Orchestrator<S: VersionedStore> {
    store: Arc<S>,
    lifecycle: BranchLifecycle<S>,
    coordinator: MergeCoordinator<S>,
}

impl<S: VersionedStore> Orchestrator<S> {
    /// Build an orchestrator over `store`.
    pub fn new(store: Arc<S>, branch_prefix: impl Into<String>, lock_timeout: Duration) -> Self {
        Self {
            lifecycle: BranchLifecycle::new(Arc::clone(&store), branch_prefix),
            coordinator: MergeCoordinator::new(Arc::clone(&store), lock_timeout),
            store,
        }
    }

    /// Branch-name prefix used for mutation branches.
    #[must_use]
    pub fn branch_prefix(&self) -> &str {
        self.lifecycle.prefix()
    }

    /// Run `work` as one branched mutation committed as `message`.
    ///
    /// Forks from `base` when supplied, else from the trunk head read at
    /// invocation time. On a clean merge returns the work's result plus the
    /// new trunk version; a detected overlap surfaces as
    /// [`MutationError::Conflict`]. Errors raised inside `work` propagate
    /// unchanged — they are neither swallowed nor converted to conflicts.
    ///
    /// The mutation branch is deleted and only then the session released, on
    /// every path past branch creation; cleanup failures are logged, never
    /// raised over the original error.
    ///
    /// # Errors
    ///
    /// See [`MutationError`] for the full taxonomy.
    #[instrument(skip(self, base, work), fields(message = %message))]
    pub async fn run<T, F>(
        &self,
        message: &str,
        base: Option<CommitId>,
        work: F,
    ) -> Result<MutationOutcome<T>, MutationError>
    where
        T: Send,
        F: for<'s> FnOnce(&'s mut S::Session) -> UnitOfWork<'s, T> + Send,
    {
        let mut session = self
            .store
            .acquire_session()
            .await
            .map_err(MutationError::ResourceUnavailable)?;

        // Capture the fork point before branching so it stays well-defined
        // even if the trunk advances underneath us.
        let base = match base {
            Some(version) => version,
            None => self.store.head(&mut session).await?,
        };

        let branch = self
            .lifecycle
            .create_and_checkout(&mut session, &base)
            .await?;

        let outcome = self
            .run_on_branch(&mut session, &branch, message, work)
            .await;

        self.finalize(&mut session, &branch).await;
        // Only now may the session go back to the pool: it is no longer
        // parked on a branch that is about to vanish.
        drop(session);

        match &outcome {
            Ok(done) => {
                counter!("strata_mutations_total", "outcome" => "merged").increment(1);
                log_audit(&AuditEvent::MutationMerged {
                    branch,
                    version: done.new_version.to_string(),
                });
            }
            Err(MutationError::Conflict { .. }) => {
                counter!("strata_mutations_total", "outcome" => "conflict").increment(1);
                log_audit(&AuditEvent::MutationConflicted { branch });
            }
            Err(MutationError::LockTimeout { .. }) => {
                counter!("strata_mutations_total", "outcome" => "lock_timeout").increment(1);
            }
            Err(_) => {
                counter!("strata_mutations_total", "outcome" => "error").increment(1);
            }
        }
        outcome
    }

    async fn run_on_branch<T, F>(
        &self,
        session: &mut S::Session,
        branch: &str,
        message: &str,
        work: F,
    ) -> Result<MutationOutcome<T>, MutationError>
    where
        T: Send,
        F: for<'s> FnOnce(&'s mut S::Session) -> UnitOfWork<'s, T> + Send,
    {
        let result = work(session).await?;
        self.store.commit_all(session, message).await?;
        self.lifecycle.checkout_trunk(session).await?;
        match self.coordinator.merge_to_trunk(session, branch).await? {
            MergeOutcome::Clean(new_version) => Ok(MutationOutcome {
                result,
                new_version,
            }),
            MergeOutcome::Conflicted { .. } => Err(MutationError::Conflict {
                branch: branch.to_string(),
            }),
        }
    }

    /// Cleanup entered from any state past branch creation. The session may
    /// still be parked on the mutation branch after an early failure, so
    /// trunk is checked out first; the delete tolerates an absent branch.
    async fn finalize(&self, session: &mut S::Session, branch: &str) {
        if let Err(err) = self.lifecycle.checkout_trunk(session).await {
            warn!(branch, error = %err, "cleanup: checkout of trunk failed");
        }
        if let Err(err) = self.lifecycle.delete_branch(session, branch).await {
            warn!(branch, error = %err, "cleanup: branch delete failed");
        }
    }
}
