//! Error taxonomy for branched mutations.

use crate::catalog::CatalogError;
use crate::store::StoreError;

/// Errors surfaced by the mutation entry point.
///
/// The split matters to callers: [`MutationError::Conflict`] and
/// [`MutationError::LockTimeout`] mean "retry with fresh state",
/// [`MutationError::Validation`] means "bad input", and the rest are
/// infrastructure failures.
#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    /// The unit of work rejected its input; propagated unchanged.
    #[error(transparent)]
    Validation(#[from] CatalogError),
    /// The merge step detected overlapping changes on the trunk. The branch
    /// was aborted and deleted; nothing reached the trunk.
    #[error("merge conflict: branch {branch} overlaps trunk changes")]
    Conflict {
        /// The mutation branch that failed to merge.
        branch: String,
    },
    /// The merge lock could not be acquired within the bound. The branch
    /// commit existed but never converged onto the trunk; callers must retry
    /// rather than assume success.
    #[error("merge lock not acquired within {timeout_ms} ms")]
    LockTimeout {
        /// The configured bound, in milliseconds.
        timeout_ms: u64,
    },
    /// Branch creation failed: unknown base version, or a name collision
    /// that survived the single regeneration attempt.
    #[error("branch create failed from base {base}: {source}")]
    BranchCreate {
        /// The base version the fork was attempted from.
        base: String,
        /// Underlying store failure.
        #[source]
        source: StoreError,
    },
    /// No dedicated session could be taken from the pool.
    #[error("session acquisition failed: {0}")]
    ResourceUnavailable(#[source] StoreError),
    /// Any other store-level failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MutationError {
    /// Whether retrying the whole mutation with fresh state can succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Conflict { .. } | Self::LockTimeout { .. } | Self::ResourceUnavailable(_)
        )
    }
}
