//! Ephemeral branch lifecycle.

use std::sync::Arc;

use tracing::instrument;
use uuid::Uuid;

use super::error::MutationError;
use crate::store::{CommitId, StoreError, VersionedStore, TRUNK};

/// Creates, checks out and deletes the per-mutation branches.
pub struct BranchLifecycle<S> {
    store: Arc<S>,
    prefix: String,
}

impl<S: VersionedStore> BranchLifecycle<S> {
    /// Lifecycle manager using `prefix` for generated branch names.
    pub fn new(store: Arc<S>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// The naming prefix. The sweeper matches branches under `prefix/`.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn generate_name(&self) -> String {
        format!("{}/{}", self.prefix, Uuid::new_v4())
    }

    /// Create a branch forked from `base` and switch the session onto it.
    ///
    /// A name collision gets exactly one regeneration attempt before it is
    /// surfaced as [`MutationError::BranchCreate`]; an unknown base fails
    /// immediately.
    #[instrument(skip(self, session), fields(base = %base))]
    pub async fn create_and_checkout(
        &self,
        session: &mut S::Session,
        base: &CommitId,
    ) -> Result<String, MutationError> {
        let mut name = self.generate_name();
        if let Err(err) = self.store.create_branch(session, &name, base).await {
            match err {
                StoreError::BranchExists(_) => {
                    name = self.generate_name();
                    self.store
                        .create_branch(session, &name, base)
                        .await
                        .map_err(|source| MutationError::BranchCreate {
                            base: base.to_string(),
                            source,
                        })?;
                }
                source => {
                    return Err(MutationError::BranchCreate {
                        base: base.to_string(),
                        source,
                    });
                }
            }
        }
        self.store.checkout(session, &name).await?;
        Ok(name)
    }

    /// Switch the session back onto the trunk.
    ///
    /// Merges apply into the checked-out line, so this must run before any
    /// merge attempt: trunk first, then merge the mutation branch into it.
    pub async fn checkout_trunk(&self, session: &mut S::Session) -> Result<(), MutationError> {
        Ok(self.store.checkout(session, TRUNK).await?)
    }

    /// Delete the mutation branch. Safe to call from cleanup paths that may
    /// run after a partial failure already removed it.
    pub async fn delete_branch(
        &self,
        session: &mut S::Session,
        name: &str,
    ) -> Result<(), MutationError> {
        Ok(self.store.delete_branch(session, name).await?)
    }
}
