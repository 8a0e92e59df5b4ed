//! Shared test utilities for integration tests.
//!
//! Provides a small kernel-over-memory-store context so concurrency
//! scenarios can run hermetically, without a live Dolt server.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use strata_kernel::mutation::Orchestrator;
use strata_kernel::store::{CommitId, MemoryStore, VersionedStore};

/// Branch-name prefix used by every test kernel.
pub const PREFIX: &str = "strata-mut";

/// Default merge-lock bound for tests.
pub const LOCK_TIMEOUT: Duration = Duration::from_millis(2_000);

/// Integration test context: an in-memory store plus an orchestrator over it.
pub struct TestKernel {
    /// The backing store.
    pub store: MemoryStore,
    /// Mutation entry point, shareable across spawned writers.
    pub orchestrator: Arc<Orchestrator<MemoryStore>>,
}

impl TestKernel {
    /// New kernel over a fresh store.
    pub fn new() -> Self {
        Self::with_lock_timeout(LOCK_TIMEOUT)
    }

    /// New kernel with an explicit merge-lock bound.
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        let store = MemoryStore::new();
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::new(store.clone()),
            PREFIX,
            lock_timeout,
        ));
        Self {
            store,
            orchestrator,
        }
    }

    /// Current trunk head.
    pub async fn trunk_head(&self) -> Result<CommitId> {
        let mut session = self.store.acquire_session().await?;
        Ok(self.store.head(&mut session).await?)
    }

    /// Read one trunk cell through a fresh session.
    pub async fn read_trunk(
        &self,
        table: &str,
        row: &str,
        column: &str,
    ) -> Result<Option<String>> {
        let session = self.store.acquire_session().await?;
        Ok(session.get(table, row, column))
    }

    /// Commit a seed value directly onto the trunk.
    pub async fn seed(
        &self,
        table: &str,
        row: &str,
        column: &str,
        value: &str,
    ) -> Result<CommitId> {
        let mut session = self.store.acquire_session().await?;
        session.put(table, row, column, value);
        Ok(self.store.commit_all(&mut session, "seed").await?)
    }

    /// Branches left behind under the mutation prefix.
    pub async fn leftover_branches(&self) -> Result<Vec<String>> {
        let mut session = self.store.acquire_session().await?;
        Ok(self
            .store
            .list_branches(&mut session, &format!("{PREFIX}/"))
            .await?)
    }
}
