//! Dolt-backed implementation of [`VersionedStore`].
//!
//! Dolt exposes its version-control surface as stored procedures and
//! functions over the MySQL wire protocol, so every operation here is a
//! plain SQL call executed on the session's own connection. The dedicated
//! session is a [`PoolConnection`] held for the whole mutation: checkout is
//! connection-scoped in Dolt, which is exactly the isolation the kernel
//! needs.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::MySqlPool;
use sqlx::pool::PoolConnection;
use sqlx::{MySql, Row};
use tracing::instrument;

use super::{CommitId, MergeReport, StoreError, VersionedStore};

/// Store client for a Dolt SQL server.
#[derive(Debug, Clone)]
pub struct DoltStore {
    pool: MySqlPool,
}

impl DoltStore {
    /// Create a client over an existing connection pool.
    #[must_use]
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// The underlying pool, for plain trunk reads outside a mutation.
    #[must_use]
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

/// Best-effort extraction of the server-side error text.
fn message_of(err: &sqlx::Error) -> String {
    err.as_database_error()
        .map_or_else(|| err.to_string(), |db| db.message().to_string())
}

#[async_trait]
impl VersionedStore for DoltStore {
    type Session = PoolConnection<MySql>;

    async fn acquire_session(&self) -> Result<Self::Session, StoreError> {
        Ok(self.pool.acquire().await?)
    }

    #[instrument(skip(self, session))]
    async fn create_branch(
        &self,
        session: &mut Self::Session,
        name: &str,
        base: &CommitId,
    ) -> Result<(), StoreError> {
        sqlx::query("CALL DOLT_BRANCH(?, ?)")
            .bind(name)
            .bind(base.as_str())
            .execute(&mut **session)
            .await
            .map_err(|e| {
                let msg = message_of(&e);
                if msg.contains("already exists") {
                    StoreError::BranchExists(name.to_string())
                } else if msg.contains("not found") || msg.contains("invalid ref") {
                    StoreError::BaseNotFound(base.to_string())
                } else {
                    StoreError::Db(e)
                }
            })?;
        Ok(())
    }

    #[instrument(skip(self, session))]
    async fn checkout(&self, session: &mut Self::Session, branch: &str) -> Result<(), StoreError> {
        sqlx::query("CALL DOLT_CHECKOUT(?)")
            .bind(branch)
            .execute(&mut **session)
            .await
            .map_err(|e| {
                if message_of(&e).contains("not found") {
                    StoreError::BranchNotFound(branch.to_string())
                } else {
                    StoreError::Db(e)
                }
            })?;
        Ok(())
    }

    #[instrument(skip(self, session, message))]
    async fn commit_all(
        &self,
        session: &mut Self::Session,
        message: &str,
    ) -> Result<CommitId, StoreError> {
        let row = sqlx::query("CALL DOLT_COMMIT('-A', '-m', ?)")
            .bind(message)
            .fetch_one(&mut **session)
            .await?;
        let hash: String = row.try_get(0)?;
        Ok(CommitId::new(hash))
    }

    #[instrument(skip(self, session))]
    async fn merge(
        &self,
        session: &mut Self::Session,
        branch: &str,
    ) -> Result<MergeReport, StoreError> {
        let row = sqlx::query("CALL DOLT_MERGE(?)")
            .bind(branch)
            .fetch_one(&mut **session)
            .await?;
        let conflicts: i64 = row.try_get("conflicts")?;
        let conflicts = u64::try_from(conflicts)
            .map_err(|_| StoreError::Protocol(format!("negative conflict count {conflicts}")))?;
        let commit = if conflicts == 0 {
            row.try_get::<String, _>("hash")
                .ok()
                .filter(|h| !h.is_empty())
                .map(CommitId::new)
        } else {
            None
        };
        Ok(MergeReport { conflicts, commit })
    }

    #[instrument(skip(self, session))]
    async fn abort_merge(&self, session: &mut Self::Session) -> Result<(), StoreError> {
        sqlx::query("CALL DOLT_MERGE('--abort')")
            .execute(&mut **session)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, session))]
    async fn delete_branch(
        &self,
        session: &mut Self::Session,
        branch: &str,
    ) -> Result<(), StoreError> {
        // Force-delete; cleanup paths may run after the branch is already gone.
        match sqlx::query("CALL DOLT_BRANCH('-D', ?)")
            .bind(branch)
            .execute(&mut **session)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                let msg = message_of(&e);
                if msg.contains("not found") || msg.contains("does not exist") {
                    Ok(())
                } else {
                    Err(StoreError::Db(e))
                }
            }
        }
    }

    #[instrument(skip(self, session))]
    async fn try_advisory_lock(
        &self,
        session: &mut Self::Session,
        name: &str,
        timeout: Duration,
    ) -> Result<bool, StoreError> {
        // GET_LOCK takes whole seconds; round the bound up.
        let secs = i64::try_from(timeout.as_millis().div_ceil(1000)).unwrap_or(i64::MAX);
        let row = sqlx::query("SELECT GET_LOCK(?, ?)")
            .bind(name)
            .bind(secs)
            .fetch_one(&mut **session)
            .await?;
        let granted: Option<i64> = row.try_get(0)?;
        Ok(granted == Some(1))
    }

    #[instrument(skip(self, session))]
    async fn release_advisory_lock(
        &self,
        session: &mut Self::Session,
        name: &str,
    ) -> Result<(), StoreError> {
        sqlx::query("SELECT RELEASE_LOCK(?)")
            .bind(name)
            .fetch_one(&mut **session)
            .await?;
        Ok(())
    }

    async fn head(&self, session: &mut Self::Session) -> Result<CommitId, StoreError> {
        let row = sqlx::query("SELECT DOLT_HASHOF('HEAD')")
            .fetch_one(&mut **session)
            .await?;
        let hash: String = row.try_get(0)?;
        Ok(CommitId::new(hash))
    }

    async fn list_branches(
        &self,
        session: &mut Self::Session,
        prefix: &str,
    ) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT name FROM dolt_branches WHERE name LIKE CONCAT(?, '%') ORDER BY name")
            .bind(prefix)
            .fetch_all(&mut **session)
            .await?;
        let mut names = Vec::with_capacity(rows.len());
        for row in rows {
            names.push(row.try_get::<String, _>("name")?);
        }
        Ok(names)
    }
}
