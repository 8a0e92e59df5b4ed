//! In-memory store with branch and merge semantics.
//!
//! Mirrors the behavior the kernel relies on from the external store:
//! branches fork from a commit, each session carries a working copy of its
//! checked-out branch, merges diff both sides against the fork point at cell
//! granularity and count conflicts, and named advisory locks wait with a
//! bound. Backs the test suites and local experimentation without a server.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use super::{CommitId, MergeReport, StoreError, VersionedStore, TRUNK};

/// Address of one stored value: table, row key, column.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellKey {
    /// Table name.
    pub table: String,
    /// Row key within the table.
    pub row: String,
    /// Column name.
    pub column: String,
}

impl CellKey {
    fn new(table: &str, row: &str, column: &str) -> Self {
        Self {
            table: table.to_string(),
            row: row.to_string(),
            column: column.to_string(),
        }
    }
}

type Snapshot = BTreeMap<CellKey, String>;

/// Cell-level change set relative to some base: `Some` for an added or
/// updated value, `None` for a deletion.
type ChangeSet = BTreeMap<CellKey, Option<String>>;

#[derive(Debug, Clone)]
struct CommitNode {
    parents: Vec<String>,
    snapshot: Snapshot,
    message: String,
}

#[derive(Debug, Default)]
struct Shared {
    commits: HashMap<String, CommitNode>,
    branches: BTreeMap<String, String>,
}

impl Shared {
    fn head_of(&self, branch: &str) -> Result<String, StoreError> {
        self.branches
            .get(branch)
            .cloned()
            .ok_or_else(|| StoreError::BranchNotFound(branch.to_string()))
    }

    fn snapshot_of(&self, commit: &str) -> Result<Snapshot, StoreError> {
        self.commits
            .get(commit)
            .map(|node| node.snapshot.clone())
            .ok_or_else(|| StoreError::Protocol(format!("dangling commit {commit}")))
    }

    fn ancestors(&self, start: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([start.to_string()]);
        while let Some(id) = queue.pop_front() {
            if seen.insert(id.clone()) {
                if let Some(node) = self.commits.get(&id) {
                    queue.extend(node.parents.iter().cloned());
                }
            }
        }
        seen
    }

    /// Nearest common ancestor, breadth-first from `b` over the ancestor set
    /// of `a`. Exact for the topologies produced here (forks off a line).
    fn merge_base(&self, a: &str, b: &str) -> Option<String> {
        let reachable = self.ancestors(a);
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([b.to_string()]);
        while let Some(id) = queue.pop_front() {
            if reachable.contains(&id) {
                return Some(id);
            }
            if seen.insert(id.clone()) {
                if let Some(node) = self.commits.get(&id) {
                    queue.extend(node.parents.iter().cloned());
                }
            }
        }
        None
    }
}

fn diff(base: &Snapshot, side: &Snapshot) -> ChangeSet {
    let mut changes = ChangeSet::new();
    for (key, value) in side {
        if base.get(key) != Some(value) {
            changes.insert(key.clone(), Some(value.clone()));
        }
    }
    for key in base.keys() {
        if !side.contains_key(key) {
            changes.insert(key.clone(), None);
        }
    }
    changes
}

/// In-memory [`VersionedStore`] implementation.
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<Shared>>,
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a store with an empty genesis commit on the trunk.
    #[must_use]
    pub fn new() -> Self {
        let genesis = Uuid::new_v4().to_string();
        let mut commits = HashMap::new();
        commits.insert(
            genesis.clone(),
            CommitNode {
                parents: Vec::new(),
                snapshot: Snapshot::new(),
                message: "genesis".to_string(),
            },
        );
        let mut branches = BTreeMap::new();
        branches.insert(TRUNK.to_string(), genesis);
        Self {
            state: Arc::new(Mutex::new(Shared { commits, branches })),
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Commit message lookup, for inspecting history.
    #[must_use]
    pub fn commit_message(&self, id: &CommitId) -> Option<String> {
        self.state
            .lock()
            .commits
            .get(id.as_str())
            .map(|node| node.message.clone())
    }

    fn lock_handle(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .entry(name.to_string())
            .or_default()
            .clone()
    }
}

/// Dedicated session over a [`MemoryStore`].
///
/// Owns a working copy of its checked-out branch; writes stay session-local
/// until [`VersionedStore::commit_all`]. Advisory locks held by the session
/// release when it drops, matching connection-scoped locks in the real store.
pub struct MemorySession {
    state: Arc<Mutex<Shared>>,
    branch: String,
    workspace: Snapshot,
    merge_conflicted: bool,
    held_locks: HashMap<String, OwnedMutexGuard<()>>,
}

impl MemorySession {
    /// Read one cell from the working copy.
    #[must_use]
    pub fn get(&self, table: &str, row: &str, column: &str) -> Option<String> {
        self.workspace.get(&CellKey::new(table, row, column)).cloned()
    }

    /// Write one cell in the working copy.
    pub fn put(&mut self, table: &str, row: &str, column: &str, value: impl Into<String>) {
        self.workspace
            .insert(CellKey::new(table, row, column), value.into());
    }

    /// Remove an entire row from the working copy.
    pub fn delete_row(&mut self, table: &str, row: &str) {
        self.workspace
            .retain(|key, _| !(key.table == table && key.row == row));
    }

    /// Name of the branch this session has checked out.
    #[must_use]
    pub fn branch(&self) -> &str {
        &self.branch
    }
}

#[async_trait]
impl VersionedStore for MemoryStore {
    type Session = MemorySession;

    async fn acquire_session(&self) -> Result<Self::Session, StoreError> {
        let workspace = {
            let state = self.state.lock();
            let head = state.head_of(TRUNK)?;
            state.snapshot_of(&head)?
        };
        Ok(MemorySession {
            state: Arc::clone(&self.state),
            branch: TRUNK.to_string(),
            workspace,
            merge_conflicted: false,
            held_locks: HashMap::new(),
        })
    }

    async fn create_branch(
        &self,
        _session: &mut Self::Session,
        name: &str,
        base: &CommitId,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if !state.commits.contains_key(base.as_str()) {
            return Err(StoreError::BaseNotFound(base.to_string()));
        }
        if state.branches.contains_key(name) {
            return Err(StoreError::BranchExists(name.to_string()));
        }
        state
            .branches
            .insert(name.to_string(), base.as_str().to_string());
        Ok(())
    }

    async fn checkout(&self, session: &mut Self::Session, branch: &str) -> Result<(), StoreError> {
        let workspace = {
            let state = self.state.lock();
            let head = state.head_of(branch)?;
            state.snapshot_of(&head)?
        };
        session.branch = branch.to_string();
        session.workspace = workspace;
        session.merge_conflicted = false;
        Ok(())
    }

    async fn commit_all(
        &self,
        session: &mut Self::Session,
        message: &str,
    ) -> Result<CommitId, StoreError> {
        let mut state = self.state.lock();
        let head = state.head_of(&session.branch)?;
        let id = Uuid::new_v4().to_string();
        state.commits.insert(
            id.clone(),
            CommitNode {
                parents: vec![head],
                snapshot: session.workspace.clone(),
                message: message.to_string(),
            },
        );
        state.branches.insert(session.branch.clone(), id.clone());
        Ok(CommitId::new(id))
    }

    async fn merge(
        &self,
        session: &mut Self::Session,
        branch: &str,
    ) -> Result<MergeReport, StoreError> {
        let mut state = self.state.lock();
        let into_head = state.head_of(&session.branch)?;
        let from_head = state.head_of(branch)?;

        // Already contained in the target line: nothing to do.
        if state.ancestors(&into_head).contains(&from_head) {
            return Ok(MergeReport {
                conflicts: 0,
                commit: Some(CommitId::new(into_head)),
            });
        }

        // Fast-forward when the target has not moved since the fork.
        if state.ancestors(&from_head).contains(&into_head) {
            let snapshot = state.snapshot_of(&from_head)?;
            state
                .branches
                .insert(session.branch.clone(), from_head.clone());
            session.workspace = snapshot;
            return Ok(MergeReport {
                conflicts: 0,
                commit: Some(CommitId::new(from_head)),
            });
        }

        let base = state
            .merge_base(&into_head, &from_head)
            .ok_or_else(|| StoreError::Protocol("no merge base".to_string()))?;
        let base_snapshot = state.snapshot_of(&base)?;
        let into_snapshot = state.snapshot_of(&into_head)?;
        let from_snapshot = state.snapshot_of(&from_head)?;

        let ours = diff(&base_snapshot, &into_snapshot);
        let theirs = diff(&base_snapshot, &from_snapshot);

        let conflict_count = ours
            .iter()
            .filter(|(key, value)| theirs.get(*key).is_some_and(|other| other != *value))
            .count();
        let conflicts = u64::try_from(conflict_count).unwrap_or(u64::MAX);

        if conflicts > 0 {
            session.merge_conflicted = true;
            return Ok(MergeReport {
                conflicts,
                commit: None,
            });
        }

        let mut merged = into_snapshot;
        for (key, change) in theirs {
            match change {
                Some(value) => {
                    merged.insert(key, value);
                }
                None => {
                    merged.remove(&key);
                }
            }
        }

        let id = Uuid::new_v4().to_string();
        state.commits.insert(
            id.clone(),
            CommitNode {
                parents: vec![into_head, from_head],
                snapshot: merged.clone(),
                message: format!("merge {branch} into {}", session.branch),
            },
        );
        state.branches.insert(session.branch.clone(), id.clone());
        session.workspace = merged;
        Ok(MergeReport {
            conflicts: 0,
            commit: Some(CommitId::new(id)),
        })
    }

    async fn abort_merge(&self, session: &mut Self::Session) -> Result<(), StoreError> {
        if !session.merge_conflicted {
            return Err(StoreError::Protocol("no merge in progress".to_string()));
        }
        let workspace = {
            let state = self.state.lock();
            let head = state.head_of(&session.branch)?;
            state.snapshot_of(&head)?
        };
        session.workspace = workspace;
        session.merge_conflicted = false;
        Ok(())
    }

    async fn delete_branch(
        &self,
        _session: &mut Self::Session,
        branch: &str,
    ) -> Result<(), StoreError> {
        if branch == TRUNK {
            return Err(StoreError::Protocol("refusing to delete trunk".to_string()));
        }
        // Absent branches are fine; cleanup paths may call this twice.
        self.state.lock().branches.remove(branch);
        Ok(())
    }

    async fn try_advisory_lock(
        &self,
        session: &mut Self::Session,
        name: &str,
        timeout: Duration,
    ) -> Result<bool, StoreError> {
        if session.held_locks.contains_key(name) {
            return Ok(true);
        }
        let handle = self.lock_handle(name);
        match tokio::time::timeout(timeout, handle.lock_owned()).await {
            Ok(guard) => {
                session.held_locks.insert(name.to_string(), guard);
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    async fn release_advisory_lock(
        &self,
        session: &mut Self::Session,
        name: &str,
    ) -> Result<(), StoreError> {
        session.held_locks.remove(name);
        Ok(())
    }

    async fn head(&self, session: &mut Self::Session) -> Result<CommitId, StoreError> {
        Ok(CommitId::new(self.state.lock().head_of(&session.branch)?))
    }

    async fn list_branches(
        &self,
        _session: &mut Self::Session,
        prefix: &str,
    ) -> Result<Vec<String>, StoreError> {
        Ok(self
            .state
            .lock()
            .branches
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    async fn seed_trunk(store: &MemoryStore, cells: &[(&str, &str, &str, &str)]) -> Result<CommitId> {
        let mut session = store.acquire_session().await?;
        for &(table, row, column, value) in cells {
            session.put(table, row, column, value);
        }
        Ok(store.commit_all(&mut session, "seed").await?)
    }

    #[tokio::test]
    async fn fork_commit_merge_fast_forwards() -> Result<()> {
        let store = MemoryStore::new();
        let base = seed_trunk(&store, &[("items", "x", "body", "v1")]).await?;

        let mut session = store.acquire_session().await?;
        store.create_branch(&mut session, "work/a", &base).await?;
        store.checkout(&mut session, "work/a").await?;
        session.put("items", "x", "body", "v2");
        let branch_tip = store.commit_all(&mut session, "update x").await?;

        store.checkout(&mut session, TRUNK).await?;
        let report = store.merge(&mut session, "work/a").await?;
        assert!(report.is_clean());
        assert_eq!(report.commit.as_ref(), Some(&branch_tip));

        let reader = store.acquire_session().await?;
        assert_eq!(reader.get("items", "x", "body").as_deref(), Some("v2"));
        Ok(())
    }

    #[tokio::test]
    async fn non_overlapping_branches_both_merge() -> Result<()> {
        let store = MemoryStore::new();
        let base = seed_trunk(
            &store,
            &[("items", "x", "body", "old"), ("items", "y", "body", "old")],
        )
        .await?;

        let mut a = store.acquire_session().await?;
        store.create_branch(&mut a, "work/a", &base).await?;
        store.checkout(&mut a, "work/a").await?;
        a.put("items", "x", "body", "from-a");
        store.commit_all(&mut a, "a").await?;

        let mut b = store.acquire_session().await?;
        store.create_branch(&mut b, "work/b", &base).await?;
        store.checkout(&mut b, "work/b").await?;
        b.put("items", "y", "body", "from-b");
        store.commit_all(&mut b, "b").await?;

        store.checkout(&mut a, TRUNK).await?;
        assert!(store.merge(&mut a, "work/a").await?.is_clean());
        store.checkout(&mut b, TRUNK).await?;
        // Second merge is a true three-way merge: trunk moved since the fork.
        assert!(store.merge(&mut b, "work/b").await?.is_clean());

        let reader = store.acquire_session().await?;
        assert_eq!(reader.get("items", "x", "body").as_deref(), Some("from-a"));
        assert_eq!(reader.get("items", "y", "body").as_deref(), Some("from-b"));
        Ok(())
    }

    #[tokio::test]
    async fn overlapping_change_conflicts_and_abort_restores() -> Result<()> {
        let store = MemoryStore::new();
        let base = seed_trunk(&store, &[("attrs", "i1:color", "value", "green")]).await?;

        let mut a = store.acquire_session().await?;
        store.create_branch(&mut a, "work/a", &base).await?;
        store.checkout(&mut a, "work/a").await?;
        a.put("attrs", "i1:color", "value", "red");
        store.commit_all(&mut a, "red").await?;

        let mut b = store.acquire_session().await?;
        store.create_branch(&mut b, "work/b", &base).await?;
        store.checkout(&mut b, "work/b").await?;
        b.put("attrs", "i1:color", "value", "blue");
        store.commit_all(&mut b, "blue").await?;

        store.checkout(&mut a, TRUNK).await?;
        assert!(store.merge(&mut a, "work/a").await?.is_clean());
        let trunk_after_first = store.head(&mut a).await?;

        store.checkout(&mut b, TRUNK).await?;
        let report = store.merge(&mut b, "work/b").await?;
        assert_eq!(report.conflicts, 1);
        assert!(report.commit.is_none());

        store.abort_merge(&mut b).await?;
        assert_eq!(store.head(&mut b).await?, trunk_after_first);
        assert_eq!(b.get("attrs", "i1:color", "value").as_deref(), Some("red"));
        Ok(())
    }

    #[tokio::test]
    async fn same_value_on_both_sides_is_not_a_conflict() -> Result<()> {
        let store = MemoryStore::new();
        let base = seed_trunk(&store, &[("items", "x", "body", "old")]).await?;

        for name in ["work/a", "work/b"] {
            let mut s = store.acquire_session().await?;
            store.create_branch(&mut s, name, &base).await?;
            store.checkout(&mut s, name).await?;
            s.put("items", "x", "body", "same");
            store.commit_all(&mut s, name).await?;
            store.checkout(&mut s, TRUNK).await?;
            assert!(store.merge(&mut s, name).await?.is_clean());
        }
        Ok(())
    }

    #[tokio::test]
    async fn advisory_lock_times_out_and_releases_on_drop() -> Result<()> {
        let store = MemoryStore::new();
        let mut holder = store.acquire_session().await?;
        let mut waiter = store.acquire_session().await?;

        assert!(
            store
                .try_advisory_lock(&mut holder, "merge", Duration::from_millis(10))
                .await?
        );
        assert!(
            !store
                .try_advisory_lock(&mut waiter, "merge", Duration::from_millis(50))
                .await?
        );

        drop(holder);
        assert!(
            store
                .try_advisory_lock(&mut waiter, "merge", Duration::from_millis(50))
                .await?
        );
        Ok(())
    }

    #[tokio::test]
    async fn delete_branch_is_idempotent_and_trunk_protected() -> Result<()> {
        let store = MemoryStore::new();
        let mut session = store.acquire_session().await?;
        let base = store.head(&mut session).await?;
        store.create_branch(&mut session, "work/gone", &base).await?;

        store.delete_branch(&mut session, "work/gone").await?;
        store.delete_branch(&mut session, "work/gone").await?;
        assert!(store.delete_branch(&mut session, TRUNK).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn list_branches_filters_by_prefix() -> Result<()> {
        let store = MemoryStore::new();
        let mut session = store.acquire_session().await?;
        let base = store.head(&mut session).await?;
        store.create_branch(&mut session, "mut/one", &base).await?;
        store.create_branch(&mut session, "mut/two", &base).await?;
        store.create_branch(&mut session, "other", &base).await?;

        let names = store.list_branches(&mut session, "mut/").await?;
        assert_eq!(names, vec!["mut/one".to_string(), "mut/two".to_string()]);
        Ok(())
    }
}
