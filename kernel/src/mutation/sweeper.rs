//! Startup cleanup of branches left behind by crashed processes.

use tracing::{info, warn};

use super::error::MutationError;
use crate::infrastructure::audit::{log_audit, AuditEvent};
use crate::store::VersionedStore;

/// Delete every branch matching the mutation naming convention.
///
/// Runs once at startup, before the process accepts traffic: nothing has
/// mutated yet, so every match is by definition an orphan and no age filter
/// is needed. Per-branch delete failures are logged and counted, not raised;
/// a failure to even list branches is, so a broken store fails startup
/// visibly.
///
/// Returns the number of branches removed.
///
/// # Errors
///
/// Returns an error when the branch listing itself fails.
pub async fn sweep_orphans<S: VersionedStore>(
    store: &S,
    session: &mut S::Session,
    branch_prefix: &str,
) -> Result<u64, MutationError> {
    let pattern = format!("{branch_prefix}/");
    let orphans = store.list_branches(session, &pattern).await?;

    let mut removed: u64 = 0;
    let mut skipped: u64 = 0;
    for branch in orphans {
        match store.delete_branch(session, &branch).await {
            Ok(()) => {
                info!(branch, "removed orphaned mutation branch");
                removed += 1;
            }
            Err(err) => {
                warn!(branch, error = %err, "failed to remove orphaned branch");
                skipped += 1;
            }
        }
    }

    log_audit(&AuditEvent::OrphansSwept { removed, skipped });
    Ok(removed)
}
