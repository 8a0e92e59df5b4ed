//! Integration tests for failure paths: cleanup after errors, lock-timeout
//! behavior, and orphan recovery after a simulated crash.

mod common;

use std::time::{Duration, Instant};

use anyhow::Result;
use common::{TestKernel, PREFIX};
use strata_kernel::catalog::CatalogError;
use strata_kernel::mutation::{sweep_orphans, MutationError, MERGE_LOCK_NAME};
use strata_kernel::store::VersionedStore;

/// A unit-of-work failure leaves no branch behind and no trace on the trunk,
/// and the error arrives unchanged.
#[tokio::test]
async fn failed_unit_of_work_leaves_no_residue() -> Result<()> {
    let kernel = TestKernel::new();
    kernel.seed("items", "x", "body", "original").await?;
    let head_before = kernel.trunk_head().await?;

    let err = kernel
        .orchestrator
        .run("doomed write", None, |session| {
            Box::pin(async move {
                session.put("items", "x", "body", "should never land");
                Err::<(), _>(MutationError::Validation(CatalogError::NotFound {
                    entity: "item",
                    id: "ghost".to_string(),
                }))
            })
        })
        .await
        .expect_err("unit-of-work error must propagate");

    assert!(matches!(
        err,
        MutationError::Validation(CatalogError::NotFound { .. })
    ));
    assert_eq!(kernel.trunk_head().await?, head_before);
    assert_eq!(
        kernel.read_trunk("items", "x", "body").await?.as_deref(),
        Some("original")
    );
    assert!(kernel.leftover_branches().await?.is_empty());
    Ok(())
}

/// A blocked merge lock yields `LockTimeout` within the configured bound,
/// not indefinitely, and the mutation branch is still torn down.
#[tokio::test]
async fn blocked_merge_lock_times_out_within_the_bound() -> Result<()> {
    let bound = Duration::from_millis(100);
    let kernel = TestKernel::with_lock_timeout(bound);

    // A stuck prior holder.
    let mut holder = kernel.store.acquire_session().await?;
    assert!(
        kernel
            .store
            .try_advisory_lock(&mut holder, MERGE_LOCK_NAME, Duration::from_millis(10))
            .await?
    );

    let started = Instant::now();
    let err = kernel
        .orchestrator
        .run("blocked", None, |session| {
            Box::pin(async move {
                session.put("items", "x", "body", "stuck");
                Ok(())
            })
        })
        .await
        .expect_err("merge lock is held elsewhere");
    let elapsed = started.elapsed();

    assert!(matches!(err, MutationError::LockTimeout { .. }));
    assert!(
        elapsed < Duration::from_secs(2),
        "timed out after {elapsed:?}, expected roughly the {bound:?} bound"
    );
    assert!(kernel.leftover_branches().await?.is_empty());
    assert_eq!(kernel.read_trunk("items", "x", "body").await?, None);

    // Once the holder goes away the same mutation goes through.
    drop(holder);
    kernel
        .orchestrator
        .run("unblocked", None, |session| {
            Box::pin(async move {
                session.put("items", "x", "body", "landed");
                Ok(())
            })
        })
        .await?;
    assert_eq!(
        kernel.read_trunk("items", "x", "body").await?.as_deref(),
        Some("landed")
    );
    Ok(())
}

/// A conflicting writer does not corrupt trunk state even when it loses, and
/// later mutations proceed normally.
#[tokio::test]
async fn conflict_loser_can_retry_with_fresh_state() -> Result<()> {
    let kernel = TestKernel::new();
    kernel.seed("attrs", "i1:color", "value", "green").await?;
    let base = kernel.trunk_head().await?;

    kernel
        .orchestrator
        .run("set red", Some(base.clone()), |session| {
            Box::pin(async move {
                session.put("attrs", "i1:color", "value", "red");
                Ok(())
            })
        })
        .await?;

    let err = kernel
        .orchestrator
        .run("set blue", Some(base), |session| {
            Box::pin(async move {
                session.put("attrs", "i1:color", "value", "blue");
                Ok(())
            })
        })
        .await
        .expect_err("overlapping write off the stale base conflicts");
    assert!(err.is_retryable());

    // Retried with fresh state (no pinned base) the write converges.
    kernel
        .orchestrator
        .run("set blue again", None, |session| {
            Box::pin(async move {
                session.put("attrs", "i1:color", "value", "blue");
                Ok(())
            })
        })
        .await?;
    assert_eq!(
        kernel
            .read_trunk("attrs", "i1:color", "value")
            .await?
            .as_deref(),
        Some("blue")
    );
    Ok(())
}

/// After a simulated crash (branch created, never deleted) the startup sweep
/// removes the orphan and leaves the trunk untouched.
#[tokio::test]
async fn sweeper_recovers_after_simulated_crash() -> Result<()> {
    let kernel = TestKernel::new();
    kernel.seed("items", "x", "body", "survives").await?;

    let mut session = kernel.store.acquire_session().await?;
    let head = kernel.store.head(&mut session).await?;

    // Crash window: the branch exists, its owner is gone.
    kernel
        .store
        .create_branch(&mut session, &format!("{PREFIX}/crashed"), &head)
        .await?;
    kernel
        .store
        .create_branch(&mut session, "release/v2", &head)
        .await?;

    let removed = sweep_orphans(&kernel.store, &mut session, PREFIX).await?;
    assert_eq!(removed, 1, "only the mutation branch is swept");

    let remaining = kernel.store.list_branches(&mut session, "").await?;
    assert!(remaining.contains(&"release/v2".to_string()));
    assert!(!remaining.iter().any(|name| name.starts_with(PREFIX)));
    assert_eq!(kernel.store.head(&mut session).await?, head);
    assert_eq!(
        kernel.read_trunk("items", "x", "body").await?.as_deref(),
        Some("survives")
    );
    Ok(())
}
