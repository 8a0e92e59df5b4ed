//! Integration tests for the branched-mutation protocol.
//!
//! Concurrency scenarios: parallel writers off the same base, conflict
//! detection on overlapping cells, and trunk convergence under load.

mod common;

use std::sync::Arc;

use anyhow::Result;
use common::TestKernel;
use strata_kernel::mutation::MutationError;
use tokio::sync::Barrier;

/// Two concurrent mutations off the same head, touching different items:
/// both merge clean and both writes land on the trunk.
#[tokio::test]
async fn concurrent_disjoint_writers_both_merge_clean() -> Result<()> {
    let kernel = TestKernel::new();
    kernel.seed("items", "x", "body", "old-x").await?;
    kernel.seed("items", "y", "body", "old-y").await?;
    let base = kernel.trunk_head().await?;

    let barrier = Arc::new(Barrier::new(2));
    let mut handles = Vec::new();
    for (row, value) in [("x", "new-x"), ("y", "new-y")] {
        let orchestrator = Arc::clone(&kernel.orchestrator);
        let barrier = Arc::clone(&barrier);
        let base = base.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            orchestrator
                .run(&format!("update {row}"), Some(base), |session| {
                    Box::pin(async move {
                        session.put("items", row, "body", value);
                        Ok(())
                    })
                })
                .await
        }));
    }

    let mut versions = Vec::new();
    for handle in handles {
        let outcome = handle.await?.expect("disjoint writer must merge clean");
        versions.push(outcome.new_version);
    }

    assert_ne!(versions[0], versions[1], "each merge yields its own head");
    let final_head = kernel.trunk_head().await?;
    assert!(
        versions.contains(&final_head),
        "trunk head is the later of the two merge commits"
    );
    assert_eq!(
        kernel.read_trunk("items", "x", "body").await?.as_deref(),
        Some("new-x")
    );
    assert_eq!(
        kernel.read_trunk("items", "y", "body").await?.as_deref(),
        Some("new-y")
    );
    assert!(kernel.leftover_branches().await?.is_empty());
    Ok(())
}

/// Two concurrent mutations off the same head setting the same attribute to
/// different values: exactly one merges clean, the other conflicts, and the
/// trunk ends with exactly one of the two values.
#[tokio::test]
async fn concurrent_overlapping_writers_exactly_one_wins() -> Result<()> {
    let kernel = TestKernel::new();
    kernel.seed("attrs", "i1:color", "value", "green").await?;
    let base = kernel.trunk_head().await?;

    let barrier = Arc::new(Barrier::new(2));
    let mut handles = Vec::new();
    for color in ["red", "blue"] {
        let orchestrator = Arc::clone(&kernel.orchestrator);
        let barrier = Arc::clone(&barrier);
        let base = base.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            let outcome = orchestrator
                .run(&format!("set color {color}"), Some(base), |session| {
                    Box::pin(async move {
                        session.put("attrs", "i1:color", "value", color);
                        Ok(color)
                    })
                })
                .await;
            (color, outcome)
        }));
    }

    let mut winners = Vec::new();
    let mut conflicts = 0;
    for handle in handles {
        let (color, outcome) = handle.await?;
        match outcome {
            Ok(_) => winners.push(color),
            Err(MutationError::Conflict { .. }) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(winners.len(), 1, "exactly one writer merges clean");
    assert_eq!(conflicts, 1, "the other writer conflicts");
    assert_eq!(
        kernel
            .read_trunk("attrs", "i1:color", "value")
            .await?
            .as_deref(),
        Some(winners[0]),
        "trunk holds the winner's value, never a mix"
    );
    assert!(kernel.leftover_branches().await?.is_empty());
    Ok(())
}

/// A mutation with no explicit base forks from the head read at invocation
/// time and succeeds when nothing conflicts.
#[tokio::test]
async fn default_base_is_the_invocation_time_head() -> Result<()> {
    let kernel = TestKernel::new();
    kernel.seed("items", "x", "body", "v1").await?;

    let outcome = kernel
        .orchestrator
        .run("update x", None, |session| {
            Box::pin(async move {
                session.put("items", "x", "body", "v2");
                Ok(())
            })
        })
        .await?;

    assert_eq!(kernel.trunk_head().await?, outcome.new_version);
    assert_eq!(
        kernel.read_trunk("items", "x", "body").await?.as_deref(),
        Some("v2")
    );
    Ok(())
}

/// A stale base whose changes do not overlap any intervening commit still
/// merges clean.
#[tokio::test]
async fn stale_base_without_overlap_merges_clean() -> Result<()> {
    let kernel = TestKernel::new();
    kernel.seed("items", "x", "body", "old").await?;
    let stale = kernel.trunk_head().await?;

    // The trunk moves on.
    kernel
        .orchestrator
        .run("update x", None, |session| {
            Box::pin(async move {
                session.put("items", "x", "body", "newer");
                Ok(())
            })
        })
        .await?;

    let outcome = kernel
        .orchestrator
        .run("add y", Some(stale), |session| {
            Box::pin(async move {
                session.put("items", "y", "body", "fresh");
                Ok(())
            })
        })
        .await;

    assert!(outcome.is_ok(), "disjoint change off a stale base is clean");
    assert_eq!(
        kernel.read_trunk("items", "x", "body").await?.as_deref(),
        Some("newer")
    );
    assert_eq!(
        kernel.read_trunk("items", "y", "body").await?.as_deref(),
        Some("fresh")
    );
    Ok(())
}

/// Many concurrent writers off the same base on the same cell: merges are
/// serialized, exactly one wins, and every loser sees a conflict rather than
/// a partial write.
#[tokio::test]
async fn contended_cell_under_load_keeps_exactly_one_winner() -> Result<()> {
    const WRITERS: usize = 8;

    let kernel = TestKernel::new();
    kernel.seed("attrs", "i1:size", "value", "0").await?;
    let base = kernel.trunk_head().await?;

    let barrier = Arc::new(Barrier::new(WRITERS));
    let mut handles = Vec::new();
    for writer in 0..WRITERS {
        let orchestrator = Arc::clone(&kernel.orchestrator);
        let barrier = Arc::clone(&barrier);
        let base = base.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            let value = format!("{writer}");
            orchestrator
                .run(&format!("writer {writer}"), Some(base), |session| {
                    Box::pin(async move {
                        session.put("attrs", "i1:size", "value", value.clone());
                        Ok(value)
                    })
                })
                .await
        }));
    }

    let mut clean = Vec::new();
    let mut conflicted = 0;
    for handle in handles {
        match handle.await? {
            Ok(outcome) => clean.push(outcome.result),
            Err(MutationError::Conflict { .. }) => conflicted += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(clean.len(), 1, "exactly one writer may win the cell");
    assert_eq!(conflicted, WRITERS - 1);
    assert_eq!(
        kernel
            .read_trunk("attrs", "i1:size", "value")
            .await?
            .as_deref(),
        Some(clean[0].as_str())
    );
    assert!(kernel.leftover_branches().await?.is_empty());
    Ok(())
}

/// Many concurrent writers on disjoint rows: everything merges clean and the
/// trunk converges with all writes present.
#[tokio::test]
async fn disjoint_writers_under_load_all_merge_clean() -> Result<()> {
    const WRITERS: usize = 8;

    let kernel = TestKernel::new();
    let base = kernel.trunk_head().await?;

    let barrier = Arc::new(Barrier::new(WRITERS));
    let mut handles = Vec::new();
    for writer in 0..WRITERS {
        let orchestrator = Arc::clone(&kernel.orchestrator);
        let barrier = Arc::clone(&barrier);
        let base = base.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            let row = format!("row-{writer}");
            orchestrator
                .run(&format!("writer {writer}"), Some(base), |session| {
                    Box::pin(async move {
                        session.put("items", &row, "body", "done");
                        Ok(())
                    })
                })
                .await
        }));
    }

    for handle in handles {
        handle.await?.expect("disjoint writers never conflict");
    }

    for writer in 0..WRITERS {
        assert_eq!(
            kernel
                .read_trunk("items", &format!("row-{writer}"), "body")
                .await?
                .as_deref(),
            Some("done")
        );
    }
    assert!(kernel.leftover_branches().await?.is_empty());
    Ok(())
}
