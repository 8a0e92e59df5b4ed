//! End-to-end tests against a live Dolt SQL server.
//!
//! Skipped unless `STRATA_TEST_DATABASE_URL` points at a running server,
//! e.g. `mysql://root@127.0.0.1:3306/strata_test`. Everything here mutates
//! real branches, so point it at a throwaway database.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::mysql::MySqlPoolOptions;
use strata_kernel::catalog::{self, NewItem, ValueKind};
use strata_kernel::mutation::{MutationError, Orchestrator};
use strata_kernel::store::{DoltStore, VersionedStore};

async fn live_store() -> Result<Option<Arc<DoltStore>>> {
    let Ok(url) = std::env::var("STRATA_TEST_DATABASE_URL") else {
        eprintln!("STRATA_TEST_DATABASE_URL unset; skipping live Dolt test");
        return Ok(None);
    };
    let pool = MySqlPoolOptions::new()
        .max_connections(8)
        .connect(&url)
        .await?;
    catalog::ensure_schema(&pool).await?;
    Ok(Some(Arc::new(DoltStore::new(pool))))
}

fn orchestrator(store: &Arc<DoltStore>) -> Orchestrator<DoltStore> {
    Orchestrator::new(Arc::clone(store), "strata-test-mut", Duration::from_secs(10))
}

#[tokio::test]
async fn item_round_trip_through_branched_mutation() -> Result<()> {
    let Some(store) = live_store().await? else {
        return Ok(());
    };
    let orch = orchestrator(&store);

    let type_name = format!("type-{}", uuid_suffix());
    let name = type_name.clone();
    orch.run(&format!("register item type '{type_name}'"), None, |session| {
        Box::pin(async move {
            catalog::registry::create_item_type(&mut **session, &name)
                .await
                .map_err(MutationError::from)
        })
    })
    .await?;

    let item_type = type_name.clone();
    let outcome = orch
        .run("create live item", None, |session| {
            Box::pin(async move {
                catalog::items::create_item(
                    &mut **session,
                    NewItem {
                        item_type,
                        name: "live".to_string(),
                        body: "round trip".to_string(),
                    },
                )
                .await
                .map_err(MutationError::from)
            })
        })
        .await?;

    // The write is visible on the trunk through a plain pooled connection.
    let mut conn = store.pool().acquire().await?;
    let fetched = catalog::items::get_item(&mut conn, &outcome.result.id, None).await?;
    assert_eq!(fetched.body, "round trip");

    // And invisible at the pre-mutation version.
    let mut session = store.acquire_session().await?;
    let head_now = store.head(&mut session).await?;
    assert_eq!(head_now, outcome.new_version);
    Ok(())
}

#[tokio::test]
async fn typed_attribute_rejects_bad_values_live() -> Result<()> {
    let Some(store) = live_store().await? else {
        return Ok(());
    };
    let orch = orchestrator(&store);

    let attr = format!("count-{}", uuid_suffix());
    let attr_name = attr.clone();
    orch.run("register counter type", None, |session| {
        Box::pin(async move {
            catalog::registry::create_attribute_type(
                &mut **session,
                &attr_name,
                ValueKind::Integer,
            )
            .await
            .map_err(MutationError::from)
        })
    })
    .await?;

    let attr_name = attr.clone();
    let err = orch
        .run("set bad value", None, |session| {
            Box::pin(async move {
                catalog::attributes::set_attribute(
                    &mut **session,
                    "no-such-item",
                    &attr_name,
                    "not-a-number",
                )
                .await
                .map_err(MutationError::from)
            })
        })
        .await
        .expect_err("non-integer value must be rejected");
    assert!(matches!(err, MutationError::Validation(_)));
    Ok(())
}

fn uuid_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}
