//! Strata Kernel binary entrypoint.
//!
//! Wires up configuration, telemetry, the database pool, and the HTTP server,
//! then runs the kernel service until shutdown.

use std::sync::Arc;
use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::mysql::MySqlPoolOptions;
use strata_kernel::api::AppState;
use strata_kernel::infrastructure::{audit, config::Settings, server, telemetry::TelemetryBuilder};
use strata_kernel::mutation::{sweep_orphans, Orchestrator};
use strata_kernel::store::{DoltStore, VersionedStore};
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Settings::new().expect("Failed to load configuration");

    let mut telemetry_builder =
        TelemetryBuilder::new(config.telemetry.service_name.clone(), env!("CARGO_PKG_VERSION"))
            .with_log_level("info")
            .with_sampling_ratio(config.telemetry.sampling_ratio);

    if let Some(ref endpoint) = config.telemetry.otlp_endpoint {
        telemetry_builder = telemetry_builder.with_tracing(endpoint);
    }

    telemetry_builder
        .init()
        .expect("Failed to initialize telemetry");

    info!("Strata kernel starting...");
    audit::log_audit(&audit::AuditEvent::SystemStartup {
        component: "kernel".into(),
    });

    let pool = MySqlPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(config.database.url.expose_secret())
        .await?;

    strata_kernel::catalog::ensure_schema(&pool).await?;

    let store = Arc::new(DoltStore::new(pool));
    let orchestrator = Orchestrator::new(
        Arc::clone(&store),
        config.mutation.branch_prefix.clone(),
        Duration::from_millis(config.mutation.lock_timeout_ms),
    );

    // Sweep before accepting traffic: nothing has mutated yet, so every
    // branch matching the prefix is an orphan from a crashed process.
    {
        let mut session = store.acquire_session().await?;
        let removed =
            sweep_orphans(store.as_ref(), &mut session, &config.mutation.branch_prefix).await?;
        info!(removed, "orphan branch sweep complete");
    }

    let state = Arc::new(AppState::new(Arc::clone(&store), orchestrator));

    if std::env::args().any(|arg| arg == "--mcp") {
        info!("Serving MCP on stdio");
        strata_kernel::mcp::serve_stdio(state).await?;
        audit::log_audit(&audit::AuditEvent::SystemShutdown {
            reason: "stdin closed".into(),
        });
        return Ok(());
    }

    let server_config = config.clone();
    let server_state = Arc::clone(&state);
    tokio::spawn(async move {
        if let Err(e) = server::run_server(&server_config, server_state).await {
            error!("API server failed: {:?}", e);
        }
    });

    info!("Strata kernel initialized. Waiting for shutdown signal...");

    shutdown_signal().await;

    info!("Shutdown signal received, cleaning up...");
    audit::log_audit(&audit::AuditEvent::SystemShutdown {
        reason: "Signal received".into(),
    });

    info!("Strata kernel shutdown complete.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
