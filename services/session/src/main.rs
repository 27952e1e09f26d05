//! Roster session daemon.
//!
//! Wires the session service together: SQLite store, LRU cache, flush
//! worker and expiry reaper, with a graceful shutdown sequence that runs a
//! final flush pass after the workers have stopped.

use std::sync::Arc;

use anyhow::{Context, Result};
use roster_session::{Config, SessionService, SqliteStore};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to ROSTER_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting roster session service");
    info!(
        cache_capacity = config.cache_capacity,
        flush_interval_secs = config.flush_interval_secs,
        reap_interval_secs = config.reap_interval_secs,
        persist = config.persist,
        db_path = %config.db_path,
        "Configuration loaded"
    );

    let store = SqliteStore::open(&config.db_path)
        .with_context(|| format!("failed to open session store at {}", config.db_path))?;
    let service = SessionService::new(config, Arc::new(store));

    // Create shutdown channel for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handles = service.spawn_workers(shutdown_rx);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Received shutdown signal");

    // Order matters: stop the timers first, then run the final flush so
    // no dirty state is left behind.
    let _ = shutdown_tx.send(true);

    info!("Waiting for workers to shut down...");
    let shutdown_timeout = std::time::Duration::from_secs(10);
    for handle in worker_handles {
        if let Err(e) = tokio::time::timeout(shutdown_timeout, handle).await {
            warn!(error = %e, "Worker did not shut down in time");
        }
    }

    service.shutdown().await;

    info!("Session service shutdown complete");
    Ok(())
}
