//! Till Terminal - offline-first sync runtime for POS terminals.
//!
//! Keeps a terminal's SQLite store reconciled with the central backend:
//! local changes are pushed, remote changes pulled, and conflicts routed
//! through the resolver, all on a background cadence.

use std::sync::Arc;
use till_terminal::{db, Config, HttpRemoteStore, SyncScheduler};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "till_terminal=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!(store_id = %config.store_id, "starting Till terminal sync runtime");

    // Open the local store
    let pool = db::create_pool(&config.database_url).await?;

    tracing::info!("running database migrations...");
    db::run_migrations(&pool).await?;

    // Wire the remote store and the scheduler
    let remote = Arc::new(HttpRemoteStore::new(
        config.remote_url.clone(),
        config.api_key.clone(),
    )?);
    let scheduler = SyncScheduler::new(pool, remote, config);

    let health = scheduler.health_check().await;
    tracing::info!(
        database = health.database,
        connectivity = health.connectivity,
        pending = health.pending_records,
        "startup health check"
    );

    scheduler.start().await?;

    // Run until interrupted; the in-flight cycle finishes before exit
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    scheduler.stop().await;

    Ok(())
}
