mod api;
mod config;
mod db;
mod error;
mod pricing;
mod providers;
mod rules;
mod scheduler;
mod types;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::routes::{router, ApiState};
use crate::config::Config;
use crate::db::WatchlistStore;
use crate::error::Result;
use crate::providers::ProviderRegistry;
use crate::rules::RulesStore;
use crate::scheduler::Scheduler;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Stores ---
    let pool = db::connect(&cfg.db_path).await?;
    let store = WatchlistStore::new(pool);

    let rules = Arc::new(RulesStore::new(&cfg.rules_path));
    let loaded = rules.load().await?;
    info!(
        "Rules loaded from {} ({} overrides)",
        rules.path().display(),
        loaded.overrides.len()
    );

    // --- Provider clients ---
    let providers = ProviderRegistry::from_config(&cfg)?;
    if cfg.ebay_item_url.is_none() || cfg.ebay_sold_url.is_none() {
        warn!("EBAY_ITEM_URL / EBAY_SOLD_URL not fully set: unconfigured eBay kinds will be quarantined as unsupported");
    }

    // --- Scheduler ---
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let health = Arc::new(HealthState::new());
    let scheduler = Scheduler::new(
        store.clone(),
        providers.clone(),
        Arc::clone(&rules),
        cfg.batch_limit,
        Duration::from_secs(cfg.tick_seconds),
        Arc::clone(&health),
        shutdown_rx,
    );
    let scheduler_handle = tokio::spawn(async move { scheduler.run().await });

    // --- HTTP API server ---
    let api_state = ApiState { store, rules, providers, health };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {e}");
            }
            info!("Shutdown requested");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    // The scheduler finishes its current batch before exiting.
    if let Err(e) = scheduler_handle.await {
        error!("Scheduler task failed: {e}");
    }
    Ok(())
}
