// =============================================================================
// Impulse Scanner — Main Entry Point
// =============================================================================
//
// Loads configuration, warms the row cache from the last snapshot, and serves
// the scan API until Ctrl+C.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod apgar;
mod api;
mod app_state;
mod cache;
mod divergence;
mod error;
mod impulse;
mod indicators;
mod market_data;
mod runtime_config;
mod scanner;
mod types;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::cache::ScanSnapshot;
use crate::market_data::ChartApiProvider;
use crate::runtime_config::ScannerConfig;

/// How often expired cache entries are swept.
const PURGE_INTERVAL_SECS: u64 = 600;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Impulse Scanner starting up");

    let config_path = std::env::var("SCANNER_CONFIG").unwrap_or_else(|_| "scanner_config.json".into());
    let mut config = ScannerConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, path = %config_path, "Failed to load config, using defaults");
        let defaults = ScannerConfig::default();
        if !std::path::Path::new(&config_path).exists() {
            match defaults.save(&config_path) {
                Ok(()) => info!(path = %config_path, "Wrote default config for editing"),
                Err(e) => warn!(error = %e, path = %config_path, "Could not write default config"),
            }
        }
        defaults
    });
    config.apply_env_overrides();

    info!(
        bind_addr = %config.bind_addr,
        concurrency = config.concurrency,
        universes = ?config.universes.keys().collect::<Vec<_>>(),
        "Configuration ready"
    );

    // ── 2. Provider & shared state ───────────────────────────────────────
    let provider = ChartApiProvider::new(config.provider_base_url.clone(), config.provider_timeout())
        .context("failed to build market data provider")?;
    let state = Arc::new(AppState::new(config, Arc::new(provider)));

    // ── 3. Warm start ────────────────────────────────────────────────────
    match ScanSnapshot::load(&state.config.snapshot_path) {
        Ok(Some(snapshot)) => {
            state.warm_start(&snapshot);
        }
        Ok(None) => info!("No scan snapshot found; starting cold"),
        Err(e) => warn!(error = %e, "Ignoring unreadable scan snapshot"),
    }

    // ── 4. Cache sweeper ─────────────────────────────────────────────────
    let purge_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(PURGE_INTERVAL_SECS));
        loop {
            interval.tick().await;
            let rows = purge_state.scanner.row_cache().purge_expired();
            let quotes = purge_state.quotes.cache().purge_expired();
            if rows + quotes > 0 {
                info!(rows, quotes, "Purged expired cache entries");
            }
        }
    });

    // ── 5. API server ────────────────────────────────────────────────────
    let bind_addr = state.config.bind_addr.clone();
    let app = api::rest::router(state.clone());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind API server to {bind_addr}"))?;
    info!(addr = %bind_addr, "API server listening. Press Ctrl+C to stop.");

    // ── 6. Graceful shutdown ─────────────────────────────────────────────
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            warn!("Shutdown signal received, stopping gracefully");
        })
        .await
        .context("API server failed")?;

    info!("Impulse Scanner shut down complete.");
    Ok(())
}
