mod aggregator;
mod api;
mod clients;
mod clock;
mod config;
mod error;
mod state;
mod stats;
mod types;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::aggregator::AggregatorService;
use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::api::routes::{router, ApiState};
use crate::clients::{build_clients, http_client};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::Result;
use crate::state::PerformanceStore;
use crate::stats::{AnomalyMonitor, RetentionSweeper, StatisticsService};

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
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // --- Statistics engine ---
    let store = PerformanceStore::new(Arc::clone(&clock), cfg.max_samples_per_key);
    let health = Arc::new(HealthState::new());
    let statistics = Arc::new(StatisticsService::new(
        Arc::clone(&store),
        cfg.thresholds,
        cfg.statistics_cache_ttl,
        Arc::clone(&clock),
    ));
    info!(
        fast_ms = cfg.thresholds.fast_upper_limit_ms,
        medium_ms = cfg.thresholds.medium_upper_limit_ms,
        "Statistics ready: retention {:?}, cleanup every {:?}, analysis window {:?}, checks every {:?}",
        cfg.retention_period,
        cfg.cleanup_interval,
        cfg.analysis_period,
        cfg.check_interval,
    );

    // --- Background loops ---
    let shutdown = CancellationToken::new();

    let sweeper = RetentionSweeper::new(
        Arc::clone(&store),
        Arc::clone(&health),
        cfg.retention_period,
        cfg.cleanup_interval,
    );
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown.clone()));

    let monitor = AnomalyMonitor::new(
        Arc::clone(&store),
        Arc::clone(&health),
        cfg.aggregator_name.clone(),
        cfg.analysis_period,
        cfg.check_interval,
    );
    let monitor_handle = tokio::spawn(monitor.run(shutdown.clone()));

    // --- Upstreams ---
    let http = http_client(cfg.http_timeout)?;
    let clients = build_clients(&cfg, &http, &store, &clock);
    if clients.is_empty() {
        warn!("No upstream credentials configured: aggregation responses will be empty");
    }
    let aggregator = Arc::new(AggregatorService::new(clients));
    info!("Upstreams registered: {}", aggregator.api_names().join(", "));

    // --- HTTP API server ---
    let api_state = ApiState {
        store,
        statistics,
        aggregator,
        latency: Arc::new(LatencyStats::new()),
        health,
        aggregator_name: Arc::from(cfg.aggregator_name.as_str()),
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {e}");
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    for (name, handle) in [("sweeper", sweeper_handle), ("monitor", monitor_handle)] {
        if let Err(e) = handle.await {
            error!("Background {name} task ended abnormally: {e}");
        }
    }
    info!("Shutdown complete");

    Ok(())
}
