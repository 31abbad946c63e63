//! Tollgate request gate.
//!
//! Main entry point for the standalone gate. Loads configuration, wires the
//! authentication and rate limit stages, and serves until a shutdown signal
//! arrives.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tollgate_api::{create_router, start_server, AppState, Config};
use tollgate_core::RealClock;
use tollgate_limiter::IdleSweeper;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config.rust_log);

    info!("Starting tollgate request gate");

    let addr = config.parse_server_addr()?;
    let rate_limit_policy = config.to_rate_limit_policy()?;
    info!(
        %addr,
        rate_limit_enabled = rate_limit_policy.enabled,
        capacity = rate_limit_policy.bandwidth.capacity(),
        refill_tokens = rate_limit_policy.bandwidth.refill_tokens(),
        refill_interval_secs = rate_limit_policy.bandwidth.refill_interval().as_secs(),
        strategy = %rate_limit_policy.strategy,
        "Configuration loaded"
    );

    let state = AppState::from_config(&config, Arc::new(RealClock::new()))?;

    // Idle buckets are swept once per refill interval.
    let shutdown = CancellationToken::new();
    let sweeper = rate_limit_policy.idle_eviction_after().map(|idle_after| {
        IdleSweeper::new(
            Arc::clone(state.rate_limit.limiter()),
            idle_after,
            rate_limit_policy.bandwidth.refill_interval(),
            shutdown.clone(),
        )
        .spawn()
    });

    let app = create_router(state, config.router_settings()?);
    let served = start_server(app, addr).await.context("HTTP server failed");

    shutdown.cancel();
    if let Some(handle) = sweeper {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "idle sweeper did not stop cleanly");
        }
    }

    info!("Tollgate shutdown complete");
    served
}

/// Initializes tracing from the configured filter directive.
fn init_tracing(directive: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_new(directive)
        .unwrap_or_else(|_| EnvFilter::new("info,tollgate=debug,tower_http=debug"));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}
