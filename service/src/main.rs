#![deny(
    clippy::expect_used,
    clippy::panic,
    clippy::print_stdout,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used
)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use payguard_api::{
    checkout::{CheckoutService, Collaborators},
    config::Config,
    http::build_app,
    protocol::{spawn_sweeper, Clock, SystemClock},
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Load and validate configuration first (fail-fast)
    let config = Config::load().map_err(|e| anyhow::anyhow!("{e}"))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.level))
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "payguard-api starting up"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let collaborators = Collaborators::in_memory(&config.checkout);
    let service = Arc::new(CheckoutService::from_config(
        &config,
        Arc::clone(&clock),
        collaborators,
    )?);

    tracing::info!(
        tolerance_ms = config.protocol.freshness_tolerance_ms,
        retention_ms = config.protocol.nonce_retention_ms,
        nonce_commit = ?config.protocol.nonce_commit,
        max_requests = config.rate_limit.max_requests,
        courses = config.checkout.courses.len(),
        "Payment protocol configured"
    );

    let sweeper = spawn_sweeper(
        service.registries().clone(),
        clock,
        Duration::from_millis(config.protocol.sweep_interval_ms),
    );

    let app = build_app(&config, service);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweeper.abort();
    tracing::info!("payguard-api stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
