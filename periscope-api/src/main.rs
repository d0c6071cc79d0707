//! Periscope API Server Entry Point
//!
//! Loads the instance configuration, assembles the query pipeline and
//! starts the Axum HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use periscope_api::jobs::{cache_sweeper_task, CacheSweeperConfig};
use periscope_api::{
    apply_env_overrides, assemble, create_api_router, init_tracing, ApiConfig, ApiError,
    ApiResult,
};
use periscope_core::Config;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ApiResult<()> {
    let api_config = ApiConfig::from_env();

    let mut config = Config::load(&api_config.config_path)?;
    apply_env_overrides(&mut config)?;
    init_tracing(config.params.logging.format)?;

    tracing::info!(
        path = %api_config.config_path,
        devices = config.devices.len(),
        "Configuration loaded"
    );

    let sweeper_config = CacheSweeperConfig::from_params(&config.params);
    let assembled = assemble(config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = tokio::spawn(cache_sweeper_task(
        Arc::clone(&assembled.cache),
        sweeper_config,
        shutdown_rx,
    ));

    let app = create_api_router(assembled.state, &api_config);

    let addr = api_config.bind_addr()?;
    tracing::info!(%addr, "Starting Periscope API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper.await {
        tracing::warn!(error = %e, "Cache sweeper task failed");
    }

    Ok(())
}
