//! rolegate API composition root.

#![forbid(unsafe_code)]

mod api_config;
mod api_router;
mod api_services;
mod dto;
mod error;
mod handlers;
mod middleware;
mod state;

use rolegate_core::AppError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api_config::{ApiConfig, init_tracing};
use crate::api_router::build_router;
use crate::api_services::{build_app_state, connect_and_migrate};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ApiConfig::load()?;
    let pool = connect_and_migrate(config.runtime.database_url.as_str()).await?;

    if config.migrate_only {
        info!("database migrations applied successfully");
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let app_state = build_app_state(&config, pool).await?;

    let poller = app_state.dynamic_config_service.clone();
    let poll_interval = config.runtime.settings.config_poll_interval;
    let poller_shutdown = shutdown.clone();
    let poller_task = tokio::spawn(async move {
        poller.run_poller(poll_interval, poller_shutdown).await;
    });

    let app = build_router(app_state);
    let address = config.socket_address()?;
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| AppError::Internal(format!("failed to bind listener: {error}")))?;

    info!(%address, "rolegate-api listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .map_err(|error| AppError::Internal(format!("api server error: {error}")));

    shutdown.cancel();
    if let Err(error) = poller_task.await {
        warn!(error = %error, "dynamic configuration poller ended abnormally");
    }

    served
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(error) = result {
                warn!(error = %error, "failed to listen for shutdown signal");
            }
        }
        () = shutdown.cancelled() => {}
    }

    info!("shutdown requested");
    shutdown.cancel();
}
