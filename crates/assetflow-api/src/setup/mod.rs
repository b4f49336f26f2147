//! Application setup and initialization

pub mod database;
pub mod routes;
pub mod server;
pub mod services;

use std::sync::Arc;

use anyhow::{Context, Result};

use assetflow_core::Config;

use crate::state::AppState;

pub use services::{start_background_tasks, BackgroundTasks};

/// Validate configuration, initialize logging, and wire every component.
///
/// Background tasks are not started here; see [`start_background_tasks`].
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    config
        .validate()
        .context("Configuration validation failed")?;

    assetflow_infra::init_telemetry(config.log_json())
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    tracing::info!(
        environment = %config.environment(),
        "Configuration loaded and validated successfully"
    );

    let state = services::initialize_services(&config).await?;
    let router = routes::setup_routes(state.clone());

    Ok((state, router))
}
