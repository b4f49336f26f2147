//! Application state shared by handlers and the background tasks.

use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::Notify;

use assetflow_core::{Config, MessageQueue};
use assetflow_services::{
    AssetLifecycle, AssetOrchestrator, IngestionPipeline, MediaGateway, RetrySweeper,
};
use assetflow_storage::Storage;

/// Which implementation backs each seam, reported by `/health`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Backends {
    pub store: &'static str,
    pub queue: &'static str,
    pub storage: &'static str,
    pub gateway: &'static str,
    pub scanner: &'static str,
}

/// Durable side. Exactly one of `pool` and `notifier` is set.
#[derive(Clone)]
pub struct QueueState {
    pub queue: Arc<dyn MessageQueue>,
    pub pool: Option<PgPool>,
    pub notifier: Option<Arc<Notify>>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Content store served by the file server.
    pub storage: Arc<dyn Storage>,
    /// In-process ingestion behind `POST /`.
    pub pipeline: Arc<IngestionPipeline>,
    pub gateway: Arc<dyn MediaGateway>,
    pub lifecycle: Arc<AssetLifecycle>,
    pub orchestrator: Arc<AssetOrchestrator>,
    pub sweeper: Arc<RetrySweeper>,
    pub queue: QueueState,
    pub backends: Backends,
}
