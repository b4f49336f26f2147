//! Component wiring and background tasks.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;

use assetflow_core::{
    Clock, Config, MalwareScanner, MessagePublisher, MessageQueue, StorageMode, SystemClock,
};
use assetflow_db::{AssetRepository, AssetStore, InMemoryAssetStore, PgMessageQueue};
use assetflow_processing::{MediaValidator, OriginPolicy, ValidatorConfig};
use assetflow_services::{
    AssetLifecycle, AssetOrchestrator, ClamAVService, IngestionPipeline, LocalGateway,
    MediaGateway, PipelineConfig, RemoteStorageClient, RetrySweeper, RetrySweeperConfig,
};
use assetflow_storage::{create_staging_dir, create_storage};
use assetflow_worker::{InMemoryQueue, MessageHandler, QueueWorker, QueueWorkerConfig, WakeSource};

use super::database::setup_database;
use crate::state::{AppState, Backends, QueueState};

/// Handles to the consumer pool and the retry sweeper.
pub struct BackgroundTasks {
    pub worker: QueueWorker,
    pub sweeper: JoinHandle<()>,
}

impl BackgroundTasks {
    pub async fn shutdown(self) {
        self.worker.shutdown().await;
        self.sweeper.abort();
    }
}

fn origin_policy(config: &Config) -> OriginPolicy {
    OriginPolicy {
        allow_private: config.allow_private_origins(),
        allowlist: config.url_upload_allowlist().map(<[String]>::to_vec),
    }
}

async fn setup_store_and_queue(
    config: &Config,
) -> Result<(Arc<dyn AssetStore>, QueueState, &'static str)> {
    let visibility_timeout = Duration::from_secs(config.queue_visibility_timeout_secs());

    match config.database_url() {
        Some(database_url) => {
            let pool = setup_database(config, database_url).await?;
            let store: Arc<dyn AssetStore> =
                Arc::new(AssetRepository::new(pool.clone(), config.queue_names()));
            let queue = PgMessageQueue::new(pool.clone(), config.queue_names(), visibility_timeout);
            Ok((
                store,
                QueueState {
                    queue: Arc::new(queue),
                    pool: Some(pool),
                    notifier: None,
                },
                "postgres",
            ))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, asset state and queue are kept in memory");
            let queue = Arc::new(InMemoryQueue::new(visibility_timeout));
            let store: Arc<dyn AssetStore> = Arc::new(InMemoryAssetStore::new(
                queue.clone() as Arc<dyn MessagePublisher>
            ));
            Ok((
                store,
                QueueState {
                    notifier: Some(queue.notifier()),
                    queue: queue as Arc<dyn MessageQueue>,
                    pool: None,
                },
                "memory",
            ))
        }
    }
}

/// Build every component from configuration. Starts nothing.
pub async fn initialize_services(config: &Config) -> Result<Arc<AppState>> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let storage = create_storage(config)
        .await
        .context("Failed to initialize content store")?;
    let staging_dir = create_staging_dir(config.staging_path())
        .await
        .context("Failed to initialize staging directory")?;

    let scanner: Option<Arc<dyn MalwareScanner>> = if config.clamav_enabled() {
        tracing::info!(
            host = %config.clamav_host(),
            port = config.clamav_port(),
            "ClamAV scanning enabled"
        );
        Some(Arc::new(ClamAVService::with_timeouts(
            config.clamav_host().to_string(),
            config.clamav_port(),
            Duration::from_secs(config.clamav_connect_timeout_secs()),
            Duration::from_secs(config.clamav_read_timeout_secs()),
        )))
    } else {
        tracing::warn!("ClamAV scanning disabled, uploads are stored unscanned");
        None
    };
    let scanner_name = if scanner.is_some() { "clamav" } else { "disabled" };

    let validator = Arc::new(MediaValidator::new(
        ValidatorConfig {
            max_file_size: config.max_file_size_bytes(),
        },
        scanner,
    ));

    let policy = origin_policy(config);
    let pipeline = Arc::new(
        IngestionPipeline::new(
            PipelineConfig {
                staging_dir,
                connect_timeout: Duration::from_secs(config.download_connect_timeout_secs()),
                read_timeout: Duration::from_secs(config.download_read_timeout_secs()),
            },
            validator,
            storage.clone(),
            policy.clone(),
        )
        .context("Failed to build ingestion pipeline")?,
    );

    let gateway: Arc<dyn MediaGateway> = match config.storage_mode() {
        StorageMode::Local => Arc::new(LocalGateway::new(pipeline.clone())),
        StorageMode::Remote => {
            let base_url = config
                .remote_storage_url()
                .context("REMOTE_STORAGE_URL is required in remote storage mode")?;
            let timeout = Duration::from_secs(
                config.download_connect_timeout_secs() + config.download_read_timeout_secs(),
            );
            tracing::info!(base_url = %base_url, "Using remote storage service");
            Arc::new(RemoteStorageClient::new(base_url, timeout)?)
        }
    };

    let (store, queue, store_name) = setup_store_and_queue(config).await?;

    let lifecycle = Arc::new(AssetLifecycle::new(store.clone(), clock.clone(), policy));
    let orchestrator = Arc::new(AssetOrchestrator::new(
        store.clone(),
        gateway.clone(),
        clock.clone(),
        Duration::from_secs(config.asset_lease_secs()),
    )?);
    let sweeper = Arc::new(RetrySweeper::new(
        store,
        clock,
        RetrySweeperConfig {
            interval: Duration::from_secs(config.retry_sweep_interval_secs()),
            max_upload_attempts: config.max_upload_attempts(),
            max_delete_attempts: config.max_delete_attempts(),
            batch_size: 100,
        },
    ));

    let backends = Backends {
        store: store_name,
        queue: store_name,
        storage: "local",
        gateway: gateway.name(),
        scanner: scanner_name,
    };
    tracing::info!(
        store = backends.store,
        gateway = backends.gateway,
        scanner = backends.scanner,
        "Services initialized"
    );

    Ok(Arc::new(AppState {
        config: config.clone(),
        storage,
        pipeline,
        gateway,
        lifecycle,
        orchestrator,
        sweeper,
        queue,
        backends,
    }))
}

/// Start the queue consumers and the retry sweeper.
pub fn start_background_tasks(state: &AppState) -> BackgroundTasks {
    let config = &state.config;

    let wake = match (&state.queue.pool, &state.queue.notifier) {
        (Some(pool), _) => WakeSource::Postgres(pool.clone()),
        (None, Some(notifier)) => WakeSource::Notify(notifier.clone()),
        (None, None) => WakeSource::Poll,
    };

    let worker = QueueWorker::start(
        state.queue.queue.clone(),
        state.orchestrator.clone() as Arc<dyn MessageHandler>,
        QueueWorkerConfig {
            max_workers: config.queue_max_workers(),
            poll_interval_ms: config.queue_poll_interval_ms(),
        },
        wake,
    );

    let sweeper = state.sweeper.clone().start();

    BackgroundTasks { worker, sweeper }
}
