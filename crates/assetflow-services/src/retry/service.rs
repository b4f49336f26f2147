//! Scheduled retry of failed assets.
//!
//! The sweeper is the only retry path: consumers never requeue. Each pass moves failed
//! assets under their attempt cap back to the waiting status (queuing a message), and
//! republishes waiting assets whose processing lease ran out.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};

use assetflow_core::models::AssetStatus;
use assetflow_core::Clock;
use assetflow_db::AssetStore;

#[derive(Debug, Clone)]
pub struct RetrySweeperConfig {
    pub interval: Duration,
    pub max_upload_attempts: i32,
    pub max_delete_attempts: i32,
    /// Assets handled per status and pass.
    pub batch_size: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub uploads_requeued: usize,
    pub deletions_requeued: usize,
    pub leases_reaped: usize,
    /// Failed assets at or above their cap. They stay failed for good.
    pub exhausted: i64,
}

pub struct RetrySweeper {
    store: Arc<dyn AssetStore>,
    clock: Arc<dyn Clock>,
    config: RetrySweeperConfig,
    running: Mutex<()>,
}

impl RetrySweeper {
    pub fn new(
        store: Arc<dyn AssetStore>,
        clock: Arc<dyn Clock>,
        config: RetrySweeperConfig,
    ) -> Self {
        Self {
            store,
            clock,
            config,
            running: Mutex::new(()),
        }
    }

    /// Start the background sweep loop. Abort the returned handle to stop it.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut sweep_interval = interval(self.config.interval);
            sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            tracing::info!(
                interval_secs = self.config.interval.as_secs(),
                max_upload_attempts = self.config.max_upload_attempts,
                max_delete_attempts = self.config.max_delete_attempts,
                "Retry sweeper started"
            );

            loop {
                sweep_interval.tick().await;
                if let Err(e) = self.run_once().await {
                    tracing::error!(error = %e, "Retry sweep failed");
                }
            }
        })
    }

    /// One pass. Returns `None` without doing anything when a pass is already running.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self) -> Result<Option<SweepReport>> {
        let Ok(_guard) = self.running.try_lock() else {
            tracing::debug!("Retry sweep already running, skipping");
            return Ok(None);
        };

        let uploads_requeued = self
            .requeue_failed(AssetStatus::UploadFailed, self.config.max_upload_attempts)
            .await?;
        let deletions_requeued = self
            .requeue_failed(AssetStatus::DeletionFailed, self.config.max_delete_attempts)
            .await?;
        let leases_reaped = self.reap_expired_leases().await?;
        let exhausted = self
            .store
            .count_exhausted(
                self.config.max_upload_attempts,
                self.config.max_delete_attempts,
            )
            .await?;

        if exhausted > 0 {
            tracing::warn!(
                exhausted = exhausted,
                "Assets have exhausted their retry attempts and need manual attention"
            );
        }

        let report = SweepReport {
            uploads_requeued,
            deletions_requeued,
            leases_reaped,
            exhausted,
        };
        tracing::info!(
            uploads_requeued = report.uploads_requeued,
            deletions_requeued = report.deletions_requeued,
            leases_reaped = report.leases_reaped,
            "Retry sweep completed"
        );
        Ok(Some(report))
    }

    async fn requeue_failed(&self, failed_status: AssetStatus, max_attempts: i32) -> Result<usize> {
        let candidates = self
            .store
            .find_retryable(failed_status, max_attempts, self.config.batch_size)
            .await?;

        let mut requeued = 0;
        for asset in candidates {
            match self.store.requeue(asset.id, failed_status).await {
                Ok(true) => {
                    tracing::debug!(asset_id = asset.id, status = %failed_status, "Asset requeued");
                    requeued += 1;
                }
                // Changed concurrently, e.g. released by its producer.
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(error = %e, asset_id = asset.id, "Failed to requeue asset");
                }
            }
        }
        Ok(requeued)
    }

    async fn reap_expired_leases(&self) -> Result<usize> {
        let now = self.clock.now();
        let expired = self
            .store
            .find_expired_leases(now, self.config.batch_size)
            .await?;

        let mut reaped = 0;
        for asset in expired {
            match self.store.republish_expired(asset.id, asset.status, now).await {
                Ok(true) => {
                    tracing::warn!(
                        asset_id = asset.id,
                        status = %asset.status,
                        "Processing lease expired, asset republished"
                    );
                    reaped += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(error = %e, asset_id = asset.id, "Failed to republish asset");
                }
            }
        }
        Ok(reaped)
    }
}
