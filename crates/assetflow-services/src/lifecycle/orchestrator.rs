//! Consumer side of the asset lifecycle.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use assetflow_core::models::{AssetStatus, Delivery, Destination, MediaAsset};
use assetflow_core::Clock;
use assetflow_db::{AssetStore, ClaimOutcome};
use assetflow_worker::MessageHandler;

use crate::services::gateway::MediaGateway;

/// What a single message did to its asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    Uploaded,
    UploadFailed,
    Deleted,
    DeletionFailed,
    /// Stale, duplicate, or raced message. The asset was left untouched.
    Skipped,
}

/// Applies upload and delete messages to assets.
///
/// Gateway failures become state transitions and are never returned. Only store
/// failures surface as `Err`, which leaves the message for redelivery.
pub struct AssetOrchestrator {
    store: Arc<dyn AssetStore>,
    gateway: Arc<dyn MediaGateway>,
    clock: Arc<dyn Clock>,
    lease: chrono::Duration,
}

impl AssetOrchestrator {
    pub fn new(
        store: Arc<dyn AssetStore>,
        gateway: Arc<dyn MediaGateway>,
        clock: Arc<dyn Clock>,
        lease: Duration,
    ) -> Result<Self> {
        let lease = chrono::Duration::from_std(lease).context("Asset lease out of range")?;
        Ok(Self {
            store,
            gateway,
            clock,
            lease,
        })
    }

    /// Claim `asset_id` in `expected` status, logging why a message is dropped.
    async fn claim(&self, asset_id: i64, expected: AssetStatus) -> Result<Option<MediaAsset>> {
        let now = self.clock.now();
        let outcome = self
            .store
            .claim(asset_id, expected, now, now + self.lease)
            .await?;

        match outcome {
            ClaimOutcome::Claimed(asset) => Ok(Some(asset)),
            ClaimOutcome::NotFound => {
                tracing::info!(asset_id = asset_id, "Asset no longer exists, dropping message");
                Ok(None)
            }
            ClaimOutcome::StatusMismatch(status) => {
                tracing::info!(
                    asset_id = asset_id,
                    status = %status,
                    expected = %expected,
                    "Asset not in expected status, dropping message"
                );
                Ok(None)
            }
            ClaimOutcome::Leased => {
                tracing::info!(
                    asset_id = asset_id,
                    "Asset is being processed by another consumer, dropping message"
                );
                Ok(None)
            }
        }
    }

    #[tracing::instrument(skip(self), fields(gateway = self.gateway.name()))]
    pub async fn handle_upload(&self, asset_id: i64) -> Result<HandleOutcome> {
        let Some(asset) = self.claim(asset_id, AssetStatus::WaitingUpload).await? else {
            return Ok(HandleOutcome::Skipped);
        };

        match self.gateway.upload(asset.media_type, &asset.origin_url).await {
            Ok(stored) => {
                let updated = self
                    .store
                    .complete_upload(asset_id, &stored.locator, self.clock.now())
                    .await?;

                match updated {
                    Some(asset) => {
                        tracing::info!(
                            asset_id = asset_id,
                            storage_key = %stored.locator,
                            upload_attempts = asset.upload_attempts,
                            "Asset uploaded"
                        );
                        Ok(HandleOutcome::Uploaded)
                    }
                    None => {
                        // Released while the upload was running; the row is gone.
                        tracing::info!(
                            asset_id = asset_id,
                            storage_key = %stored.locator,
                            "Asset released during upload, discarding stored object"
                        );
                        if let Err(e) = self.gateway.delete(&stored.locator).await {
                            tracing::warn!(
                                error = %e,
                                storage_key = %stored.locator,
                                "Failed to discard orphaned stored object"
                            );
                        }
                        Ok(HandleOutcome::Skipped)
                    }
                }
            }
            Err(e) => {
                let updated = self.store.fail_upload(asset_id, self.clock.now()).await?;
                match updated {
                    Some(asset) => {
                        tracing::warn!(
                            asset_id = asset_id,
                            error = %e,
                            error_code = e.code(),
                            retryable = e.is_retryable(),
                            upload_attempts = asset.upload_attempts,
                            "Asset upload failed"
                        );
                        Ok(HandleOutcome::UploadFailed)
                    }
                    None => {
                        tracing::info!(
                            asset_id = asset_id,
                            error = %e,
                            "Asset released during failed upload"
                        );
                        Ok(HandleOutcome::Skipped)
                    }
                }
            }
        }
    }

    #[tracing::instrument(skip(self), fields(gateway = self.gateway.name()))]
    pub async fn handle_delete(&self, asset_id: i64) -> Result<HandleOutcome> {
        let Some(asset) = self.claim(asset_id, AssetStatus::WaitingDeletion).await? else {
            return Ok(HandleOutcome::Skipped);
        };

        let result = match asset.stored_locator.as_deref() {
            Some(locator) => self.gateway.delete(locator).await,
            None => {
                tracing::warn!(asset_id = asset_id, "Asset awaiting deletion has no locator");
                Ok(())
            }
        };

        match result {
            Ok(()) => {
                if self.store.complete_deletion(asset_id).await? {
                    tracing::info!(asset_id = asset_id, "Asset deleted");
                    Ok(HandleOutcome::Deleted)
                } else {
                    Ok(HandleOutcome::Skipped)
                }
            }
            Err(e) => match self.store.fail_deletion(asset_id, self.clock.now()).await? {
                Some(asset) => {
                    tracing::warn!(
                        asset_id = asset_id,
                        error = %e,
                        delete_attempts = asset.delete_attempts,
                        "Asset deletion failed"
                    );
                    Ok(HandleOutcome::DeletionFailed)
                }
                None => Ok(HandleOutcome::Skipped),
            },
        }
    }

    pub async fn handle_message(
        &self,
        destination: Destination,
        asset_id: i64,
    ) -> Result<HandleOutcome> {
        match destination {
            Destination::Upload => self.handle_upload(asset_id).await,
            Destination::Delete => self.handle_delete(asset_id).await,
        }
    }
}

#[async_trait]
impl MessageHandler for AssetOrchestrator {
    async fn handle(self: Arc<Self>, delivery: &Delivery) -> Result<()> {
        self.handle_message(delivery.destination, delivery.asset_id)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{start, ScriptedGateway};
    use assetflow_core::models::{MediaCategory, NewMediaAsset};
    use assetflow_core::{ManualClock, MessagePublisher};
    use assetflow_db::InMemoryAssetStore;
    use assetflow_worker::InMemoryQueue;

    struct Harness {
        store: Arc<InMemoryAssetStore>,
        queue: Arc<InMemoryQueue>,
        clock: Arc<ManualClock>,
        gateway: Arc<ScriptedGateway>,
        orchestrator: AssetOrchestrator,
    }

    fn harness(gateway: Arc<ScriptedGateway>) -> Harness {
        let queue = Arc::new(InMemoryQueue::new(Duration::from_secs(60)));
        let store = Arc::new(InMemoryAssetStore::new(
            queue.clone() as Arc<dyn MessagePublisher>
        ));
        let clock = Arc::new(ManualClock::new(start()));
        let orchestrator = AssetOrchestrator::new(
            store.clone(),
            gateway.clone(),
            clock.clone(),
            Duration::from_secs(600),
        )
        .unwrap();
        Harness {
            store,
            queue,
            clock,
            gateway,
            orchestrator,
        }
    }

    fn new_image() -> NewMediaAsset {
        NewMediaAsset {
            media_type: MediaCategory::Image,
            origin_url: "https://cdn.example.com/cat.png".to_string(),
        }
    }

    fn uploaded_asset(id: i64) -> MediaAsset {
        MediaAsset {
            id,
            media_type: MediaCategory::Image,
            origin_url: "https://cdn.example.com/cat.png".to_string(),
            stored_locator: Some("1_stored.png".to_string()),
            status: AssetStatus::WaitingDeletion,
            upload_attempts: 1,
            delete_attempts: 0,
            created_at: start(),
            last_upload_attempt_at: Some(start()),
            last_delete_attempt_at: None,
            lease_expires_at: None,
        }
    }

    #[tokio::test]
    async fn successful_upload_records_locator_and_attempt() {
        let h = harness(ScriptedGateway::new(true, true));
        let asset = h.store.create(new_image(), start()).await.unwrap();

        let outcome = h.orchestrator.handle_upload(asset.id).await.unwrap();
        assert_eq!(outcome, HandleOutcome::Uploaded);

        let stored = h.store.get(asset.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AssetStatus::Uploaded);
        assert_eq!(stored.stored_locator.as_deref(), Some("1_stored.png"));
        assert_eq!(stored.upload_attempts, 1);
        assert_eq!(stored.last_upload_attempt_at, Some(start()));
        assert_eq!(stored.lease_expires_at, None);
    }

    #[tokio::test]
    async fn failed_upload_moves_to_upload_failed() {
        let h = harness(ScriptedGateway::new(false, true));
        let asset = h.store.create(new_image(), start()).await.unwrap();

        let outcome = h.orchestrator.handle_upload(asset.id).await.unwrap();
        assert_eq!(outcome, HandleOutcome::UploadFailed);

        let stored = h.store.get(asset.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AssetStatus::UploadFailed);
        assert_eq!(stored.stored_locator, None);
        assert_eq!(stored.upload_attempts, 1);
    }

    #[tokio::test]
    async fn status_mismatch_leaves_asset_untouched() {
        let h = harness(ScriptedGateway::new(true, true));
        let asset = h.store.create(new_image(), start()).await.unwrap();
        h.orchestrator.handle_upload(asset.id).await.unwrap();
        let before = h.store.get(asset.id).await.unwrap().unwrap();

        // Duplicate delivery of the same upload message.
        let outcome = h.orchestrator.handle_upload(asset.id).await.unwrap();
        assert_eq!(outcome, HandleOutcome::Skipped);
        assert_eq!(h.store.get(asset.id).await.unwrap().unwrap(), before);
        assert_eq!(h.gateway.upload_calls(), 1);

        // A delete message for an asset that is not waiting for deletion.
        let outcome = h.orchestrator.handle_delete(asset.id).await.unwrap();
        assert_eq!(outcome, HandleOutcome::Skipped);
        assert_eq!(h.store.get(asset.id).await.unwrap().unwrap(), before);
    }

    #[tokio::test]
    async fn unknown_asset_is_skipped() {
        let h = harness(ScriptedGateway::new(true, true));
        assert_eq!(
            h.orchestrator.handle_upload(404).await.unwrap(),
            HandleOutcome::Skipped
        );
        assert_eq!(
            h.orchestrator.handle_delete(404).await.unwrap(),
            HandleOutcome::Skipped
        );
        assert_eq!(h.gateway.upload_calls(), 0);
    }

    #[tokio::test]
    async fn leased_asset_is_skipped_until_lease_expires() {
        let h = harness(ScriptedGateway::new(true, true));
        let asset = h.store.create(new_image(), start()).await.unwrap();

        // Another consumer holds the lease.
        let now = start();
        h.store
            .claim(
                asset.id,
                AssetStatus::WaitingUpload,
                now,
                now + chrono::Duration::seconds(600),
            )
            .await
            .unwrap();

        assert_eq!(
            h.orchestrator.handle_upload(asset.id).await.unwrap(),
            HandleOutcome::Skipped
        );

        h.clock.advance(chrono::Duration::seconds(601));
        assert_eq!(
            h.orchestrator.handle_upload(asset.id).await.unwrap(),
            HandleOutcome::Uploaded
        );
    }

    #[tokio::test]
    async fn delete_removes_row_and_stored_object() {
        let h = harness(ScriptedGateway::new(true, true));
        h.store.insert(uploaded_asset(7)).await;

        let outcome = h.orchestrator.handle_delete(7).await.unwrap();
        assert_eq!(outcome, HandleOutcome::Deleted);
        assert!(h.store.get(7).await.unwrap().is_none());
        assert_eq!(*h.gateway.deletes.lock().unwrap(), vec!["1_stored.png"]);
    }

    #[tokio::test]
    async fn failed_delete_moves_to_deletion_failed() {
        let h = harness(ScriptedGateway::new(true, false));
        h.store.insert(uploaded_asset(7)).await;

        let outcome = h.orchestrator.handle_delete(7).await.unwrap();
        assert_eq!(outcome, HandleOutcome::DeletionFailed);

        let asset = h.store.get(7).await.unwrap().unwrap();
        assert_eq!(asset.status, AssetStatus::DeletionFailed);
        assert_eq!(asset.delete_attempts, 1);
        assert_eq!(asset.last_delete_attempt_at, Some(start()));
        assert_eq!(asset.stored_locator.as_deref(), Some("1_stored.png"));
    }

    #[tokio::test]
    async fn handles_queue_deliveries() {
        let h = harness(ScriptedGateway::new(true, true));
        let asset = h.store.create(new_image(), start()).await.unwrap();
        assert_eq!(h.queue.pending_ids(Destination::Upload).await, vec![asset.id]);

        let orchestrator = Arc::new(h.orchestrator);
        let acked = assetflow_worker::drain_queue(h.queue.as_ref(), orchestrator.clone())
            .await
            .unwrap();

        assert_eq!(acked, 1);
        assert!(h.queue.is_empty().await);
        assert_eq!(
            h.store.get(asset.id).await.unwrap().unwrap().status,
            AssetStatus::Uploaded
        );
    }
}
