//! In-memory [`AssetStore`] for development and tests.
//!
//! A single mutex stands in for the database transaction. Messages go out through the
//! configured publisher after the lock is released, i.e. after the change is visible.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use assetflow_core::models::{AssetStatus, Destination, MediaAsset, NewMediaAsset};
use assetflow_core::MessagePublisher;

use super::store::{ensure_transition, AssetStore, ClaimOutcome, ReleaseOutcome};

#[derive(Default)]
struct Inner {
    assets: HashMap<i64, MediaAsset>,
    next_id: i64,
}

pub struct InMemoryAssetStore {
    inner: Mutex<Inner>,
    publisher: Arc<dyn MessagePublisher>,
}

impl InMemoryAssetStore {
    pub fn new(publisher: Arc<dyn MessagePublisher>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            publisher,
        }
    }

    /// Insert a record as-is. Lets tests start from any lifecycle state.
    pub async fn insert(&self, asset: MediaAsset) {
        let mut inner = self.inner.lock().await;
        inner.next_id = inner.next_id.max(asset.id);
        inner.assets.insert(asset.id, asset);
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.assets.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn publish_committed(&self, destination: Destination, asset_id: i64) {
        if let Err(e) = self.publisher.publish(destination, asset_id).await {
            tracing::error!(
                error = %e,
                asset_id = asset_id,
                destination = %destination,
                "Failed to publish message after state change"
            );
        }
    }

    /// Apply `f` to the asset if it is currently in `expected` status.
    async fn update_if<F>(
        &self,
        id: i64,
        expected: AssetStatus,
        next: AssetStatus,
        f: F,
    ) -> Result<Option<MediaAsset>>
    where
        F: FnOnce(&mut MediaAsset),
    {
        ensure_transition(expected, next)?;
        let mut inner = self.inner.lock().await;
        let Some(asset) = inner.assets.get_mut(&id) else {
            return Ok(None);
        };
        if asset.status != expected {
            return Ok(None);
        }
        asset.status = next;
        f(asset);
        Ok(Some(asset.clone()))
    }
}

#[async_trait]
impl AssetStore for InMemoryAssetStore {
    async fn get(&self, id: i64) -> Result<Option<MediaAsset>> {
        Ok(self.inner.lock().await.assets.get(&id).cloned())
    }

    async fn list_by_status(&self, status: AssetStatus, limit: i64) -> Result<Vec<MediaAsset>> {
        let inner = self.inner.lock().await;
        let mut assets: Vec<MediaAsset> = inner
            .assets
            .values()
            .filter(|a| a.status == status)
            .cloned()
            .collect();
        assets.sort_by_key(|a| a.id);
        assets.truncate(limit.max(0) as usize);
        Ok(assets)
    }

    async fn create(&self, new_asset: NewMediaAsset, now: DateTime<Utc>) -> Result<MediaAsset> {
        let asset = {
            let mut inner = self.inner.lock().await;
            inner.next_id += 1;
            let asset = MediaAsset {
                id: inner.next_id,
                media_type: new_asset.media_type,
                origin_url: new_asset.origin_url,
                stored_locator: None,
                status: AssetStatus::WaitingUpload,
                upload_attempts: 0,
                delete_attempts: 0,
                created_at: now,
                last_upload_attempt_at: None,
                last_delete_attempt_at: None,
                lease_expires_at: None,
            };
            inner.assets.insert(asset.id, asset.clone());
            asset
        };

        self.publish_committed(Destination::Upload, asset.id).await;
        tracing::info!(asset_id = asset.id, "Media asset created, upload queued");
        Ok(asset)
    }

    async fn release(&self, id: i64) -> Result<ReleaseOutcome> {
        let outcome = {
            let mut inner = self.inner.lock().await;
            let Some(asset) = inner.assets.get_mut(&id) else {
                return Ok(ReleaseOutcome::NotFound);
            };

            if asset.status.is_never_uploaded() {
                inner.assets.remove(&id);
                return Ok(ReleaseOutcome::Removed);
            }

            if asset.status != AssetStatus::Uploaded {
                return Ok(ReleaseOutcome::AlreadyDeleting(asset.status));
            }

            ensure_transition(asset.status, AssetStatus::WaitingDeletion)?;
            asset.status = AssetStatus::WaitingDeletion;
            ReleaseOutcome::DeletionEnqueued(asset.clone())
        };

        self.publish_committed(Destination::Delete, id).await;
        Ok(outcome)
    }

    async fn claim(
        &self,
        id: i64,
        expected: AssetStatus,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<ClaimOutcome> {
        let mut inner = self.inner.lock().await;
        let Some(asset) = inner.assets.get_mut(&id) else {
            return Ok(ClaimOutcome::NotFound);
        };
        if asset.status != expected {
            return Ok(ClaimOutcome::StatusMismatch(asset.status));
        }
        if asset.is_leased(now) {
            return Ok(ClaimOutcome::Leased);
        }
        asset.lease_expires_at = Some(lease_until);
        Ok(ClaimOutcome::Claimed(asset.clone()))
    }

    async fn complete_upload(
        &self,
        id: i64,
        stored_locator: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<MediaAsset>> {
        self.update_if(id, AssetStatus::WaitingUpload, AssetStatus::Uploaded, |asset| {
            asset.stored_locator = Some(stored_locator.to_string());
            asset.upload_attempts += 1;
            asset.last_upload_attempt_at = Some(now);
            asset.lease_expires_at = None;
        })
        .await
    }

    async fn fail_upload(&self, id: i64, now: DateTime<Utc>) -> Result<Option<MediaAsset>> {
        self.update_if(id, AssetStatus::WaitingUpload, AssetStatus::UploadFailed, |asset| {
            asset.upload_attempts += 1;
            asset.last_upload_attempt_at = Some(now);
            asset.lease_expires_at = None;
        })
        .await
    }

    async fn complete_deletion(&self, id: i64) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let removable = matches!(
            inner.assets.get(&id),
            Some(asset) if asset.status == AssetStatus::WaitingDeletion
        );
        if removable {
            inner.assets.remove(&id);
        }
        Ok(removable)
    }

    async fn fail_deletion(&self, id: i64, now: DateTime<Utc>) -> Result<Option<MediaAsset>> {
        self.update_if(id, AssetStatus::WaitingDeletion, AssetStatus::DeletionFailed, |asset| {
            asset.delete_attempts += 1;
            asset.last_delete_attempt_at = Some(now);
            asset.lease_expires_at = None;
        })
        .await
    }

    async fn find_retryable(
        &self,
        failed_status: AssetStatus,
        max_attempts: i32,
        limit: i64,
    ) -> Result<Vec<MediaAsset>> {
        let attempts: fn(&MediaAsset) -> i32 = match failed_status {
            AssetStatus::UploadFailed => |a| a.upload_attempts,
            AssetStatus::DeletionFailed => |a| a.delete_attempts,
            other => return Err(anyhow::anyhow!("{} is not a retryable status", other)),
        };

        let inner = self.inner.lock().await;
        let mut assets: Vec<MediaAsset> = inner
            .assets
            .values()
            .filter(|a| a.status == failed_status && attempts(a) < max_attempts)
            .cloned()
            .collect();
        assets.sort_by_key(|a| a.id);
        assets.truncate(limit.max(0) as usize);
        Ok(assets)
    }

    async fn requeue(&self, id: i64, failed_status: AssetStatus) -> Result<bool> {
        let (waiting, destination) = failed_status
            .retry_target()
            .ok_or_else(|| anyhow::anyhow!("{} is not a retryable status", failed_status))?;

        let moved = self
            .update_if(id, failed_status, waiting, |_| {})
            .await?
            .is_some();

        if moved {
            self.publish_committed(destination, id).await;
        }
        Ok(moved)
    }

    async fn find_expired_leases(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<MediaAsset>> {
        let inner = self.inner.lock().await;
        let mut assets: Vec<MediaAsset> = inner
            .assets
            .values()
            .filter(|a| {
                a.status.pending_destination().is_some()
                    && a.lease_expires_at.is_some_and(|expires| expires <= now)
            })
            .cloned()
            .collect();
        assets.sort_by_key(|a| a.id);
        assets.truncate(limit.max(0) as usize);
        Ok(assets)
    }

    async fn republish_expired(
        &self,
        id: i64,
        status: AssetStatus,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let destination = status
            .pending_destination()
            .ok_or_else(|| anyhow::anyhow!("{} has no pending destination", status))?;

        let cleared = {
            let mut inner = self.inner.lock().await;
            match inner.assets.get_mut(&id) {
                Some(asset)
                    if asset.status == status
                        && asset.lease_expires_at.is_some_and(|expires| expires <= now) =>
                {
                    asset.lease_expires_at = None;
                    true
                }
                _ => false,
            }
        };

        if cleared {
            self.publish_committed(destination, id).await;
        }
        Ok(cleared)
    }

    async fn count_exhausted(
        &self,
        max_upload_attempts: i32,
        max_delete_attempts: i32,
    ) -> Result<i64> {
        let inner = self.inner.lock().await;
        let count = inner
            .assets
            .values()
            .filter(|a| match a.status {
                AssetStatus::UploadFailed => a.upload_attempts >= max_upload_attempts,
                AssetStatus::DeletionFailed => a.delete_attempts >= max_delete_attempts,
                _ => false,
            })
            .count();
        Ok(count as i64)
    }
}
