//! Producer side of the asset lifecycle, used by whoever authors content.

use std::sync::Arc;

use assetflow_core::models::{ContentBlock, MediaAsset, MediaReference, NewMediaAsset};
use assetflow_core::{AppError, Clock};
use assetflow_db::{AssetStore, ReleaseOutcome};
use assetflow_processing::OriginPolicy;

pub struct AssetLifecycle {
    store: Arc<dyn AssetStore>,
    clock: Arc<dyn Clock>,
    policy: OriginPolicy,
}

impl AssetLifecycle {
    pub fn new(store: Arc<dyn AssetStore>, clock: Arc<dyn Clock>, policy: OriginPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    pub fn store(&self) -> &Arc<dyn AssetStore> {
        &self.store
    }

    /// Create an asset for new media and queue its upload once the row is committed.
    ///
    /// The origin URL is checked syntactically here so malformed references fail
    /// synchronously; resolution happens when the upload runs.
    #[tracing::instrument(skip(self, new_asset), fields(media_type = %new_asset.media_type))]
    pub async fn register(&self, new_asset: NewMediaAsset) -> Result<MediaAsset, AppError> {
        self.policy.parse(&new_asset.origin_url)?;
        let asset = self.store.create(new_asset, self.clock.now()).await?;
        Ok(asset)
    }

    /// Drop a media reference. Never-uploaded assets are deleted outright; uploaded
    /// ones are queued for deletion.
    #[tracing::instrument(skip(self))]
    pub async fn release(&self, asset_id: i64) -> Result<ReleaseOutcome, AppError> {
        let outcome = self.store.release(asset_id).await?;
        match &outcome {
            ReleaseOutcome::Removed => {
                tracing::info!(asset_id = asset_id, "Never-uploaded asset removed")
            }
            ReleaseOutcome::DeletionEnqueued(_) => {
                tracing::info!(asset_id = asset_id, "Asset deletion queued")
            }
            ReleaseOutcome::AlreadyDeleting(status) => {
                tracing::debug!(asset_id = asset_id, status = %status, "Asset deletion already pending")
            }
            ReleaseOutcome::NotFound => {
                tracing::debug!(asset_id = asset_id, "Released asset does not exist")
            }
        }
        Ok(outcome)
    }

    /// Swap the media behind a reference: release the old asset, register the new one.
    pub async fn replace(
        &self,
        asset_id: i64,
        replacement: NewMediaAsset,
    ) -> Result<(ReleaseOutcome, MediaAsset), AppError> {
        // Reject a bad replacement before touching the current asset.
        self.policy.parse(&replacement.origin_url)?;
        let released = self.release(asset_id).await?;
        let registered = self.register(replacement).await?;
        Ok((released, registered))
    }

    /// Reconcile one content block edit with the asset lifecycle.
    ///
    /// `previous` is the stored block (if any), `next` the incoming one (`None` when the
    /// block is removed). Returns the block to persist, with its media reference bound
    /// to the current asset.
    pub async fn sync_block(
        &self,
        previous: Option<&ContentBlock>,
        next: Option<ContentBlock>,
    ) -> Result<Option<ContentBlock>, AppError> {
        let old = previous.and_then(ContentBlock::media);

        match (old, next) {
            (None, None) => Ok(None),
            (None, Some(ContentBlock::Text { text })) => Ok(Some(ContentBlock::Text { text })),
            (None, Some(ContentBlock::Media(reference))) => {
                let bound = self.bind(reference).await?;
                Ok(Some(ContentBlock::Media(bound)))
            }
            (Some(old), None) => {
                self.release_reference(old).await?;
                Ok(None)
            }
            (Some(old), Some(ContentBlock::Text { text })) => {
                self.release_reference(old).await?;
                Ok(Some(ContentBlock::Text { text }))
            }
            (Some(old), Some(ContentBlock::Media(mut reference))) if old.same_media(&reference) => {
                reference.asset_id = old.asset_id;
                Ok(Some(ContentBlock::Media(reference)))
            }
            (Some(old), Some(ContentBlock::Media(reference))) => {
                self.policy.parse(&reference.origin_url)?;
                self.release_reference(old).await?;
                let bound = self.bind(reference).await?;
                Ok(Some(ContentBlock::Media(bound)))
            }
        }
    }

    async fn bind(&self, mut reference: MediaReference) -> Result<MediaReference, AppError> {
        let asset = self
            .register(NewMediaAsset {
                media_type: reference.media_type,
                origin_url: reference.origin_url.clone(),
            })
            .await?;
        reference.asset_id = Some(asset.id);
        Ok(reference)
    }

    async fn release_reference(&self, reference: &MediaReference) -> Result<(), AppError> {
        match reference.asset_id {
            Some(asset_id) => {
                self.release(asset_id).await?;
            }
            None => {
                tracing::debug!(origin_url = %reference.origin_url, "Unbound media reference, nothing to release");
            }
        }
        Ok(())
    }
}
