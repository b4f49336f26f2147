use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use assetflow_core::models::{AssetStatus, MediaAsset, NewMediaAsset};

/// Result of trying to take ownership of an asset for one processing attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// Status matched and no other consumer held a lease. The returned record carries
    /// the new lease.
    Claimed(MediaAsset),
    NotFound,
    /// The asset is in a different status than the message expects.
    StatusMismatch(AssetStatus),
    /// Another consumer is working on the asset right now.
    Leased,
}

/// Result of the producer dropping a media reference.
#[derive(Debug, Clone, PartialEq)]
pub enum ReleaseOutcome {
    /// The asset was never uploaded and its row was deleted. Nothing was published.
    Removed,
    /// The asset moved to `WAITING_DELETION` and a delete message was queued.
    DeletionEnqueued(MediaAsset),
    /// Deletion is already pending or failed and awaiting a retry.
    AlreadyDeleting(AssetStatus),
    NotFound,
}

/// Refuse a status write that is not an edge of the lifecycle graph.
pub(crate) fn ensure_transition(from: AssetStatus, to: AssetStatus) -> Result<()> {
    anyhow::ensure!(
        from.can_transition_to(to),
        "Illegal asset transition {} -> {}",
        from,
        to
    );
    Ok(())
}

/// Persistence contract of the asset lifecycle.
///
/// Every mutating method is a compare-and-set on the expected prior status, so two
/// consumers racing on the same asset can never both apply a transition. Methods that
/// return `Option`/`bool` report `None`/`false` when the precondition no longer held.
/// Any message a transition implies is only visible to consumers once the transition
/// is durable.
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn get(&self, id: i64) -> Result<Option<MediaAsset>>;

    async fn list_by_status(&self, status: AssetStatus, limit: i64) -> Result<Vec<MediaAsset>>;

    /// Insert an asset in `WAITING_UPLOAD` and queue its upload.
    async fn create(&self, new_asset: NewMediaAsset, now: DateTime<Utc>) -> Result<MediaAsset>;

    /// Drop the asset if it never reached storage, otherwise move it to
    /// `WAITING_DELETION` and queue its deletion.
    async fn release(&self, id: i64) -> Result<ReleaseOutcome>;

    /// Take a processing lease on an asset that is in `expected` status.
    async fn claim(
        &self,
        id: i64,
        expected: AssetStatus,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<ClaimOutcome>;

    /// `WAITING_UPLOAD -> UPLOADED`, recording the locator and one upload attempt.
    async fn complete_upload(
        &self,
        id: i64,
        stored_locator: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<MediaAsset>>;

    /// `WAITING_UPLOAD -> UPLOAD_FAILED`, recording one upload attempt.
    async fn fail_upload(&self, id: i64, now: DateTime<Utc>) -> Result<Option<MediaAsset>>;

    /// Remove an asset in `WAITING_DELETION`.
    async fn complete_deletion(&self, id: i64) -> Result<bool>;

    /// `WAITING_DELETION -> DELETION_FAILED`, recording one delete attempt.
    async fn fail_deletion(&self, id: i64, now: DateTime<Utc>) -> Result<Option<MediaAsset>>;

    /// Failed assets (`UPLOAD_FAILED` or `DELETION_FAILED`) whose matching attempt
    /// counter is below `max_attempts`.
    async fn find_retryable(
        &self,
        failed_status: AssetStatus,
        max_attempts: i32,
        limit: i64,
    ) -> Result<Vec<MediaAsset>>;

    /// Move a failed asset back to its waiting status and queue it again.
    async fn requeue(&self, id: i64, failed_status: AssetStatus) -> Result<bool>;

    /// Waiting assets whose processing lease ran out.
    async fn find_expired_leases(&self, now: DateTime<Utc>, limit: i64)
        -> Result<Vec<MediaAsset>>;

    /// Clear an expired lease and queue the asset again. Attempt counters are untouched.
    async fn republish_expired(
        &self,
        id: i64,
        status: AssetStatus,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Number of failed assets at or above their attempt cap.
    async fn count_exhausted(&self, max_upload_attempts: i32, max_delete_attempts: i32)
        -> Result<i64>;
}
