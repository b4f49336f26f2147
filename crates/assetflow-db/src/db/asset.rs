use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};

use assetflow_core::models::{AssetStatus, Destination, MediaAsset, NewMediaAsset, QueueNames};

use super::queue::enqueue;
use super::store::{ensure_transition, AssetStore, ClaimOutcome, ReleaseOutcome};

const ASSET_COLUMNS: &str = "id, media_type, origin_url, stored_locator, status, \
    upload_attempts, delete_attempts, created_at, last_upload_attempt_at, \
    last_delete_attempt_at, lease_expires_at";

/// PostgreSQL-backed [`AssetStore`].
#[derive(Clone)]
pub struct AssetRepository {
    pool: PgPool,
    queues: QueueNames,
}

impl AssetRepository {
    pub fn new(pool: PgPool, queues: QueueNames) -> Self {
        Self { pool, queues }
    }

    fn attempts_column(failed_status: AssetStatus) -> Result<&'static str> {
        match failed_status {
            AssetStatus::UploadFailed => Ok("upload_attempts"),
            AssetStatus::DeletionFailed => Ok("delete_attempts"),
            other => Err(anyhow::anyhow!("{} is not a retryable status", other)),
        }
    }
}

#[async_trait]
impl AssetStore for AssetRepository {
    #[tracing::instrument(skip(self))]
    async fn get(&self, id: i64) -> Result<Option<MediaAsset>> {
        sqlx::query_as::<Postgres, MediaAsset>(&format!(
            "SELECT {} FROM media_assets WHERE id = $1",
            ASSET_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch media asset")
    }

    #[tracing::instrument(skip(self))]
    async fn list_by_status(&self, status: AssetStatus, limit: i64) -> Result<Vec<MediaAsset>> {
        sqlx::query_as::<Postgres, MediaAsset>(&format!(
            "SELECT {} FROM media_assets WHERE status = $1 ORDER BY id LIMIT $2",
            ASSET_COLUMNS
        ))
        .bind(status)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list media assets")
    }

    #[tracing::instrument(skip(self, new_asset), fields(media_type = %new_asset.media_type))]
    async fn create(&self, new_asset: NewMediaAsset, now: DateTime<Utc>) -> Result<MediaAsset> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction for asset creation")?;

        let asset = sqlx::query_as::<Postgres, MediaAsset>(&format!(
            r#"
            INSERT INTO media_assets (media_type, origin_url, status, created_at)
            VALUES ($1, $2, 'WAITING_UPLOAD', $3)
            RETURNING {}
            "#,
            ASSET_COLUMNS
        ))
        .bind(new_asset.media_type)
        .bind(&new_asset.origin_url)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to insert media asset")?;

        enqueue(&mut tx, self.queues.name_of(Destination::Upload), asset.id).await?;

        tx.commit()
            .await
            .context("Failed to commit asset creation")?;

        tracing::info!(
            asset_id = asset.id,
            origin_url = %asset.origin_url,
            "Media asset created, upload queued"
        );

        Ok(asset)
    }

    #[tracing::instrument(skip(self))]
    async fn release(&self, id: i64) -> Result<ReleaseOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction for asset release")?;

        let current: Option<MediaAsset> = sqlx::query_as::<Postgres, MediaAsset>(&format!(
            "SELECT {} FROM media_assets WHERE id = $1 FOR UPDATE",
            ASSET_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to lock media asset")?;

        let Some(current) = current else {
            tx.rollback().await.ok();
            return Ok(ReleaseOutcome::NotFound);
        };

        if current.status.is_never_uploaded() {
            sqlx::query("DELETE FROM media_assets WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .context("Failed to delete never-uploaded asset")?;
            tx.commit().await.context("Failed to commit asset removal")?;

            tracing::info!(asset_id = id, status = %current.status, "Never-uploaded asset removed");
            return Ok(ReleaseOutcome::Removed);
        }

        if current.status != AssetStatus::Uploaded {
            tx.rollback().await.ok();
            return Ok(ReleaseOutcome::AlreadyDeleting(current.status));
        }

        let asset = sqlx::query_as::<Postgres, MediaAsset>(&format!(
            r#"
            UPDATE media_assets
            SET status = 'WAITING_DELETION'
            WHERE id = $1
            RETURNING {}
            "#,
            ASSET_COLUMNS
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to mark asset for deletion")?;

        enqueue(&mut tx, self.queues.name_of(Destination::Delete), id).await?;

        tx.commit()
            .await
            .context("Failed to commit asset release")?;

        tracing::info!(asset_id = id, "Asset deletion queued");
        Ok(ReleaseOutcome::DeletionEnqueued(asset))
    }

    #[tracing::instrument(skip(self))]
    async fn claim(
        &self,
        id: i64,
        expected: AssetStatus,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<ClaimOutcome> {
        let claimed: Option<MediaAsset> = sqlx::query_as::<Postgres, MediaAsset>(&format!(
            r#"
            UPDATE media_assets
            SET lease_expires_at = $3
            WHERE id = $1
                AND status = $2
                AND (lease_expires_at IS NULL OR lease_expires_at <= $4)
            RETURNING {}
            "#,
            ASSET_COLUMNS
        ))
        .bind(id)
        .bind(expected)
        .bind(lease_until)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to claim media asset")?;

        if let Some(asset) = claimed {
            return Ok(ClaimOutcome::Claimed(asset));
        }

        // Work out why the conditional update missed.
        Ok(match self.get(id).await? {
            None => ClaimOutcome::NotFound,
            Some(asset) if asset.status != expected => ClaimOutcome::StatusMismatch(asset.status),
            Some(_) => ClaimOutcome::Leased,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn complete_upload(
        &self,
        id: i64,
        stored_locator: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<MediaAsset>> {
        sqlx::query_as::<Postgres, MediaAsset>(&format!(
            r#"
            UPDATE media_assets
            SET status = 'UPLOADED',
                stored_locator = $2,
                upload_attempts = upload_attempts + 1,
                last_upload_attempt_at = $3,
                lease_expires_at = NULL
            WHERE id = $1 AND status = 'WAITING_UPLOAD'
            RETURNING {}
            "#,
            ASSET_COLUMNS
        ))
        .bind(id)
        .bind(stored_locator)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to record successful upload")
    }

    #[tracing::instrument(skip(self))]
    async fn fail_upload(&self, id: i64, now: DateTime<Utc>) -> Result<Option<MediaAsset>> {
        sqlx::query_as::<Postgres, MediaAsset>(&format!(
            r#"
            UPDATE media_assets
            SET status = 'UPLOAD_FAILED',
                upload_attempts = upload_attempts + 1,
                last_upload_attempt_at = $2,
                lease_expires_at = NULL
            WHERE id = $1 AND status = 'WAITING_UPLOAD'
            RETURNING {}
            "#,
            ASSET_COLUMNS
        ))
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to record failed upload")
    }

    #[tracing::instrument(skip(self))]
    async fn complete_deletion(&self, id: i64) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM media_assets WHERE id = $1 AND status = 'WAITING_DELETION'")
                .bind(id)
                .execute(&self.pool)
                .await
                .context("Failed to remove deleted asset")?;
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self))]
    async fn fail_deletion(&self, id: i64, now: DateTime<Utc>) -> Result<Option<MediaAsset>> {
        sqlx::query_as::<Postgres, MediaAsset>(&format!(
            r#"
            UPDATE media_assets
            SET status = 'DELETION_FAILED',
                delete_attempts = delete_attempts + 1,
                last_delete_attempt_at = $2,
                lease_expires_at = NULL
            WHERE id = $1 AND status = 'WAITING_DELETION'
            RETURNING {}
            "#,
            ASSET_COLUMNS
        ))
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to record failed deletion")
    }

    #[tracing::instrument(skip(self))]
    async fn find_retryable(
        &self,
        failed_status: AssetStatus,
        max_attempts: i32,
        limit: i64,
    ) -> Result<Vec<MediaAsset>> {
        let column = Self::attempts_column(failed_status)?;
        sqlx::query_as::<Postgres, MediaAsset>(&format!(
            "SELECT {} FROM media_assets WHERE status = $1 AND {} < $2 ORDER BY id LIMIT $3",
            ASSET_COLUMNS, column
        ))
        .bind(failed_status)
        .bind(max_attempts)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to find retryable assets")
    }

    #[tracing::instrument(skip(self))]
    async fn requeue(&self, id: i64, failed_status: AssetStatus) -> Result<bool> {
        let (waiting, destination) = failed_status
            .retry_target()
            .ok_or_else(|| anyhow::anyhow!("{} is not a retryable status", failed_status))?;
        ensure_transition(failed_status, waiting)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction for requeue")?;

        let result = sqlx::query("UPDATE media_assets SET status = $3 WHERE id = $1 AND status = $2")
            .bind(id)
            .bind(failed_status)
            .bind(waiting)
            .execute(&mut *tx)
            .await
            .context("Failed to move asset back to waiting")?;

        if result.rows_affected() == 0 {
            tx.rollback().await.ok();
            return Ok(false);
        }

        enqueue(&mut tx, self.queues.name_of(destination), id).await?;
        tx.commit().await.context("Failed to commit requeue")?;
        Ok(true)
    }

    #[tracing::instrument(skip(self))]
    async fn find_expired_leases(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<MediaAsset>> {
        sqlx::query_as::<Postgres, MediaAsset>(&format!(
            r#"
            SELECT {}
            FROM media_assets
            WHERE status IN ('WAITING_UPLOAD', 'WAITING_DELETION')
                AND lease_expires_at <= $1
            ORDER BY id
            LIMIT $2
            "#,
            ASSET_COLUMNS
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to find expired leases")
    }

    #[tracing::instrument(skip(self))]
    async fn republish_expired(
        &self,
        id: i64,
        status: AssetStatus,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let destination = status
            .pending_destination()
            .ok_or_else(|| anyhow::anyhow!("{} has no pending destination", status))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction for lease republish")?;

        let result = sqlx::query(
            r#"
            UPDATE media_assets
            SET lease_expires_at = NULL
            WHERE id = $1 AND status = $2 AND lease_expires_at <= $3
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to clear expired lease")?;

        if result.rows_affected() == 0 {
            tx.rollback().await.ok();
            return Ok(false);
        }

        enqueue(&mut tx, self.queues.name_of(destination), id).await?;
        tx.commit()
            .await
            .context("Failed to commit lease republish")?;
        Ok(true)
    }

    #[tracing::instrument(skip(self))]
    async fn count_exhausted(
        &self,
        max_upload_attempts: i32,
        max_delete_attempts: i32,
    ) -> Result<i64> {
        sqlx::query_scalar::<Postgres, i64>(
            r#"
            SELECT COUNT(*)
            FROM media_assets
            WHERE (status = 'UPLOAD_FAILED' AND upload_attempts >= $1)
                OR (status = 'DELETION_FAILED' AND delete_attempts >= $2)
            "#,
        )
        .bind(max_upload_attempts)
        .bind(max_delete_attempts)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count exhausted assets")
    }
}
