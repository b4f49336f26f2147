//! Outbox-backed message queue on PostgreSQL.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgConnection, PgPool, Postgres};

use assetflow_core::models::{Delivery, QueueNames};
use assetflow_core::MessageQueue;

/// Channel used with LISTEN/NOTIFY when a message is written to the outbox.
pub const MESSAGE_NOTIFY_CHANNEL: &str = "assetflow_message";

/// Append a message to the outbox on the caller's connection, so it commits or rolls
/// back together with the surrounding transaction.
pub(crate) async fn enqueue(conn: &mut PgConnection, queue_name: &str, asset_id: i64) -> Result<()> {
    sqlx::query("INSERT INTO asset_messages (destination, asset_id) VALUES ($1, $2)")
        .bind(queue_name)
        .bind(asset_id)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("Failed to enqueue asset {} on {}", asset_id, queue_name))?;

    // Delivered on commit only.
    sqlx::query("SELECT pg_notify($1, $2)")
        .bind(MESSAGE_NOTIFY_CHANNEL)
        .bind(queue_name)
        .execute(&mut *conn)
        .await
        .context("Failed to send pg_notify for queued message")?;

    tracing::debug!(asset_id = asset_id, queue = %queue_name, "Message queued");
    Ok(())
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: i64,
    destination: String,
    asset_id: i64,
    attempts: i32,
}

#[derive(Clone)]
pub struct PgMessageQueue {
    pool: PgPool,
    queues: QueueNames,
    visibility_timeout: Duration,
}

impl PgMessageQueue {
    pub fn new(pool: PgPool, queues: QueueNames, visibility_timeout: Duration) -> Self {
        Self {
            pool,
            queues,
            visibility_timeout,
        }
    }

    /// Number of messages still in the outbox, delivered or not.
    pub async fn depth(&self) -> Result<i64> {
        sqlx::query_scalar::<Postgres, i64>("SELECT COUNT(*) FROM asset_messages")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count queued messages")
    }
}

#[async_trait]
impl MessageQueue for PgMessageQueue {
    #[tracing::instrument(skip(self))]
    async fn claim_next(&self) -> Result<Option<Delivery>> {
        let now = Utc::now();
        let invisible_until = now
            + chrono::Duration::from_std(self.visibility_timeout)
                .context("Visibility timeout out of range")?;
        let destinations = vec![self.queues.upload.clone(), self.queues.delete.clone()];

        let row: Option<MessageRow> = sqlx::query_as::<Postgres, MessageRow>(
            r#"
            UPDATE asset_messages
            SET available_at = $2,
                attempts = attempts + 1
            WHERE id = (
                SELECT id
                FROM asset_messages
                WHERE available_at <= $1
                    AND destination = ANY($3)
                ORDER BY id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, destination, asset_id, attempts
            "#,
        )
        .bind(now)
        .bind(invisible_until)
        .bind(&destinations)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to claim next message")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let destination = self.queues.destination_of(&row.destination).ok_or_else(|| {
            anyhow::anyhow!("Message {} has unknown destination {}", row.id, row.destination)
        })?;

        tracing::debug!(
            receipt = row.id,
            asset_id = row.asset_id,
            destination = %destination,
            attempts = row.attempts,
            "Message claimed"
        );

        Ok(Some(Delivery {
            receipt: row.id,
            destination,
            asset_id: row.asset_id,
            attempts: row.attempts,
        }))
    }

    #[tracing::instrument(skip(self))]
    async fn ack(&self, receipt: i64) -> Result<()> {
        sqlx::query("DELETE FROM asset_messages WHERE id = $1")
            .bind(receipt)
            .execute(&self.pool)
            .await
            .context("Failed to acknowledge message")?;
        Ok(())
    }
}
