//! Worker pool: wake-up via LISTEN/NOTIFY, an in-process notifier, or polling.
//!
//! Shutdown: [`QueueWorker::shutdown`] stops claiming new messages; it does not wait for
//! in-flight handlers. Unacknowledged deliveries reappear after the queue's visibility
//! timeout.
//!
//! Handlers are never cancelled from here. Long operations are bounded by the transport
//! timeouts of whatever they call.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use sqlx::PgPool;
use tokio::sync::{mpsc, Notify, Semaphore};
use tokio::time::sleep;

use assetflow_core::models::Delivery;
use assetflow_core::MessageQueue;
use assetflow_db::MESSAGE_NOTIFY_CHANNEL;

use crate::context::MessageHandler;

#[derive(Debug, Clone)]
pub struct QueueWorkerConfig {
    pub max_workers: usize,
    pub poll_interval_ms: u64,
}

impl Default for QueueWorkerConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            poll_interval_ms: 1000,
        }
    }
}

/// What wakes the pool besides the poll interval.
pub enum WakeSource {
    /// Poll only.
    Poll,
    /// LISTEN on the outbox notification channel.
    Postgres(PgPool),
    /// In-process notifier, e.g. [`crate::InMemoryQueue::notifier`].
    Notify(Arc<Notify>),
}

impl WakeSource {
    fn name(&self) -> &'static str {
        match self {
            WakeSource::Poll => "poll",
            WakeSource::Postgres(_) => "listen_notify",
            WakeSource::Notify(_) => "in_process",
        }
    }
}

pub struct QueueWorker {
    shutdown_tx: mpsc::Sender<()>,
}

impl QueueWorker {
    /// Spawn the worker pool.
    pub fn start(
        queue: Arc<dyn MessageQueue>,
        handler: Arc<dyn MessageHandler>,
        config: QueueWorkerConfig,
        wake: WakeSource,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        tokio::spawn(async move {
            Self::worker_pool(queue, handler, config, wake, shutdown_rx).await;
        });

        Self { shutdown_tx }
    }

    async fn worker_pool(
        queue: Arc<dyn MessageQueue>,
        handler: Arc<dyn MessageHandler>,
        config: QueueWorkerConfig,
        wake: WakeSource,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!(
            max_workers = config.max_workers,
            poll_interval_ms = config.poll_interval_ms,
            wake_source = wake.name(),
            "Queue worker pool started"
        );

        let semaphore = Arc::new(Semaphore::new(config.max_workers.max(1)));
        let poll_interval = Duration::from_millis(config.poll_interval_ms);

        let (notify_tx, mut notify_rx) = mpsc::channel::<()>(16);
        match wake {
            WakeSource::Poll => {}
            WakeSource::Postgres(pool) => spawn_pg_listener(pool, notify_tx.clone()),
            WakeSource::Notify(notify) => {
                let tx = notify_tx.clone();
                tokio::spawn(async move {
                    loop {
                        notify.notified().await;
                        if tx.send(()).await.is_err() {
                            break;
                        }
                    }
                });
            }
        }

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Queue worker pool shutting down");
                    break;
                }
                _ = notify_rx.recv() => {
                    Self::claim_and_dispatch(&queue, &handler, &semaphore, &notify_tx).await;
                }
                _ = sleep(poll_interval) => {
                    Self::claim_and_dispatch(&queue, &handler, &semaphore, &notify_tx).await;
                }
            }
        }

        tracing::info!("Queue worker pool stopped");
    }

    /// Claim messages until the queue is empty or every worker is busy.
    async fn claim_and_dispatch(
        queue: &Arc<dyn MessageQueue>,
        handler: &Arc<dyn MessageHandler>,
        semaphore: &Arc<Semaphore>,
        done_tx: &mpsc::Sender<()>,
    ) {
        loop {
            let permit = match semaphore.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::debug!("No workers available, skipping claim");
                    return;
                }
            };

            match queue.claim_next().await {
                Ok(Some(delivery)) => {
                    let queue = queue.clone();
                    let handler = handler.clone();
                    let done_tx = done_tx.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        process_delivery(queue.as_ref(), handler, &delivery).await;
                        // A slot is free again; look for more work right away.
                        let _ = done_tx.try_send(());
                    });
                }
                Ok(None) => {
                    tracing::trace!("No messages available in queue");
                    return;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to claim message from queue");
                    return;
                }
            }
        }
    }

    /// Signals the worker pool to stop claiming messages and exit its loop.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating queue worker shutdown");
        let _ = self.shutdown_tx.send(()).await;
    }
}

fn spawn_pg_listener(pool: PgPool, tx: mpsc::Sender<()>) {
    tokio::spawn(async move {
        loop {
            match sqlx::postgres::PgListener::connect_with(&pool).await {
                Ok(mut listener) => {
                    if let Err(e) = listener.listen(MESSAGE_NOTIFY_CHANNEL).await {
                        tracing::warn!(error = %e, "LISTEN failed, will retry");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        continue;
                    }
                    while listener.recv().await.is_ok() {
                        if tx.send(()).await.is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "PgListener connect failed, will retry");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    });
}

/// Run the handler for one delivery and acknowledge it on success.
#[tracing::instrument(
    skip(queue, handler, delivery),
    fields(
        receipt = delivery.receipt,
        asset_id = delivery.asset_id,
        destination = %delivery.destination,
        attempts = delivery.attempts
    )
)]
async fn process_delivery(
    queue: &dyn MessageQueue,
    handler: Arc<dyn MessageHandler>,
    delivery: &Delivery,
) -> bool {
    let started = Instant::now();

    match handler.handle(delivery).await {
        Ok(()) => {
            if let Err(e) = queue.ack(delivery.receipt).await {
                tracing::error!(error = %e, "Failed to acknowledge message");
                return false;
            }
            tracing::debug!(
                duration_ms = started.elapsed().as_millis() as u64,
                "Message processed"
            );
            true
        }
        Err(e) => {
            tracing::error!(
                error = %e,
                duration_ms = started.elapsed().as_millis() as u64,
                "Message handling failed, leaving it for redelivery"
            );
            false
        }
    }
}

/// Process every currently visible message one at a time. Returns how many deliveries
/// were acknowledged.
///
/// Used for one-shot processing (tests, maintenance). Deliveries whose handler fails
/// stay invisible until their visibility timeout runs out, so the loop terminates.
pub async fn drain_queue(
    queue: &dyn MessageQueue,
    handler: Arc<dyn MessageHandler>,
) -> Result<usize> {
    let mut acknowledged = 0;
    while let Some(delivery) = queue.claim_next().await? {
        if process_delivery(queue, handler.clone(), &delivery).await {
            acknowledged += 1;
        }
    }
    Ok(acknowledged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryQueue;
    use assetflow_core::models::Destination;
    use assetflow_core::MessagePublisher;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        handled: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl MessageHandler for CountingHandler {
        async fn handle(self: Arc<Self>, _delivery: &Delivery) -> Result<()> {
            self.handled.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("store unavailable");
            }
            Ok(())
        }
    }

    fn handler(fail: bool) -> Arc<CountingHandler> {
        Arc::new(CountingHandler {
            handled: AtomicUsize::new(0),
            fail,
        })
    }

    #[tokio::test]
    async fn drain_acknowledges_successful_deliveries() {
        let queue = InMemoryQueue::new(Duration::from_secs(60));
        queue.publish(Destination::Upload, 1).await.unwrap();
        queue.publish(Destination::Delete, 2).await.unwrap();

        let handler = handler(false);
        let acked = drain_queue(&queue, handler.clone())
            .await
            .unwrap();

        assert_eq!(acked, 2);
        assert_eq!(handler.handled.load(Ordering::SeqCst), 2);
        assert_eq!(queue.len().await, 0);
    }

    #[tokio::test]
    async fn failed_delivery_is_not_acknowledged() {
        let queue = InMemoryQueue::new(Duration::from_secs(60));
        queue.publish(Destination::Upload, 1).await.unwrap();

        let acked = drain_queue(&queue, handler(true))
            .await
            .unwrap();

        assert_eq!(acked, 0);
        // Still queued, waiting for its visibility timeout.
        assert_eq!(queue.len().await, 1);
        assert!(queue.claim_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn worker_pool_processes_published_messages() {
        let queue = Arc::new(InMemoryQueue::new(Duration::from_secs(60)));
        let handler = handler(false);

        let worker = QueueWorker::start(
            queue.clone(),
            handler.clone(),
            QueueWorkerConfig {
                max_workers: 2,
                poll_interval_ms: 50,
            },
            WakeSource::Notify(queue.notifier()),
        );

        for id in 1..=3 {
            queue.publish(Destination::Upload, id).await.unwrap();
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while queue.len().await > 0 && Instant::now() < deadline {
            sleep(Duration::from_millis(20)).await;
        }
        worker.shutdown().await;

        assert_eq!(queue.len().await, 0);
        assert_eq!(handler.handled.load(Ordering::SeqCst), 3);
    }
}
