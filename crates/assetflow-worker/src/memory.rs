//! In-process message broker.
//!
//! Same delivery contract as the PostgreSQL outbox: claimed messages are hidden for the
//! visibility timeout and come back unless acknowledged.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use assetflow_core::models::{Delivery, Destination};
use assetflow_core::{MessagePublisher, MessageQueue};

struct Pending {
    receipt: i64,
    destination: Destination,
    asset_id: i64,
    attempts: i32,
    visible_at: Instant,
}

#[derive(Default)]
struct State {
    messages: VecDeque<Pending>,
    next_receipt: i64,
}

pub struct InMemoryQueue {
    state: Mutex<State>,
    visibility_timeout: Duration,
    notify: Arc<Notify>,
}

impl InMemoryQueue {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(State::default()),
            visibility_timeout,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Signalled on every publish.
    pub fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    /// Messages not yet acknowledged, in flight or not.
    pub async fn len(&self) -> usize {
        self.state.lock().await.messages.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Asset ids waiting on `destination`, in publish order.
    pub async fn pending_ids(&self, destination: Destination) -> Vec<i64> {
        self.state
            .lock()
            .await
            .messages
            .iter()
            .filter(|m| m.destination == destination)
            .map(|m| m.asset_id)
            .collect()
    }
}

#[async_trait]
impl MessagePublisher for InMemoryQueue {
    async fn publish(&self, destination: Destination, asset_id: i64) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            state.next_receipt += 1;
            let receipt = state.next_receipt;
            state.messages.push_back(Pending {
                receipt,
                destination,
                asset_id,
                attempts: 0,
                visible_at: Instant::now(),
            });
        }
        tracing::debug!(asset_id = asset_id, destination = %destination, "Message queued");
        self.notify.notify_one();
        Ok(())
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn claim_next(&self) -> Result<Option<Delivery>> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let Some(message) = state.messages.iter_mut().find(|m| m.visible_at <= now) else {
            return Ok(None);
        };

        message.visible_at = now + self.visibility_timeout;
        message.attempts += 1;

        Ok(Some(Delivery {
            receipt: message.receipt,
            destination: message.destination,
            asset_id: message.asset_id,
            attempts: message.attempts,
        }))
    }

    async fn ack(&self, receipt: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        state.messages.retain(|m| m.receipt != receipt);
        Ok(())
    }
}
