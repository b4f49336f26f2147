//! Messaging seams.
//!
//! [`MessagePublisher`] is the producer side, [`MessageQueue`] the consumer side. Both
//! carry nothing but a destination and an asset id.

use async_trait::async_trait;

use crate::models::{Delivery, Destination};

/// Publishes an asset id to one of the two lifecycle destinations.
///
/// Stores call this only after the state change that motivates the message has been
/// committed.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, destination: Destination, asset_id: i64) -> anyhow::Result<()>;
}

/// At-least-once consumer interface.
///
/// A claimed delivery stays invisible to other consumers for the queue's visibility
/// timeout. Unless it is acknowledged before then it is delivered again.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Claim the next visible message, if any.
    async fn claim_next(&self) -> anyhow::Result<Option<Delivery>>;

    /// Remove a delivered message for good.
    async fn ack(&self, receipt: i64) -> anyhow::Result<()>;
}
