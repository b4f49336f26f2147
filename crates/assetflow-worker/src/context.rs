//! Message handler trait
//!
//! The services layer implements this for the lifecycle orchestrator. The worker calls
//! `handle` for every claimed delivery and acknowledges it only when `Ok` is returned.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use assetflow_core::models::Delivery;

/// Consumer side of a lifecycle destination.
///
/// Return `Ok` once the message needs no further delivery, including when it was
/// stale and dropped. Return `Err` only for failures that should lead to redelivery,
/// such as the asset store being unreachable.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(self: Arc<Self>, delivery: &Delivery) -> Result<()>;
}
