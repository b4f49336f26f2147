//! Assetflow persistence layer.
//!
//! Asset lifecycle records and the transactional outbox that feeds the queue workers.

pub mod db;

pub use db::{
    AssetRepository, AssetStore, ClaimOutcome, InMemoryAssetStore, PgMessageQueue,
    ReleaseOutcome, MESSAGE_NOTIFY_CHANNEL,
};
