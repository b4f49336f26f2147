//! Asset repositories
//!
//! [`AssetStore`] is the contract the lifecycle services program against. The
//! PostgreSQL implementation writes lifecycle messages into an outbox table inside the
//! same transaction as the status change; the in-memory implementation publishes them
//! once the change has been applied.

pub mod asset;
pub mod memory;
pub mod queue;
pub mod store;

pub use asset::AssetRepository;
pub use memory::InMemoryAssetStore;
pub use queue::{PgMessageQueue, MESSAGE_NOTIFY_CHANNEL};
pub use store::{AssetStore, ClaimOutcome, ReleaseOutcome};
