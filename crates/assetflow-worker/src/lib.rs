//! Assetflow queue workers.
//!
//! [`QueueWorker`] claims lifecycle messages from a [`assetflow_core::MessageQueue`] and
//! hands each one to a [`MessageHandler`]. [`InMemoryQueue`] is the broker used when no
//! database is configured.

pub mod context;
pub mod memory;
pub mod queue;

pub use context::MessageHandler;
pub use memory::InMemoryQueue;
pub use queue::{drain_queue, QueueWorker, QueueWorkerConfig, WakeSource};
