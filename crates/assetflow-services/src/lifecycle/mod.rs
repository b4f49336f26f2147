//! Asset lifecycle: producers create and release assets, the orchestrator consumes the
//! resulting upload and delete messages.

pub mod orchestrator;
pub mod producer;

pub use orchestrator::{AssetOrchestrator, HandleOutcome};
pub use producer::AssetLifecycle;
