//! Assetflow services layer
//!
//! Orchestration and domain services: the malware scanner client, the ingestion
//! pipeline, storage gateways, the asset lifecycle (producer and consumer) and the
//! retry sweeper. HTTP handling stays in `assetflow-api`.

pub mod lifecycle;
pub mod retry;
pub mod services;

pub use lifecycle::{AssetLifecycle, AssetOrchestrator, HandleOutcome};
pub use retry::{RetrySweeper, RetrySweeperConfig, SweepReport};
pub use services::clamav::ClamAVService;
pub use services::gateway::{LocalGateway, MediaGateway, RemoteStorageClient, StoredMedia};
pub use services::ingestion::{IngestError, IngestionPipeline, PipelineConfig};

#[cfg(test)]
pub(crate) mod testing;
