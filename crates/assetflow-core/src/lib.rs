//! Assetflow Core Library
//!
//! Domain models, the error taxonomy, configuration and the seam traits shared by
//! every assetflow crate.

pub mod clock;
pub mod config;
pub mod error;
pub mod messaging;
pub mod models;
pub mod scanner;
pub mod storage_types;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AssetflowConfig, Config};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use messaging::{MessagePublisher, MessageQueue};
pub use models::{
    AssetStatus, ContentBlock, Delivery, Destination, MediaAsset, MediaCategory, MediaReference,
    NewMediaAsset, QueueNames,
};
pub use scanner::{MalwareScanner, ScanResult};
pub use storage_types::StorageMode;
