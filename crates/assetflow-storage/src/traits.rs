//! Storage abstraction trait

use std::path::Path;
use std::pin::Pin;

use assetflow_core::AppError;
use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid stored name: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            // Unknown and malformed names look the same to a client.
            StorageError::NotFound(name) | StorageError::InvalidKey(name) => {
                AppError::NotFound(format!("File not found: {}", name))
            }
            other => AppError::StorageFailure(other.to_string()),
        }
    }
}

/// Reader over (part of) a stored object.
pub type ByteReader = Pin<Box<dyn AsyncRead + Send>>;

/// A persisted file. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub name: String,
    pub size: u64,
    pub url: String,
}

/// Content store.
///
/// Objects are addressed by their generated stored name and never modified after
/// `store_file` returns, so any number of readers may open the same object.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Copy a staged file into the store under `name`.
    async fn store_file(&self, name: &str, source: &Path) -> StorageResult<StoredObject>;

    /// Open a reader positioned at `start` that yields at most `length` bytes.
    async fn open_range(&self, name: &str, start: u64, length: u64) -> StorageResult<ByteReader>;

    /// Read up to `max` leading bytes, for content sniffing.
    async fn read_head(&self, name: &str, max: usize) -> StorageResult<Vec<u8>>;

    /// Size in bytes of a stored object.
    async fn content_length(&self, name: &str) -> StorageResult<u64>;

    async fn exists(&self, name: &str) -> StorageResult<bool>;

    /// Delete an object. Returns `false` when nothing was stored under `name`.
    async fn delete(&self, name: &str) -> StorageResult<bool>;

    /// Public URL under which `name` is served.
    fn public_url(&self, name: &str) -> String;
}
