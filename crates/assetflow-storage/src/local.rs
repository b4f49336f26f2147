use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::keys::validate_stored_name;
use crate::traits::{ByteReader, Storage, StorageError, StorageResult, StoredObject};

/// Local filesystem storage implementation
#[derive(Clone, Debug)]
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: String,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for stored objects (e.g., "/var/lib/assetflow/media")
    /// * `base_url` - Base URL the file server is reachable under (e.g., "http://localhost:4000")
    pub async fn new(base_path: impl Into<PathBuf>, base_url: String) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        let base_path = base_path.canonicalize().map_err(|e| {
            StorageError::ConfigError(format!("Failed to canonicalize base path: {}", e))
        })?;

        Ok(LocalStorage {
            base_path,
            base_url,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Map a stored name onto the filesystem, refusing anything that would leave the
    /// storage root.
    fn name_to_path(&self, name: &str) -> StorageResult<PathBuf> {
        validate_stored_name(name)?;

        let path = self.base_path.join(name);
        if path.parent() != Some(self.base_path.as_path()) {
            return Err(StorageError::InvalidKey(
                "Stored name resolves outside storage directory".to_string(),
            ));
        }

        Ok(path)
    }

    async fn open_existing(&self, name: &str) -> StorageResult<(PathBuf, fs::File)> {
        let path = self.name_to_path(name)?;
        match fs::File::open(&path).await {
            Ok(file) => Ok((path, file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) => Err(StorageError::ReadFailed(format!(
                "Failed to open file {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn store_file(&self, name: &str, source: &Path) -> StorageResult<StoredObject> {
        let path = self.name_to_path(name)?;
        let partial = self.base_path.join(format!("{}.part", name));
        let start = std::time::Instant::now();

        let size = fs::copy(source, &partial).await.map_err(|e| {
            StorageError::WriteFailed(format!(
                "Failed to copy {} into storage: {}",
                source.display(),
                e
            ))
        })?;

        // Readers only ever see complete objects.
        if let Err(e) = fs::rename(&partial, &path).await {
            let _ = fs::remove_file(&partial).await;
            return Err(StorageError::WriteFailed(format!(
                "Failed to move {} into place: {}",
                path.display(),
                e
            )));
        }

        tracing::info!(
            path = %path.display(),
            storage_key = %name,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage write successful"
        );

        Ok(StoredObject {
            name: name.to_string(),
            size,
            url: self.public_url(name),
        })
    }

    async fn open_range(&self, name: &str, start: u64, length: u64) -> StorageResult<ByteReader> {
        let (path, mut file) = self.open_existing(name).await?;

        file.seek(SeekFrom::Start(start)).await.map_err(|e| {
            StorageError::ReadFailed(format!(
                "Failed to seek {} to {}: {}",
                path.display(),
                start,
                e
            ))
        })?;

        Ok(Box::pin(file.take(length)))
    }

    async fn read_head(&self, name: &str, max: usize) -> StorageResult<Vec<u8>> {
        let (_, file) = self.open_existing(name).await?;

        let mut head = Vec::with_capacity(max);
        file.take(max as u64).read_to_end(&mut head).await?;
        Ok(head)
    }

    async fn content_length(&self, name: &str) -> StorageResult<u64> {
        let path = self.name_to_path(name)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(meta.len()),
            Ok(_) => Err(StorageError::NotFound(name.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) => Err(StorageError::IoError(e)),
        }
    }

    async fn exists(&self, name: &str) -> StorageResult<bool> {
        let path = self.name_to_path(name)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    async fn delete(&self, name: &str) -> StorageResult<bool> {
        let path = self.name_to_path(name)?;
        let start = std::time::Instant::now();

        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(
                    path = %path.display(),
                    storage_key = %name,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Local storage delete successful"
                );
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::DeleteFailed(format!(
                "Failed to delete file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn public_url(&self, name: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), name)
    }
}
