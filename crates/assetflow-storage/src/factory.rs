use std::path::{Path, PathBuf};
use std::sync::Arc;

use assetflow_core::Config;

use crate::{LocalStorage, Storage, StorageError, StorageResult};

/// Create the content store served by this instance.
pub async fn create_storage(config: &Config) -> StorageResult<Arc<dyn Storage>> {
    let storage = LocalStorage::new(
        config.local_storage_path(),
        config.local_storage_base_url().to_string(),
    )
    .await?;

    tracing::info!(
        path = %storage.base_path().display(),
        "Content store initialized"
    );

    Ok(Arc::new(storage))
}

/// Ensure the staging directory for in-flight downloads exists.
pub async fn create_staging_dir(path: &Path) -> StorageResult<PathBuf> {
    tokio::fs::create_dir_all(path).await.map_err(|e| {
        StorageError::ConfigError(format!(
            "Failed to create staging directory {}: {}",
            path.display(),
            e
        ))
    })?;
    Ok(path.to_path_buf())
}
