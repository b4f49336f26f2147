//! Where the orchestrator sends media: the in-process pipeline or a remote storage
//! service exposing the same HTTP surface as `assetflow-api`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use assetflow_core::MediaCategory;
use assetflow_storage::Storage;

use super::ingestion::{IngestError, IngestionPipeline};

/// Result of a successful upload. `locator` is the stored name used for deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMedia {
    #[serde(rename = "storedFilename")]
    pub locator: String,
    #[serde(rename = "storedUrl")]
    pub url: String,
}

#[async_trait]
pub trait MediaGateway: Send + Sync {
    async fn upload(
        &self,
        category: MediaCategory,
        origin_url: &str,
    ) -> Result<StoredMedia, IngestError>;

    /// Remove stored media. Deleting something that is already gone succeeds.
    async fn delete(&self, locator: &str) -> Result<(), IngestError>;

    fn name(&self) -> &'static str;
}

/// Runs the ingestion pipeline in this process.
pub struct LocalGateway {
    pipeline: Arc<IngestionPipeline>,
    storage: Arc<dyn Storage>,
}

impl LocalGateway {
    pub fn new(pipeline: Arc<IngestionPipeline>) -> Self {
        let storage = pipeline.storage().clone();
        Self { pipeline, storage }
    }
}

#[async_trait]
impl MediaGateway for LocalGateway {
    async fn upload(
        &self,
        category: MediaCategory,
        origin_url: &str,
    ) -> Result<StoredMedia, IngestError> {
        let stored = self.pipeline.ingest(category, origin_url).await?;
        Ok(StoredMedia {
            locator: stored.name,
            url: stored.url,
        })
    }

    async fn delete(&self, locator: &str) -> Result<(), IngestError> {
        let removed = self.storage.delete(locator).await?;
        if !removed {
            tracing::debug!(storage_key = %locator, "Stored object already absent");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadRequest<'a> {
    media_type: MediaCategory,
    origin_url: &'a str,
}

#[derive(Deserialize)]
struct RemoteError {
    #[serde(default)]
    error: String,
    code: Option<String>,
}

/// Client for a remote storage service (`POST /`, `DELETE /{name}`).
pub struct RemoteStorageClient {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteStorageClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn error_from(response: reqwest::Response) -> IngestError {
        let status = response.status();
        let body = response.json::<RemoteError>().await.ok();
        let message = body
            .as_ref()
            .map(|b| b.error.clone())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| format!("Remote storage responded with {}", status));

        match body.and_then(|b| b.code).as_deref() {
            Some("INVALID_URL") => IngestError::InvalidUrl(message),
            Some("INVALID_MIME_TYPE") => IngestError::InvalidMimeType(message),
            Some("INVALID_SIZE") => IngestError::InvalidSize(message),
            Some("MALICIOUS_CONTENT") => IngestError::Malicious(message),
            Some("SCANNER_UNAVAILABLE") => IngestError::ScannerUnreachable(message),
            Some("DOWNLOAD_FAILED") => IngestError::DownloadFailure(message),
            _ => IngestError::StorageFailure(message),
        }
    }
}

#[async_trait]
impl MediaGateway for RemoteStorageClient {
    #[tracing::instrument(skip(self, category), fields(category = %category))]
    async fn upload(
        &self,
        category: MediaCategory,
        origin_url: &str,
    ) -> Result<StoredMedia, IngestError> {
        let response = self
            .client
            .post(format!("{}/", self.base_url))
            .json(&UploadRequest {
                media_type: category,
                origin_url,
            })
            .send()
            .await
            .map_err(|e| IngestError::StorageFailure(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        response
            .json::<StoredMedia>()
            .await
            .map_err(|e| IngestError::StorageFailure(format!("Invalid upload response: {}", e)))
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, locator: &str) -> Result<(), IngestError> {
        let response = self
            .client
            .delete(format!("{}/{}", self.base_url, locator))
            .send()
            .await
            .map_err(|e| IngestError::StorageFailure(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                tracing::debug!(storage_key = %locator, "Remote object already absent");
                Ok(())
            }
            _ => Err(Self::error_from(response).await),
        }
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}
