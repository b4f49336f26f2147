//! Download, validate, and store one origin resource.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use assetflow_core::{AppError, MediaCategory};
use assetflow_processing::{
    MediaValidator, OriginPolicy, UrlGuardError, ValidationError, MAX_SNIFF_BYTES,
};
use assetflow_storage::{generate_stored_name, Storage, StorageError, StoredObject};

/// Why an ingestion attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Invalid origin URL: {0}")]
    InvalidUrl(String),

    #[error("{0}")]
    InvalidMimeType(String),

    #[error("{0}")]
    InvalidSize(String),

    #[error("Malware detected: {0}")]
    Malicious(String),

    #[error("Scanner unavailable: {0}")]
    ScannerUnreachable(String),

    #[error("Download failed: {0}")]
    DownloadFailure(String),

    #[error("Storage failure: {0}")]
    StorageFailure(String),
}

impl IngestError {
    /// A later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IngestError::DownloadFailure(_)
                | IngestError::StorageFailure(_)
                | IngestError::ScannerUnreachable(_)
        )
    }

    /// Machine-readable code, shared with the HTTP error codes.
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::InvalidUrl(_) => "INVALID_URL",
            IngestError::InvalidMimeType(_) => "INVALID_MIME_TYPE",
            IngestError::InvalidSize(_) => "INVALID_SIZE",
            IngestError::Malicious(_) => "MALICIOUS_CONTENT",
            IngestError::ScannerUnreachable(_) => "SCANNER_UNAVAILABLE",
            IngestError::DownloadFailure(_) => "DOWNLOAD_FAILED",
            IngestError::StorageFailure(_) => "STORAGE_ERROR",
        }
    }
}

impl From<ValidationError> for IngestError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::InvalidMimeType { .. } | ValidationError::UnknownExtension(_) => {
                IngestError::InvalidMimeType(err.to_string())
            }
            ValidationError::EmptyFile | ValidationError::FileTooLarge { .. } => {
                IngestError::InvalidSize(err.to_string())
            }
            ValidationError::Malicious(signature) => IngestError::Malicious(signature),
            ValidationError::ScannerUnreachable(msg) => IngestError::ScannerUnreachable(msg),
            ValidationError::Io(e) => IngestError::StorageFailure(e.to_string()),
        }
    }
}

impl From<UrlGuardError> for IngestError {
    fn from(err: UrlGuardError) -> Self {
        IngestError::InvalidUrl(err.to_string())
    }
}

impl From<StorageError> for IngestError {
    fn from(err: StorageError) -> Self {
        IngestError::StorageFailure(err.to_string())
    }
}

impl From<std::io::Error> for IngestError {
    fn from(err: std::io::Error) -> Self {
        IngestError::StorageFailure(err.to_string())
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::InvalidUrl(msg) => AppError::InvalidUrl(msg),
            IngestError::InvalidMimeType(msg) => AppError::InvalidMimeType(msg),
            IngestError::InvalidSize(msg) => AppError::InvalidSize(msg),
            IngestError::Malicious(signature) => AppError::Malicious(signature),
            IngestError::ScannerUnreachable(msg) => AppError::ScannerUnreachable(msg),
            IngestError::DownloadFailure(msg) => AppError::DownloadFailure(msg),
            IngestError::StorageFailure(msg) => AppError::StorageFailure(msg),
        }
    }
}

/// Marker error for a redirect target the origin policy turned down.
#[derive(Debug, thiserror::Error)]
#[error("Redirect to {0} refused by origin policy")]
struct RedirectRefused(String);

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub staging_dir: PathBuf,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

pub struct IngestionPipeline {
    client: reqwest::Client,
    validator: Arc<MediaValidator>,
    storage: Arc<dyn Storage>,
    policy: OriginPolicy,
    staging_dir: PathBuf,
}

impl IngestionPipeline {
    pub fn new(
        config: PipelineConfig,
        validator: Arc<MediaValidator>,
        storage: Arc<dyn Storage>,
        policy: OriginPolicy,
    ) -> anyhow::Result<Self> {
        // Redirect targets go through the same origin checks as the URL itself.
        let redirect_policy = policy.clone();
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .redirect(reqwest::redirect::Policy::custom(move |attempt| {
                if attempt.previous().len() >= 5 {
                    attempt.error("too many redirects")
                } else if let Err(e) = redirect_policy.parse(attempt.url().as_str()) {
                    let refused = RedirectRefused(format!("{} ({})", attempt.url(), e));
                    attempt.error(refused)
                } else {
                    attempt.follow()
                }
            }))
            .build()?;

        Ok(Self {
            client,
            validator,
            storage,
            policy,
            staging_dir: config.staging_dir,
        })
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Fetch `origin_url`, check it against `category`, and persist it in the content
    /// store. Nothing reaches the store unless every check passed; the staging copy is
    /// always removed.
    #[tracing::instrument(skip(self, category), fields(category = %category))]
    pub async fn ingest(
        &self,
        category: MediaCategory,
        origin_url: &str,
    ) -> Result<StoredObject, IngestError> {
        let start = Instant::now();
        let url = self.policy.check(origin_url).await?;

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(classify_send_error)?;

        if !response.status().is_success() {
            return Err(IngestError::DownloadFailure(format!(
                "Origin responded with {}",
                response.status()
            )));
        }

        let max_size = self.validator.max_file_size();
        if let Some(declared) = response.content_length() {
            if declared >= max_size {
                return Err(ValidationError::FileTooLarge {
                    size: declared,
                    max: max_size,
                }
                .into());
            }
        }

        // Type check on the first bytes, before anything is written.
        let mut head = Vec::new();
        let mut exhausted = false;
        while head.len() < MAX_SNIFF_BYTES {
            match next_chunk(&mut response).await? {
                Some(chunk) => head.extend_from_slice(&chunk),
                None => {
                    exhausted = true;
                    break;
                }
            }
        }
        if head.is_empty() {
            return Err(ValidationError::EmptyFile.into());
        }
        guard_size(head.len() as u64, max_size)?;
        let sniffed = self.validator.sniff(&head, category)?;

        // Removed on drop as well, so an abandoned ingest leaves nothing behind.
        let staging = tempfile::Builder::new()
            .prefix("ingest-")
            .suffix(".part")
            .tempfile_in(&self.staging_dir)?
            .into_temp_path();
        let result = self
            .stage_and_store(&mut response, &head, exhausted, &staging, &sniffed.extension)
            .await;

        let staging_display = staging.display().to_string();
        if let Err(e) = staging.close() {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    error = %e,
                    path = %staging_display,
                    "Failed to remove staging file"
                );
            }
        }

        match &result {
            Ok(stored) => tracing::info!(
                stored_name = %stored.name,
                size = stored.size,
                mime_type = %sniffed.mime_type,
                duration_ms = start.elapsed().as_millis() as u64,
                "Media ingested"
            ),
            Err(e) => tracing::warn!(
                error = %e,
                retryable = e.is_retryable(),
                duration_ms = start.elapsed().as_millis() as u64,
                "Media ingestion failed"
            ),
        }
        result
    }

    async fn stage_and_store(
        &self,
        response: &mut reqwest::Response,
        head: &[u8],
        exhausted: bool,
        staging_path: &Path,
        extension: &str,
    ) -> Result<StoredObject, IngestError> {
        let max_size = self.validator.max_file_size();
        let mut file = File::create(staging_path).await?;
        file.write_all(head).await?;
        let mut written = head.len() as u64;

        if !exhausted {
            while let Some(chunk) = next_chunk(response).await? {
                written += chunk.len() as u64;
                guard_size(written, max_size)?;
                file.write_all(&chunk).await?;
            }
        }
        file.flush().await?;
        drop(file);

        let staged_size = tokio::fs::metadata(staging_path).await?.len();
        self.validator.validate_file_size(staged_size)?;
        self.validator.scan(staging_path).await?;

        let name = generate_stored_name(extension);
        let stored = self.storage.store_file(&name, staging_path).await?;
        Ok(stored)
    }
}

/// Refused redirects are permanent; everything else on the wire may succeed later.
fn classify_send_error(err: reqwest::Error) -> IngestError {
    let mut source = std::error::Error::source(&err);
    while let Some(cause) = source {
        if let Some(refused) = cause.downcast_ref::<RedirectRefused>() {
            return IngestError::InvalidUrl(refused.to_string());
        }
        source = cause.source();
    }
    IngestError::DownloadFailure(err.to_string())
}

async fn next_chunk(
    response: &mut reqwest::Response,
) -> Result<Option<Bytes>, IngestError> {
    response
        .chunk()
        .await
        .map_err(|e| IngestError::DownloadFailure(e.to_string()))
}

/// Abort as soon as the running byte count can no longer be accepted.
fn guard_size(size: u64, max: u64) -> Result<(), IngestError> {
    if size >= max {
        return Err(ValidationError::FileTooLarge { size, max }.into());
    }
    Ok(())
}
