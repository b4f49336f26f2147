use std::path::Path;
use std::sync::Arc;

use assetflow_core::{AppError, MalwareScanner, MediaCategory, ScanResult};

/// Leading bytes handed to the sniffer. Enough for every signature `infer` knows.
pub const MAX_SNIFF_BYTES: usize = 8192;

/// Validation errors for downloaded media
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid MIME type: detected {detected}, expected {expected}*")]
    InvalidMimeType {
        detected: String,
        expected: &'static str,
    },

    #[error("No extension registered for {0}")]
    UnknownExtension(String),

    #[error("Empty file")]
    EmptyFile,

    #[error("File too large: {size} bytes (limit: {max} bytes)")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Malware detected: {0}")]
    Malicious(String),

    #[error("Scanner unavailable: {0}")]
    ScannerUnreachable(String),

    #[error("Failed to inspect local copy: {0}")]
    Io(#[from] std::io::Error),
}

impl ValidationError {
    /// Rejections that will not change on retry.
    pub fn is_permanent(&self) -> bool {
        !matches!(
            self,
            ValidationError::ScannerUnreachable(_) | ValidationError::Io(_)
        )
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::InvalidMimeType { .. } | ValidationError::UnknownExtension(_) => {
                AppError::InvalidMimeType(err.to_string())
            }
            ValidationError::EmptyFile | ValidationError::FileTooLarge { .. } => {
                AppError::InvalidSize(err.to_string())
            }
            ValidationError::Malicious(signature) => AppError::Malicious(signature),
            ValidationError::ScannerUnreachable(msg) => AppError::ScannerUnreachable(msg),
            ValidationError::Io(e) => AppError::StorageFailure(e.to_string()),
        }
    }
}

/// MIME type detected from content plus the extension stored objects get.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SniffedType {
    pub mime_type: String,
    pub extension: String,
}

/// Canonical extension for the media types we expect to see.
pub fn canonical_extension(mime_type: &str) -> Option<&'static str> {
    let ext = match mime_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/bmp" => "bmp",
        "image/tiff" => "tif",
        "image/avif" => "avif",
        "image/heif" => "heif",
        "image/vnd.microsoft.icon" => "ico",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        "video/x-matroska" => "mkv",
        "video/x-msvideo" => "avi",
        "video/mpeg" => "mpg",
        "video/x-flv" => "flv",
        "audio/mpeg" => "mp3",
        "audio/ogg" => "ogg",
        "audio/x-wav" => "wav",
        "audio/x-flac" => "flac",
        "audio/aac" => "aac",
        "audio/m4a" => "m4a",
        "audio/midi" => "mid",
        _ => return None,
    };
    Some(ext)
}

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Files must be strictly smaller than this.
    pub max_file_size: u64,
}

/// Media file validator
///
/// Stateless apart from its configuration; a single instance is shared by all
/// ingestion attempts.
pub struct MediaValidator {
    config: ValidatorConfig,
    scanner: Option<Arc<dyn MalwareScanner>>,
}

impl MediaValidator {
    /// `scanner` is `None` when scanning is disabled by configuration.
    pub fn new(config: ValidatorConfig, scanner: Option<Arc<dyn MalwareScanner>>) -> Self {
        Self { config, scanner }
    }

    pub fn max_file_size(&self) -> u64 {
        self.config.max_file_size
    }

    /// Detect the real type of `head` and check it against the declared category.
    pub fn sniff(
        &self,
        head: &[u8],
        category: MediaCategory,
    ) -> Result<SniffedType, ValidationError> {
        let expected = category.expected_mime_prefix();

        let kind = infer::get(head).ok_or_else(|| ValidationError::InvalidMimeType {
            detected: "unknown".to_string(),
            expected,
        })?;

        let mime_type = kind.mime_type();
        if !mime_type.starts_with(expected) {
            return Err(ValidationError::InvalidMimeType {
                detected: mime_type.to_string(),
                expected,
            });
        }

        let extension = canonical_extension(mime_type)
            .or_else(|| Some(kind.extension()).filter(|ext| !ext.is_empty()))
            .ok_or_else(|| ValidationError::UnknownExtension(mime_type.to_string()))?;

        Ok(SniffedType {
            mime_type: mime_type.to_string(),
            extension: extension.to_string(),
        })
    }

    /// Accept iff `0 < size < max_file_size`.
    pub fn validate_file_size(&self, size: u64) -> Result<(), ValidationError> {
        if size == 0 {
            return Err(ValidationError::EmptyFile);
        }

        if size >= self.config.max_file_size {
            return Err(ValidationError::FileTooLarge {
                size,
                max: self.config.max_file_size,
            });
        }

        Ok(())
    }

    /// Scan the local copy. A scanner failure is never reported as malware.
    pub async fn scan(&self, local_copy: &Path) -> Result<(), ValidationError> {
        let Some(scanner) = &self.scanner else {
            tracing::debug!(path = %local_copy.display(), "Malware scanning disabled, skipping");
            return Ok(());
        };

        match scanner.scan_file(local_copy).await {
            ScanResult::Clean => Ok(()),
            ScanResult::Infected(signature) => {
                tracing::warn!(
                    path = %local_copy.display(),
                    signature = %signature,
                    "Malware detected in downloaded file"
                );
                Err(ValidationError::Malicious(signature))
            }
            ScanResult::Error(msg) => Err(ValidationError::ScannerUnreachable(msg)),
        }
    }

    /// Full check: type from the origin head bytes, then size and scan of the local copy.
    pub async fn validate(
        &self,
        origin_head: &[u8],
        category: MediaCategory,
        local_copy: &Path,
    ) -> Result<SniffedType, ValidationError> {
        let sniffed = self.sniff(origin_head, category)?;

        let size = tokio::fs::metadata(local_copy).await?.len();
        self.validate_file_size(size)?;

        self.scan(local_copy).await?;
        Ok(sniffed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    const PNG_HEADER: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48,
        0x44, 0x52,
    ];
    const MP3_HEADER: &[u8] = &[0x49, 0x44, 0x33, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];

    struct FixedScanner(ScanResult);

    #[async_trait]
    impl MalwareScanner for FixedScanner {
        async fn scan_file(&self, _path: &Path) -> ScanResult {
            self.0.clone()
        }
    }

    fn test_validator(scan: Option<ScanResult>) -> MediaValidator {
        MediaValidator::new(
            ValidatorConfig { max_file_size: 100 },
            scan.map(|result| Arc::new(FixedScanner(result)) as Arc<dyn MalwareScanner>),
        )
    }

    #[test]
    fn test_sniff_png_as_image() {
        let validator = test_validator(None);
        let sniffed = validator.sniff(PNG_HEADER, MediaCategory::Image).unwrap();
        assert_eq!(sniffed.mime_type, "image/png");
        assert_eq!(sniffed.extension, "png");
    }

    #[test]
    fn test_sniff_category_mismatch() {
        let validator = test_validator(None);
        assert!(matches!(
            validator.sniff(PNG_HEADER, MediaCategory::Video),
            Err(ValidationError::InvalidMimeType { expected: "video/", .. })
        ));
        assert!(validator.sniff(MP3_HEADER, MediaCategory::Audio).is_ok());
    }

    #[test]
    fn test_sniff_undetectable() {
        let validator = test_validator(None);
        assert!(matches!(
            validator.sniff(b"just some text", MediaCategory::Image),
            Err(ValidationError::InvalidMimeType { .. })
        ));
    }

    #[test]
    fn test_file_size_bounds_are_exclusive() {
        let validator = test_validator(None);
        assert!(matches!(
            validator.validate_file_size(0),
            Err(ValidationError::EmptyFile)
        ));
        assert!(validator.validate_file_size(1).is_ok());
        assert!(validator.validate_file_size(99).is_ok());
        assert!(matches!(
            validator.validate_file_size(100),
            Err(ValidationError::FileTooLarge { size: 100, max: 100 })
        ));
        assert!(validator.validate_file_size(101).is_err());
    }

    #[tokio::test]
    async fn test_scan_results_map_to_distinct_errors() {
        let path = Path::new("/nonexistent");

        assert!(test_validator(Some(ScanResult::Clean))
            .scan(path)
            .await
            .is_ok());

        let infected = test_validator(Some(ScanResult::Infected("Eicar".to_string())))
            .scan(path)
            .await
            .unwrap_err();
        assert!(matches!(infected, ValidationError::Malicious(ref sig) if sig == "Eicar"));
        assert!(infected.is_permanent());

        let unreachable = test_validator(Some(ScanResult::Error("refused".to_string())))
            .scan(path)
            .await
            .unwrap_err();
        assert!(matches!(unreachable, ValidationError::ScannerUnreachable(_)));
        assert!(!unreachable.is_permanent());
    }

    #[tokio::test]
    async fn test_validate_full_pass() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("staged");
        tokio::fs::write(&local, PNG_HEADER).await.unwrap();

        let sniffed = test_validator(Some(ScanResult::Clean))
            .validate(PNG_HEADER, MediaCategory::Image, &local)
            .await
            .unwrap();
        assert_eq!(sniffed.extension, "png");
    }

    #[tokio::test]
    async fn test_validate_rejects_empty_local_copy() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("staged");
        tokio::fs::write(&local, b"").await.unwrap();

        let err = test_validator(Some(ScanResult::Clean))
            .validate(PNG_HEADER, MediaCategory::Image, &local)
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::EmptyFile));
    }

    #[test]
    fn test_maps_into_app_error() {
        let err: AppError = ValidationError::FileTooLarge { size: 5, max: 4 }.into();
        assert_eq!(err.error_type(), "InvalidSize");

        let err: AppError = ValidationError::ScannerUnreachable("down".to_string()).into();
        assert_eq!(err.error_type(), "ScannerUnreachable");
    }
}
