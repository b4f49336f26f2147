//! Error types module
//!
//! All request-visible failures are unified under [`AppError`]. Each variant describes
//! its own HTTP presentation through [`ErrorMetadata`], so the API layer never has to
//! match on variants to build a response.
//!
//! The `Database` variant carries a `sqlx::Error` when the `sqlx` feature is enabled
//! and a plain message otherwise.

use std::io;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Expected failures such as validation rejections
    Debug,
    /// Recoverable issues, e.g. an origin that timed out
    Warn,
    /// Unexpected failures
    Error,
}

/// Metadata for error responses.
///
/// Errors describe their own HTTP status, machine-readable code and logging level.
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "INVALID_MIME_TYPE")
    fn error_code(&self) -> &'static str;

    /// Whether retrying the same operation later can succeed
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the client
    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden in production
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid MIME type: {0}")]
    InvalidMimeType(String),

    #[error("Invalid size: {0}")]
    InvalidSize(String),

    #[error("Malicious content detected: {0}")]
    Malicious(String),

    #[error("Range not satisfiable for resource of {total_size} bytes")]
    RangeNotSatisfiable { total_size: u64 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Download failed: {0}")]
    DownloadFailure(String),

    #[error("Storage failure: {0}")]
    StorageFailure(String),

    #[error("Scanner unreachable: {0}")]
    ScannerUnreachable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::StorageFailure(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, suggested_action, sensitive, log_level).
fn app_error_static_metadata(
    err: &AppError,
) -> (
    u16,
    &'static str,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
) {
    match err {
        AppError::Database(_) => (
            500,
            "DATABASE_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::InvalidUrl(_) => (
            400,
            "INVALID_URL",
            false,
            Some("Provide an absolute http or https URL"),
            false,
            LogLevel::Debug,
        ),
        AppError::InvalidMimeType(_) => (
            415,
            "INVALID_MIME_TYPE",
            false,
            Some("Check that the file matches the declared media type"),
            false,
            LogLevel::Debug,
        ),
        AppError::InvalidSize(_) => (
            422,
            "INVALID_SIZE",
            false,
            Some("Use a non-empty file below the size limit"),
            false,
            LogLevel::Debug,
        ),
        AppError::Malicious(_) => (
            422,
            "MALICIOUS_CONTENT",
            false,
            None,
            false,
            LogLevel::Warn,
        ),
        AppError::RangeNotSatisfiable { .. } => (
            416,
            "RANGE_NOT_SATISFIABLE",
            false,
            Some("Request a range inside the resource bounds"),
            false,
            LogLevel::Debug,
        ),
        AppError::NotFound(_) => (
            404,
            "NOT_FOUND",
            false,
            Some("Verify the resource exists"),
            false,
            LogLevel::Debug,
        ),
        AppError::DownloadFailure(_) => (
            502,
            "DOWNLOAD_FAILED",
            true,
            Some("Check the origin URL and retry later"),
            false,
            LogLevel::Warn,
        ),
        AppError::StorageFailure(_) => (
            500,
            "STORAGE_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::ScannerUnreachable(_) => (
            503,
            "SCANNER_UNAVAILABLE",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::InvalidInput(_) => (
            400,
            "INVALID_INPUT",
            false,
            Some("Check request parameters and try again"),
            false,
            LogLevel::Debug,
        ),
        AppError::Internal(_) | AppError::InternalWithSource { .. } => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
    }
}

impl AppError {
    /// Get the error type name for detailed error responses
    pub fn error_type(&self) -> &str {
        match self {
            AppError::Database(_) => "Database",
            AppError::InvalidUrl(_) => "InvalidUrl",
            AppError::InvalidMimeType(_) => "InvalidMimeType",
            AppError::InvalidSize(_) => "InvalidSize",
            AppError::Malicious(_) => "Malicious",
            AppError::RangeNotSatisfiable { .. } => "RangeNotSatisfiable",
            AppError::NotFound(_) => "NotFound",
            AppError::DownloadFailure(_) => "DownloadFailure",
            AppError::StorageFailure(_) => "StorageFailure",
            AppError::ScannerUnreachable(_) => "ScannerUnreachable",
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::Internal(_) | AppError::InternalWithSource { .. } => "Internal",
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).3
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).4
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).5
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Database(_) => "Failed to access database".to_string(),
            AppError::StorageFailure(_) => "Failed to access storage".to_string(),
            AppError::ScannerUnreachable(_) => "Malware scanner is unavailable".to_string(),
            AppError::Malicious(_) => "File was rejected by the malware scanner".to_string(),
            AppError::RangeNotSatisfiable { total_size } => {
                format!("Requested range is outside 0-{}", total_size)
            }
            AppError::InvalidUrl(ref msg)
            | AppError::InvalidMimeType(ref msg)
            | AppError::InvalidSize(ref msg)
            | AppError::NotFound(ref msg)
            | AppError::DownloadFailure(ref msg)
            | AppError::InvalidInput(ref msg) => msg.clone(),
            AppError::Internal(_) | AppError::InternalWithSource { .. } => {
                "Internal server error".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_metadata_database() {
        #[cfg(feature = "sqlx")]
        let err = AppError::from(sqlx::Error::PoolClosed);
        #[cfg(not(feature = "sqlx"))]
        let err = AppError::Database("pool closed".to_string());
        assert_eq!(err.http_status_code(), 500);
        assert_eq!(err.error_code(), "DATABASE_ERROR");
        assert!(err.is_recoverable());
        assert_eq!(err.client_message(), "Failed to access database");
        assert!(err.is_sensitive());
        assert_eq!(err.log_level(), LogLevel::Error);
    }

    #[test]
    fn test_error_metadata_not_found() {
        let err = AppError::NotFound("File not found".to_string());
        assert_eq!(err.http_status_code(), 404);
        assert_eq!(err.error_code(), "NOT_FOUND");
        assert!(!err.is_recoverable());
        assert_eq!(err.client_message(), "File not found");
        assert!(!err.is_sensitive());
    }

    #[test]
    fn test_error_metadata_range_not_satisfiable() {
        let err = AppError::RangeNotSatisfiable { total_size: 10 };
        assert_eq!(err.http_status_code(), 416);
        assert_eq!(err.error_code(), "RANGE_NOT_SATISFIABLE");
        assert!(err.client_message().contains("10"));
    }

    #[test]
    fn test_scanner_failure_is_not_a_verdict() {
        let unreachable = AppError::ScannerUnreachable("connection refused".to_string());
        let malicious = AppError::Malicious("Eicar-Test-Signature".to_string());

        assert!(unreachable.is_recoverable());
        assert!(!malicious.is_recoverable());
        assert_ne!(unreachable.error_code(), malicious.error_code());
        assert_eq!(unreachable.http_status_code(), 503);
    }

    #[test]
    fn test_retryable_variants() {
        assert!(AppError::DownloadFailure("timeout".to_string()).is_recoverable());
        assert!(AppError::StorageFailure("disk full".to_string()).is_recoverable());
        assert!(!AppError::InvalidSize("empty".to_string()).is_recoverable());
        assert!(!AppError::InvalidUrl("ftp://x".to_string()).is_recoverable());
    }

    #[test]
    fn test_io_error_maps_to_storage_failure() {
        let err = AppError::from(io::Error::new(io::ErrorKind::Other, "boom"));
        assert_eq!(err.error_type(), "StorageFailure");
        assert_eq!(err.client_message(), "Failed to access storage");
    }

    #[test]
    fn test_detailed_message_includes_source_chain() {
        let err = AppError::from(anyhow::anyhow!("inner").context("outer"));
        let details = err.detailed_message();
        assert!(details.contains("Internal error with source"));
        assert!(details.contains("Caused by"));
    }
}
