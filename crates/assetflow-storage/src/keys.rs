//! Stored-name generation and validation.

use chrono::Utc;
use uuid::Uuid;

use crate::traits::{StorageError, StorageResult};

/// Generate a fresh stored name: `{unix millis}_{32 hex chars}.{ext}`.
pub fn generate_stored_name(extension: &str) -> String {
    let ext = extension.trim_start_matches('.').to_lowercase();
    format!(
        "{}_{}.{}",
        Utc::now().timestamp_millis(),
        Uuid::new_v4().simple(),
        ext
    )
}

/// Reject names that could escape the storage root or address hidden files.
pub fn validate_stored_name(name: &str) -> StorageResult<()> {
    if name.is_empty()
        || name.contains("..")
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
        || name.starts_with('.')
    {
        return Err(StorageError::InvalidKey(format!(
            "Stored name contains invalid characters: {}",
            name
        )));
    }
    Ok(())
}
