//! Assetflow Storage Library
//!
//! Content store abstraction and the local filesystem implementation.
//!
//! # Stored names
//!
//! Objects live in a flat namespace under the storage root. Names are generated by
//! [`keys::generate_stored_name`] as `{timestamp}_{random}.{ext}` and must not contain
//! path separators, `..`, or a leading dot.

pub mod factory;
pub mod keys;
pub mod local;
pub mod traits;

// Re-export commonly used types
pub use factory::{create_staging_dir, create_storage};
pub use keys::{generate_stored_name, validate_stored_name};
pub use local::LocalStorage;
pub use traits::{ByteReader, Storage, StorageError, StorageResult, StoredObject};
