//! Assetflow content checks
//!
//! Decides whether downloaded media may enter the content store: real MIME type from
//! magic bytes, size bounds, malware scan, and origin URL policy.

pub mod url_guard;
pub mod validator;

pub use url_guard::{OriginPolicy, UrlGuardError};
pub use validator::{
    canonical_extension, MediaValidator, SniffedType, ValidationError, ValidatorConfig,
    MAX_SNIFF_BYTES,
};
