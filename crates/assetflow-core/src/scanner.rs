//! Malware scanner seam.
//!
//! The validator only depends on this trait; the ClamAV client lives in
//! `assetflow-services`.

use std::path::Path;

use async_trait::async_trait;

/// Outcome of a single scan.
///
/// `Error` means the scanner could not produce a verdict (unreachable, timed out,
/// unparseable reply). It is never a malware verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanResult {
    Clean,
    Infected(String),
    Error(String),
}

impl ScanResult {
    pub fn is_clean(&self) -> bool {
        matches!(self, ScanResult::Clean)
    }
}

#[async_trait]
pub trait MalwareScanner: Send + Sync {
    /// Scan the file at `path`. Transport failures are reported as [`ScanResult::Error`].
    async fn scan_file(&self, path: &Path) -> ScanResult;
}
