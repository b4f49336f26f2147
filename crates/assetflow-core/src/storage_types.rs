use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Where ingested media ends up.
///
/// `Local` runs the ingestion pipeline in-process against the local content store;
/// `Remote` forwards uploads and deletions to a storage service over HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    Local,
    Remote,
}

impl FromStr for StorageMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(StorageMode::Local),
            "remote" => Ok(StorageMode::Remote),
            _ => Err(anyhow::anyhow!("Invalid storage mode: {}", s)),
        }
    }
}

impl Display for StorageMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StorageMode::Local => write!(f, "local"),
            StorageMode::Remote => write!(f, "remote"),
        }
    }
}
