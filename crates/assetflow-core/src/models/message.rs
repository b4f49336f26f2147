use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::asset::AssetStatus;

/// Queue destination of a lifecycle message. The payload is always a single asset id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Destination {
    Upload,
    Delete,
}

impl Destination {
    /// Status an asset must be in for a message on this destination to be processed.
    pub fn waiting_status(&self) -> AssetStatus {
        match self {
            Destination::Upload => AssetStatus::WaitingUpload,
            Destination::Delete => AssetStatus::WaitingDeletion,
        }
    }

    pub fn default_queue_name(&self) -> &'static str {
        match self {
            Destination::Upload => "upload-request",
            Destination::Delete => "delete-request",
        }
    }
}

impl FromStr for Destination {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upload-request" | "upload" => Ok(Destination::Upload),
            "delete-request" | "delete" => Ok(Destination::Delete),
            _ => Err(anyhow::anyhow!("Unknown destination: {}", s)),
        }
    }
}

impl Display for Destination {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.default_queue_name())
    }
}

/// Maps destinations to the configured queue names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueNames {
    pub upload: String,
    pub delete: String,
}

impl QueueNames {
    pub fn name_of(&self, destination: Destination) -> &str {
        match destination {
            Destination::Upload => &self.upload,
            Destination::Delete => &self.delete,
        }
    }

    pub fn destination_of(&self, queue_name: &str) -> Option<Destination> {
        if queue_name == self.upload {
            Some(Destination::Upload)
        } else if queue_name == self.delete {
            Some(Destination::Delete)
        } else {
            None
        }
    }
}

impl Default for QueueNames {
    fn default() -> Self {
        Self {
            upload: Destination::Upload.default_queue_name().to_string(),
            delete: Destination::Delete.default_queue_name().to_string(),
        }
    }
}

/// A delivered message. `receipt` identifies the delivery for acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub receipt: i64,
    pub destination: Destination,
    pub asset_id: i64,
    pub attempts: i32,
}
