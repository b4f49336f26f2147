use serde::{Deserialize, Serialize};

use super::asset::MediaCategory;

/// A block of authored content.
///
/// Only media blocks participate in the asset lifecycle; text blocks are carried so
/// callers can hand over whole documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
    Media(MediaReference),
}

/// Reference from a media block to its asset. `asset_id` is empty until the block has
/// been registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaReference {
    pub media_type: MediaCategory,
    pub origin_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<i64>,
}

impl MediaReference {
    pub fn new(media_type: MediaCategory, origin_url: impl Into<String>) -> Self {
        Self {
            media_type,
            origin_url: origin_url.into(),
            asset_id: None,
        }
    }

    /// Two references point at the same media when category and origin agree.
    pub fn same_media(&self, other: &MediaReference) -> bool {
        self.media_type == other.media_type && self.origin_url == other.origin_url
    }
}

impl ContentBlock {
    pub fn media(&self) -> Option<&MediaReference> {
        match self {
            ContentBlock::Media(reference) => Some(reference),
            ContentBlock::Text { .. } => None,
        }
    }
}
