use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(feature = "sqlx")]
use sqlx::FromRow;

use super::message::Destination;

/// Declared media category of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "media_category", rename_all = "lowercase")
)]
#[serde(rename_all = "UPPERCASE")]
pub enum MediaCategory {
    #[serde(alias = "image")]
    Image,
    #[serde(alias = "video")]
    Video,
    #[serde(alias = "audio")]
    Audio,
}

impl MediaCategory {
    /// MIME prefix the sniffed content type has to start with.
    pub fn expected_mime_prefix(&self) -> &'static str {
        match self {
            MediaCategory::Image => "image/",
            MediaCategory::Video => "video/",
            MediaCategory::Audio => "audio/",
        }
    }
}

impl FromStr for MediaCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "image" => Ok(MediaCategory::Image),
            "video" => Ok(MediaCategory::Video),
            "audio" => Ok(MediaCategory::Audio),
            _ => Err(anyhow::anyhow!("Invalid media category: {}", s)),
        }
    }
}

impl Display for MediaCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            MediaCategory::Image => write!(f, "IMAGE"),
            MediaCategory::Video => write!(f, "VIDEO"),
            MediaCategory::Audio => write!(f, "AUDIO"),
        }
    }
}

/// Lifecycle status of a [`MediaAsset`].
///
/// ```text
/// WAITING_UPLOAD -> UPLOADED | UPLOAD_FAILED
/// UPLOAD_FAILED -> WAITING_UPLOAD
/// UPLOADED -> WAITING_DELETION -> (removed) | DELETION_FAILED
/// DELETION_FAILED -> WAITING_DELETION
/// WAITING_UPLOAD | UPLOAD_FAILED -> (removed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "asset_status", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetStatus {
    WaitingUpload,
    Uploaded,
    UploadFailed,
    WaitingDeletion,
    DeletionFailed,
}

impl AssetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetStatus::WaitingUpload => "WAITING_UPLOAD",
            AssetStatus::Uploaded => "UPLOADED",
            AssetStatus::UploadFailed => "UPLOAD_FAILED",
            AssetStatus::WaitingDeletion => "WAITING_DELETION",
            AssetStatus::DeletionFailed => "DELETION_FAILED",
        }
    }

    /// The asset never reached the content store, so it can be dropped without
    /// contacting storage.
    pub fn is_never_uploaded(&self) -> bool {
        matches!(self, AssetStatus::WaitingUpload | AssetStatus::UploadFailed)
    }

    /// Statuses in which the stored locator is set.
    pub fn has_locator(&self) -> bool {
        matches!(
            self,
            AssetStatus::Uploaded | AssetStatus::WaitingDeletion | AssetStatus::DeletionFailed
        )
    }

    /// Whether `self -> next` is an edge of the lifecycle graph. Removal is not a
    /// status: never-uploaded assets and completed deletions drop the record.
    pub fn can_transition_to(&self, next: AssetStatus) -> bool {
        use AssetStatus::*;
        matches!(
            (self, next),
            (WaitingUpload, Uploaded)
                | (WaitingUpload, UploadFailed)
                | (UploadFailed, WaitingUpload)
                | (Uploaded, WaitingDeletion)
                | (WaitingDeletion, DeletionFailed)
                | (DeletionFailed, WaitingDeletion)
        )
    }

    /// Waiting status and destination a failed asset is moved back to by a retry.
    pub fn retry_target(&self) -> Option<(AssetStatus, Destination)> {
        match self {
            AssetStatus::UploadFailed => Some((AssetStatus::WaitingUpload, Destination::Upload)),
            AssetStatus::DeletionFailed => {
                Some((AssetStatus::WaitingDeletion, Destination::Delete))
            }
            _ => None,
        }
    }

    /// Destination that processes assets waiting in this status.
    pub fn pending_destination(&self) -> Option<Destination> {
        match self {
            AssetStatus::WaitingUpload => Some(Destination::Upload),
            AssetStatus::WaitingDeletion => Some(Destination::Delete),
            _ => None,
        }
    }
}

impl FromStr for AssetStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "WAITING_UPLOAD" => Ok(AssetStatus::WaitingUpload),
            "UPLOADED" => Ok(AssetStatus::Uploaded),
            "UPLOAD_FAILED" => Ok(AssetStatus::UploadFailed),
            "WAITING_DELETION" => Ok(AssetStatus::WaitingDeletion),
            "DELETION_FAILED" => Ok(AssetStatus::DeletionFailed),
            _ => Err(anyhow::anyhow!("Invalid asset status: {}", s)),
        }
    }
}

impl Display for AssetStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Lifecycle record of one media reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
#[serde(rename_all = "camelCase")]
pub struct MediaAsset {
    pub id: i64,
    pub media_type: MediaCategory,
    pub origin_url: String,
    pub stored_locator: Option<String>,
    pub status: AssetStatus,
    pub upload_attempts: i32,
    pub delete_attempts: i32,
    pub created_at: DateTime<Utc>,
    pub last_upload_attempt_at: Option<DateTime<Utc>>,
    pub last_delete_attempt_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease_expires_at: Option<DateTime<Utc>>,
}

impl MediaAsset {
    /// Another consumer holds an unexpired processing lease.
    pub fn is_leased(&self, now: DateTime<Utc>) -> bool {
        self.lease_expires_at.is_some_and(|expires| expires > now)
    }
}

/// Input for creating an asset in `WAITING_UPLOAD`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMediaAsset {
    pub media_type: MediaCategory,
    pub origin_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_edges() {
        use AssetStatus::*;
        assert!(WaitingUpload.can_transition_to(Uploaded));
        assert!(WaitingUpload.can_transition_to(UploadFailed));
        assert!(UploadFailed.can_transition_to(WaitingUpload));
        assert!(Uploaded.can_transition_to(WaitingDeletion));
        assert!(DeletionFailed.can_transition_to(WaitingDeletion));

        assert!(!Uploaded.can_transition_to(WaitingUpload));
        assert!(!UploadFailed.can_transition_to(Uploaded));
        assert!(!WaitingDeletion.can_transition_to(Uploaded));
        assert!(!DeletionFailed.can_transition_to(Uploaded));
    }

    #[test]
    fn test_retry_targets() {
        assert_eq!(
            AssetStatus::UploadFailed.retry_target(),
            Some((AssetStatus::WaitingUpload, Destination::Upload))
        );
        assert_eq!(
            AssetStatus::DeletionFailed.retry_target(),
            Some((AssetStatus::WaitingDeletion, Destination::Delete))
        );
        assert_eq!(AssetStatus::WaitingDeletion.retry_target(), None);
        assert_eq!(AssetStatus::Uploaded.retry_target(), None);
    }

    #[test]
    fn test_never_uploaded_and_locator_states_are_disjoint() {
        for status in [
            AssetStatus::WaitingUpload,
            AssetStatus::Uploaded,
            AssetStatus::UploadFailed,
            AssetStatus::WaitingDeletion,
            AssetStatus::DeletionFailed,
        ] {
            assert_ne!(status.is_never_uploaded(), status.has_locator());
            assert_eq!(status.as_str().parse::<AssetStatus>().ok(), Some(status));
        }
    }

    #[test]
    fn test_category_serde_accepts_both_cases() {
        let upper: MediaCategory = serde_json::from_str("\"IMAGE\"").unwrap();
        let lower: MediaCategory = serde_json::from_str("\"video\"").unwrap();
        assert_eq!(upper, MediaCategory::Image);
        assert_eq!(lower, MediaCategory::Video);
        assert_eq!(serde_json::to_string(&MediaCategory::Audio).unwrap(), "\"AUDIO\"");
        assert_eq!(MediaCategory::Audio.expected_mime_prefix(), "audio/");
    }

    #[test]
    fn test_lease_check() {
        let now = Utc::now();
        let mut asset = MediaAsset {
            id: 1,
            media_type: MediaCategory::Image,
            origin_url: "https://cdn.example.com/a.png".to_string(),
            stored_locator: None,
            status: AssetStatus::WaitingUpload,
            upload_attempts: 0,
            delete_attempts: 0,
            created_at: now,
            last_upload_attempt_at: None,
            last_delete_attempt_at: None,
            lease_expires_at: None,
        };
        assert!(!asset.is_leased(now));

        asset.lease_expires_at = Some(now + chrono::Duration::seconds(30));
        assert!(asset.is_leased(now));
        assert!(!asset.is_leased(now + chrono::Duration::seconds(31)));
    }
}
