use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role granted moderation rights everywhere an ownership check would
/// otherwise apply.
pub const ROLE_ADMIN: &str = "admin";

/// Default role for submitting users.
pub const ROLE_ARTIST: &str = "artist";

/// Moderation state of a submitted track. Rejection is not a state; a
/// rejected track's record is deleted outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackStatus {
    Pending,
    Approved,
}

impl std::fmt::Display for TrackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackStatus::Pending => write!(f, "pending"),
            TrackStatus::Approved => write!(f, "approved"),
        }
    }
}

/// A track record stored as one JSON document under the meta directory.
///
/// Exactly one of `pending_location`/`approved_location` is set at any time,
/// matching `status`. `id` and `owner_id` never change once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackRecord {
    pub id: String,
    pub title: String,
    pub album: String,
    pub owner_id: String,
    pub owner_display_name: String,
    pub original_file_name: String,
    pub stored_file_name: String,
    #[serde(default)]
    pub pending_location: Option<String>,
    #[serde(default)]
    pub approved_location: Option<String>,
    pub mime_type: String,
    pub file_size: u64,
    pub status: TrackStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrackRecord {
    /// Path of the binary this record currently describes.
    pub fn active_location(&self) -> Option<&str> {
        match self.status {
            TrackStatus::Pending => self.pending_location.as_deref(),
            TrackStatus::Approved => self.approved_location.as_deref(),
        }
    }

    /// Whether `requester` may see or stream this track: approved tracks are
    /// public, unapproved ones are limited to their owner and admins.
    pub fn visible_to(&self, requester: &str, role: &str) -> bool {
        self.status == TrackStatus::Approved || role == ROLE_ADMIN || self.owner_id == requester
    }
}

/// Per-user submission limits, read-only to the track core.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UserQuota {
    pub max_pending_tracks: u32,
    pub max_storage_mb: u64,
}

impl Default for UserQuota {
    fn default() -> Self {
        Self {
            max_pending_tracks: 10,
            max_storage_mb: 2048,
        }
    }
}

/// An account stored as one JSON document under the users directory.
/// Provisioned out-of-band; only the fields an admin may edit ever change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub display_name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub badges: Vec<String>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub quota: UserQuota,
}
