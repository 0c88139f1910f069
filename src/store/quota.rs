use crate::media::MediaStore;
use crate::store::meta::{MetaStore, StoreError};
use crate::store::models::TrackStatus;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Read-side view of a user's consumption, computed from ground truth on
/// every call. Enforcement happens in the track lifecycle; this type only
/// answers "how much is in use right now".
#[derive(Clone)]
pub struct QuotaLedger {
    meta: MetaStore,
    media: MediaStore,
}

impl QuotaLedger {
    pub fn new(meta: MetaStore, media: MediaStore) -> Self {
        Self { meta, media }
    }

    /// Megabytes currently stored for `owner` across the pending and
    /// approved areas. In-flight spools live outside both and do not count.
    pub async fn storage_used_mb(&self, owner: &str) -> Result<f64, StoreError> {
        let bytes = self.media.user_storage_bytes(owner).await?;
        Ok(bytes as f64 / BYTES_PER_MB)
    }

    /// Number of tracks `owner` has awaiting moderation.
    pub async fn pending_count(&self, owner: &str) -> Result<usize, StoreError> {
        let pending = self.meta.list_by_status(TrackStatus::Pending).await?;
        Ok(pending.iter().filter(|t| t.owner_id == owner).count())
    }
}
