//! Track moderation state machine: Pending -> Approved, or Pending -> gone.
//!
//! Approve and Reject serialize per track id through [`IdLockMap`]; Submit
//! and streaming take no locks. On Approve the binary moves before the
//! record is rewritten, so a crash between the two leaves a "moved but
//! still Pending" state that [`TrackLifecycle::reconcile`] repairs.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::media::{MediaStore, SpooledUpload};
use crate::sanitize;
use crate::store::meta::{MetaStore, StoreError};
use crate::store::models::{TrackRecord, TrackStatus};
use crate::store::users::UserStore;
use crate::store::QuotaLedger;

/// MIME types accepted for submission.
pub const AUDIO_MIME_TYPES: [&str; 9] = [
    "audio/mpeg",
    "audio/wav",
    "audio/x-wav",
    "audio/flac",
    "audio/x-flac",
    "audio/aac",
    "audio/ogg",
    "audio/x-m4a",
    "audio/mp4",
];

/// Album bucket used when a track carries no album name.
const DEFAULT_ALBUM: &str = "Singles";

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("track not found: {0}")]
    NotFound(String),
    #[error("track {id} is {status}, operation requires a pending track")]
    InvalidState { id: String, status: TrackStatus },
    #[error("storage quota exceeded: {used_mb:.1} MB used of {max_mb} MB")]
    QuotaExceeded { used_mb: f64, max_mb: u64 },
    #[error("pending track limit reached: {count} of {max}")]
    PendingQuotaExceeded { count: usize, max: u32 },
    #[error("unsupported media type: {0}")]
    UnsupportedMedia(String),
    #[error("binary missing for track {0}")]
    MediaMissing(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of a startup [`TrackLifecycle::reconcile`] pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReconcileReport {
    /// Records inspected.
    pub checked: usize,
    /// Half-finished approvals completed from filesystem evidence.
    pub repaired: usize,
    /// Records whose binary could not be located; left for the operator.
    pub missing: usize,
}

#[derive(Clone)]
pub struct TrackLifecycle {
    meta: MetaStore,
    media: MediaStore,
    users: UserStore,
    quotas: QuotaLedger,
    locks: Arc<IdLockMap>,
}

impl TrackLifecycle {
    pub fn new(meta: MetaStore, media: MediaStore, users: UserStore) -> Self {
        let quotas = QuotaLedger::new(meta.clone(), media.clone());
        Self {
            meta,
            media,
            users,
            quotas,
            locks: Arc::new(IdLockMap::default()),
        }
    }

    // ========================================================================
    // Submit
    // ========================================================================

    /// Accept a spooled upload into the owner's pending area and create its
    /// Pending record. On any rejection the spool is discarded; nothing
    /// reaches a user-visible area and no record exists.
    pub async fn submit(
        &self,
        owner: &str,
        upload: SpooledUpload,
        title: &str,
        album: &str,
    ) -> Result<TrackRecord, LifecycleError> {
        match self.try_submit(owner, &upload, title, album).await {
            Ok(record) => Ok(record),
            Err(e) => {
                self.media.discard_spool(&upload.path).await;
                Err(e)
            }
        }
    }

    async fn try_submit(
        &self,
        owner: &str,
        upload: &SpooledUpload,
        title: &str,
        album: &str,
    ) -> Result<TrackRecord, LifecycleError> {
        if !AUDIO_MIME_TYPES.contains(&upload.mime_type.as_str()) {
            return Err(LifecycleError::UnsupportedMedia(upload.mime_type.clone()));
        }

        let account = self.users.get(owner).await?;

        // Quota gates run while the upload still sits in the spool area, so
        // the walk below never counts the incoming bytes.
        let used_mb = self.quotas.storage_used_mb(owner).await?;
        if used_mb > account.quota.max_storage_mb as f64 {
            return Err(LifecycleError::QuotaExceeded {
                used_mb,
                max_mb: account.quota.max_storage_mb,
            });
        }
        let count = self.quotas.pending_count(owner).await?;
        if count >= account.quota.max_pending_tracks as usize {
            return Err(LifecycleError::PendingQuotaExceeded {
                count,
                max: account.quota.max_pending_tracks,
            });
        }

        let stored_name = crate::media::stored_file_name(&upload.original_file_name);
        let pending_path = self
            .media
            .promote_spool(&upload.path, owner, &stored_name)
            .await?;

        let now = chrono::Utc::now();
        let record = TrackRecord {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            album: album.to_string(),
            owner_id: owner.to_string(),
            owner_display_name: account.display_name.clone(),
            original_file_name: upload.original_file_name.clone(),
            stored_file_name: stored_name,
            pending_location: Some(pending_path.to_string_lossy().into_owned()),
            approved_location: None,
            mime_type: upload.mime_type.clone(),
            file_size: upload.size,
            status: TrackStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.meta.put(&record).await {
            // The binary already landed in the pending area; pull it back out
            // so a failed submit leaves no trace.
            let _ = self.media.remove(&pending_path).await;
            return Err(e.into());
        }

        Ok(record)
    }

    // ========================================================================
    // Approve / Reject
    // ========================================================================

    /// Publish a pending track: move its binary into the owner's approved
    /// area, then rewrite the record as Approved. The move strictly precedes
    /// the metadata write.
    pub async fn approve(
        &self,
        id: &str,
        override_album: Option<&str>,
    ) -> Result<TrackRecord, LifecycleError> {
        let _guard = self.locks.acquire(id).await;

        let mut record = self.fetch(id).await?;
        if record.status != TrackStatus::Pending {
            return Err(LifecycleError::InvalidState {
                id: id.to_string(),
                status: record.status,
            });
        }
        let Some(pending_location) = record.pending_location.clone() else {
            return Err(LifecycleError::MediaMissing(id.to_string()));
        };

        let album = resolve_album(&record.album, override_album);
        let dest = self
            .media
            .approved_area(&record.owner_id, &album_dir_name(&album))
            .join(approved_file_name(&record));

        self.media
            .relocate(Path::new(&pending_location), &dest)
            .await?;

        record.status = TrackStatus::Approved;
        record.album = album;
        record.pending_location = None;
        record.approved_location = Some(dest.to_string_lossy().into_owned());
        record.updated_at = chrono::Utc::now();
        self.meta.put(&record).await?;

        Ok(record)
    }

    /// Remove a pending track: binary first (absence tolerated), then the
    /// record. Approved tracks cannot be rejected; a second reject of the
    /// same id observes NotFound.
    pub async fn reject(&self, id: &str) -> Result<TrackRecord, LifecycleError> {
        let _guard = self.locks.acquire(id).await;

        let record = self.fetch(id).await?;
        if record.status != TrackStatus::Pending {
            return Err(LifecycleError::InvalidState {
                id: id.to_string(),
                status: record.status,
            });
        }

        if let Some(location) = &record.pending_location {
            self.media.remove(Path::new(location)).await?;
        }
        match self.meta.delete(id).await {
            Ok(()) => Ok(record),
            Err(StoreError::NotFound(_)) => Err(LifecycleError::NotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    // ========================================================================
    // Drift repair
    // ========================================================================

    /// Startup sweep over every record, verifying that the binary its status
    /// points at is actually on disk. A Pending record whose pending file is
    /// gone but whose derived approved path exists is a half-finished
    /// approval; the filesystem wins and the record is completed. Anything
    /// else unexplained is logged and counted for the operator.
    pub async fn reconcile(&self) -> Result<ReconcileReport, LifecycleError> {
        let mut report = ReconcileReport::default();

        for mut record in self.meta.list_all().await? {
            report.checked += 1;
            match record.status {
                TrackStatus::Approved => {
                    if !self.location_exists(record.approved_location.as_deref()).await {
                        tracing::warn!(
                            id = %record.id,
                            location = ?record.approved_location,
                            "approved track binary missing"
                        );
                        report.missing += 1;
                    }
                }
                TrackStatus::Pending => {
                    if self.location_exists(record.pending_location.as_deref()).await {
                        continue;
                    }
                    let album = resolve_album(&record.album, None);
                    let derived = self
                        .media
                        .approved_area(&record.owner_id, &album_dir_name(&album))
                        .join(approved_file_name(&record));
                    if self.media.exists(&derived).await {
                        record.status = TrackStatus::Approved;
                        record.album = album;
                        record.pending_location = None;
                        record.approved_location = Some(derived.to_string_lossy().into_owned());
                        record.updated_at = chrono::Utc::now();
                        self.meta.put(&record).await?;
                        tracing::info!(id = %record.id, "completed interrupted approval");
                        report.repaired += 1;
                    } else {
                        tracing::warn!(
                            id = %record.id,
                            location = ?record.pending_location,
                            "pending track binary missing"
                        );
                        report.missing += 1;
                    }
                }
            }
        }

        Ok(report)
    }

    async fn location_exists(&self, location: Option<&str>) -> bool {
        match location {
            Some(path) => self.media.exists(Path::new(path)).await,
            None => false,
        }
    }

    async fn fetch(&self, id: &str) -> Result<TrackRecord, LifecycleError> {
        match self.meta.get(id).await {
            Ok(record) => Ok(record),
            Err(StoreError::NotFound(_)) => Err(LifecycleError::NotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

/// Pick the album a track is published under: per-call override, then the
/// record's own, then the default bucket.
fn resolve_album(current: &str, override_album: Option<&str>) -> String {
    let chosen = override_album
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| current.trim());
    if chosen.is_empty() {
        DEFAULT_ALBUM.to_string()
    } else {
        chosen.to_string()
    }
}

/// Directory name for an album, sanitized for the filesystem.
fn album_dir_name(album: &str) -> String {
    let dir = sanitize::file_name(album);
    if dir.is_empty() {
        DEFAULT_ALBUM.to_string()
    } else {
        dir
    }
}

/// Approved file name: sanitized title, short id suffix so same-titled
/// tracks in one album never collide, extension from the original upload
/// with a MIME-derived fallback.
pub(crate) fn approved_file_name(record: &TrackRecord) -> String {
    let title = sanitize::file_name(&record.title);
    let base = if title.is_empty() {
        "track".to_string()
    } else {
        title
    };
    let short_id = record.id.get(..8).unwrap_or(&record.id);
    let ext = Path::new(&record.original_file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .or_else(|| {
            mime_guess::get_mime_extensions_str(&record.mime_type)
                .and_then(|exts| exts.first())
                .map(|e| (*e).to_string())
        })
        .unwrap_or_else(|| "bin".to_string());
    format!("{base}-{short_id}.{ext}")
}

// ============================================================================
// Per-id locking
// ============================================================================

/// Lazily built map of per-track mutexes. Entries appear on first acquire
/// and are evicted when the last holder releases, so the map stays bounded
/// by the number of ids under moderation at once.
#[derive(Default)]
struct IdLockMap {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

struct IdLockGuard<'a> {
    map: &'a IdLockMap,
    id: String,
    permit: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl IdLockMap {
    async fn acquire(&self, id: &str) -> IdLockGuard<'_> {
        let entry = {
            let mut locks = match self.locks.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            Arc::clone(locks.entry(id.to_string()).or_default())
        };
        let permit = entry.lock_owned().await;
        IdLockGuard {
            map: self,
            id: id.to_string(),
            permit: Some(permit),
        }
    }
}

impl Drop for IdLockGuard<'_> {
    fn drop(&mut self) {
        // Release the permit before inspecting the refcount, otherwise the
        // map entry always looks shared.
        self.permit.take();
        let mut locks = match self.map.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(entry) = locks.get(&self.id) {
            if Arc::strong_count(entry) == 1 {
                locks.remove(&self.id);
            }
        }
    }
}
