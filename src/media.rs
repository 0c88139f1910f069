use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::sanitize;

/// Binary payload store for uploaded audio.
///
/// Layout under the data directory:
///   `pending/<owner>/<stored-name>`        awaiting moderation
///   `music/<owner>/<album>/<file>`         approved, publicly streamable
///   `tmp/.upload-<uuid>`                   in-flight upload spools
///
/// Everything lives on one filesystem so moves between areas are single
/// `rename` calls with no zero-copy window.
#[derive(Clone)]
pub struct MediaStore {
    pending_root: PathBuf,
    music_root: PathBuf,
    tmp_root: PathBuf,
}

/// An upload written to the spool area, ready to be handed to the track
/// lifecycle. Carries the provenance the record will keep.
#[derive(Debug)]
pub struct SpooledUpload {
    pub path: PathBuf,
    pub original_file_name: String,
    pub mime_type: String,
    pub size: u64,
}

/// Stored name for a freshly accepted binary: timestamp prefix for
/// collision resistance, original name lowercased and made path-safe.
pub fn stored_file_name(original: &str) -> String {
    let sanitized = sanitize::file_name(&original.to_lowercase());
    let base = if sanitized.is_empty() {
        "upload".to_string()
    } else {
        sanitized
    };
    format!("{}-{}", chrono::Utc::now().timestamp_millis(), base)
}

impl MediaStore {
    /// Open the store under `data_dir`, creating the area roots.
    pub async fn open<P: AsRef<Path>>(data_dir: P) -> std::io::Result<Self> {
        let data_dir = data_dir.as_ref();
        let store = Self {
            pending_root: data_dir.join("pending"),
            music_root: data_dir.join("music"),
            tmp_root: data_dir.join("tmp"),
        };
        tokio::fs::create_dir_all(&store.pending_root).await?;
        tokio::fs::create_dir_all(&store.music_root).await?;
        tokio::fs::create_dir_all(&store.tmp_root).await?;
        Ok(store)
    }

    /// The owner's moderation holding area.
    pub fn pending_area(&self, owner: &str) -> PathBuf {
        self.pending_root.join(owner)
    }

    /// The owner's public area for one album. `album_dir` must already be a
    /// sanitized file name.
    pub fn approved_area(&self, owner: &str, album_dir: &str) -> PathBuf {
        self.music_root.join(owner).join(album_dir)
    }

    /// Create a fresh spool file for an in-flight upload.
    pub async fn create_spool(&self) -> std::io::Result<(PathBuf, tokio::fs::File)> {
        let path = self
            .tmp_root
            .join(format!(".upload-{}", uuid::Uuid::new_v4()));
        let file = tokio::fs::File::create(&path).await?;
        Ok((path, file))
    }

    /// Best-effort removal of a spool that will not be promoted.
    pub async fn discard_spool(&self, path: &Path) {
        let _ = tokio::fs::remove_file(path).await;
    }

    /// Move a spooled upload into the owner's pending area under
    /// `stored_name`, returning the final path.
    pub async fn promote_spool(
        &self,
        spool: &Path,
        owner: &str,
        stored_name: &str,
    ) -> std::io::Result<PathBuf> {
        let area = self.pending_area(owner);
        tokio::fs::create_dir_all(&area).await?;
        let dest = area.join(stored_name);
        tokio::fs::rename(spool, &dest).await?;
        Ok(dest)
    }

    /// Move an approved binary into place, creating the destination album
    /// directory as needed. Rename, never copy-then-delete.
    pub async fn relocate(&self, from: &Path, to: &Path) -> std::io::Result<()> {
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(from, to).await
    }

    /// Delete a binary, tolerating one that is already gone. Returns whether
    /// a file was actually removed.
    pub async fn remove(&self, path: &Path) -> std::io::Result<bool> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Whether a binary is present at `path`.
    pub async fn exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(path).await.is_ok()
    }

    /// Total bytes currently attributed to `owner` across the pending and
    /// approved areas. Walks the directories every call; quota checks are
    /// rare enough that ground truth beats a cached counter.
    pub async fn user_storage_bytes(&self, owner: &str) -> std::io::Result<u64> {
        let mut total = 0u64;
        for root in [self.pending_area(owner), self.music_root.join(owner)] {
            total += dir_size(&root).await?;
        }
        Ok(total)
    }
}

/// Recursive directory byte count; a missing directory counts as empty.
async fn dir_size(root: &Path) -> std::io::Result<u64> {
    let mut total = 0u64;
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if meta.is_dir() {
                stack.push(entry.path());
            } else {
                total += meta.len();
            }
        }
    }
    Ok(total)
}
