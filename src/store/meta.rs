use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::io::AsyncWriteExt;

use super::models::{TrackRecord, TrackStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no record with id `{0}`")]
    NotFound(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Track metadata store: one JSON document per record under a single
/// directory, addressed by track id.
///
/// Writes go to a temp file in the same directory and are renamed over the
/// final path, so readers only ever see complete records. Put/delete on one
/// id boil down to a single `rename`/`unlink`, which is what makes them
/// linearizable without any locking here.
#[derive(Clone)]
pub struct MetaStore {
    dir: PathBuf,
}

impl MetaStore {
    /// Open the store rooted at `dir`, creating the directory if needed.
    pub async fn open<P: AsRef<Path>>(dir: P) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Create or replace the record addressed by `record.id`.
    pub async fn put(&self, record: &TrackRecord) -> Result<(), StoreError> {
        debug_assert!(!record.id.is_empty(), "track id must not be empty");

        let data = serde_json::to_vec_pretty(record)?;
        let tmp = self.dir.join(format!(".tmp-{}", uuid::Uuid::new_v4()));

        let result = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(&data).await?;
            file.flush().await?;
            file.sync_all().await?;
            tokio::fs::rename(&tmp, self.record_path(&record.id)).await?;
            Ok(())
        }
        .await;

        if result.is_err() {
            let _ = tokio::fs::remove_file(&tmp).await;
        }
        result
    }

    /// Load a record by id.
    pub async fn get(&self, id: &str) -> Result<TrackRecord, StoreError> {
        let data = tokio::fs::read(self.record_path(id)).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                StoreError::NotFound(id.to_string())
            } else {
                StoreError::Io(e)
            }
        })?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Remove a record. A second delete of the same id fails with NotFound.
    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        tokio::fs::remove_file(self.record_path(id))
            .await
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    StoreError::NotFound(id.to_string())
                } else {
                    StoreError::Io(e)
                }
            })
    }

    /// Ids currently present, snapshotted in one directory scan. Non-record
    /// residents of the directory (temp files, stray archives) are ignored.
    async fn snapshot_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(id) = name.strip_suffix(".json") {
                if !id.is_empty() && !id.starts_with('.') {
                    ids.push(id.to_string());
                }
            }
        }
        Ok(ids)
    }

    /// All records present at the time of the directory snapshot. Records
    /// deleted while loading are skipped rather than failing the listing.
    pub async fn list_all(&self) -> Result<Vec<TrackRecord>, StoreError> {
        let ids = self.snapshot_ids().await?;
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get(&id).await {
                Ok(record) => records.push(record),
                Err(StoreError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(records)
    }

    /// All records currently in `status`. No ordering guarantee.
    pub async fn list_by_status(
        &self,
        status: TrackStatus,
    ) -> Result<Vec<TrackRecord>, StoreError> {
        let mut records = self.list_all().await?;
        records.retain(|r| r.status == status);
        Ok(records)
    }
}
