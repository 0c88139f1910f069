use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("backup task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Snapshots the whole service state (track records, pending and approved
/// binaries, user accounts) into one zip under `<data_dir>/backups`.
#[derive(Clone)]
pub struct BackupService {
    data_dir: PathBuf,
    users_dir: PathBuf,
}

impl BackupService {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(data_dir: P, users_dir: Q) -> Self {
        Self {
            data_dir: data_dir.into(),
            users_dir: users_dir.into(),
        }
    }

    /// Write a new archive and return its file name. The walk and deflate
    /// work runs on the blocking pool; request handlers stay responsive.
    pub async fn create(&self) -> Result<String, BackupError> {
        let data_dir = self.data_dir.clone();
        let users_dir = self.users_dir.clone();
        tokio::task::spawn_blocking(move || write_archive(&data_dir, &users_dir)).await?
    }
}

fn write_archive(data_dir: &Path, users_dir: &Path) -> Result<String, BackupError> {
    let backups_dir = data_dir.join("backups");
    std::fs::create_dir_all(&backups_dir)?;

    let name = format!("backup-{}.zip", chrono::Utc::now().timestamp_millis());
    let file = File::create(backups_dir.join(&name))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    add_dir(&mut zip, &data_dir.join("meta"), "meta", options)?;
    add_dir(&mut zip, &data_dir.join("pending"), "pending", options)?;
    add_dir(&mut zip, &data_dir.join("music"), "music", options)?;
    add_dir(&mut zip, users_dir, "users", options)?;

    zip.finish()?.flush()?;
    Ok(name)
}

/// Add every file under `root` to the archive beneath `prefix`. A root that
/// does not exist yet contributes nothing.
fn add_dir(
    zip: &mut ZipWriter<File>,
    root: &Path,
    prefix: &str,
    options: SimpleFileOptions,
) -> Result<(), BackupError> {
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                stack.push(path);
                continue;
            }
            let rel = path.strip_prefix(root).unwrap_or(&path);
            zip.start_file(format!("{prefix}/{}", rel.to_string_lossy()), options)?;
            let mut src = File::open(&path)?;
            std::io::copy(&mut src, zip)?;
        }
    }
    Ok(())
}
