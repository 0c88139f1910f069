use std::path::PathBuf;

use chrono::SecondsFormat;
use tokio::io::AsyncWriteExt;

/// Append-only activity log for moderation-relevant events.
///
/// One line per event: `[timestamp] EVENT details`. The file is opened in
/// append mode per write, so concurrent handlers interleave whole lines.
/// Logging is advisory: a failed append never fails the operation that
/// produced the event.
#[derive(Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Append one event line, best effort.
    pub async fn record(&self, event: &str, details: &str) {
        if let Err(e) = self.append(event, details).await {
            tracing::warn!(
                error = %e,
                path = %self.path.display(),
                "Failed to append activity log entry"
            );
        }
    }

    async fn append(&self, event: &str, details: &str) -> std::io::Result<()> {
        let stamp = chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let line = format!("[{stamp}] {event} {details}\n");
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }

    /// The full log as text; a log that was never written to reads as empty.
    pub async fn read_all(&self) -> std::io::Result<String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e),
        }
    }
}
