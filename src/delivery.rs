//! Byte-range playback of stored track binaries.
//!
//! Resolves a track id to its active binary, applies the visibility rule
//! (approved tracks are public, unapproved ones owner-or-admin only), and
//! hands back a bounded reader. No lock is taken or held here; a stream
//! that races a moderation move just plays out against the already-open
//! file handle.

use std::io::SeekFrom;

use tokio::io::{AsyncReadExt, AsyncSeekExt, Take};
use tokio_util::io::ReaderStream;

use crate::store::meta::{MetaStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("track not found: {0}")]
    NotFound(String),
    #[error("track is not visible to this user")]
    Forbidden,
    #[error("binary missing for track {0}")]
    MediaMissing(String),
    #[error("requested range starts past the end of a {total}-byte file")]
    RangeNotSatisfiable { total: u64 },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A playable stream resolved from a track record. `range` is the satisfied
/// inclusive byte range when the request asked for one; `None` means the
/// whole file.
#[derive(Debug)]
pub struct MediaStream {
    pub mime_type: String,
    pub total_size: u64,
    pub range: Option<(u64, u64)>,
    reader: Take<tokio::fs::File>,
}

impl MediaStream {
    /// Bytes this stream will produce.
    pub fn content_length(&self) -> u64 {
        match self.range {
            Some((start, end)) => end - start + 1,
            None => self.total_size,
        }
    }

    pub fn into_stream(self) -> ReaderStream<Take<tokio::fs::File>> {
        ReaderStream::new(self.reader)
    }
}

#[derive(Clone)]
pub struct StreamDelivery {
    meta: MetaStore,
}

impl StreamDelivery {
    pub fn new(meta: MetaStore) -> Self {
        Self { meta }
    }

    /// Open a track for playback on behalf of `requester`.
    ///
    /// `range_header` is the raw `Range` header value, if any. A single
    /// `bytes=start-end` form is honored with the end clamped to EOF and an
    /// open end meaning "through the final byte". A start past EOF fails
    /// with [`DeliveryError::RangeNotSatisfiable`]; anything else the parser
    /// does not recognize (multi-range, suffix form, garbage) falls back to
    /// the full file so playback keeps working.
    pub async fn open(
        &self,
        id: &str,
        requester: &str,
        role: &str,
        range_header: Option<&str>,
    ) -> Result<MediaStream, DeliveryError> {
        let record = match self.meta.get(id).await {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) => return Err(DeliveryError::NotFound(id.to_string())),
            Err(e) => return Err(e.into()),
        };
        if !record.visible_to(requester, role) {
            return Err(DeliveryError::Forbidden);
        }
        let Some(location) = record.active_location() else {
            return Err(DeliveryError::MediaMissing(id.to_string()));
        };

        let mut file = match tokio::fs::File::open(location).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DeliveryError::MediaMissing(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let total_size = file.metadata().await?.len();

        let range = match range_header.and_then(parse_range) {
            Some((start, _)) if start >= total_size => {
                return Err(DeliveryError::RangeNotSatisfiable { total: total_size });
            }
            // An explicit end before the start is not a usable range.
            Some((start, Some(end))) if end < start => None,
            Some((start, end)) => {
                let end = end.unwrap_or(total_size - 1).min(total_size - 1);
                Some((start, end))
            }
            None => None,
        };

        let reader = match range {
            Some((start, end)) => {
                file.seek(SeekFrom::Start(start)).await?;
                file.take(end - start + 1)
            }
            None => file.take(total_size),
        };

        Ok(MediaStream {
            mime_type: record.mime_type,
            total_size,
            range,
            reader,
        })
    }
}

/// Parse a `Range: bytes=START-END` header value into `(start, end)`.
/// Returns `None` for every form this service does not serve partially:
/// multiple ranges, the suffix form, or unparseable input.
fn parse_range(header: &str) -> Option<(u64, Option<u64>)> {
    let ranges = header.strip_prefix("bytes=")?;
    if ranges.contains(',') {
        return None;
    }
    let (start, end) = ranges.split_once('-')?;
    let start = start.parse::<u64>().ok()?;
    let end = if end.is_empty() {
        None
    } else {
        Some(end.parse::<u64>().ok()?)
    };
    Some((start, end))
}
