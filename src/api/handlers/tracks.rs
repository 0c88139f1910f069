use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use super::{delivery_error, lifecycle_error, store_error};
use crate::api::extract::{AuthUser, RequireAdmin};
use crate::api::response::{ApiError, AppQuery, JSend, JSendPaginated, Pagination};
use crate::delivery::DeliveryError;
use crate::media::SpooledUpload;
use crate::sanitize;
use crate::store::models::{TrackRecord, TrackStatus};
use crate::store::StoreError;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

/// Track view returned to clients. Storage paths stay server-side.
#[derive(Debug, Serialize)]
pub struct TrackResponse {
    pub id: String,
    pub title: String,
    pub album: String,
    pub owner: String,
    pub owner_display_name: String,
    pub original_file_name: String,
    pub mime_type: String,
    pub file_size: u64,
    pub status: TrackStatus,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct ListTracksParams {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    50
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

#[derive(Default)]
struct UploadForm {
    spool: Option<SpooledUpload>,
    title: Option<String>,
    album: Option<String>,
}

pub(super) fn track_to_response(record: &TrackRecord) -> TrackResponse {
    TrackResponse {
        id: record.id.clone(),
        title: record.title.clone(),
        album: record.album.clone(),
        owner: record.owner_id.clone(),
        owner_display_name: record.owner_display_name.clone(),
        original_file_name: record.original_file_name.clone(),
        mime_type: record.mime_type.clone(),
        file_size: record.file_size,
        status: record.status,
        created_at: record.created_at.to_rfc3339(),
        updated_at: record.updated_at.to_rfc3339(),
    }
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn upload_track(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<JSend<TrackResponse>>), ApiError> {
    let mut form = UploadForm::default();
    if let Err(e) = read_upload_form(&state, &mut form, &mut multipart).await {
        if let Some(spool) = form.spool.take() {
            state.media.discard_spool(&spool.path).await;
        }
        return Err(e);
    }
    let Some(spool) = form.spool.take() else {
        return Err(ApiError::bad_request("track file field is required"));
    };

    let title = sanitize::text(form.title.as_deref().unwrap_or_default());
    let title = if title.is_empty() {
        spool.original_file_name.clone()
    } else {
        title
    };
    let album = sanitize::text(form.album.as_deref().unwrap_or_default());

    let record = state
        .lifecycle
        .submit(&user.username, spool, &title, &album)
        .await
        .map_err(lifecycle_error)?;

    state
        .audit
        .record(
            "UPLOAD",
            &format!(
                "user={} track={} file={}",
                user.username, record.id, record.original_file_name
            ),
        )
        .await;

    tracing::debug!(track_id = %record.id, user = %user.username, "Accepted upload");

    Ok((StatusCode::CREATED, JSend::success(track_to_response(&record))))
}

/// Pull the upload out of the multipart body, streaming the file part into a
/// spool as it arrives. A spool created here stays in `form` even on error,
/// so the caller can discard it.
async fn read_upload_form(
    state: &AppState,
    form: &mut UploadForm,
    multipart: &mut Multipart,
) -> Result<(), ApiError> {
    loop {
        let mut field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Ok(()),
            Err(e) => return Err(ApiError::bad_request(format!("Invalid multipart data: {e}"))),
        };
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "track" => {
                if form.spool.is_some() {
                    return Err(ApiError::bad_request("duplicate track field"));
                }
                let original_file_name = field.file_name().unwrap_or("upload").to_string();
                let mime_type = field
                    .content_type()
                    .map(|s| s.to_string())
                    .filter(|ct| ct != "application/octet-stream")
                    .or_else(|| {
                        mime_guess::from_path(&original_file_name)
                            .first()
                            .map(|m| m.to_string())
                    })
                    .unwrap_or_else(|| "application/octet-stream".to_string());

                let (path, mut file) = state
                    .media
                    .create_spool()
                    .await
                    .map_err(|e| ApiError::internal(format!("Failed to spool upload: {e}")))?;
                form.spool = Some(SpooledUpload {
                    path,
                    original_file_name,
                    mime_type,
                    size: 0,
                });

                let mut size: u64 = 0;
                loop {
                    let chunk = match field.chunk().await {
                        Ok(Some(chunk)) => chunk,
                        Ok(None) => break,
                        Err(e) => {
                            return Err(ApiError::bad_request(format!("Failed to read file: {e}")))
                        }
                    };
                    size += chunk.len() as u64;
                    if size > state.config.max_upload_size {
                        return Err(ApiError::payload_too_large(format!(
                            "File exceeds maximum upload size of {} bytes",
                            state.config.max_upload_size
                        )));
                    }
                    file.write_all(&chunk)
                        .await
                        .map_err(|e| ApiError::internal(e.to_string()))?;
                }
                file.flush()
                    .await
                    .map_err(|e| ApiError::internal(e.to_string()))?;
                file.sync_all()
                    .await
                    .map_err(|e| ApiError::internal(e.to_string()))?;
                if let Some(spool) = form.spool.as_mut() {
                    spool.size = size;
                }
            }
            "title" => {
                form.title = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("Invalid title: {e}")))?,
                );
            }
            "album" => {
                form.album = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("Invalid album: {e}")))?,
                );
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }
}

pub async fn list_tracks(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    AppQuery(params): AppQuery<ListTracksParams>,
) -> Result<Json<JSendPaginated<TrackResponse>>, ApiError> {
    if params.limit == 0 {
        return Err(ApiError::bad_request("limit must be greater than 0"));
    }

    let mut tracks = state
        .meta
        .list_by_status(TrackStatus::Approved)
        .await
        .map_err(store_error)?;
    tracks.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let total = tracks.len() as u64;
    let items: Vec<TrackResponse> = tracks
        .iter()
        .skip(params.offset as usize)
        .take(params.limit as usize)
        .map(track_to_response)
        .collect();

    Ok(JSendPaginated::success(
        items,
        Pagination {
            limit: params.limit,
            offset: params.offset,
            total,
        },
    ))
}

/// Moderation queue, oldest submission first.
pub async fn pending_tracks(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Json<JSend<Vec<TrackResponse>>>, ApiError> {
    let mut tracks = state
        .meta
        .list_by_status(TrackStatus::Pending)
        .await
        .map_err(store_error)?;
    tracks.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    Ok(JSend::success(
        tracks.iter().map(track_to_response).collect(),
    ))
}

pub async fn get_track(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<JSend<TrackResponse>>, ApiError> {
    let record = match state.meta.get(&id).await {
        Ok(record) => record,
        Err(StoreError::NotFound(_)) => return Err(ApiError::not_found("Track not found")),
        Err(e) => return Err(store_error(e)),
    };
    if !record.visible_to(&user.username, &user.role) {
        return Err(ApiError::forbidden("Track is not visible to this user"));
    }

    Ok(JSend::success(track_to_response(&record)))
}

pub async fn stream_track(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok());

    let stream = match state
        .delivery
        .open(&id, &user.username, &user.role, range)
        .await
    {
        Ok(stream) => stream,
        Err(DeliveryError::RangeNotSatisfiable { total }) => {
            return Response::builder()
                .status(StatusCode::RANGE_NOT_SATISFIABLE)
                .header(header::CONTENT_RANGE, format!("bytes */{total}"))
                .body(Body::empty())
                .map_err(|e| ApiError::internal(e.to_string()));
        }
        Err(e) => return Err(delivery_error(e)),
    };

    let mime_type = stream.mime_type.clone();
    let content_length = stream.content_length();
    let total_size = stream.total_size;
    let satisfied = stream.range;

    let builder = Response::builder()
        .header(header::CONTENT_TYPE, mime_type)
        .header(header::CONTENT_LENGTH, content_length.to_string())
        .header(header::ACCEPT_RANGES, "bytes");
    let builder = match satisfied {
        Some((start, end)) => builder.status(StatusCode::PARTIAL_CONTENT).header(
            header::CONTENT_RANGE,
            format!("bytes {start}-{end}/{total_size}"),
        ),
        None => builder.status(StatusCode::OK),
    };

    builder
        .body(Body::from_stream(stream.into_stream()))
        .map_err(|e| ApiError::internal(e.to_string()))
}

/// Case-insensitive substring search over the approved catalog. A blank
/// query is a client error, not an empty result.
pub async fn search_tracks(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    AppQuery(params): AppQuery<SearchParams>,
) -> Result<Json<JSend<Vec<TrackResponse>>>, ApiError> {
    let needle = params.q.trim().to_lowercase();
    if needle.is_empty() {
        return Err(ApiError::unprocessable_entity("Search query is required"));
    }

    let tracks = state
        .meta
        .list_by_status(TrackStatus::Approved)
        .await
        .map_err(store_error)?;
    let items: Vec<TrackResponse> = tracks
        .iter()
        .filter(|t| {
            t.title.to_lowercase().contains(&needle)
                || t.album.to_lowercase().contains(&needle)
                || t.owner_id.to_lowercase().contains(&needle)
                || t.owner_display_name.to_lowercase().contains(&needle)
        })
        .map(track_to_response)
        .collect();

    Ok(JSend::success(items))
}
