use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Json;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use super::auth::{user_to_response, UserResponse};
use super::tracks::{track_to_response, TrackResponse};
use super::{lifecycle_error, store_error};
use crate::api::extract::RequireAdmin;
use crate::api::response::{ApiError, AppJson, JSend};
use crate::sanitize;
use crate::store::StoreError;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApproveRequest {
    #[serde(default)]
    pub album: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub avatar: Option<Option<String>>,
    #[serde(default)]
    pub badges: Option<Vec<String>>,
    #[serde(default)]
    pub verified: Option<bool>,
    #[serde(default)]
    pub quota: Option<UpdateQuotaRequest>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UpdateQuotaRequest {
    #[serde(default)]
    pub max_pending_tracks: Option<u32>,
    #[serde(default)]
    pub max_storage_mb: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct BackupResponse {
    pub file: String,
}

/// Distinguishes between a missing field (`None`) and an explicit `null` (`Some(None)`).
fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: DeserializeOwned,
    D: Deserializer<'de>,
{
    Ok(Some(Option::deserialize(deserializer)?))
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health() -> Json<JSend<HealthResponse>> {
    JSend::success(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn approve_track(
    State(state): State<Arc<AppState>>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<String>,
    body: Option<AppJson<ApproveRequest>>,
) -> Result<Json<JSend<TrackResponse>>, ApiError> {
    let req = body.map(|AppJson(r)| r).unwrap_or_default();
    let album = req.album.as_deref().map(sanitize::text);
    let album = album.as_deref().filter(|a| !a.is_empty());

    let record = state
        .lifecycle
        .approve(&id, album)
        .await
        .map_err(lifecycle_error)?;

    state
        .audit
        .record(
            "APPROVE",
            &format!(
                "admin={} track={} owner={} album={}",
                admin.username, record.id, record.owner_id, record.album
            ),
        )
        .await;

    tracing::debug!(track_id = %id, admin = %admin.username, "Approved track");
    Ok(JSend::success(track_to_response(&record)))
}

pub async fn reject_track(
    State(state): State<Arc<AppState>>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<String>,
    body: Option<AppJson<RejectRequest>>,
) -> Result<Json<JSend<()>>, ApiError> {
    let req = body.map(|AppJson(r)| r).unwrap_or_default();
    let reason = sanitize::text(req.reason.as_deref().unwrap_or_default());

    let record = state.lifecycle.reject(&id).await.map_err(lifecycle_error)?;

    let mut details = format!(
        "admin={} track={} owner={}",
        admin.username, record.id, record.owner_id
    );
    if !reason.is_empty() {
        details.push_str(&format!(" reason={reason}"));
    }
    state.audit.record("REJECT", &details).await;

    tracing::debug!(track_id = %id, admin = %admin.username, "Rejected track");
    Ok(JSend::success(()))
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Json<JSend<Vec<UserResponse>>>, ApiError> {
    let mut accounts = state.users.list().await.map_err(store_error)?;
    accounts.sort_by(|a, b| a.username.cmp(&b.username));

    Ok(JSend::success(
        accounts.iter().map(user_to_response).collect(),
    ))
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    RequireAdmin(admin): RequireAdmin,
    Path(username): Path<String>,
    AppJson(req): AppJson<UpdateUserRequest>,
) -> Result<Json<JSend<UserResponse>>, ApiError> {
    // Validate at least one field is provided
    if req.display_name.is_none()
        && req.avatar.is_none()
        && req.badges.is_none()
        && req.verified.is_none()
        && req.quota.is_none()
    {
        return Err(ApiError::bad_request(
            "at least one field (display_name, avatar, badges, verified, quota) must be provided",
        ));
    }

    let mut account = match state.users.get(&username).await {
        Ok(account) => account,
        Err(StoreError::NotFound(_)) => return Err(ApiError::not_found("User not found")),
        Err(e) => return Err(store_error(e)),
    };

    if let Some(name) = req.display_name {
        account.display_name = sanitize::text(&name);
    }
    if let Some(avatar) = req.avatar {
        account.avatar = avatar.map(|a| sanitize::text(&a));
    }
    if let Some(badges) = req.badges {
        account.badges = badges
            .iter()
            .map(|b| sanitize::text(b))
            .filter(|b| !b.is_empty())
            .collect();
    }
    if let Some(verified) = req.verified {
        account.verified = verified;
    }
    if let Some(quota) = req.quota {
        if let Some(max) = quota.max_pending_tracks {
            account.quota.max_pending_tracks = max;
        }
        if let Some(max) = quota.max_storage_mb {
            account.quota.max_storage_mb = max;
        }
    }

    state.users.put(&account).await.map_err(store_error)?;

    state
        .audit
        .record(
            "USER_UPDATE",
            &format!("admin={} user={}", admin.username, account.username),
        )
        .await;

    tracing::debug!(user = %account.username, admin = %admin.username, "Updated user");
    Ok(JSend::success(user_to_response(&account)))
}

pub async fn get_logs(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Response, ApiError> {
    let text = state
        .audit
        .read_all()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from(text))
        .map_err(|e| ApiError::internal(e.to_string()))
}

pub async fn create_backup(
    State(state): State<Arc<AppState>>,
    RequireAdmin(admin): RequireAdmin,
) -> Result<Json<JSend<BackupResponse>>, ApiError> {
    let file = state
        .backup
        .create()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    state
        .audit
        .record("BACKUP", &format!("admin={} file={}", admin.username, file))
        .await;

    tracing::debug!(file = %file, admin = %admin.username, "Backup written");
    Ok(JSend::success(BackupResponse { file }))
}
