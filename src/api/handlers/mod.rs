mod admin;
mod auth;
mod tracks;

use crate::api::response::ApiError;
use crate::delivery::DeliveryError;
use crate::lifecycle::LifecycleError;
use crate::store::StoreError;

pub use admin::{
    approve_track, create_backup, get_logs, health, list_users, reject_track, update_user,
};
pub use auth::{login, profile};
pub use tracks::{
    get_track, list_tracks, pending_tracks, search_tracks, stream_track, upload_track,
};

/// Map a LifecycleError to an ApiError
fn lifecycle_error(e: LifecycleError) -> ApiError {
    match e {
        LifecycleError::NotFound(_) | LifecycleError::MediaMissing(_) => {
            ApiError::not_found(e.to_string())
        }
        LifecycleError::InvalidState { .. } => ApiError::conflict(e.to_string()),
        LifecycleError::QuotaExceeded { .. } => ApiError::payload_too_large(e.to_string()),
        LifecycleError::PendingQuotaExceeded { .. } => ApiError::too_many_requests(e.to_string()),
        LifecycleError::UnsupportedMedia(_) => ApiError::unsupported_media_type(e.to_string()),
        LifecycleError::Store(StoreError::NotFound(_)) => ApiError::not_found(e.to_string()),
        _ => ApiError::internal(e.to_string()),
    }
}

/// Map a DeliveryError to an ApiError
fn delivery_error(e: DeliveryError) -> ApiError {
    match e {
        DeliveryError::NotFound(_) | DeliveryError::MediaMissing(_) => {
            ApiError::not_found(e.to_string())
        }
        DeliveryError::Forbidden => ApiError::forbidden(e.to_string()),
        DeliveryError::RangeNotSatisfiable { .. } => {
            ApiError::Fail(axum::http::StatusCode::RANGE_NOT_SATISFIABLE, e.to_string())
        }
        DeliveryError::Store(StoreError::NotFound(_)) => ApiError::not_found(e.to_string()),
        _ => ApiError::internal(e.to_string()),
    }
}

/// Map a StoreError to an ApiError
fn store_error(e: StoreError) -> ApiError {
    match e {
        StoreError::NotFound(_) => ApiError::not_found(e.to_string()),
        _ => ApiError::internal(e.to_string()),
    }
}
