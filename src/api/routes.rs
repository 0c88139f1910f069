use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config.max_upload_size as usize;

    Router::new()
        // Auth
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/profile", get(handlers::profile))
        // Tracks
        .route("/api/tracks", get(handlers::list_tracks))
        .route(
            "/api/tracks/upload",
            post(handlers::upload_track).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/tracks/pending", get(handlers::pending_tracks))
        .route("/api/tracks/:id", get(handlers::get_track))
        .route("/api/tracks/:id/stream", get(handlers::stream_track))
        .route("/api/search", get(handlers::search_tracks))
        // Moderation and administration
        .route("/api/admin/tracks/:id/approve", post(handlers::approve_track))
        .route("/api/admin/tracks/:id/reject", post(handlers::reject_track))
        .route("/api/admin/users", get(handlers::list_users))
        .route("/api/admin/users/:username", patch(handlers::update_user))
        .route("/api/admin/logs", get(handlers::get_logs))
        .route("/api/admin/backup", post(handlers::create_backup))
        // Health
        .route("/api/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
