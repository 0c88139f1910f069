use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::store_error;
use crate::api::extract::AuthUser;
use crate::api::response::{ApiError, AppJson, JSend};
use crate::auth;
use crate::store::models::{UserAccount, UserQuota};
use crate::store::StoreError;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
}

/// Account view returned to clients; never carries the password hash.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub username: String,
    pub role: String,
    pub display_name: String,
    pub avatar: Option<String>,
    pub badges: Vec<String>,
    pub verified: bool,
    pub quota: UserQuota,
}

pub(super) fn user_to_response(account: &UserAccount) -> UserResponse {
    UserResponse {
        username: account.username.clone(),
        role: account.role.clone(),
        display_name: account.display_name.clone(),
        avatar: account.avatar.clone(),
        badges: account.badges.clone(),
        verified: account.verified,
        quota: account.quota,
    }
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn login(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<LoginRequest>,
) -> Result<Json<JSend<LoginResponse>>, ApiError> {
    // Unknown user and wrong password answer identically.
    let account = match state.users.get(&req.username).await {
        Ok(account) => account,
        Err(StoreError::NotFound(_)) => {
            return Err(ApiError::unauthorized("Invalid credentials"));
        }
        Err(e) => return Err(store_error(e)),
    };

    let verified = auth::verify_password(&req.password, &account.password_hash)
        .map_err(|e| ApiError::internal(format!("Stored credential unusable: {e}")))?;
    if !verified {
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    let token = auth::issue_token(
        &account.username,
        &account.role,
        &state.config.jwt_secret,
        state.config.token_expiry_hours,
    )
    .map_err(|e| ApiError::internal(e.to_string()))?;

    state
        .audit
        .record("LOGIN", &format!("user={}", account.username))
        .await;

    tracing::debug!(user = %account.username, "Login succeeded");

    Ok(JSend::success(LoginResponse {
        token,
        user: user_to_response(&account),
    }))
}

pub async fn profile(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<JSend<UserResponse>>, ApiError> {
    let account = match state.users.get(&user.username).await {
        Ok(account) => account,
        Err(StoreError::NotFound(_)) => {
            // Token outlived the account file.
            return Err(ApiError::unauthorized("Account no longer exists"));
        }
        Err(e) => return Err(store_error(e)),
    };

    Ok(JSend::success(user_to_response(&account)))
}
