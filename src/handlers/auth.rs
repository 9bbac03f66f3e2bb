//! # Authentication Handlers
//!
//! HTTP endpoints for passkey registration, login and sessions.
//!
//! ## Registration
//! - POST /api/auth/register/start: create pending user, get challenge
//! - POST /api/auth/register/reissue: new challenge for a pending user
//! - POST /api/auth/register/finish: verify passkey, provision account
//!
//! ## Authentication
//! - POST /api/auth/authenticate/start: get login challenge
//! - POST /api/auth/authenticate/finish: verify assertion, start session
//!
//! ## Sessions
//! - POST /api/auth/logout
//! - GET /api/auth/session

use crate::error::{AppError, AppResult};
use crate::handlers::{session_user_id, SESSION_USER_ID};
use crate::state::AppState;
use crate::webauthn::types::*;
use crate::webauthn::{authentication, registration};
use axum::{extract::State, Json};
use serde_json::{json, Value};
use tower_sessions::Session;

/// Start passkey registration
///
/// ## Response
/// ```json
/// {
///   "publicKey": { "challenge": "...", "rp": {...}, "user": {...} },
///   "user_id": "550e8400-e29b-41d4-a716-446655440000"
/// }
/// ```
/// Keep `user_id` to delete the pending user if the ceremony is abandoned.
pub async fn register_start(
    State(state): State<AppState>,
    Json(req): Json<RegistrationStartRequest>,
) -> AppResult<Json<RegistrationStartResponse>> {
    let started =
        registration::start_registration(&state, &req.username, &req.display_name).await?;

    Ok(Json(RegistrationStartResponse {
        options: started.options,
        user_id: started.user_id,
    }))
}

/// Issue a new registration challenge for a pending user
pub async fn register_reissue(
    State(state): State<AppState>,
    Json(req): Json<ReissueRequest>,
) -> AppResult<Json<RegistrationStartResponse>> {
    let started = registration::reissue_challenge(&state, &req.user_id).await?;

    Ok(Json(RegistrationStartResponse {
        options: started.options,
        user_id: started.user_id,
    }))
}

/// Finish passkey registration
///
/// Provisioning retries can keep this request open for several seconds.
pub async fn register_finish(
    State(state): State<AppState>,
    Json(req): Json<RegistrationFinishRequest>,
) -> AppResult<Json<Value>> {
    let username = registration::finish_registration(
        &state,
        &req.username,
        req.credential_name.as_deref(),
        &req.credential,
    )
    .await?;

    Ok(Json(json!({
        "success": true,
        "username": username,
        "message": "Registration successful"
    })))
}

pub async fn authenticate_start(
    State(state): State<AppState>,
    Json(req): Json<AuthenticationStartRequest>,
) -> AppResult<Json<Value>> {
    let options = authentication::start_authentication(&state, &req.username).await?;

    Ok(Json(options))
}

/// Finish passkey authentication and log the user in
///
/// The session id is cycled on login to prevent session fixation.
pub async fn authenticate_finish(
    session: Session,
    State(state): State<AppState>,
    Json(req): Json<AuthenticationFinishRequest>,
) -> AppResult<Json<Value>> {
    let user = authentication::finish_authentication(&state, &req.username, &req.credential).await?;

    session
        .cycle_id()
        .await
        .map_err(|e| AppError::Internal(format!("Session error: {}", e)))?;
    session
        .insert(SESSION_USER_ID, &user.id)
        .await
        .map_err(|e| AppError::Internal(format!("Session error: {}", e)))?;

    Ok(Json(json!({
        "success": true,
        "username": user.username,
        "user_id": user.id,
        "message": "Authentication successful"
    })))
}

pub async fn logout(session: Session) -> AppResult<Json<Value>> {
    session
        .delete()
        .await
        .map_err(|e| AppError::Internal(format!("Session error: {}", e)))?;

    Ok(Json(json!({
        "success": true,
        "message": "Logged out successfully"
    })))
}

pub async fn session_info(session: Session) -> AppResult<Json<Value>> {
    match session_user_id(&session).await? {
        Some(id) => Ok(Json(json!({
            "authenticated": true,
            "user_id": id
        }))),
        None => Ok(Json(json!({
            "authenticated": false
        }))),
    }
}
