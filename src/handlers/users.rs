//! # User Handlers
//!
//! Handlers for the current user's profile and for deleting users.

use crate::db::{credentials, users};
use crate::error::{AppError, AppResult};
use crate::handlers::session_user_id;
use crate::state::AppState;
use crate::webauthn::registration;
use axum::{
    extract::{Path, State},
    Json,
};
use base64::prelude::*;
use serde_json::{json, Value};
use tower_sessions::Session;

/// Get current authenticated user's profile
///
/// ## Route
/// GET /api/users/me
///
/// ## Authentication
/// Requires authentication (protected by require_auth middleware)
///
/// ## Response
/// ```json
/// {
///   "id": "550e8400-e29b-41d4-a716-446655440000",
///   "username": "alice",
///   "display_name": "Alice Smith",
///   "registration_status": "COMPLETED",
///   "registered_at": "2024-01-15T10:30:00Z",
///   "credentials": [{ "id": "q83v...", "name": "work laptop", "last_used_at": null }]
/// }
/// ```
///
/// Credential ids are base64url encoded. Public keys and the user handle are
/// never returned.
pub async fn get_current_user(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<Json<Value>> {
    // The require_auth middleware already checked that user is logged in
    let user_id = session_user_id(&session)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Not authenticated".to_string()))?;

    let user = users::find_by_id(&state.db, &user_id).await?;
    let creds = credentials::find_by_user_id(&state.db, &user.id).await?;

    let credentials: Vec<Value> = creds
        .iter()
        .map(|c| {
            json!({
                "id": BASE64_URL_SAFE_NO_PAD.encode(&c.credential_id),
                "name": c.friendly_name,
                "created_at": c.created_at,
                "last_used_at": c.last_used_at
            })
        })
        .collect();

    Ok(Json(json!({
        "id": user.id,
        "username": user.username,
        "display_name": user.display_name,
        "registration_status": user.registration_status,
        "registered_at": user.registered_at,
        "completed_at": user.completed_at,
        "credentials": credentials
    })))
}

/// Delete a user
///
/// ## Route
/// DELETE /api/users/{id}
///
/// ## Authorization
/// - **Pending** users can be deleted by id alone; this is how a client cleans
///   up after an abandoned registration
/// - **Completed** users can only be deleted from their own session
///
/// ## Errors
/// - 404: no such user
/// - 401: completed user without a matching session
/// - 502: the identity provider account could not be deleted (user kept)
pub async fn delete_user(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let user = users::find_by_id(&state.db, &id).await?;

    if user.is_completed() {
        let session_user = session_user_id(&session).await?;
        if session_user.as_deref() != Some(user.id.as_str()) {
            return Err(AppError::Unauthorized(
                "Only the user themselves can delete a registered account".to_string(),
            ));
        }
    }

    let deleted = registration::delete_registration(&state, &user.id).await?;

    if deleted.is_completed() {
        session
            .delete()
            .await
            .map_err(|e| AppError::Internal(format!("Session error: {}", e)))?;
    }

    Ok(Json(json!({
        "success": true,
        "user_id": deleted.id,
        "message": "User deleted"
    })))
}
