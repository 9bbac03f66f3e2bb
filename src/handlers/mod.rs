//! # HTTP Request Handlers
//!
//! This module contains all the HTTP route handlers (controllers).
//! Each handler processes a specific API endpoint.
//!
//! ## Submodules
//! - `health`: Liveness and readiness endpoints (for monitoring)
//! - `auth`: Registration, login, logout and session endpoints
//! - `users`: Current user profile and user deletion
//!
//! ## Handler Pattern
//! Handlers are async functions that:
//! 1. Extract data from request (path params, JSON body, session)
//! 2. Call business logic (registration flow, database operations)
//! 3. Return a response (JSON, status code)
//!
//! Errors are returned as `AppError`, which renders
//! `{"error": ..., "kind": ...}` with the matching status code.

pub mod auth;
pub mod health;
pub mod users;

use crate::error::AppError;
use tower_sessions::Session;

/// Session key holding the logged-in user's id
pub const SESSION_USER_ID: &str = "user_id";

pub(crate) async fn session_user_id(session: &Session) -> Result<Option<String>, AppError> {
    session
        .get(SESSION_USER_ID)
        .await
        .map_err(|e| AppError::Internal(format!("Session error: {}", e)))
}
