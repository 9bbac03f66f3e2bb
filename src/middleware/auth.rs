//! # Authentication Middleware
//!
//! Rejects requests without a logged-in session before they reach the handler.

use crate::error::AppError;
use crate::handlers::session_user_id;
use axum::{
    extract::Request,
    middleware::Next,
    response::Response,
};
use tower_sessions::Session;

/// Require a session with a user id
///
/// ## Usage
/// ```rust,ignore
/// Router::new()
///     .route("/api/users/me", get(get_current_user))
///     .layer(axum_middleware::from_fn(require_auth))
/// ```
pub async fn require_auth(
    session: Session,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    match session_user_id(&session).await? {
        Some(_) => Ok(next.run(request).await),
        None => Err(AppError::Unauthorized("Not authenticated".to_string())),
    }
}
