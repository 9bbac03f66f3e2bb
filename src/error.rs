//! # Error Handling
//!
//! This module defines the application error type and converts it into HTTP
//! responses.
//!
//! ## Error Taxonomy
//! - **Validation** (`BadRequest`, `NotFound`, `Conflict`): returned immediately,
//!   nothing was changed
//! - **ChallengeExpired**: no pending challenge for the user; the client must
//!   start the ceremony again
//! - **Verification**: the authenticator response did not verify; never retried
//! - **Provisioning / RoleAssignment**: the identity provider failed after the
//!   credential was saved; the registration flow has already rolled back
//! - **IdentityDeletion**: the identity provider account could not be removed,
//!   so the local user was kept
//!
//! Failures of rollback steps are only logged. The caller always sees the
//! error that caused the rollback.

use crate::identity::IdentityError;
use crate::webauthn::verifier::VerificationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-wide error type
///
/// The `#[from]` attributes let `?` convert library errors into `AppError`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Database errors (SQLx library errors)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Resource not found errors (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request errors (400)
    ///
    /// Used when client sends invalid data (blank fields, malformed ids)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Uniqueness conflicts (409), e.g. a username that is already taken
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Authentication/authorization errors (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// No pending challenge matches the finish request (410)
    #[error("Challenge expired: {0}")]
    ChallengeExpired(String),

    /// The authenticator response failed WebAuthn verification (400)
    #[error("Verification failed: {0}")]
    Verification(#[from] VerificationError),

    /// The identity provider account could not be created (502)
    #[error("Identity provisioning failed: {0}")]
    Provisioning(#[source] IdentityError),

    /// Default roles could not be assigned (502)
    #[error("Role assignment failed: {0}")]
    RoleAssignment(#[source] IdentityError),

    /// The identity provider account could not be deleted (502)
    #[error("Identity deletion failed: {0}")]
    IdentityDeletion(#[source] IdentityError),

    /// Internal server errors (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code sent as `kind` in error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "validation",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::ChallengeExpired(_) => "challenge_expired",
            AppError::Verification(_) => "verification_failed",
            AppError::Provisioning(_) => "provisioning_failed",
            AppError::RoleAssignment(_) => "role_assignment_failed",
            AppError::IdentityDeletion(_) => "identity_deletion_failed",
            AppError::Database(_) | AppError::Serialization(_) | AppError::Internal(_) => {
                "internal"
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::Verification(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::ChallengeExpired(_) => StatusCode::GONE,
            AppError::Provisioning(_)
            | AppError::RoleAssignment(_)
            | AppError::IdentityDeletion(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Serialization(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Convert AppError into an HTTP response
///
/// Internal details are logged; the body only carries a safe message and the
/// error kind: `{ "error": "...", "kind": "..." }`.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let error_message = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "Database error".to_string()
            }
            AppError::Serialization(e) => {
                tracing::error!("Serialization error: {:?}", e);
                "Serialization error".to_string()
            }
            AppError::Verification(e) => {
                tracing::warn!("WebAuthn verification error: {}", e);
                "Authentication error".to_string()
            }
            AppError::Provisioning(e) | AppError::RoleAssignment(e) | AppError::IdentityDeletion(e) => {
                tracing::error!(kind = self.kind(), "Identity provider error: {}", e);
                match &self {
                    AppError::Provisioning(_) => "Could not provision identity, please try again",
                    AppError::RoleAssignment(_) => "Could not assign roles, please try again",
                    _ => "Could not delete identity, please try again",
                }
                .to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            // For these errors, the custom message is safe to show to users
            AppError::NotFound(_)
            | AppError::BadRequest(_)
            | AppError::Conflict(_)
            | AppError::Unauthorized(_)
            | AppError::ChallengeExpired(_) => self.to_string(),
        };

        let body = Json(json!({
            "error": error_message,
            "kind": self.kind(),
        }));

        (self.status(), body).into_response()
    }
}

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_registration_failures_map_to_distinct_statuses() {
        let cases = [
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST, "validation"),
            (AppError::Conflict("x".into()), StatusCode::CONFLICT, "conflict"),
            (AppError::ChallengeExpired("x".into()), StatusCode::GONE, "challenge_expired"),
            (
                AppError::Verification(VerificationError::Rejected("bad signature".into())),
                StatusCode::BAD_REQUEST,
                "verification_failed",
            ),
            (
                AppError::Provisioning(IdentityError::Unavailable("down".into())),
                StatusCode::BAD_GATEWAY,
                "provisioning_failed",
            ),
            (
                AppError::RoleAssignment(IdentityError::RoleNotFound("admin".into())),
                StatusCode::BAD_GATEWAY,
                "role_assignment_failed",
            ),
        ];

        for (err, status, kind) in cases {
            assert_eq!(err.status(), status, "{err}");
            assert_eq!(err.kind(), kind, "{err}");
        }
    }

    #[tokio::test]
    async fn internal_details_are_not_leaked() {
        let response = AppError::Internal("secret stack trace".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(body["error"], "Internal server error");
        assert_eq!(body["kind"], "internal");
    }
}
