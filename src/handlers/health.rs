//! # Health Check Handlers
//!
//! Liveness and readiness endpoints for load balancers and monitoring.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

/// Health check endpoint
///
/// ## Route
/// GET /health
///
/// ## Response
/// ```json
/// {
///   "status": "healthy",
///   "service": "passkey-provisioning"
/// }
/// ```
///
/// ## Why not return AppResult?
/// This handler never fails, so we return Json<Value> directly
/// instead of AppResult<Json<Value>>
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "passkey-provisioning"
    }))
}

/// Readiness check endpoint
///
/// Returns 503 Service Unavailable if the database is not reachable.
/// The identity provider is not checked here; registration reports its failures.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match sqlx::query("SELECT 1").fetch_one(&state.db).await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
