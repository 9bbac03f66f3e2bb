//! # Router
//!
//! Routes and middleware layers. Kept apart from `main` so integration tests
//! can drive the same router with an in-memory session store.

use crate::handlers::auth::*;
use crate::handlers::health::{health_check, readiness};
use crate::handlers::users::{delete_user, get_current_user};
use crate::middleware;
use crate::state::AppState;
use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, SessionManagerLayer, SessionStore};

/// Build the application router
///
/// Sessions expire after `session_inactivity` without a request.
pub fn build_router<S>(state: AppState, session_store: S, session_inactivity: Duration) -> Router
where
    S: SessionStore + Clone,
{
    let session_layer = SessionManagerLayer::new(session_store)
        .with_expiry(Expiry::OnInactivity(session_inactivity));

    // In production, restrict this to specific origins
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Any unauthenticated request here gets 401 Unauthorized
    let protected_routes = Router::new()
        .route("/api/users/me", get(get_current_user))
        .layer(axum_middleware::from_fn(middleware::auth::require_auth))
        .with_state(state.clone());

    Router::new()
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness))
        // Registration flow (creating a passkey and the identity account)
        .route("/api/auth/register/start", post(register_start))
        .route("/api/auth/register/reissue", post(register_reissue))
        .route("/api/auth/register/finish", post(register_finish))
        // Authentication flow (logging in with a passkey)
        .route("/api/auth/authenticate/start", post(authenticate_start))
        .route("/api/auth/authenticate/finish", post(authenticate_finish))
        // Session management
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/session", get(session_info))
        // Pending users may be removed without a session; see the handler
        .route("/api/users/{id}", delete(delete_user))
        .merge(protected_routes)
        // Applied in reverse order
        .layer(session_layer)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
