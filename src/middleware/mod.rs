//! Request guards layered onto individual routes.
//!
//! CORS, tracing and the session layer are applied to the whole router in
//! [`crate::app::build_router`]. Guards here run per route.
//!
//! - `auth`: rejects requests whose session carries no logged-in user. Only
//!   COMPLETED users ever get a session, so a guarded handler can assume the
//!   account is fully provisioned.

pub mod auth;
