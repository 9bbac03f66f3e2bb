//! # Passkey Ceremonies
//!
//! Registration and login, each split into a start call that issues a
//! challenge and a finish call that consumes it.
//!
//! ## Submodules
//! - `verifier`: issues challenges and checks authenticator responses (webauthn-rs)
//! - `challenge_cache`: single-use challenges with a TTL, keyed by username
//! - `registration`: the registration saga and account deletion
//! - `authentication`: login against stored credentials
//! - `types`: JSON bodies of the endpoints
//!
//! ## Registration states
//!
//! ```text
//! start:  INITIATED ─► LOCAL_USER_PENDING ─► CHALLENGE_ISSUED
//! finish: CREDENTIAL_VERIFIED ─► IDENTITY_PROVISIONED ─► ROLES_ASSIGNED ─► COMPLETED
//! ```
//!
//! Any failing step moves the run to FAILED and undoes the earlier steps
//! newest first. The stored user row only records PENDING or COMPLETED.
//! Only a COMPLETED user can log in. The identity provider account exists
//! exactly when the user is COMPLETED, apart from a final database write
//! failure which is logged for reconciliation.

pub mod authentication;
pub mod challenge_cache;
pub mod registration;
pub mod types;
pub mod verifier;
