//! # Database Models
//!
//! This module defines the data structures that map to database tables.
//!
//! ## Key Concepts
//! - **Registration status**: a user row exists from the first registration
//!   step on, but only counts as registered once it is `COMPLETED`
//! - **User handle**: random bytes given to authenticators instead of the
//!   username, so the authenticator never learns who the user is
//! - **UUIDs**: user primary keys are random UUID v4 strings

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Length of the random user handle in bytes
pub const USER_HANDLE_LEN: usize = 32;

/// Where a user is in the registration flow
///
/// Stored as text: `PENDING` or `COMPLETED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationStatus {
    /// Passkey not yet verified, no identity provider account yet
    Pending,
    /// Passkey verified, account provisioned and roles assigned
    Completed,
}

/// User account information
///
/// ## Invariants
/// - `username` is unique and never changes
/// - `handle` is unique and never reused
/// - `external_identity_id` is set exactly when the status is `COMPLETED`
///
/// ## Why Strings for dates?
/// SQLite stores timestamps as text (RFC3339 format)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Unique identifier (UUID v4)
    pub id: String,

    /// Unique username, used for login/lookup
    pub username: String,

    /// Human-readable display name shown during passkey creation
    pub display_name: String,

    /// Opaque WebAuthn user handle (never sent in API responses)
    #[serde(skip)]
    pub handle: Vec<u8>,

    /// Account id in the identity provider, set on completion
    pub external_identity_id: Option<String>,

    pub registration_status: RegistrationStatus,

    /// When the registration was started (RFC3339 timestamp)
    pub registered_at: String,

    /// When the registration completed (RFC3339 timestamp)
    pub completed_at: Option<String>,

    pub updated_at: String,
}

impl User {
    /// Create a new pending user with generated ID, handle and timestamps
    pub fn new(username: String, display_name: String) -> Self {
        let now = Utc::now().to_rfc3339();

        Self {
            id: Uuid::new_v4().to_string(),
            username,
            display_name,
            handle: generate_handle(),
            external_identity_id: None,
            registration_status: RegistrationStatus::Pending,
            registered_at: now.clone(),
            completed_at: None,
            updated_at: now,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.registration_status == RegistrationStatus::Completed
    }
}

/// Fresh random user handle
///
/// Random rather than derived from the username or id, so authenticators
/// cannot link it back to the account.
pub fn generate_handle() -> Vec<u8> {
    rand::random::<[u8; USER_HANDLE_LEN]>().to_vec()
}

/// Passkey credential stored for a user
///
/// ## What is stored?
/// - **Public Key**: the serialized passkey, including the COSE public key
/// - **Signature Count**: last counter reported by the authenticator
/// - **Friendly Name**: label chosen by the user ("my phone")
///
/// ## Security Note
/// We only store the PUBLIC key, never the private key.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PasskeyCredential {
    /// Credential identifier chosen by the authenticator
    pub credential_id: Vec<u8>,

    /// ID of the user who owns this credential
    pub user_id: String,

    /// Serialized public key and passkey metadata
    pub public_key: Vec<u8>,

    /// Signature counter, used to detect cloned authenticators
    pub signature_count: i64,

    pub friendly_name: Option<String>,

    /// When the credential was created (RFC3339 timestamp)
    pub created_at: String,

    /// When the credential was last used for authentication
    pub last_used_at: Option<String>,
}

impl PasskeyCredential {
    pub fn new(
        credential_id: Vec<u8>,
        user_id: String,
        public_key: Vec<u8>,
        signature_count: u32,
        friendly_name: Option<String>,
    ) -> Self {
        Self {
            credential_id,
            user_id,
            public_key,
            signature_count: i64::from(signature_count),
            friendly_name,
            created_at: Utc::now().to_rfc3339(),
            last_used_at: None,
        }
    }
}
