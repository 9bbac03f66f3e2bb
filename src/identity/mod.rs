//! # Identity Provider Integration
//!
//! Verified users get a matching account in an external identity provider
//! (Keycloak) plus a default set of realm roles.
//!
//! ## Submodules
//! - `keycloak`: [`IdentityProvider`] implementation over the Keycloak admin REST API
//! - `provisioning`: [`IdentityProvisioningClient`], the idempotent, retrying
//!   façade the registration flow talks to
//!
//! The provider trait is the seam between the registration flow and the
//! remote system, so tests can swap in an in-memory provider.

pub mod keycloak;
pub mod provisioning;

pub use keycloak::KeycloakAdmin;
pub use provisioning::IdentityProvisioningClient;

use crate::retry::RetryError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Realm role as the identity provider represents it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRepresentation {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("identity provider returned {status} for {operation}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("account '{0}' not found in identity provider")]
    UserNotFound(String),

    #[error("role '{0}' not found in identity provider")]
    RoleNotFound(String),

    #[error("identity provider response missing {0}")]
    MalformedResponse(String),

    #[error("invalid identity provider configuration: {0}")]
    InvalidConfiguration(String),

    #[error("identity provider unavailable: {0}")]
    Unavailable(String),

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<IdentityError>,
    },

    #[error("cancelled after {attempts} attempts: {last}")]
    Cancelled {
        attempts: u32,
        #[source]
        last: Box<IdentityError>,
    },
}

impl IdentityError {
    /// True when the account the operation targeted does not exist
    pub fn is_user_not_found(&self) -> bool {
        matches!(self, IdentityError::UserNotFound(_))
    }
}

impl From<RetryError<IdentityError>> for IdentityError {
    fn from(err: RetryError<IdentityError>) -> Self {
        match err {
            RetryError::Exhausted { attempts, last } => IdentityError::Exhausted {
                attempts,
                last: Box::new(last),
            },
            RetryError::Cancelled { attempts, last } => IdentityError::Cancelled {
                attempts,
                last: Box::new(last),
            },
        }
    }
}

/// Black-box operations consumed from the identity provider
///
/// Implementations report a missing account on delete as
/// [`IdentityError::UserNotFound`] and an unknown role as
/// [`IdentityError::RoleNotFound`].
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Id of the account with this username, if there is one
    async fn find_user_id(&self, username: &str) -> Result<Option<String>, IdentityError>;

    /// Create an enabled account and return its id
    async fn create_user(&self, username: &str) -> Result<String, IdentityError>;

    async fn delete_user(&self, external_id: &str) -> Result<(), IdentityError>;

    async fn find_realm_role(&self, role_name: &str) -> Result<RoleRepresentation, IdentityError>;

    /// Add all `roles` to the account in one call
    async fn add_realm_role_mappings(
        &self,
        external_id: &str,
        roles: &[RoleRepresentation],
    ) -> Result<(), IdentityError>;
}
