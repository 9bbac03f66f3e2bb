//! # Application State
//!
//! This module defines the shared state that's accessible to all request handlers.
//! In Axum, state is how you share resources (database connections, configuration, etc.)
//! across different parts of your application.
//!
//! ## The State Pattern
//! Instead of creating new database connections for each request, we:
//! 1. Create a connection pool once at startup
//! 2. Store it in AppState
//! 3. Share it across all request handlers
//! 4. Axum clones the state for each request (cheap because we use Arc)
//!
//! Collaborators sit behind trait objects so tests can swap in fakes.

use crate::config::Config;
use crate::db;
use crate::identity::{IdentityProvisioningClient, KeycloakAdmin};
use crate::roles::{RolePolicy, StaticRolePolicy};
use crate::webauthn::challenge_cache::{ChallengeStore, InMemoryChallengeCache};
use crate::webauthn::verifier::{CredentialVerifier, WebauthnVerifier};
use anyhow::Result;
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared application state
///
/// ## Thread Safety
/// `SqlitePool` and every `Arc<dyn Trait + Send + Sync>` here can be shared
/// across async tasks, and cloning only copies pointers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,

    /// Generates challenges and verifies authenticator responses
    pub verifier: Arc<dyn CredentialVerifier>,

    /// Outstanding registration challenges, keyed by username
    pub registration_challenges: Arc<dyn ChallengeStore>,

    /// Outstanding login challenges, keyed by username
    pub authentication_challenges: Arc<dyn ChallengeStore>,

    /// Identity provider account and role operations
    pub provisioning: Arc<IdentityProvisioningClient>,

    /// Roles given to newly registered users
    pub roles: Arc<dyn RolePolicy>,
}

impl AppState {
    /// Initialize application state
    ///
    /// This function:
    /// 1. Connects to the SQLite database and runs migrations
    /// 2. Configures WebAuthn with the relying party information
    /// 3. Builds the Keycloak admin client
    ///
    /// `shutdown` is cancelled when the server stops; it cuts retry waits short.
    ///
    /// # Errors
    /// Returns an error if:
    /// - Database connection or migrations fail
    /// - WebAuthn configuration is invalid (e.g., malformed URL)
    /// - The Keycloak server URL is invalid
    pub async fn new(config: &Config, shutdown: CancellationToken) -> Result<Self> {
        let db = db::connect(&config.database_url).await?;

        let verifier = WebauthnVerifier::new(
            &config.rp_id,
            &config.rp_origin,
            &config.rp_name,
            config.authenticator_attachment.clone(),
        )?;

        let keycloak = KeycloakAdmin::new(&config.keycloak)?;
        let provisioning =
            IdentityProvisioningClient::new(Arc::new(keycloak), config.provisioning_retry, shutdown);

        Ok(AppState {
            db,
            verifier: Arc::new(verifier),
            registration_challenges: Arc::new(InMemoryChallengeCache::new(config.challenge_ttl)),
            authentication_challenges: Arc::new(InMemoryChallengeCache::new(config.challenge_ttl)),
            provisioning: Arc::new(provisioning),
            roles: Arc::new(StaticRolePolicy::new(config.default_roles.clone())),
        })
    }
}
