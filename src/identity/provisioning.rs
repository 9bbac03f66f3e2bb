//! # Identity Provisioning Client
//!
//! Façade over an [`IdentityProvider`] used by the registration flow.
//!
//! ## Guarantees
//! - `create_with_retry` looks the username up first and never creates a
//!   second account for it
//! - `assign_roles` resolves every role before assigning any of them, then
//!   assigns them in one call
//! - deletes treat an already missing account as success
//!
//! Only account creation is retried. Role assignment runs after the account
//! exists and a failure there is rolled back by the caller instead.

use super::{IdentityError, IdentityProvider, RoleRepresentation};
use crate::retry::{self, RetryPolicy};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct IdentityProvisioningClient {
    provider: Arc<dyn IdentityProvider>,
    retry_policy: RetryPolicy,
    shutdown: CancellationToken,
}

impl IdentityProvisioningClient {
    /// `shutdown` aborts retry waits when the server stops.
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        retry_policy: RetryPolicy,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            provider,
            retry_policy,
            shutdown,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy
    }

    /// Account id for `username`, if the identity provider has one
    ///
    /// The single lookup behind `exists`, the idempotency check of
    /// `create_with_retry` and `delete_user_by_username`.
    async fn lookup(&self, username: &str) -> Result<Option<String>, IdentityError> {
        let found = self.provider.find_user_id(username).await?;
        tracing::debug!(username, exists = found.is_some(), "Checked identity provider account");
        Ok(found)
    }

    pub async fn exists(&self, username: &str) -> Result<bool, IdentityError> {
        Ok(self.lookup(username).await?.is_some())
    }

    /// Return the account id for `username`, creating the account if needed
    pub async fn create_with_retry(&self, username: &str) -> Result<String, IdentityError> {
        // An account left by an earlier run is reused, never duplicated
        if let Some(external_id) = self.lookup(username).await? {
            tracing::info!(username, %external_id, "Account already exists, skipping creation");
            return Ok(external_id);
        }

        // Only the create call is retried; a failed lookup above is returned as is
        let provider = &self.provider;
        let external_id = retry::execute(
            self.retry_policy,
            &self.shutdown,
            "create_identity",
            || provider.create_user(username),
        )
        .await?;

        tracing::info!(username, %external_id, "Created identity provider account");
        Ok(external_id)
    }

    /// Assign all of `role_names` or none of them
    pub async fn assign_roles(
        &self,
        external_id: &str,
        role_names: &[String],
    ) -> Result<(), IdentityError> {
        if role_names.is_empty() {
            tracing::warn!(external_id, "No roles to assign");
            return Ok(());
        }

        // Resolve every role first so an unknown one assigns nothing
        let mut roles: Vec<RoleRepresentation> = Vec::with_capacity(role_names.len());
        for name in role_names {
            let role = self.provider.find_realm_role(name).await.map_err(|e| {
                tracing::error!(external_id, role = %name, error = %e, "Failed to resolve role");
                e
            })?;
            tracing::debug!(role = %role.name, role_id = %role.id, "Prepared role for assignment");
            roles.push(role);
        }

        // One call for all roles
        self.provider
            .add_realm_role_mappings(external_id, &roles)
            .await?;

        tracing::info!(external_id, count = roles.len(), "Assigned roles");
        Ok(())
    }

    pub async fn delete_user(&self, external_id: &str) -> Result<(), IdentityError> {
        match self.provider.delete_user(external_id).await {
            Ok(()) => {
                tracing::info!(external_id, "Deleted identity provider account");
                Ok(())
            }
            Err(e) if e.is_user_not_found() => {
                tracing::info!(external_id, "Identity provider account already absent");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(external_id, error = %e, "Failed to delete identity provider account");
                Err(e)
            }
        }
    }

    pub async fn delete_user_by_username(&self, username: &str) -> Result<(), IdentityError> {
        match self.lookup(username).await {
            Ok(Some(external_id)) => self.delete_user(&external_id).await,
            Ok(None) => {
                tracing::info!(username, "No identity provider account to delete");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(username, error = %e, "Failed to look up account for deletion");
                Err(e)
            }
        }
    }
}
