//! # Keycloak Admin Client
//!
//! [`IdentityProvider`] backed by the Keycloak admin REST API.
//!
//! ## Authentication
//! The server authenticates as a confidential client using the
//! `client_credentials` grant. The admin token is cached and renewed once less
//! than [`TOKEN_RENEWAL_MARGIN`] of its lifetime is left, so a token never
//! expires halfway through a request.
//!
//! ## Endpoints used
//! - `POST /realms/{realm}/protocol/openid-connect/token`
//! - `GET /admin/realms/{realm}/users?username=..&exact=true`
//! - `POST /admin/realms/{realm}/users`
//! - `DELETE /admin/realms/{realm}/users/{id}`
//! - `GET /admin/realms/{realm}/roles/{name}`
//! - `POST /admin/realms/{realm}/users/{id}/role-mappings/realm`

use super::{IdentityError, IdentityProvider, RoleRepresentation};
use crate::config::KeycloakConfig;
use async_trait::async_trait;
use reqwest::header::LOCATION;
use reqwest::{Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use url::Url;

/// Renew the admin token when less than this much lifetime remains
pub const TOKEN_RENEWAL_MARGIN: Duration = Duration::from_secs(30);

pub struct KeycloakAdmin {
    http: reqwest::Client,
    base_url: Url,
    realm: String,
    client_id: String,
    client_secret: SecretString,
    token: Mutex<Option<AdminToken>>,
}

struct AdminToken {
    access_token: SecretString,
    expires_at: Instant,
}

impl AdminToken {
    fn is_fresh(&self) -> bool {
        self.expires_at.saturating_duration_since(Instant::now()) >= TOKEN_RENEWAL_MARGIN
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct UserRepresentation {
    id: String,
    username: String,
}

impl KeycloakAdmin {
    pub fn new(config: &KeycloakConfig) -> Result<Self, IdentityError> {
        let base_url = Url::parse(&config.server_url)
            .map_err(|e| IdentityError::InvalidConfiguration(format!("server url: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(IdentityError::InvalidConfiguration(format!(
                "server url '{}' cannot be used as a base",
                config.server_url
            )));
        }

        let http = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            http,
            base_url,
            realm: config.realm.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            token: Mutex::new(None),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn admin_endpoint(&self, segments: &[&str]) -> Url {
        let mut all = vec!["admin", "realms", self.realm.as_str()];
        all.extend_from_slice(segments);
        self.endpoint(&all)
    }

    /// Cached admin token, fetched again when close to expiry
    async fn access_token(&self) -> Result<String, IdentityError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            tracing::debug!("Using cached admin token");
            return Ok(token.access_token.expose_secret().to_string());
        }

        let url = self.endpoint(&[
            "realms",
            self.realm.as_str(),
            "protocol",
            "openid-connect",
            "token",
        ]);
        let response = self
            .http
            .post(url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret()),
            ])
            .send()
            .await?;
        let body: TokenResponse = expect_success(response, "token request").await?.json().await?;

        tracing::info!(expires_in = body.expires_in, "Obtained admin token");
        let access_token = body.access_token.clone();
        *cached = Some(AdminToken {
            access_token: SecretString::from(body.access_token),
            expires_at: Instant::now() + Duration::from_secs(body.expires_in),
        });
        Ok(access_token)
    }
}

async fn expect_success(
    response: Response,
    operation: &'static str,
) -> Result<Response, IdentityError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(IdentityError::Status {
        operation,
        status: status.as_u16(),
        body,
    })
}

/// Last path segment of the `Location` header Keycloak sets on create
fn created_id(response: &Response) -> Option<String> {
    response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|location| location.trim_end_matches('/').rsplit('/').next())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl IdentityProvider for KeycloakAdmin {
    async fn find_user_id(&self, username: &str) -> Result<Option<String>, IdentityError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(self.admin_endpoint(&["users"]))
            .bearer_auth(&token)
            .query(&[("username", username), ("exact", "true")])
            .send()
            .await?;
        let users: Vec<UserRepresentation> =
            expect_success(response, "user lookup").await?.json().await?;

        // Keycloak stores usernames lowercased
        Ok(users
            .into_iter()
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .map(|u| u.id))
    }

    async fn create_user(&self, username: &str) -> Result<String, IdentityError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(self.admin_endpoint(&["users"]))
            .bearer_auth(&token)
            .json(&json!({ "username": username, "enabled": true }))
            .send()
            .await?;

        // An earlier attempt may have created the account before failing
        if response.status() == StatusCode::CONFLICT {
            tracing::info!(username, "Account already exists, resolving id");
        } else {
            let response = expect_success(response, "user creation").await?;
            if let Some(id) = created_id(&response) {
                return Ok(id);
            }
        }

        self.find_user_id(username).await?.ok_or_else(|| {
            IdentityError::MalformedResponse(format!("id of created account '{username}'"))
        })
    }

    async fn delete_user(&self, external_id: &str) -> Result<(), IdentityError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .delete(self.admin_endpoint(&["users", external_id]))
            .bearer_auth(&token)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(IdentityError::UserNotFound(external_id.to_string()));
        }
        expect_success(response, "user deletion").await?;
        Ok(())
    }

    async fn find_realm_role(&self, role_name: &str) -> Result<RoleRepresentation, IdentityError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(self.admin_endpoint(&["roles", role_name]))
            .bearer_auth(&token)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(IdentityError::RoleNotFound(role_name.to_string()));
        }
        Ok(expect_success(response, "role lookup").await?.json().await?)
    }

    async fn add_realm_role_mappings(
        &self,
        external_id: &str,
        roles: &[RoleRepresentation],
    ) -> Result<(), IdentityError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(self.admin_endpoint(&["users", external_id, "role-mappings", "realm"]))
            .bearer_auth(&token)
            .json(roles)
            .send()
            .await?;
        expect_success(response, "role mapping").await?;
        Ok(())
    }
}
