//! # Configuration Management
//!
//! This module handles loading configuration from environment variables.
//! It uses the "12-factor app" methodology where configuration comes from the environment.
//!
//! ## Environment Variables
//! - `HOST`, `PORT`: Server bind address (default: 127.0.0.1:8080)
//! - `DATABASE_URL`: SQLite database connection string
//! - `RP_ID`, `RP_ORIGIN`, `RP_NAME`: WebAuthn Relying Party settings
//! - `AUTHENTICATOR_ATTACHMENT`: `cross-platform` (default), `platform` or `any`
//! - `CHALLENGE_TTL_SECS`: How long an issued challenge stays usable (default: 300)
//! - `KEYCLOAK_SERVER_URL`, `KEYCLOAK_REALM`: Identity provider location
//! - `KEYCLOAK_CLIENT_ID`, `KEYCLOAK_CLIENT_SECRET`: Admin client credentials
//! - `KEYCLOAK_TIMEOUT_SECS`: Per-request timeout for admin calls (default: 10)
//! - `PROVISION_MAX_ATTEMPTS`, `PROVISION_BASE_DELAY_MS`: Account creation retry budget
//! - `DEFAULT_ROLES`: Comma-separated realm roles given to every new user
//! - `SESSION_INACTIVITY_HOURS`: Session lifetime without activity (default: 24)

use crate::retry::RetryPolicy;
use anyhow::{bail, Context, Result};
use secrecy::SecretString;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use webauthn_rs_proto::AuthenticatorAttachment;

/// Application configuration
///
/// ## WebAuthn Terminology
/// - **RP (Relying Party)**: Your application/website that relies on authentication
/// - **RP ID**: Your domain name (e.g., "example.com" or "localhost")
/// - **RP Origin**: Full URL of your application (e.g., "https://example.com")
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host/IP address to bind to
    pub host: String,

    /// Server port number (1-65535)
    pub port: u16,

    /// SQLite database connection URL
    /// Format: "sqlite:filename.db?mode=rwc"
    pub database_url: String,

    /// WebAuthn Relying Party ID (domain without protocol or port)
    pub rp_id: String,

    /// WebAuthn Relying Party Origin (full URL including protocol)
    pub rp_origin: String,

    /// Human-readable name shown to users during passkey creation
    pub rp_name: String,

    /// Which authenticators may be used for registration
    /// `None` lets the browser offer any authenticator
    pub authenticator_attachment: Option<AuthenticatorAttachment>,

    /// Lifetime of an issued, not yet consumed challenge
    pub challenge_ttl: Duration,

    /// Identity provider admin API settings
    pub keycloak: KeycloakConfig,

    /// Retry budget for identity provider account creation
    pub provisioning_retry: RetryPolicy,

    /// Realm roles assigned to every newly registered user
    pub default_roles: Vec<String>,

    /// Session expiry after this many hours of inactivity
    pub session_inactivity_hours: i64,
}

/// Keycloak admin client settings
///
/// Implements `Debug` manually to redact the client secret.
#[derive(Clone)]
pub struct KeycloakConfig {
    /// Base URL of the Keycloak server, e.g. "http://localhost:8180"
    pub server_url: String,
    /// Realm the users are provisioned into
    pub realm: String,
    /// Confidential client allowed to manage users (service account)
    pub client_id: String,
    pub client_secret: SecretString,
    /// Per-request timeout
    pub timeout: Duration,
}

impl std::fmt::Debug for KeycloakConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeycloakConfig")
            .field("server_url", &self.server_url)
            .field("realm", &self.realm)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Loads `.env` first if present (dotenvy doesn't error if the file is missing).
    ///
    /// ## Example .env file
    /// ```text
    /// PORT=8080
    /// DATABASE_URL=sqlite:passkey.db?mode=rwc
    /// RP_ID=localhost
    /// RP_ORIGIN=http://localhost:8080
    /// KEYCLOAK_SERVER_URL=http://localhost:8180
    /// KEYCLOAK_REALM=myrealm
    /// KEYCLOAK_CLIENT_ID=passkey-server
    /// KEYCLOAK_CLIENT_SECRET=change-me
    /// DEFAULT_ROLES=user,reader
    /// ```
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    ///
    /// Missing keys fall back to defaults; present but unparsable values are
    /// an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let max_attempts: u32 = parse(&lookup, "PROVISION_MAX_ATTEMPTS", 3)?;
        let base_delay_ms: u64 = parse(&lookup, "PROVISION_BASE_DELAY_MS", 1000)?;
        if max_attempts == 0 {
            bail!("PROVISION_MAX_ATTEMPTS must be at least 1");
        }

        Ok(Config {
            host: var("HOST", "127.0.0.1"),
            port: parse(&lookup, "PORT", 8080)?,
            database_url: var("DATABASE_URL", "sqlite:passkey.db?mode=rwc"),
            rp_id: var("RP_ID", "localhost"),
            rp_origin: var("RP_ORIGIN", "http://localhost:8080"),
            rp_name: var("RP_NAME", "Passkey Demo"),
            authenticator_attachment: parse_attachment(&var(
                "AUTHENTICATOR_ATTACHMENT",
                "cross-platform",
            ))?,
            challenge_ttl: Duration::from_secs(parse(&lookup, "CHALLENGE_TTL_SECS", 300)?),
            keycloak: KeycloakConfig {
                server_url: var("KEYCLOAK_SERVER_URL", "http://localhost:8180"),
                realm: var("KEYCLOAK_REALM", "myrealm"),
                client_id: var("KEYCLOAK_CLIENT_ID", "passkey-server"),
                client_secret: SecretString::from(var("KEYCLOAK_CLIENT_SECRET", "")),
                timeout: Duration::from_secs(parse(&lookup, "KEYCLOAK_TIMEOUT_SECS", 10)?),
            },
            provisioning_retry: RetryPolicy::new(
                max_attempts,
                Duration::from_millis(base_delay_ms),
            ),
            default_roles: parse_role_list(&var("DEFAULT_ROLES", "user")),
            session_inactivity_hours: parse(&lookup, "SESSION_INACTIVITY_HOURS", 24)?,
        })
    }

    /// Get the socket address to bind the server to, e.g. "127.0.0.1:8080"
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: '{raw}'")),
        None => Ok(default),
    }
}

fn parse_attachment(raw: &str) -> Result<Option<AuthenticatorAttachment>> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "cross-platform" | "cross_platform" => Ok(Some(AuthenticatorAttachment::CrossPlatform)),
        "platform" => Ok(Some(AuthenticatorAttachment::Platform)),
        "any" | "" => Ok(None),
        other => bail!("invalid value for AUTHENTICATOR_ATTACHMENT: '{other}'"),
    }
}

/// Split a comma-separated role list, dropping blanks and duplicates
pub fn parse_role_list(raw: &str) -> Vec<String> {
    let mut roles: Vec<String> = Vec::new();
    for role in raw.split(',').map(str::trim).filter(|r| !r.is_empty()) {
        if !roles.iter().any(|r| r == role) {
            roles.push(role.to_string());
        }
    }
    roles
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = config_from(&[]).expect("defaults");

        assert_eq!(config.bind_address(), "127.0.0.1:8080");
        assert_eq!(config.challenge_ttl, Duration::from_secs(300));
        assert_eq!(config.provisioning_retry.max_attempts, 3);
        assert_eq!(config.provisioning_retry.initial_delay, Duration::from_secs(1));
        assert_eq!(config.default_roles, vec!["user".to_string()]);
        assert!(matches!(
            config.authenticator_attachment,
            Some(AuthenticatorAttachment::CrossPlatform)
        ));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config_from(&[
            ("PORT", "9090"),
            ("PROVISION_MAX_ATTEMPTS", "5"),
            ("PROVISION_BASE_DELAY_MS", "250"),
            ("DEFAULT_ROLES", "user, reader,,user"),
            ("AUTHENTICATOR_ATTACHMENT", "any"),
            ("KEYCLOAK_REALM", "prod"),
        ])
        .expect("valid");

        assert_eq!(config.port, 9090);
        assert_eq!(config.provisioning_retry.max_attempts, 5);
        assert_eq!(config.provisioning_retry.initial_delay, Duration::from_millis(250));
        assert_eq!(config.default_roles, vec!["user".to_string(), "reader".to_string()]);
        assert!(config.authenticator_attachment.is_none());
        assert_eq!(config.keycloak.realm, "prod");
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(config_from(&[("PORT", "eighty")]).is_err());
        assert!(config_from(&[("PROVISION_MAX_ATTEMPTS", "0")]).is_err());
        assert!(config_from(&[("AUTHENTICATOR_ATTACHMENT", "bluetooth")]).is_err());
    }

    #[test]
    fn empty_role_list_is_allowed() {
        let config = config_from(&[("DEFAULT_ROLES", " , ")]).expect("valid");
        assert!(config.default_roles.is_empty());
    }

    #[test]
    fn debug_output_redacts_the_client_secret() {
        let config = config_from(&[("KEYCLOAK_CLIENT_SECRET", "hunter2")]).expect("valid");
        let printed = format!("{:?}", config);
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("[REDACTED]"));
    }
}
