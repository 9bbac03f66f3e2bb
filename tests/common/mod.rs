#![allow(dead_code)]

use async_trait::async_trait;
use passkey_provisioning::db::{self, models::PasskeyCredential};
use passkey_provisioning::identity::{
    IdentityError, IdentityProvider, IdentityProvisioningClient, RoleRepresentation,
};
use passkey_provisioning::retry::RetryPolicy;
use passkey_provisioning::roles::StaticRolePolicy;
use passkey_provisioning::state::AppState;
use passkey_provisioning::webauthn::challenge_cache::InMemoryChallengeCache;
use passkey_provisioning::webauthn::verifier::{
    CredentialVerifier, IssuedChallenge, RegistrationSubject, VerificationError,
    VerifiedAssertion, VerifiedCredential,
};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

/// Verifier that trusts any response echoing the issued challenge
///
/// Ceremony state is `{"challenge": "..."}`. A response is
/// `{"challenge": "...", "credential_id": "...", "counter": n}`.
#[derive(Default)]
pub struct FakeVerifier {
    pub fail_issuance: AtomicBool,
}

impl FakeVerifier {
    fn issue(&self, options: Value, challenge: String) -> Result<IssuedChallenge, VerificationError> {
        if self.fail_issuance.load(Ordering::SeqCst) {
            return Err(VerificationError::Rejected("issuance disabled".into()));
        }
        Ok(IssuedChallenge {
            options,
            state: serde_json::to_vec(&json!({ "challenge": challenge })).expect("state"),
        })
    }

    fn check_challenge(state: &[u8], response: &Value) -> Result<(), VerificationError> {
        let state: Value = serde_json::from_slice(state)
            .map_err(|e| VerificationError::Malformed(e.to_string()))?;
        if state["challenge"] != response["challenge"] {
            return Err(VerificationError::Rejected("challenge mismatch".into()));
        }
        Ok(())
    }

    fn credential_id(response: &Value) -> Result<Vec<u8>, VerificationError> {
        response["credential_id"]
            .as_str()
            .map(|id| id.as_bytes().to_vec())
            .ok_or_else(|| VerificationError::Malformed("missing credential_id".into()))
    }
}

impl CredentialVerifier for FakeVerifier {
    fn start_registration(
        &self,
        subject: &RegistrationSubject,
    ) -> Result<IssuedChallenge, VerificationError> {
        let challenge = uuid::Uuid::new_v4().to_string();
        let options = json!({
            "publicKey": {
                "challenge": challenge,
                "user": { "name": subject.username, "displayName": subject.display_name }
            }
        });
        self.issue(options, challenge)
    }

    fn finish_registration(
        &self,
        state: &[u8],
        response: &Value,
    ) -> Result<VerifiedCredential, VerificationError> {
        Self::check_challenge(state, response)?;
        Ok(VerifiedCredential {
            credential_id: Self::credential_id(response)?,
            public_key: b"fake-public-key".to_vec(),
            signature_count: 0,
        })
    }

    fn start_assertion(
        &self,
        credentials: &[PasskeyCredential],
    ) -> Result<IssuedChallenge, VerificationError> {
        let challenge = uuid::Uuid::new_v4().to_string();
        let allowed: Vec<String> = credentials
            .iter()
            .map(|c| String::from_utf8_lossy(&c.credential_id).into_owned())
            .collect();
        let options = json!({
            "publicKey": { "challenge": challenge, "allowCredentials": allowed }
        });
        self.issue(options, challenge)
    }

    fn finish_assertion(
        &self,
        state: &[u8],
        response: &Value,
        _credentials: &[PasskeyCredential],
    ) -> Result<VerifiedAssertion, VerificationError> {
        Self::check_challenge(state, response)?;
        let counter = response["counter"].as_u64().unwrap_or(1);
        Ok(VerifiedAssertion {
            credential_id: Self::credential_id(response)?,
            signature_count: u32::try_from(counter).unwrap_or(u32::MAX),
            public_key: None,
        })
    }
}

/// Response the fake verifier accepts for the given start options
pub fn signed_response(options: &Value, credential_id: &str) -> Value {
    json!({
        "challenge": options["publicKey"]["challenge"],
        "credential_id": credential_id
    })
}

/// In-memory identity provider with failure switches and call counters
pub struct FakeIdentityProvider {
    accounts: Mutex<HashMap<String, String>>,
    known_roles: HashSet<String>,
    role_mappings: Mutex<HashMap<String, Vec<String>>>,
    next_id: AtomicU32,
    pub create_calls: AtomicU32,
    /// Number of upcoming create calls that fail as unavailable
    pub create_failures: AtomicU32,
    pub fail_role_mapping: AtomicBool,
    pub fail_delete: AtomicBool,
    pub delete_calls: AtomicU32,
}

impl FakeIdentityProvider {
    pub fn new(known_roles: &[&str]) -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            known_roles: known_roles.iter().map(|r| r.to_string()).collect(),
            role_mappings: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(1),
            create_calls: AtomicU32::new(0),
            create_failures: AtomicU32::new(0),
            fail_role_mapping: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            delete_calls: AtomicU32::new(0),
        }
    }

    pub fn account_id(&self, username: &str) -> Option<String> {
        self.accounts.lock().expect("lock").get(username).cloned()
    }

    pub fn account_count(&self) -> usize {
        self.accounts.lock().expect("lock").len()
    }

    pub fn roles_of(&self, external_id: &str) -> Vec<String> {
        self.role_mappings
            .lock()
            .expect("lock")
            .get(external_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Account that exists before any registration touched it
    pub fn seed_account(&self, username: &str) -> String {
        let id = format!("seed-{username}");
        self.accounts
            .lock()
            .expect("lock")
            .insert(username.to_string(), id.clone());
        id
    }

    /// Remove an account behind the server's back
    pub fn forget_account(&self, username: &str) {
        self.accounts.lock().expect("lock").remove(username);
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn find_user_id(&self, username: &str) -> Result<Option<String>, IdentityError> {
        Ok(self.account_id(username))
    }

    async fn create_user(&self, username: &str) -> Result<String, IdentityError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .create_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(IdentityError::Unavailable("keycloak restarting".into()));
        }

        let id = format!("kc-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.accounts
            .lock()
            .expect("lock")
            .insert(username.to_string(), id.clone());
        Ok(id)
    }

    async fn delete_user(&self, external_id: &str) -> Result<(), IdentityError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(IdentityError::Unavailable("delete refused".into()));
        }

        let mut accounts = self.accounts.lock().expect("lock");
        let before = accounts.len();
        accounts.retain(|_, id| id != external_id);
        if accounts.len() == before {
            return Err(IdentityError::UserNotFound(external_id.to_string()));
        }
        self.role_mappings.lock().expect("lock").remove(external_id);
        Ok(())
    }

    async fn find_realm_role(&self, role_name: &str) -> Result<RoleRepresentation, IdentityError> {
        if !self.known_roles.contains(role_name) {
            return Err(IdentityError::RoleNotFound(role_name.to_string()));
        }
        Ok(RoleRepresentation {
            id: format!("role-{role_name}"),
            name: role_name.to_string(),
        })
    }

    async fn add_realm_role_mappings(
        &self,
        external_id: &str,
        roles: &[RoleRepresentation],
    ) -> Result<(), IdentityError> {
        if self.fail_role_mapping.load(Ordering::SeqCst) {
            return Err(IdentityError::Unavailable("role mapping refused".into()));
        }
        self.role_mappings
            .lock()
            .expect("lock")
            .entry(external_id.to_string())
            .or_default()
            .extend(roles.iter().map(|r| r.name.clone()));
        Ok(())
    }
}

pub struct TestApp {
    pub state: AppState,
    pub verifier: Arc<FakeVerifier>,
    pub idp: Arc<FakeIdentityProvider>,
    pub shutdown: CancellationToken,
}

pub struct TestAppBuilder {
    retry: RetryPolicy,
    default_roles: Vec<String>,
    known_roles: Vec<&'static str>,
    challenge_ttl: Duration,
}

impl Default for TestAppBuilder {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::new(3, Duration::from_millis(1)),
            default_roles: vec!["user".into()],
            known_roles: vec!["user", "reader"],
            challenge_ttl: Duration::from_secs(60),
        }
    }
}

impl TestAppBuilder {
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn default_roles(mut self, roles: &[&str]) -> Self {
        self.default_roles = roles.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn challenge_ttl(mut self, ttl: Duration) -> Self {
        self.challenge_ttl = ttl;
        self
    }

    pub async fn build(self) -> TestApp {
        let db = db::connect_in_memory().await.expect("in-memory db");
        let verifier = Arc::new(FakeVerifier::default());
        let idp = Arc::new(FakeIdentityProvider::new(&self.known_roles));
        let shutdown = CancellationToken::new();

        let provisioning =
            IdentityProvisioningClient::new(idp.clone(), self.retry, shutdown.clone());

        let state = AppState {
            db,
            verifier: verifier.clone(),
            registration_challenges: Arc::new(InMemoryChallengeCache::new(self.challenge_ttl)),
            authentication_challenges: Arc::new(InMemoryChallengeCache::new(self.challenge_ttl)),
            provisioning: Arc::new(provisioning),
            roles: Arc::new(StaticRolePolicy::new(self.default_roles)),
        };

        TestApp {
            state,
            verifier,
            idp,
            shutdown,
        }
    }
}

pub async fn test_app() -> TestApp {
    TestAppBuilder::default().build().await
}
