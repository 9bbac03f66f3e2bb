//! JSON bodies of the `/api/auth/*` endpoints.
//!
//! Authenticator payloads stay `serde_json::Value` and are handed to the
//! verifier untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `POST /api/auth/register/start`
///
/// ```json
/// { "username": "alice", "display_name": "Alice Smith" }
/// ```
#[derive(Debug, Serialize, Deserialize)]
pub struct RegistrationStartRequest {
    pub username: String,
    /// Shown by the authenticator while the passkey is created
    pub display_name: String,
}

/// Creation options plus the id of the pending user
///
/// The options are flattened, so the body is
/// `{"publicKey": {...}, "user_id": "..."}`.
#[derive(Debug, Serialize)]
pub struct RegistrationStartResponse {
    #[serde(flatten)]
    pub options: Value,
    pub user_id: String,
}

/// `POST /api/auth/register/reissue`
#[derive(Debug, Serialize, Deserialize)]
pub struct ReissueRequest {
    pub user_id: String,
}

/// `POST /api/auth/register/finish`
#[derive(Debug, Serialize, Deserialize)]
pub struct RegistrationFinishRequest {
    pub username: String,

    /// Label for the new credential ("work laptop")
    #[serde(default)]
    pub credential_name: Option<String>,

    /// `PublicKeyCredential` returned by `navigator.credentials.create()`
    pub credential: Value,
}

/// `POST /api/auth/authenticate/start`
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthenticationStartRequest {
    pub username: String,
}

/// `POST /api/auth/authenticate/finish`
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthenticationFinishRequest {
    pub username: String,

    /// Assertion returned by `navigator.credentials.get()`
    pub credential: Value,
}
