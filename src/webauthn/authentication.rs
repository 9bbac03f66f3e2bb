//! # Passkey Authentication Logic
//!
//! This module handles logging in with an existing passkey.
//! Like registration, it's a two-step challenge-response process.
//!
//! ## Authentication Flow
//! 1. **Start**: Look up the user's credentials → issue a challenge
//! 2. **Finish**: Verify the signed challenge → record the new signature count
//!
//! Only completed users can log in. Nothing here touches the identity
//! provider, so there is nothing to roll back.

use crate::db::models::User;
use crate::db::{credentials, users};
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::webauthn::challenge_cache::PendingChallenge;
use serde_json::Value;

/// Start the passkey authentication process
///
/// ## Returns
/// Options for `navigator.credentials.get()`, listing the user's credentials
/// as allowed credentials.
///
/// ## Errors
/// - BadRequest: blank username
/// - NotFound: unknown user, registration not completed, or no passkeys
pub async fn start_authentication(state: &AppState, username: &str) -> AppResult<Value> {
    let username = users::normalize_username(username)?;
    let username = username.as_str();
    let user = users::find_by_username(&state.db, username).await?;
    if !user.is_completed() {
        return Err(AppError::NotFound(format!(
            "User '{}' has not completed registration",
            username
        )));
    }

    let stored_creds = credentials::find_by_user_id(&state.db, &user.id).await?;
    if stored_creds.is_empty() {
        return Err(AppError::NotFound(format!(
            "No passkeys found for user '{}'",
            username
        )));
    }

    let issued = state
        .verifier
        .start_assertion(&stored_creds)
        .map_err(|e| AppError::Internal(format!("Failed to issue login challenge: {e}")))?;

    state
        .authentication_challenges
        .put(PendingChallenge::new(&user.username, issued.state))
        .await?;

    Ok(issued.options)
}

/// Finish the passkey authentication process
///
/// ## What gets verified?
/// - The signature over the challenge, with the stored public key
/// - RP ID and origin
/// - The signature counter did not go backwards
///
/// The cached challenge is removed however this returns.
pub async fn finish_authentication(
    state: &AppState,
    username: &str,
    credential: &Value,
) -> AppResult<User> {
    let username = users::normalize_username(username)?;
    let username = username.as_str();
    let result = verify(state, username, credential).await;

    if let Err(e) = state.authentication_challenges.remove(username).await {
        tracing::warn!(username, error = %e, "Failed to clear login challenge");
    }

    result
}

async fn verify(state: &AppState, username: &str, credential: &Value) -> AppResult<User> {
    let user = users::find_by_username(&state.db, username).await?;

    // Single use, like the registration challenge
    let challenge = state
        .authentication_challenges
        .take(username)
        .await?
        .ok_or_else(|| AppError::ChallengeExpired(format!("No pending login for '{}'", username)))?;

    let stored_creds = credentials::find_by_user_id(&state.db, &user.id).await?;
    let assertion = state
        .verifier
        .finish_assertion(&challenge.state, credential, &stored_creds)?;

    // The verifier only checked the signature; the key must also be this user's
    if !stored_creds
        .iter()
        .any(|c| c.credential_id == assertion.credential_id)
    {
        return Err(AppError::Unauthorized(
            "Credential does not belong to this user".to_string(),
        ));
    }

    credentials::record_assertion(
        &state.db,
        &assertion.credential_id,
        assertion.signature_count,
        assertion.public_key.as_deref(),
    )
    .await?;

    tracing::info!(
        username,
        user_id = %user.id,
        signature_count = assertion.signature_count,
        "User authenticated"
    );
    Ok(user)
}
