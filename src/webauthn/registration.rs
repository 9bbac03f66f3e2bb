//! # Passkey Registration Logic
//!
//! This module handles the server-side logic for creating new passkey
//! credentials and the matching identity provider account.
//! Registration is a two-step process: start and finish.
//!
//! ## Registration Flow
//! 1. **Start**: Create a pending user → generate challenge → send to client
//! 2. **Finish**: Verify credential → store it → create the identity provider
//!    account → assign default roles → mark the user completed
//!
//! ## Rolling back
//! The local database and the identity provider share no transaction. Every
//! forward step that changed something pushes its undo onto the run, and a
//! failed run undoes them newest first before the error is returned:
//!
//! | Failed step            | Undone                                   |
//! |------------------------|------------------------------------------|
//! | challenge issuance     | local user                               |
//! | account creation       | credential                               |
//! | role assignment        | identity account, then credential        |
//!
//! A failed undo is logged and skipped. Failure of the final status update is
//! not rolled back; the user stays pending next to a live account and
//! credential, and an error is logged for reconciliation.

use crate::db::models::{PasskeyCredential, User};
use crate::db::{credentials, users};
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::webauthn::challenge_cache::PendingChallenge;
use crate::webauthn::verifier::RegistrationSubject;
use serde_json::Value;
use std::fmt;

/// Where a registration run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Initiated,
    LocalUserPending,
    ChallengeIssued,
    CredentialVerified,
    IdentityProvisioned,
    RolesAssigned,
    Completed,
    Failed,
}

impl fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegistrationState::Initiated => "INITIATED",
            RegistrationState::LocalUserPending => "LOCAL_USER_PENDING",
            RegistrationState::ChallengeIssued => "CHALLENGE_ISSUED",
            RegistrationState::CredentialVerified => "CREDENTIAL_VERIFIED",
            RegistrationState::IdentityProvisioned => "IDENTITY_PROVISIONED",
            RegistrationState::RolesAssigned => "ROLES_ASSIGNED",
            RegistrationState::Completed => "COMPLETED",
            RegistrationState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Undo for one completed forward step
#[derive(Debug)]
enum Compensation {
    DeleteLocalUser { user_id: String },
    DeleteCredential { credential_id: Vec<u8> },
    DeleteExternalIdentity { external_id: String },
}

impl Compensation {
    async fn run(&self, state: &AppState) -> AppResult<()> {
        match self {
            Compensation::DeleteLocalUser { user_id } => users::delete_user(&state.db, user_id).await,
            Compensation::DeleteCredential { credential_id } => {
                credentials::delete_credential(&state.db, credential_id).await
            }
            Compensation::DeleteExternalIdentity { external_id } => state
                .provisioning
                .delete_user(external_id)
                .await
                .map_err(AppError::IdentityDeletion),
        }
    }
}

/// One pass through the registration state machine
struct SagaRun {
    username: String,
    state: RegistrationState,
    compensations: Vec<Compensation>,
}

impl SagaRun {
    fn new(username: &str) -> Self {
        tracing::debug!(username, state = %RegistrationState::Initiated, "Registration step");
        Self {
            username: username.to_string(),
            state: RegistrationState::Initiated,
            compensations: Vec::new(),
        }
    }

    /// Resume a run whose earlier steps happened in a previous request
    fn resume(username: &str, state: RegistrationState) -> Self {
        Self {
            username: username.to_string(),
            state,
            compensations: Vec::new(),
        }
    }

    fn advance(&mut self, next: RegistrationState) {
        tracing::info!(
            username = %self.username,
            from = %self.state,
            to = %next,
            "Registration step"
        );
        self.state = next;
    }

    fn on_failure(&mut self, compensation: Compensation) {
        self.compensations.push(compensation);
    }

    /// Undo completed steps newest first and hand back the original error
    async fn fail(mut self, app: &AppState, error: AppError) -> AppError {
        tracing::warn!(
            username = %self.username,
            from = %self.state,
            to = %RegistrationState::Failed,
            error = %error,
            "Registration failed, rolling back"
        );
        self.state = RegistrationState::Failed;

        while let Some(compensation) = self.compensations.pop() {
            match compensation.run(app).await {
                Ok(()) => tracing::info!(username = %self.username, ?compensation, "Rolled back"),
                Err(e) => tracing::error!(
                    username = %self.username,
                    ?compensation,
                    error = %e,
                    "Rollback step failed, manual cleanup needed"
                ),
            }
        }

        error
    }
}

/// What the client needs to continue after start or re-issue
#[derive(Debug, Clone)]
pub struct RegistrationStarted {
    /// Options for `navigator.credentials.create()`
    pub options: Value,
    /// Local user id, for cleanup if the ceremony is abandoned
    pub user_id: String,
}

fn required<'a>(value: &'a str, field: &str) -> AppResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::BadRequest(format!("{field} must not be blank")));
    }
    Ok(value)
}

/// Issue a registration challenge for `user` and cache it under the username
async fn issue_challenge(state: &AppState, user: &User) -> AppResult<Value> {
    let subject = RegistrationSubject {
        handle: user.handle.clone(),
        username: user.username.clone(),
        display_name: user.display_name.clone(),
    };

    let issued = state
        .verifier
        .start_registration(&subject)
        .map_err(|e| AppError::Internal(format!("Failed to issue registration challenge: {e}")))?;

    state
        .registration_challenges
        .put(PendingChallenge::new(&user.username, issued.state))
        .await?;

    Ok(issued.options)
}

/// Start the passkey registration process
///
/// Creates a pending user and issues the challenge the client signs with
/// its authenticator.
///
/// ## Flow
/// 1. Validate input and check the username is free
/// 2. Create the pending user with a fresh random handle
/// 3. Generate the WebAuthn creation challenge
/// 4. Cache the ceremony state under the username
///
/// If step 3 or 4 fails the user from step 2 is deleted again.
///
/// ## Errors
/// - BadRequest: blank username or display name
/// - Conflict: username already taken, in any letter case
pub async fn start_registration(
    state: &AppState,
    username: &str,
    display_name: &str,
) -> AppResult<RegistrationStarted> {
    let username = users::normalize_username(username)?;
    let username = username.as_str();
    let display_name = required(display_name, "display_name")?;
    let mut run = SagaRun::new(username);

    // Fail fast before creating anything
    if users::username_exists(&state.db, username).await? {
        return Err(AppError::Conflict(format!("User '{}' already exists", username)));
    }

    // The unique index still catches a concurrent start for the same name
    let user = users::create_user(&state.db, username, display_name).await?;
    run.advance(RegistrationState::LocalUserPending);
    run.on_failure(Compensation::DeleteLocalUser {
        user_id: user.id.clone(),
    });

    // From here on a failure deletes the user again
    let options = match issue_challenge(state, &user).await {
        Ok(options) => options,
        Err(e) => return Err(run.fail(state, e).await),
    };
    run.advance(RegistrationState::ChallengeIssued);

    Ok(RegistrationStarted {
        options,
        user_id: user.id,
    })
}

/// Issue a new challenge for a user whose registration is still pending
///
/// Replaces the cached challenge, so a response to the earlier one no longer
/// verifies. Completed users get `Conflict`.
pub async fn reissue_challenge(state: &AppState, user_id: &str) -> AppResult<RegistrationStarted> {
    let user = users::find_by_id(&state.db, user_id).await?;
    if user.is_completed() {
        return Err(AppError::Conflict(format!(
            "User '{}' is already registered",
            user.username
        )));
    }

    let options = issue_challenge(state, &user).await?;
    tracing::info!(username = %user.username, "Re-issued registration challenge");

    Ok(RegistrationStarted {
        options,
        user_id: user.id,
    })
}

/// Finish the passkey registration process
///
/// Verifies the credential created by the authenticator, then provisions the
/// identity provider account and completes the user.
///
/// The cached challenge is removed however this returns. It is single use,
/// so repeating a finish that already succeeded gets `ChallengeExpired`.
///
/// ## Errors
/// - NotFound: no user with this username
/// - ChallengeExpired: no live challenge for the username
/// - Verification: attestation did not verify
/// - Conflict: credential already stored, or user completed meanwhile
/// - Provisioning / RoleAssignment: identity provider failed, rolled back
pub async fn finish_registration(
    state: &AppState,
    username: &str,
    friendly_name: Option<&str>,
    credential: &Value,
) -> AppResult<String> {
    let username = users::normalize_username(username)?;
    let username = username.as_str();
    let result = complete(state, username, friendly_name, credential).await;

    if let Err(e) = state.registration_challenges.remove(username).await {
        tracing::warn!(username, error = %e, "Failed to clear registration challenge");
    }

    result
}

async fn complete(
    state: &AppState,
    username: &str,
    friendly_name: Option<&str>,
    credential: &Value,
) -> AppResult<String> {
    let user = users::find_by_username(&state.db, username).await?;
    let mut run = SagaRun::resume(username, RegistrationState::ChallengeIssued);

    // Step 1: Consume the challenge
    // Whoever takes it first owns the run. A replay or a concurrent finish
    // finds nothing here.
    let challenge = state
        .registration_challenges
        .take(username)
        .await?
        .ok_or_else(|| {
            AppError::ChallengeExpired(format!("No pending registration for '{}'", username))
        })?;

    // A re-issue racing a successful finish can leave a challenge behind
    if user.is_completed() {
        return Err(AppError::Conflict(format!(
            "User '{}' is already registered",
            username
        )));
    }

    // Step 2: Verify the attestation against the ceremony state
    // Nothing has been written yet, so a rejection needs no rollback.
    let verified = state
        .verifier
        .finish_registration(&challenge.state, credential)?;

    // Step 3: Store the credential
    // The credential id is the primary key; a reused authenticator is a Conflict.
    let friendly_name = friendly_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string);
    let passkey = PasskeyCredential::new(
        verified.credential_id,
        user.id.clone(),
        verified.public_key,
        verified.signature_count,
        friendly_name,
    );
    credentials::save_credential(&state.db, &passkey).await?;
    run.advance(RegistrationState::CredentialVerified);
    run.on_failure(Compensation::DeleteCredential {
        credential_id: passkey.credential_id.clone(),
    });

    // Step 4: Create (or find) the identity provider account
    // Retried with backoff. Exhaustion removes the credential again.
    let external_id = match state.provisioning.create_with_retry(username).await {
        Ok(id) => id,
        Err(e) => return Err(run.fail(state, AppError::Provisioning(e)).await),
    };
    run.advance(RegistrationState::IdentityProvisioned);
    run.on_failure(Compensation::DeleteExternalIdentity {
        external_id: external_id.clone(),
    });

    // Step 5: Assign default roles, all or none
    let roles = state.roles.default_roles(username);
    if let Err(e) = state.provisioning.assign_roles(&external_id, &roles).await {
        return Err(run.fail(state, AppError::RoleAssignment(e)).await);
    }
    run.advance(RegistrationState::RolesAssigned);

    // Step 6: Mark the user completed
    // No rollback past this point: the account and credential are valid.
    if let Err(e) = users::complete_registration(&state.db, &user.id, &external_id).await {
        tracing::error!(
            username,
            user_id = %user.id,
            %external_id,
            error = %e,
            "Failed to mark user completed; account and credential left in place for reconciliation"
        );
        return Err(e);
    }
    run.advance(RegistrationState::Completed);

    Ok(user.username)
}

/// Delete a user and, when completed, its identity provider account
///
/// The account goes first. If the identity provider cannot delete it the
/// local user is kept, so the pair never ends up with only the account left.
/// An account that is already gone counts as deleted.
pub async fn delete_registration(state: &AppState, user_id: &str) -> AppResult<User> {
    let user = users::find_by_id(&state.db, user_id).await?;

    if user.is_completed() {
        let deleted = match user.external_identity_id.as_deref() {
            Some(external_id) => state.provisioning.delete_user(external_id).await,
            None => state.provisioning.delete_user_by_username(&user.username).await,
        };
        deleted.map_err(AppError::IdentityDeletion)?;
    }

    users::delete_user(&state.db, &user.id).await?;
    state.registration_challenges.remove(&user.username).await?;
    state.authentication_challenges.remove(&user.username).await?;

    tracing::info!(
        username = %user.username,
        user_id = %user.id,
        status = ?user.registration_status,
        "Deleted user"
    );
    Ok(user)
}
