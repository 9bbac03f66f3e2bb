//! # Credential Verifier
//!
//! Challenge generation and response verification for both ceremonies,
//! behind the [`CredentialVerifier`] trait.
//!
//! ## Ceremony state
//! Starting a ceremony yields two things:
//! - **options**: JSON the client passes to `navigator.credentials.create()`
//!   or `navigator.credentials.get()`
//! - **state**: opaque bytes the server keeps in the challenge cache and hands
//!   back to the finish step
//!
//! [`WebauthnVerifier`] implements the trait with `webauthn-rs`. Its state is
//! the serialized `PasskeyRegistration` / `PasskeyAuthentication`, which is why
//! the crate is built with `danger-allow-state-serialisation`.

use crate::db::models::PasskeyCredential;
use anyhow::Result;
use serde_json::Value;
use thiserror::Error;
use url::Url;
use webauthn_rs::prelude::*;
use webauthn_rs_proto::AuthenticatorAttachment;

/// Who a registration challenge is issued for
#[derive(Debug, Clone)]
pub struct RegistrationSubject {
    /// Random user handle; never the username
    pub handle: Vec<u8>,
    pub username: String,
    pub display_name: String,
}

#[derive(Debug, Clone)]
pub struct IssuedChallenge {
    pub options: Value,
    pub state: Vec<u8>,
}

/// Result of a verified attestation
#[derive(Debug, Clone)]
pub struct VerifiedCredential {
    pub credential_id: Vec<u8>,
    /// Serialized passkey, stored as the credential's public key
    pub public_key: Vec<u8>,
    pub signature_count: u32,
}

/// Result of a verified assertion
#[derive(Debug, Clone)]
pub struct VerifiedAssertion {
    pub credential_id: Vec<u8>,
    pub signature_count: u32,
    /// Re-serialized passkey when verification changed its stored state
    pub public_key: Option<Vec<u8>>,
}

#[derive(Debug, Error)]
pub enum VerificationError {
    /// Response or stored state could not be decoded
    #[error("malformed ceremony data: {0}")]
    Malformed(String),

    /// Response decoded but did not verify
    #[error("{0}")]
    Rejected(String),
}

pub trait CredentialVerifier: Send + Sync {
    fn start_registration(
        &self,
        subject: &RegistrationSubject,
    ) -> Result<IssuedChallenge, VerificationError>;

    fn finish_registration(
        &self,
        state: &[u8],
        response: &Value,
    ) -> Result<VerifiedCredential, VerificationError>;

    /// Challenge that any of `credentials` can answer
    fn start_assertion(
        &self,
        credentials: &[PasskeyCredential],
    ) -> Result<IssuedChallenge, VerificationError>;

    fn finish_assertion(
        &self,
        state: &[u8],
        response: &Value,
        credentials: &[PasskeyCredential],
    ) -> Result<VerifiedAssertion, VerificationError>;
}

/// `webauthn-rs` backed verifier
///
/// ## WebAuthn Terminology
/// - **RP ID**: domain the credentials are scoped to
/// - **RP Origin**: exact origin the browser reports in client data
/// - **Attachment**: `cross-platform` restricts registration to roaming
///   authenticators such as security keys
pub struct WebauthnVerifier {
    webauthn: Webauthn,
    attachment: Option<AuthenticatorAttachment>,
}

impl WebauthnVerifier {
    pub fn new(
        rp_id: &str,
        rp_origin: &str,
        rp_name: &str,
        attachment: Option<AuthenticatorAttachment>,
    ) -> Result<Self> {
        let rp_origin = Url::parse(rp_origin)?;
        let webauthn = WebauthnBuilder::new(rp_id, &rp_origin)?
            .rp_name(rp_name)
            .build()?;

        Ok(Self {
            webauthn,
            attachment,
        })
    }
}

fn malformed(e: impl std::fmt::Display) -> VerificationError {
    VerificationError::Malformed(e.to_string())
}

fn rejected(e: WebauthnError) -> VerificationError {
    VerificationError::Rejected(e.to_string())
}

fn load_passkeys(credentials: &[PasskeyCredential]) -> Result<Vec<Passkey>, VerificationError> {
    credentials
        .iter()
        .map(|cred| serde_json::from_slice::<Passkey>(&cred.public_key).map_err(malformed))
        .collect()
}

impl CredentialVerifier for WebauthnVerifier {
    fn start_registration(
        &self,
        subject: &RegistrationSubject,
    ) -> Result<IssuedChallenge, VerificationError> {
        // webauthn-rs wants a UUID; take it from the handle so it stays opaque
        let unique_id = subject
            .handle
            .get(..16)
            .ok_or_else(|| malformed("user handle shorter than 16 bytes"))
            .and_then(|bytes| Uuid::from_slice(bytes).map_err(malformed))?;

        let (mut ccr, reg_state) = self
            .webauthn
            .start_passkey_registration(unique_id, &subject.username, &subject.display_name, None)
            .map_err(rejected)?;

        if let Some(selection) = ccr.public_key.authenticator_selection.as_mut() {
            selection.authenticator_attachment = self.attachment.clone();
        }

        Ok(IssuedChallenge {
            options: serde_json::to_value(&ccr).map_err(malformed)?,
            state: serde_json::to_vec(&reg_state).map_err(malformed)?,
        })
    }

    fn finish_registration(
        &self,
        state: &[u8],
        response: &Value,
    ) -> Result<VerifiedCredential, VerificationError> {
        let reg_state: PasskeyRegistration = serde_json::from_slice(state).map_err(malformed)?;
        let reg_credential: RegisterPublicKeyCredential =
            serde_json::from_value(response.clone()).map_err(malformed)?;

        let passkey = self
            .webauthn
            .finish_passkey_registration(&reg_credential, &reg_state)
            .map_err(rejected)?;

        let credential_id: &[u8] = passkey.cred_id().as_ref();
        Ok(VerifiedCredential {
            credential_id: credential_id.to_vec(),
            public_key: serde_json::to_vec(&passkey).map_err(malformed)?,
            signature_count: 0,
        })
    }

    fn start_assertion(
        &self,
        credentials: &[PasskeyCredential],
    ) -> Result<IssuedChallenge, VerificationError> {
        let passkeys = load_passkeys(credentials)?;
        let (rcr, auth_state) = self
            .webauthn
            .start_passkey_authentication(&passkeys)
            .map_err(rejected)?;

        Ok(IssuedChallenge {
            options: serde_json::to_value(&rcr).map_err(malformed)?,
            state: serde_json::to_vec(&auth_state).map_err(malformed)?,
        })
    }

    fn finish_assertion(
        &self,
        state: &[u8],
        response: &Value,
        credentials: &[PasskeyCredential],
    ) -> Result<VerifiedAssertion, VerificationError> {
        let auth_state: PasskeyAuthentication = serde_json::from_slice(state).map_err(malformed)?;
        let auth_credential: PublicKeyCredential =
            serde_json::from_value(response.clone()).map_err(malformed)?;

        let result = self
            .webauthn
            .finish_passkey_authentication(&auth_credential, &auth_state)
            .map_err(rejected)?;

        let credential_id: &[u8] = result.cred_id().as_ref();

        // Carry counter and backup state changes into the stored passkey
        let mut public_key = None;
        for mut passkey in load_passkeys(credentials)? {
            if passkey.update_credential(&result) == Some(true) {
                public_key = Some(serde_json::to_vec(&passkey).map_err(malformed)?);
            }
        }

        Ok(VerifiedAssertion {
            credential_id: credential_id.to_vec(),
            signature_count: result.counter(),
            public_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> WebauthnVerifier {
        WebauthnVerifier::new(
            "localhost",
            "http://localhost:8080",
            "Passkey Demo",
            Some(AuthenticatorAttachment::CrossPlatform),
        )
        .expect("verifier")
    }

    fn subject() -> RegistrationSubject {
        RegistrationSubject {
            handle: vec![7; 32],
            username: "alice".into(),
            display_name: "Alice".into(),
        }
    }

    #[test]
    fn registration_options_carry_rp_and_attachment() {
        let issued = verifier().start_registration(&subject()).expect("issued");

        let public_key = &issued.options["publicKey"];
        assert_eq!(public_key["rp"]["id"], "localhost");
        assert_eq!(public_key["user"]["name"], "alice");
        assert_eq!(
            public_key["authenticatorSelection"]["authenticatorAttachment"],
            "cross-platform"
        );
        assert!(!issued.state.is_empty());
    }

    #[test]
    fn each_challenge_is_fresh() {
        let v = verifier();
        let first = v.start_registration(&subject()).expect("first");
        let second = v.start_registration(&subject()).expect("second");
        assert_ne!(
            first.options["publicKey"]["challenge"],
            second.options["publicKey"]["challenge"]
        );
    }

    #[test]
    fn short_handle_is_refused() {
        let mut subject = subject();
        subject.handle.truncate(8);
        assert!(matches!(
            verifier().start_registration(&subject),
            Err(VerificationError::Malformed(_))
        ));
    }

    #[test]
    fn garbage_response_is_malformed() {
        let v = verifier();
        let issued = v.start_registration(&subject()).expect("issued");
        let err = v
            .finish_registration(&issued.state, &serde_json::json!({ "nope": true }))
            .expect_err("garbage");
        assert!(matches!(err, VerificationError::Malformed(_)));
    }
}
