//! Signed validation decisions.
//!
//! Every `validate` response carries a decision token in the format
//! `base64url(payload).base64url(signature)`. The payload is a JSON
//! object signed with the server's Ed25519 key; the signature covers the
//! base64url-encoded payload string. Clients persist the token in their
//! encrypted cache and re-verify it on load, so a tampered cache file
//! cannot fabricate an entitlement.

use crate::error::{LicenseError, LicenseResult};
use crate::types::{Entitlement, LicenseStatus};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

/// The signed payload of a validation decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionPayload {
    /// License key the decision is about.
    pub key: String,
    /// Fingerprint the decision was issued to.
    pub fingerprint: String,
    /// License status at decision time.
    pub status: LicenseStatus,
    /// Entitlement granted, present only when the decision is positive.
    pub entitlement: Option<Entitlement>,
    /// Server clock at decision time (seconds since epoch). Clients use
    /// this to calibrate local drift.
    pub server_time: i64,
}

impl DecisionPayload {
    /// Returns true if the decision permits the application to run.
    #[must_use]
    pub fn is_positive(&self) -> bool {
        self.status == LicenseStatus::Active && self.entitlement.is_some()
    }
}

/// A decision token that has been parsed and signature-verified.
#[derive(Debug, Clone)]
pub struct VerifiedDecision {
    raw: String,
    payload: DecisionPayload,
}

impl VerifiedDecision {
    /// Parses a decision token and verifies it against `public_key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the token structure, signature, or payload
    /// JSON is invalid.
    pub fn parse(token: &str, public_key: &[u8; 32]) -> LicenseResult<Self> {
        let token = token.trim();

        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 2 {
            return Err(LicenseError::InvalidDecision(
                "token must have exactly two parts separated by a dot".to_string(),
            ));
        }
        let payload_b64 = parts[0];
        let signature_b64 = parts[1];

        let sig_bytes = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|e| LicenseError::InvalidDecision(format!("invalid signature base64: {e}")))?;
        let signature = Signature::from_slice(&sig_bytes)
            .map_err(|_| LicenseError::InvalidDecision("invalid signature length".to_string()))?;

        let verifying_key = VerifyingKey::from_bytes(public_key)
            .map_err(|_| LicenseError::InvalidSigningKey("invalid public key".to_string()))?;

        verifying_key
            .verify(payload_b64.as_bytes(), &signature)
            .map_err(|_| LicenseError::InvalidSignature)?;

        let payload_json = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|e| LicenseError::InvalidDecision(format!("invalid payload base64: {e}")))?;
        let payload: DecisionPayload = serde_json::from_slice(&payload_json)
            .map_err(|e| LicenseError::InvalidPayload(format!("invalid payload JSON: {e}")))?;

        Ok(Self {
            raw: token.to_string(),
            payload,
        })
    }

    /// Returns the raw token string.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Returns the verified payload.
    #[must_use]
    pub fn payload(&self) -> &DecisionPayload {
        &self.payload
    }
}

/// Server-side signer for decision tokens.
pub struct DecisionSigner {
    signing_key: SigningKey,
}

impl DecisionSigner {
    /// Builds a signer from a 32-byte Ed25519 seed.
    #[must_use]
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Returns the verifying key clients should embed.
    #[must_use]
    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Signs a payload into a decision token.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn sign(&self, payload: &DecisionPayload) -> LicenseResult<String> {
        let payload_json = serde_json::to_vec(payload)?;
        let payload_b64 = URL_SAFE_NO_PAD.encode(&payload_json);
        let signature = self.signing_key.sign(payload_b64.as_bytes());
        let sig_b64 = URL_SAFE_NO_PAD.encode(signature.to_bytes());
        Ok(format!("{payload_b64}.{sig_b64}"))
    }
}
