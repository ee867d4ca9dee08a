//! Error types for the licensing domain.

use thiserror::Error;

/// Licensing-specific errors.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// Key does not match the GIRO-XXXX-XXXX-XXXX-XXXX format.
    #[error("malformed license key: {0}")]
    MalformedKey(String),

    /// Key is well-formed but its check character does not match.
    #[error("license key failed checksum")]
    ChecksumMismatch,

    /// Decision token format is invalid.
    #[error("invalid decision token: {0}")]
    InvalidDecision(String),

    /// Ed25519 signature verification failed.
    #[error("decision signature invalid")]
    InvalidSignature,

    /// Decision payload JSON is malformed or missing required fields.
    #[error("invalid decision payload: {0}")]
    InvalidPayload(String),

    /// Signing key material is unusable.
    #[error("invalid signing key: {0}")]
    InvalidSigningKey(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for licensing operations.
pub type LicenseResult<T> = Result<T, LicenseError>;
