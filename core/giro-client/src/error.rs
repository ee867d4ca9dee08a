//! Error types for the client controller.

use thiserror::Error;

/// Client-side licensing errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Cache file could not be written or removed.
    #[error("cache I/O error: {0}")]
    CacheIo(String),

    /// Cache encryption or decryption failed.
    #[error("cache crypto error: {0}")]
    CacheCrypto(String),

    /// License key failed local format validation.
    #[error(transparent)]
    License(#[from] giro_license::LicenseError),

    /// No activation has been performed on this machine.
    #[error("not activated")]
    NotActivated,

    /// Could not reach the license server.
    #[error("network unavailable: {0}")]
    Network(String),

    /// All seats are taken; the caller can resolve via transfer.
    #[error("hardware quota exceeded ({} seats bound)", conflicting_fingerprints.len())]
    Quota { conflicting_fingerprints: Vec<String> },

    /// The server denied the request with a domain error.
    #[error("request denied: {0}")]
    Denied(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
