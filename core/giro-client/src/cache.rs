//! Encrypted at-rest storage for the client license state.
//!
//! The cache file holds base64 of `nonce || ciphertext`, ChaCha20-
//! Poly1305 under a key derived from the machine fingerprint. Copying
//! the file to another machine yields garbage, and any tampering fails
//! the AEAD tag. A cache that cannot be decrypted is treated as absent,
//! which forces a fresh validation rather than an error.

use crate::error::{ClientError, ClientResult};
use crate::state::CachedState;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use giro_license::Fingerprint;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Size of nonce in bytes (96 bits for ChaCha20-Poly1305).
const NONCE_SIZE: usize = 12;

/// Domain separator for cache key derivation.
const CACHE_KEY_CONTEXT: &str = "giro-cache-key-v1";

/// Encrypted file store for [`CachedState`].
pub struct StateCache {
    path: PathBuf,
    key: [u8; 32],
}

impl StateCache {
    /// Creates a cache bound to this machine's fingerprint.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, fingerprint: &Fingerprint) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(CACHE_KEY_CONTEXT.as_bytes());
        hasher.update([0u8]);
        hasher.update(fingerprint.as_str().as_bytes());
        Self {
            path: path.into(),
            key: hasher.finalize().into(),
        }
    }

    /// Path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads and decrypts the cached state.
    ///
    /// Returns None when the file is missing, unreadable, tampered with,
    /// or encrypted for a different machine. All of those mean the same
    /// thing to the caller: re-validate.
    #[must_use]
    pub fn load(&self) -> Option<CachedState> {
        let encoded = std::fs::read_to_string(&self.path).ok()?;
        let bytes = BASE64.decode(encoded.trim()).ok()?;
        if bytes.len() <= NONCE_SIZE {
            return None;
        }

        let cipher = ChaCha20Poly1305::new((&self.key).into());
        let nonce = Nonce::from_slice(&bytes[..NONCE_SIZE]);
        let plaintext = cipher.decrypt(nonce, &bytes[NONCE_SIZE..]).ok()?;

        match serde_json::from_slice::<CachedState>(&plaintext) {
            Ok(state) => Some(state),
            Err(e) => {
                tracing::warn!("discarding undecodable license cache: {e}");
                None
            }
        }
    }

    /// Encrypts and writes the state.
    pub fn save(&self, state: &CachedState) -> ClientResult<()> {
        let plaintext = serde_json::to_vec(state)?;

        let cipher = ChaCha20Poly1305::new((&self.key).into());
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_ref())
            .map_err(|e| ClientError::CacheCrypto(e.to_string()))?;

        let mut bytes = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        bytes.extend_from_slice(&nonce_bytes);
        bytes.extend_from_slice(&ciphertext);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ClientError::CacheIo(e.to_string()))?;
        }
        std::fs::write(&self.path, BASE64.encode(&bytes))
            .map_err(|e| ClientError::CacheIo(e.to_string()))
    }

    /// Removes the cache file. Used by explicit deactivation only.
    pub fn destroy(&self) -> ClientResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ClientError::CacheIo(e.to_string())),
        }
    }
}
