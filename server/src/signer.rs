//! Decision signing key management.
//!
//! The Ed25519 seed lives in a hex file next to the database. If the
//! file is missing a fresh key is generated and written, so first boot
//! needs no provisioning step. Rotating the key invalidates client
//! caches (they fall back to a fresh validation), nothing worse.

use crate::error::{ApiError, ApiResult};
use giro_license::DecisionSigner;
use rand::RngCore;
use std::path::Path;

/// Loads the signing key from `path`, generating one if absent.
pub fn load_or_generate(path: &Path) -> ApiResult<DecisionSigner> {
    if path.exists() {
        let encoded = std::fs::read_to_string(path)
            .map_err(|e| ApiError::Internal(format!("failed to read signing key: {e}")))?;
        let bytes = hex::decode(encoded.trim())
            .map_err(|e| ApiError::Internal(format!("signing key is not valid hex: {e}")))?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ApiError::Internal("signing key must be 32 bytes".to_string()))?;
        tracing::info!(path = %path.display(), "loaded decision signing key");
        return Ok(DecisionSigner::from_seed(&seed));
    }

    let mut seed = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut seed);
    std::fs::write(path, hex::encode(seed))
        .map_err(|e| ApiError::Internal(format!("failed to write signing key: {e}")))?;
    tracing::info!(path = %path.display(), "generated new decision signing key");
    Ok(DecisionSigner::from_seed(&seed))
}
