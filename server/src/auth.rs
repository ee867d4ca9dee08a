//! Session and API-key authentication.
//!
//! Two distinct schemes:
//! - administrative calls carry `Authorization: Bearer <session token>`,
//!   issued by `/auth/login` and short-lived;
//! - machine-to-server license calls carry a long-lived per-deployment
//!   `X-Api-Key`.
//!
//! Both tokens are stored hashed; a leaked database does not leak
//! credentials.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use argon2::password_hash::rand_core::OsRng as PasswordOsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use giro_license::protocol::LoginResponse;
use giro_store::LicenseStore;
use rand::RngCore;
use sha2::{Digest, Sha256};

// Argon2id parameters (64 MB, 2 iterations), OWASP server-side profile.
const ARGON2_MEMORY_COST: u32 = 65536;
const ARGON2_TIME_COST: u32 = 2;
const ARGON2_PARALLELISM: u32 = 1;
const ARGON2_OUTPUT_LEN: usize = 32;

/// Auth operations backed by the store.
pub struct AuthLayer {
    store: LicenseStore,
    session_ttl: Duration,
}

impl AuthLayer {
    #[must_use]
    pub fn new(store: LicenseStore, session_ttl: Duration) -> Self {
        Self { store, session_ttl }
    }

    /// Hashes a password with Argon2id.
    pub fn hash_password(password: &str) -> ApiResult<String> {
        let salt = SaltString::generate(&mut PasswordOsRng);
        let argon2 = argon2_instance()?;
        argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))
    }

    fn verify_password(password: &str, hash: &str) -> ApiResult<bool> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| ApiError::Internal(format!("stored hash invalid: {e}")))?;
        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(ApiError::Internal(format!(
                "password verification failed: {e}"
            ))),
        }
    }

    /// SHA-256 hex of a token, the only form that touches the store.
    #[must_use]
    pub fn hash_token(token: &str) -> String {
        hex::encode(Sha256::digest(token.as_bytes()))
    }

    /// Random 32-byte hex token.
    #[must_use]
    pub fn generate_token() -> String {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Verifies admin credentials and issues a session token.
    ///
    /// Argon2 verification is deliberately expensive; run on the
    /// blocking pool.
    pub async fn login(&self, email: &str, password: &str) -> ApiResult<LoginResponse> {
        let store = self.store.clone();
        let email = email.to_string();
        let password = password.to_string();
        let ttl = self.session_ttl;

        tokio::task::spawn_blocking(move || {
            let Some(admin) = store.find_admin(&email)? else {
                return Err(ApiError::Unauthorized);
            };
            if !Self::verify_password(&password, &admin.password_hash)? {
                return Err(ApiError::Unauthorized);
            }

            let token = Self::generate_token();
            let expires_at = Utc::now() + ttl;
            store.insert_session(&Self::hash_token(&token), &admin.id, expires_at)?;
            // Opportunistic cleanup, keeps the table from growing.
            let _ = store.purge_expired_sessions(Utc::now());

            Ok(LoginResponse { token, expires_at })
        })
        .await
        .map_err(|e| ApiError::Internal(format!("login task failed: {e}")))?
    }

    /// Resolves a session token to an admin id.
    pub fn verify_session(&self, token: &str) -> ApiResult<String> {
        self.store
            .session_admin(&Self::hash_token(token), Utc::now())?
            .ok_or(ApiError::Unauthorized)
    }

    /// Resolves an API key to its deployment label.
    pub fn verify_api_key(&self, api_key: &str) -> ApiResult<String> {
        self.store
            .api_key_label(&Self::hash_token(api_key))?
            .ok_or(ApiError::Unauthorized)
    }

    /// Seeds the admin account and deployment API key at startup.
    pub fn bootstrap(&self, admin_email: &str, admin_password: &str, api_key: &str) -> ApiResult<()> {
        let hash = Self::hash_password(admin_password)?;
        self.store.ensure_admin(admin_email, &hash, Utc::now())?;
        self.store
            .ensure_api_key(&Self::hash_token(api_key), "default-deployment", Utc::now())?;
        Ok(())
    }
}

fn argon2_instance() -> ApiResult<Argon2<'static>> {
    let params = Params::new(
        ARGON2_MEMORY_COST,
        ARGON2_TIME_COST,
        ARGON2_PARALLELISM,
        Some(ARGON2_OUTPUT_LEN),
    )
    .map_err(|e| ApiError::Internal(format!("argon2 params: {e}")))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

// ── Extractors ───────────────────────────────────────────────────

/// Admin session auth: `Authorization: Bearer <token>`.
pub struct AdminAuth {
    pub admin_id: String,
}

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(ApiError::Unauthorized)?;
        let admin_id = state.auth.verify_session(&token)?;
        Ok(Self { admin_id })
    }
}

/// Machine auth: `X-Api-Key` header, rate limited per key.
pub struct MachineAuth {
    pub deployment: String,
}

impl FromRequestParts<AppState> for MachineAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let api_key = parts
            .headers
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;
        let deployment = state.auth.verify_api_key(api_key)?;

        if !state.limiter.try_acquire(api_key) {
            return Err(ApiError::RateLimited);
        }

        Ok(Self { deployment })
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}
