//! Wire types for the license HTTP API, shared by server and client.

use crate::types::{Entitlement, LicenseStatus, PlanTier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Machine-readable error codes carried in API error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Key failed format/checksum validation; no store access happened.
    MalformedKey,
    /// License key unknown to the server.
    NotFound,
    /// License was already revoked.
    AlreadyRevoked,
    /// License is past its expiry.
    Expired,
    /// License is suspended pending administrative review.
    Suspended,
    /// Fingerprint is not (or no longer) bound to this license.
    HardwareMismatch,
    /// All seats are taken by other fingerprints.
    HardwareQuotaExceeded,
    /// Token bucket for this API key is drained.
    RateLimited,
    /// Missing or invalid credentials.
    Unauthorized,
    /// The owner already holds the maximum number of licenses.
    OwnerQuotaExceeded,
    /// Transient server-side failure; safe to retry.
    Internal,
}

/// JSON error body returned for every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub code: ErrorCode,
    pub message: String,
    /// Present only for `HardwareQuotaExceeded`: the fingerprints
    /// currently holding seats, so the caller can drive a transfer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflicting_fingerprints: Option<Vec<String>>,
}

/// `POST /auth/login` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// `POST /auth/login` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// `POST /licenses` request (admin session auth).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLicenseRequest {
    pub owner: String,
    pub plan: PlanTier,
    /// Seat override; defaults to the plan tier's seat count.
    #[serde(default)]
    pub max_seats: Option<u32>,
    /// Expiry; None for perpetual plans.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// License details returned to administrators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseInfo {
    pub key: String,
    pub owner: String,
    pub plan: PlanTier,
    pub max_seats: u32,
    pub status: LicenseStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_validated: Option<DateTime<Utc>>,
    pub validation_count: i64,
    pub created_at: DateTime<Utc>,
    pub bindings: Vec<BindingInfo>,
}

/// One hardware binding as seen by administrators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingInfo {
    pub fingerprint: String,
    pub hostname: Option<String>,
    pub os_descriptor: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub active: bool,
}

/// `POST /licenses/{key}/activate` request (API key auth).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivateRequest {
    pub fingerprint: String,
    pub hostname: String,
    pub os_descriptor: String,
}

/// `POST /licenses/{key}/activate` success response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivateResponse {
    pub status: LicenseStatus,
    pub entitlement: Entitlement,
    /// True when the fingerprint was already bound (idempotent replay).
    pub already_bound: bool,
    pub server_time: DateTime<Utc>,
}

/// `POST /licenses/{key}/validate` request (API key auth).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateRequest {
    pub fingerprint: String,
    /// Client wall clock, used for drift detection.
    pub client_time: DateTime<Utc>,
}

/// `POST /licenses/{key}/validate` response.
///
/// The decoded fields mirror the signed token so callers that do not
/// verify signatures can still read the outcome; the client cache always
/// stores and re-verifies `decision`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateResponse {
    pub status: LicenseStatus,
    pub entitlement: Option<Entitlement>,
    pub server_time: DateTime<Utc>,
    /// Signed decision token (`base64url(payload).base64url(signature)`).
    pub decision: String,
    /// Advisory: this attempt was flagged for clock drift.
    #[serde(default)]
    pub drift_flagged: bool,
}

/// `POST /licenses/{key}/transfer` request (admin session auth).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub old_fingerprint: String,
    pub new_fingerprint: String,
}

/// `POST /licenses/{key}/transfer` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferResponse {
    pub status: LicenseStatus,
    pub old_fingerprint: String,
    pub new_fingerprint: String,
}

/// `DELETE /licenses/{key}` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokeResponse {
    pub status: LicenseStatus,
    /// Number of bindings deactivated by the revocation.
    pub seats_released: usize,
}

/// `GET /health` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
