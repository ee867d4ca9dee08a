//! Row types and operation outcomes.

use chrono::{DateTime, Utc};
use giro_license::{LicenseStatus, PlanTier};

/// One row of the `licenses` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseRecord {
    pub key: String,
    pub owner: String,
    pub plan: PlanTier,
    pub max_seats: u32,
    pub status: LicenseStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_validated: Option<DateTime<Utc>>,
    pub validation_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row of the `bindings` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingRecord {
    pub id: String,
    pub license_key: String,
    pub fingerprint: String,
    pub hostname: Option<String>,
    pub os_descriptor: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub active: bool,
}

/// Parameters for inserting a new license.
#[derive(Debug, Clone)]
pub struct NewLicense {
    pub key: String,
    pub owner: String,
    pub plan: PlanTier,
    pub max_seats: u32,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Per-owner license counts by status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LicenseStats {
    pub total: u32,
    pub active: u32,
    pub pending: u32,
    pub suspended: u32,
    pub expired: u32,
    pub revoked: u32,
}

/// What happened in an audited event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Created,
    Activated,
    Validated,
    ValidationFailed,
    Transferred,
    Revoked,
    Suspended,
    DriftFlagged,
    OriginFlagged,
    QuotaConflict,
}

impl AuditAction {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Activated => "activated",
            Self::Validated => "validated",
            Self::ValidationFailed => "validation_failed",
            Self::Transferred => "transferred",
            Self::Revoked => "revoked",
            Self::Suspended => "suspended",
            Self::DriftFlagged => "drift_flagged",
            Self::OriginFlagged => "origin_flagged",
            Self::QuotaConflict => "quota_conflict",
        }
    }

    #[must_use]
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "created" => Some(Self::Created),
            "activated" => Some(Self::Activated),
            "validated" => Some(Self::Validated),
            "validation_failed" => Some(Self::ValidationFailed),
            "transferred" => Some(Self::Transferred),
            "revoked" => Some(Self::Revoked),
            "suspended" => Some(Self::Suspended),
            "drift_flagged" => Some(Self::DriftFlagged),
            "origin_flagged" => Some(Self::OriginFlagged),
            "quota_conflict" => Some(Self::QuotaConflict),
        _ => None,
        }
    }

    /// True for the advisory fraud signals counted by the escalation
    /// policy.
    #[must_use]
    pub fn is_fraud_flag(&self) -> bool {
        matches!(self, Self::DriftFlagged | Self::OriginFlagged)
    }
}

/// A new append-only audit entry.
#[derive(Debug, Clone)]
pub struct NewAudit {
    pub license_key: String,
    pub fingerprint: Option<String>,
    pub action: AuditAction,
    pub client_time: Option<DateTime<Utc>>,
    pub server_time: DateTime<Utc>,
    pub drift_secs: Option<i64>,
    pub origin: Option<String>,
    pub detail: Option<serde_json::Value>,
}

/// One row of the `validation_audit` table.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub id: i64,
    pub license_key: String,
    pub fingerprint: Option<String>,
    pub action: AuditAction,
    pub client_time: Option<DateTime<Utc>>,
    pub server_time: DateTime<Utc>,
    pub drift_secs: Option<i64>,
    pub origin: Option<String>,
    pub detail: Option<serde_json::Value>,
}

/// One row of the `admins` table.
#[derive(Debug, Clone)]
pub struct AdminRecord {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

// ── Operation outcomes ───────────────────────────────────────────
//
// Lifecycle operations return typed outcomes instead of errors: the
// store decides what the database state allows, the service maps that
// to wire errors. Only genuine storage failures surface as StoreError.

/// Outcome of `create_license`.
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Created(LicenseRecord),
    DuplicateKey,
    OwnerQuotaExceeded { current: u32 },
}

/// Outcome of `activate_seat`.
#[derive(Debug, Clone)]
pub enum ActivateOutcome {
    /// Seat bound (or re-confirmed for an already-bound fingerprint).
    Bound {
        license: LicenseRecord,
        binding: BindingRecord,
        already_bound: bool,
    },
    /// All seats taken by other fingerprints.
    QuotaExceeded { active_fingerprints: Vec<String> },
    /// This fingerprint previously held a seat that was moved away;
    /// rebinding happens only through an explicit transfer.
    SeatRetired,
    /// Status forbids activation (suspended, expired, revoked).
    Rejected { status: LicenseStatus },
    NotFound,
}

/// Outcome of `validate_seat`.
#[derive(Debug, Clone)]
pub enum ValidateOutcome {
    /// Active license, fingerprint holds an active seat.
    Ok { license: LicenseRecord },
    /// License is fine but this fingerprint holds no active seat.
    HardwareMismatch { license: LicenseRecord },
    /// Status forbids running (pending, suspended, expired, revoked).
    Rejected { license: LicenseRecord },
    NotFound,
}

/// Outcome of `transfer_seat`.
#[derive(Debug, Clone)]
pub enum TransferOutcome {
    Done {
        license: LicenseRecord,
        released: String,
        binding: BindingRecord,
    },
    /// The old fingerprint holds no active seat on this license.
    OldNotBound { active_fingerprints: Vec<String> },
    Rejected { status: LicenseStatus },
    NotFound,
}

/// Outcome of `revoke`.
#[derive(Debug, Clone)]
pub enum RevokeOutcome {
    Done { seats_released: usize },
    AlreadyRevoked,
    /// Terminal Expired cannot transition to Revoked.
    Rejected { status: LicenseStatus },
    NotFound,
}
