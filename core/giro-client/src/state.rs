//! The validation state machine, free of I/O.
//!
//! The controller owns all network and disk access; the functions here
//! only map (cached state, attempt outcome, now) to the next state.
//! That keeps every transition testable with a fake clock and a fake
//! network layer.

use chrono::{DateTime, Duration, Utc};
use giro_license::{Entitlement, LicenseStatus};
use serde::{Deserialize, Serialize};

/// Current cache format version.
pub const CACHE_VERSION: u32 = 1;

/// The persisted client license state.
///
/// Every field except `version` is optional: older caches simply miss
/// newer fields, and unknown fields from newer writers are ignored on
/// load. Anything missing degrades to "require re-validation".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedState {
    pub version: u32,
    #[serde(default)]
    pub license_key: Option<String>,
    #[serde(default)]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub status: Option<LicenseStatus>,
    #[serde(default)]
    pub entitlement: Option<Entitlement>,
    /// Last successful validation (seconds since epoch).
    #[serde(default)]
    pub last_validated: Option<i64>,
    /// Grace deadline (seconds since epoch), last_validated + window.
    #[serde(default)]
    pub grace_deadline: Option<i64>,
    /// Signed decision token backing this cache entry.
    #[serde(default)]
    pub decision: Option<String>,
}

impl CachedState {
    /// An empty cache for a fresh activation.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            version: CACHE_VERSION,
            license_key: None,
            fingerprint: None,
            status: None,
            entitlement: None,
            last_validated: None,
            grace_deadline: None,
            decision: None,
        }
    }

    /// True when the cache carries everything needed to answer
    /// `isLicensed()` offline.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.status == Some(LicenseStatus::Active)
            && self.entitlement.is_some()
            && self.last_validated.is_some()
            && self.grace_deadline.is_some()
            && self.license_key.is_some()
    }
}

/// Why the application is blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    Revoked,
    Expired,
    Suspended,
    HardwareMismatch,
    NotActivated,
    /// Offline past the grace deadline.
    GraceExhausted,
}

/// The controller's externally visible state.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientState {
    /// Process start, no decision reached yet.
    Loading,
    /// Confirmed by the server within the current validation cycle.
    Valid {
        entitlement: Entitlement,
        last_validated: DateTime<Utc>,
    },
    /// Running on cached state without network confirmation, time-boxed.
    GracePeriod {
        entitlement: Entitlement,
        deadline: DateTime<Utc>,
    },
    /// Blocked. Terminal until a new activation.
    Invalid { reason: InvalidReason },
    /// Startup failure with no usable cache: no network and nothing
    /// cached to fall back on.
    Error { message: String },
}

impl ClientState {
    /// True when protected functionality may run.
    #[must_use]
    pub fn is_licensed(&self) -> bool {
        matches!(self, Self::Valid { .. } | Self::GracePeriod { .. })
    }
}

/// The result of one validation attempt, as seen by the state machine.
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    /// Server confirmed the license.
    Granted {
        entitlement: Entitlement,
        server_time: DateTime<Utc>,
        /// Signature-verified decision token, persisted with the cache.
        decision: String,
    },
    /// Server answered with a blocking decision. Overrides any cached
    /// grace allowance.
    Denied { reason: InvalidReason },
    /// Transient failure: offline, rate limited, server error. Absorbed
    /// by the grace window when possible.
    Unreachable { message: String },
}

/// Computes the startup state from cache alone, before any network
/// attempt completes. The UI renders from this immediately.
#[must_use]
pub fn state_from_cache(
    cached: Option<&CachedState>,
    now: DateTime<Utc>,
) -> ClientState {
    let Some(cached) = cached else {
        return ClientState::Loading;
    };
    if !cached.is_usable() {
        return ClientState::Loading;
    }
    // is_usable() checked these.
    let entitlement = cached.entitlement.clone().unwrap();
    let deadline = ts(cached.grace_deadline.unwrap());
    let last_validated = ts(cached.last_validated.unwrap());

    if now <= deadline {
        ClientState::Valid {
            entitlement,
            last_validated,
        }
    } else {
        ClientState::Invalid {
            reason: InvalidReason::GraceExhausted,
        }
    }
}

/// Applies one attempt outcome.
///
/// `cached` is the state persisted before this attempt; `grace_window`
/// bounds how long `Unreachable` outcomes keep the application running.
#[must_use]
pub fn reconcile(
    cached: Option<&CachedState>,
    outcome: &AttemptOutcome,
    now: DateTime<Utc>,
    grace_window: Duration,
) -> ClientState {
    match outcome {
        AttemptOutcome::Granted {
            entitlement,
            server_time,
            ..
        } => ClientState::Valid {
            entitlement: entitlement.clone(),
            last_validated: *server_time,
        },
        AttemptOutcome::Denied { reason } => ClientState::Invalid { reason: *reason },
        AttemptOutcome::Unreachable { message } => {
            let Some(cached) = cached.filter(|c| c.is_usable()) else {
                return ClientState::Error {
                    message: message.clone(),
                };
            };
            let last = ts(cached.last_validated.unwrap());
            let deadline = last + grace_window;
            if now <= deadline {
                ClientState::GracePeriod {
                    entitlement: cached.entitlement.clone().unwrap(),
                    deadline,
                }
            } else {
                ClientState::Invalid {
                    reason: InvalidReason::GraceExhausted,
                }
            }
        }
    }
}

/// Folds a successful attempt back into the cache for persistence.
#[must_use]
pub fn cache_after_success(
    mut cached: CachedState,
    entitlement: &Entitlement,
    server_time: DateTime<Utc>,
    decision: &str,
    grace_window: Duration,
) -> CachedState {
    cached.version = CACHE_VERSION;
    cached.status = Some(LicenseStatus::Active);
    cached.entitlement = Some(entitlement.clone());
    cached.last_validated = Some(server_time.timestamp());
    cached.grace_deadline = Some((server_time + grace_window).timestamp());
    cached.decision = Some(decision.to_string());
    cached
}

/// Folds a blocking decision into the cache: the entitlement is gone and
/// the next startup must re-validate.
#[must_use]
pub fn cache_after_denial(mut cached: CachedState, reason: InvalidReason) -> CachedState {
    cached.version = CACHE_VERSION;
    cached.status = Some(match reason {
        InvalidReason::Revoked => LicenseStatus::Revoked,
        InvalidReason::Expired => LicenseStatus::Expired,
        InvalidReason::Suspended => LicenseStatus::Suspended,
        InvalidReason::HardwareMismatch
        | InvalidReason::NotActivated
        | InvalidReason::GraceExhausted => LicenseStatus::Pending,
    });
    cached.entitlement = None;
    cached.grace_deadline = None;
    cached.decision = None;
    cached
}

fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::UNIX_EPOCH)
}
