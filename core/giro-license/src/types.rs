//! Core domain types shared between server and client.

use serde::{Deserialize, Serialize};

/// The plan tier attached to a license.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    /// Trial (limited-time evaluation).
    Trial,
    /// Monthly subscription.
    Monthly,
    /// Annual subscription.
    Annual,
    /// Perpetual (one-time purchase, never expires).
    Perpetual,
}

impl PlanTier {
    /// Returns the default seat count for this tier, used when `create`
    /// is called without an explicit override.
    #[must_use]
    pub fn default_max_seats(&self) -> u32 {
        match self {
            Self::Trial => 1,
            Self::Monthly => 3,
            Self::Annual => 5,
            Self::Perpetual => 5,
        }
    }

    /// Returns the subscription duration in days, or None for perpetual.
    #[must_use]
    pub fn duration_days(&self) -> Option<i64> {
        match self {
            Self::Trial => Some(14),
            Self::Monthly => Some(30),
            Self::Annual => Some(365),
            Self::Perpetual => None,
        }
    }

    /// Stable string form used in the store and on the wire.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trial => "trial",
            Self::Monthly => "monthly",
            Self::Annual => "annual",
            Self::Perpetual => "perpetual",
        }
    }

    /// Parses the stable string form.
    #[must_use]
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "trial" => Some(Self::Trial),
            "monthly" => Some(Self::Monthly),
            "annual" => Some(Self::Annual),
            "perpetual" => Some(Self::Perpetual),
            _ => None,
        }
    }
}

/// Authoritative status of a license on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    /// Issued but never activated.
    Pending,
    /// Activated and in good standing.
    Active,
    /// Soft-blocked pending administrative review.
    Suspended,
    /// Past its expiry timestamp. Terminal.
    Expired,
    /// Administratively revoked. Terminal.
    Revoked,
}

impl LicenseStatus {
    /// Returns true if no further transitions are allowed out of this status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Expired | Self::Revoked)
    }

    /// Checks whether a transition to `next` is allowed.
    ///
    /// Transitions are monotonic along Pending → Active → Expired/Revoked,
    /// with Active ↔ Suspended as the only reversible pair.
    #[must_use]
    pub fn can_transition_to(&self, next: LicenseStatus) -> bool {
        if *self == next {
            return false;
        }
        match self {
            Self::Pending => matches!(next, Self::Active | Self::Expired | Self::Revoked),
            Self::Active => matches!(next, Self::Suspended | Self::Expired | Self::Revoked),
            Self::Suspended => matches!(next, Self::Active | Self::Expired | Self::Revoked),
            Self::Expired | Self::Revoked => false,
        }
    }

    /// Stable string form used in the store and on the wire.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
        }
    }

    /// Parses the stable string form.
    #[must_use]
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "suspended" => Some(Self::Suspended),
            "expired" => Some(Self::Expired),
            "revoked" => Some(Self::Revoked),
            _ => None,
        }
    }
}

/// The entitlement granted by a valid license, cached by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    /// Plan tier.
    pub plan: PlanTier,
    /// Maximum simultaneously-active hardware bindings.
    pub max_seats: u32,
    /// Expiry (seconds since epoch), or None for perpetual plans.
    pub expires_at: Option<i64>,
}
