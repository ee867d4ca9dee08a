//! Fraud and clock-drift detection.
//!
//! Every signal here is advisory: it is appended to the audit log and
//! surfaced on the response, but a single flag never changes license
//! status. Only repeated flags from the same fingerprint inside the
//! rolling window escalate to a soft block (Suspended), which an
//! administrator can lift.

use crate::config::FraudPolicy;
use chrono::{DateTime, Utc};
use giro_license::LicenseStatus;
use giro_store::{AuditAction, LicenseStore, NewAudit, StoreResult};
use tracing::{info, warn};

/// What the detector concluded about one validation attempt.
#[derive(Debug, Clone, Default)]
pub struct FraudAssessment {
    /// Signed client-minus-server clock difference.
    pub drift_secs: i64,
    /// Drift exceeded the configured threshold.
    pub drift_flagged: bool,
    /// Same fingerprint validated from a different origin implausibly
    /// recently.
    pub origin_flagged: bool,
    /// Accumulated flags crossed the policy threshold and the license
    /// was suspended.
    pub escalated: bool,
}

impl FraudAssessment {
    #[must_use]
    pub fn flagged(&self) -> bool {
        self.drift_flagged || self.origin_flagged
    }
}

/// Inspects validation attempts against the audit history.
pub struct FraudDetector {
    store: LicenseStore,
    policy: FraudPolicy,
}

impl FraudDetector {
    #[must_use]
    pub fn new(store: LicenseStore, policy: FraudPolicy) -> Self {
        Self { store, policy }
    }

    /// Assesses one validation attempt. Appends flag audit rows and, on
    /// escalation, suspends the license. Runs synchronously against the
    /// store; call from a blocking context.
    pub fn assess(
        &self,
        key: &str,
        fingerprint: &str,
        client_time: DateTime<Utc>,
        origin: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<FraudAssessment> {
        let mut assessment = FraudAssessment {
            drift_secs: (client_time - now).num_seconds(),
            ..Default::default()
        };

        if assessment.drift_secs.abs() > self.policy.drift_threshold.num_seconds() {
            assessment.drift_flagged = true;
            warn!(
                key,
                fingerprint,
                drift_secs = assessment.drift_secs,
                "client clock drift flagged"
            );
            self.store.append_audit(&NewAudit {
                license_key: key.to_string(),
                fingerprint: Some(fingerprint.to_string()),
                action: AuditAction::DriftFlagged,
                client_time: Some(client_time),
                server_time: now,
                drift_secs: Some(assessment.drift_secs),
                origin: origin.map(String::from),
                detail: None,
            })?;
        }

        if let Some(current_origin) = origin {
            if let Some((prev_time, Some(prev_origin))) =
                self.store.last_validation_origin(fingerprint)?
            {
                let interval = now - prev_time;
                if prev_origin != current_origin && interval < self.policy.min_origin_interval {
                    assessment.origin_flagged = true;
                    warn!(
                        key,
                        fingerprint,
                        prev_origin = %prev_origin,
                        current_origin,
                        interval_secs = interval.num_seconds(),
                        "implausible origin change flagged"
                    );
                    self.store.append_audit(&NewAudit {
                        license_key: key.to_string(),
                        fingerprint: Some(fingerprint.to_string()),
                        action: AuditAction::OriginFlagged,
                        client_time: Some(client_time),
                        server_time: now,
                        drift_secs: None,
                        origin: Some(current_origin.to_string()),
                        detail: Some(serde_json::json!({
                            "previous_origin": prev_origin,
                            "interval_secs": interval.num_seconds(),
                        })),
                    })?;
                }
            }
        }

        if assessment.flagged() {
            let since = now - self.policy.window;
            let flags = self.store.flagged_count_since(fingerprint, since)?;
            if flags >= self.policy.max_flags {
                // set_status enforces the transition rules; a license
                // that is already terminal stays as it is.
                if let Some(updated) =
                    self.store.set_status(key, LicenseStatus::Suspended, now)?
                {
                    assessment.escalated = true;
                    info!(
                        key,
                        fingerprint, flags, "fraud flags escalated, license suspended"
                    );
                    self.store.append_audit(&NewAudit {
                        license_key: key.to_string(),
                        fingerprint: Some(fingerprint.to_string()),
                        action: AuditAction::Suspended,
                        client_time: Some(client_time),
                        server_time: now,
                        drift_secs: None,
                        origin: origin.map(String::from),
                        detail: Some(serde_json::json!({
                            "flags_in_window": flags,
                            "status": updated.status.as_str(),
                        })),
                    })?;
                }
            }
        }

        Ok(assessment)
    }
}
