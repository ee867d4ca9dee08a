//! The license lifecycle service.
//!
//! Orchestrates the store, the fraud detector, and the decision signer.
//! Store work runs on the blocking pool; transient store errors
//! (busy/locked) are retried once with backoff, domain outcomes are
//! never retried and map straight to API errors.

use crate::config::ServerConfig;
use crate::error::{ApiError, ApiResult};
use crate::fraud::{FraudAssessment, FraudDetector};
use chrono::Utc;
use giro_license::protocol::{
    ActivateRequest, ActivateResponse, BindingInfo, CreateLicenseRequest, LicenseInfo,
    RevokeResponse, TransferRequest, TransferResponse, ValidateRequest, ValidateResponse,
};
use giro_license::{
    generate, DecisionPayload, DecisionSigner, Entitlement, Fingerprint, LicenseKey,
};
use giro_store::{
    ActivateOutcome, AuditAction, BindingRecord, CreateOutcome, LicenseRecord, LicenseStore,
    NewAudit, NewLicense, RevokeOutcome, StoreError, TransferOutcome, ValidateOutcome,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Attempts at generating an unused key before giving up.
const KEY_GENERATION_ATTEMPTS: u32 = 3;

/// Backoff before the single retry of a busy store operation.
const RETRY_BACKOFF: Duration = Duration::from_millis(200);

pub struct LicenseService {
    store: LicenseStore,
    fraud: Arc<FraudDetector>,
    signer: Arc<DecisionSigner>,
    config: Arc<ServerConfig>,
}

impl LicenseService {
    #[must_use]
    pub fn new(
        store: LicenseStore,
        fraud: Arc<FraudDetector>,
        signer: Arc<DecisionSigner>,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            store,
            fraud,
            signer,
            config,
        }
    }

    /// The public key clients embed to verify decisions.
    #[must_use]
    pub fn decision_public_key(&self) -> [u8; 32] {
        self.signer.public_key()
    }

    /// Runs a store closure on the blocking pool, retrying once with
    /// backoff when the store reports a retryable (busy) error.
    async fn with_store<T, F>(&self, op: F) -> ApiResult<T>
    where
        T: Send + 'static,
        F: Fn(&LicenseStore) -> Result<T, StoreError> + Clone + Send + 'static,
    {
        let store = self.store.clone();
        let first = tokio::task::spawn_blocking({
            let op = op.clone();
            let store = store.clone();
            move || op(&store)
        })
        .await
        .map_err(|e| ApiError::Internal(format!("store task failed: {e}")))?;

        match first {
            Err(e) if e.is_retryable() => {
                tracing::warn!("store busy, retrying once: {e}");
                tokio::time::sleep(RETRY_BACKOFF).await;
                tokio::task::spawn_blocking(move || op(&store))
                    .await
                    .map_err(|e| ApiError::Internal(format!("store task failed: {e}")))?
                    .map_err(Into::into)
            }
            other => other.map_err(Into::into),
        }
    }

    // ── create ───────────────────────────────────────────────────

    /// Issues a new license. The key is generated server-side.
    pub async fn create(&self, request: CreateLicenseRequest) -> ApiResult<LicenseInfo> {
        let max_seats = request
            .max_seats
            .unwrap_or_else(|| request.plan.default_max_seats());
        if max_seats == 0 {
            return Err(ApiError::Internal("max_seats must be at least 1".into()));
        }
        let max_per_owner = self.config.max_licenses_per_owner;

        for _ in 0..KEY_GENERATION_ATTEMPTS {
            let key = generate();
            let new = NewLicense {
                key: key.as_str().to_string(),
                owner: request.owner.clone(),
                plan: request.plan,
                max_seats,
                expires_at: request.expires_at,
            };

            let outcome = self
                .with_store(move |store| {
                    let now = Utc::now();
                    let outcome = store.create_license(&new, max_per_owner, now)?;
                    if let CreateOutcome::Created(record) = &outcome {
                        store.append_audit(&NewAudit {
                            license_key: record.key.clone(),
                            fingerprint: None,
                            action: AuditAction::Created,
                            client_time: None,
                            server_time: now,
                            drift_secs: None,
                            origin: None,
                            detail: Some(serde_json::json!({
                                "owner": record.owner,
                                "plan": record.plan.as_str(),
                                "max_seats": record.max_seats,
                            })),
                        })?;
                    }
                    Ok(outcome)
                })
                .await?;

            match outcome {
                CreateOutcome::Created(record) => {
                    info!(key = %record.key, owner = %record.owner, "license created");
                    return Ok(license_info(record, Vec::new()));
                }
                // 75 bits of key entropy: a collision means someone is
                // feeding us keys, but regenerating is free.
                CreateOutcome::DuplicateKey => continue,
                CreateOutcome::OwnerQuotaExceeded { current } => {
                    return Err(ApiError::OwnerQuotaExceeded {
                        current,
                        limit: max_per_owner,
                    });
                }
            }
        }

        Err(ApiError::Internal(
            "could not generate an unused license key".into(),
        ))
    }

    // ── read ─────────────────────────────────────────────────────

    pub async fn get(&self, key: &str) -> ApiResult<LicenseInfo> {
        let key = parse_key(key)?;
        let found = self
            .with_store(move |store| store.license_with_bindings(key.as_str()))
            .await?;
        let (license, bindings) = found.ok_or(ApiError::NotFound)?;
        Ok(license_info(license, bindings))
    }

    // ── activate ─────────────────────────────────────────────────

    pub async fn activate(
        &self,
        key: &str,
        request: ActivateRequest,
        origin: Option<String>,
    ) -> ApiResult<ActivateResponse> {
        let key = parse_key(key)?;
        let fingerprint = parse_fingerprint(&request.fingerprint)?;

        let outcome = self
            .with_store(move |store| {
                let now = Utc::now();
                let outcome = store.activate_seat(
                    key.as_str(),
                    fingerprint.as_str(),
                    &request.hostname,
                    &request.os_descriptor,
                    now,
                )?;
                let (action, detail) = match &outcome {
                    ActivateOutcome::Bound { already_bound, .. } => (
                        AuditAction::Activated,
                        serde_json::json!({
                            "hostname": request.hostname,
                            "already_bound": already_bound,
                        }),
                    ),
                    ActivateOutcome::QuotaExceeded {
                        active_fingerprints,
                    } => (
                        AuditAction::QuotaConflict,
                        serde_json::json!({ "active": active_fingerprints }),
                    ),
                    _ => (
                        AuditAction::ValidationFailed,
                        serde_json::json!({ "phase": "activate" }),
                    ),
                };
                store.append_audit(&NewAudit {
                    license_key: key.as_str().to_string(),
                    fingerprint: Some(fingerprint.as_str().to_string()),
                    action,
                    client_time: None,
                    server_time: now,
                    drift_secs: None,
                    origin: origin.clone(),
                    detail: Some(detail),
                })?;
                Ok(outcome)
            })
            .await?;

        match outcome {
            ActivateOutcome::Bound {
                license,
                binding,
                already_bound,
            } => {
                info!(
                    key = %license.key,
                    fingerprint = %binding.fingerprint,
                    already_bound,
                    "activation accepted"
                );
                Ok(ActivateResponse {
                    status: license.status,
                    entitlement: entitlement_of(&license),
                    already_bound,
                    server_time: Utc::now(),
                })
            }
            ActivateOutcome::QuotaExceeded {
                active_fingerprints,
            } => Err(ApiError::HardwareQuotaExceeded {
                conflicting: active_fingerprints,
            }),
            ActivateOutcome::SeatRetired => Err(ApiError::HardwareMismatch),
            ActivateOutcome::Rejected { status } => Err(status_error(status)),
            ActivateOutcome::NotFound => Err(ApiError::NotFound),
        }
    }

    // ── validate ─────────────────────────────────────────────────

    /// Re-checks status, expiry, and seat membership; runs fraud
    /// detection; returns a signed decision with the server clock.
    pub async fn validate(
        &self,
        key: &str,
        request: ValidateRequest,
        origin: Option<String>,
    ) -> ApiResult<ValidateResponse> {
        let key = parse_key(key)?;
        let fingerprint = parse_fingerprint(&request.fingerprint)?;
        let asking_fingerprint = fingerprint.clone();
        let fraud = Arc::clone(&self.fraud);

        let (outcome, assessment) = self
            .with_store(move |store| {
                let now = Utc::now();
                // Fraud first: flags are recorded even for attempts the
                // license checks then reject, and an escalation must be
                // visible to the validation that triggered it.
                let assessment = fraud.assess(
                    key.as_str(),
                    fingerprint.as_str(),
                    request.client_time,
                    origin.as_deref(),
                    now,
                )?;

                let outcome = store.validate_seat(key.as_str(), fingerprint.as_str(), now)?;

                let action = match &outcome {
                    ValidateOutcome::Ok { .. } => AuditAction::Validated,
                    _ => AuditAction::ValidationFailed,
                };
                store.append_audit(&NewAudit {
                    license_key: key.as_str().to_string(),
                    fingerprint: Some(fingerprint.as_str().to_string()),
                    action,
                    client_time: Some(request.client_time),
                    server_time: now,
                    drift_secs: Some(assessment.drift_secs),
                    origin: origin.clone(),
                    detail: None,
                })?;
                Ok((outcome, assessment))
            })
            .await?;

        match outcome {
            ValidateOutcome::Ok { license } => {
                self.signed_response(&license, &asking_fingerprint, true, &assessment)
            }
            ValidateOutcome::Rejected { license } => {
                self.signed_response(&license, &asking_fingerprint, false, &assessment)
            }
            ValidateOutcome::HardwareMismatch { .. } => Err(ApiError::HardwareMismatch),
            ValidateOutcome::NotFound => Err(ApiError::NotFound),
        }
    }

    fn signed_response(
        &self,
        license: &LicenseRecord,
        fingerprint: &Fingerprint,
        positive: bool,
        assessment: &FraudAssessment,
    ) -> ApiResult<ValidateResponse> {
        let now = Utc::now();
        let entitlement = positive.then(|| entitlement_of(license));
        let payload = DecisionPayload {
            key: license.key.clone(),
            // The decision is bound to the fingerprint that asked; for
            // positive decisions that is the seat holder.
            fingerprint: fingerprint.as_str().to_string(),
            status: license.status,
            entitlement: entitlement.clone(),
            server_time: now.timestamp(),
        };
        let decision = self
            .signer
            .sign(&payload)
            .map_err(|e| ApiError::Internal(format!("decision signing failed: {e}")))?;

        Ok(ValidateResponse {
            status: license.status,
            entitlement,
            server_time: now,
            decision,
            drift_flagged: assessment.drift_flagged,
        })
    }

    // ── transfer ─────────────────────────────────────────────────

    /// Moves a seat between fingerprints, audited as one administrative
    /// event.
    pub async fn transfer(
        &self,
        key: &str,
        request: TransferRequest,
    ) -> ApiResult<TransferResponse> {
        let key = parse_key(key)?;
        let old = parse_fingerprint(&request.old_fingerprint)?;
        let new = parse_fingerprint(&request.new_fingerprint)?;

        let outcome = self
            .with_store(move |store| {
                let now = Utc::now();
                let outcome =
                    store.transfer_seat(key.as_str(), old.as_str(), new.as_str(), now)?;
                if let TransferOutcome::Done { released, binding, .. } = &outcome {
                    store.append_audit(&NewAudit {
                        license_key: key.as_str().to_string(),
                        fingerprint: Some(binding.fingerprint.clone()),
                        action: AuditAction::Transferred,
                        client_time: None,
                        server_time: now,
                        drift_secs: None,
                        origin: None,
                        detail: Some(serde_json::json!({
                            "from": released,
                            "to": binding.fingerprint,
                        })),
                    })?;
                }
                Ok(outcome)
            })
            .await?;

        match outcome {
            TransferOutcome::Done {
                license, binding, ..
            } => {
                info!(key = %license.key, to = %binding.fingerprint, "seat transferred");
                Ok(TransferResponse {
                    status: license.status,
                    old_fingerprint: request.old_fingerprint,
                    new_fingerprint: request.new_fingerprint,
                })
            }
            TransferOutcome::OldNotBound { .. } => Err(ApiError::HardwareMismatch),
            TransferOutcome::Rejected { status } => Err(status_error(status)),
            TransferOutcome::NotFound => Err(ApiError::NotFound),
        }
    }

    // ── revoke ───────────────────────────────────────────────────

    /// Revokes a license and releases its seats. Irreversible.
    pub async fn revoke(&self, key: &str) -> ApiResult<RevokeResponse> {
        let key = parse_key(key)?;

        let outcome = self
            .with_store(move |store| {
                let now = Utc::now();
                let outcome = store.revoke(key.as_str(), now)?;
                if let RevokeOutcome::Done { seats_released } = &outcome {
                    store.append_audit(&NewAudit {
                        license_key: key.as_str().to_string(),
                        fingerprint: None,
                        action: AuditAction::Revoked,
                        client_time: None,
                        server_time: now,
                        drift_secs: None,
                        origin: None,
                        detail: Some(serde_json::json!({ "seats_released": seats_released })),
                    })?;
                }
                Ok(outcome)
            })
            .await?;

        match outcome {
            RevokeOutcome::Done { seats_released } => {
                Ok(RevokeResponse {
                    status: giro_license::LicenseStatus::Revoked,
                    seats_released,
                })
            }
            RevokeOutcome::AlreadyRevoked => Err(ApiError::AlreadyRevoked),
            RevokeOutcome::Rejected { status } => Err(status_error(status)),
            RevokeOutcome::NotFound => Err(ApiError::NotFound),
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────

fn parse_key(key: &str) -> ApiResult<LicenseKey> {
    // Fail fast: no store or fraud work for keys that cannot exist.
    LicenseKey::parse(key).map_err(|e| ApiError::MalformedKey(e.to_string()))
}

fn parse_fingerprint(value: &str) -> ApiResult<Fingerprint> {
    Fingerprint::parse(value)
        .ok_or_else(|| ApiError::MalformedKey("fingerprint is not a valid token".into()))
}

fn entitlement_of(license: &LicenseRecord) -> Entitlement {
    Entitlement {
        plan: license.plan,
        max_seats: license.max_seats,
        expires_at: license.expires_at.map(|t| t.timestamp()),
    }
}

fn status_error(status: giro_license::LicenseStatus) -> ApiError {
    match status {
        giro_license::LicenseStatus::Revoked => ApiError::AlreadyRevoked,
        giro_license::LicenseStatus::Expired => ApiError::Expired,
        giro_license::LicenseStatus::Suspended => ApiError::Suspended,
        _ => ApiError::HardwareMismatch,
    }
}

fn license_info(license: LicenseRecord, bindings: Vec<BindingRecord>) -> LicenseInfo {
    LicenseInfo {
        key: license.key,
        owner: license.owner,
        plan: license.plan,
        max_seats: license.max_seats,
        status: license.status,
        expires_at: license.expires_at,
        last_validated: license.last_validated,
        validation_count: license.validation_count,
        created_at: license.created_at,
        bindings: bindings.into_iter().map(binding_info).collect(),
    }
}

fn binding_info(binding: BindingRecord) -> BindingInfo {
    BindingInfo {
        fingerprint: binding.fingerprint,
        hostname: binding.hostname,
        os_descriptor: binding.os_descriptor,
        first_seen: binding.first_seen,
        last_seen: binding.last_seen,
        active: binding.active,
    }
}
