//! Shared test doubles: scriptable network API, settable clock, and
//! decision-token helpers.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use giro_client::{ApiFailure, Clock, ValidationApi};
use giro_license::protocol::{
    ActivateRequest, ActivateResponse, ValidateRequest, ValidateResponse,
};
use giro_license::{DecisionPayload, DecisionSigner, Entitlement, LicenseStatus, PlanTier};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const KEY: &str = "GIRO-AAAA-BBBB-CCCC-DDDD";

pub fn test_fingerprint() -> giro_license::Fingerprint {
    giro_license::Fingerprint::derive(&["test-os", "test-arch", "test-host", "test-machine"])
}

pub fn test_signer() -> DecisionSigner {
    let seed: [u8; 32] = [7u8; 32];
    DecisionSigner::from_seed(&seed)
}

pub fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_750_000_000, 0).unwrap()
}

pub fn entitlement() -> Entitlement {
    Entitlement {
        plan: PlanTier::Annual,
        max_seats: 5,
        expires_at: Some(t0().timestamp() + 365 * 24 * 3600),
    }
}

/// Builds a signed positive validate response for `key`.
pub fn granted_response(
    signer: &DecisionSigner,
    key: &giro_license::LicenseKey,
    now: DateTime<Utc>,
) -> ValidateResponse {
    let payload = DecisionPayload {
        key: key.as_str().to_string(),
        fingerprint: test_fingerprint().as_str().to_string(),
        status: LicenseStatus::Active,
        entitlement: Some(entitlement()),
        server_time: now.timestamp(),
    };
    let decision = signer.sign(&payload).unwrap();
    ValidateResponse {
        status: LicenseStatus::Active,
        entitlement: Some(entitlement()),
        server_time: now,
        decision,
        drift_flagged: false,
    }
}

/// Builds a signed negative validate response with the given status.
pub fn denied_response(
    signer: &DecisionSigner,
    key: &giro_license::LicenseKey,
    status: LicenseStatus,
    now: DateTime<Utc>,
) -> ValidateResponse {
    let payload = DecisionPayload {
        key: key.as_str().to_string(),
        fingerprint: test_fingerprint().as_str().to_string(),
        status,
        entitlement: None,
        server_time: now.timestamp(),
    };
    let decision = signer.sign(&payload).unwrap();
    ValidateResponse {
        status,
        entitlement: None,
        server_time: now,
        decision,
        drift_flagged: false,
    }
}

pub fn activate_ok(now: DateTime<Utc>) -> ActivateResponse {
    ActivateResponse {
        status: LicenseStatus::Active,
        entitlement: entitlement(),
        already_bound: false,
        server_time: now,
    }
}

pub fn network_down() -> ApiFailure {
    ApiFailure::Network("connection refused".to_string())
}

/// A clock the test moves by hand.
pub struct FakeClock {
    now: Mutex<DateTime<Utc>>,
}

impl FakeClock {
    pub fn at(start: DateTime<Utc>) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            now: Mutex::new(start),
        })
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance_hours(&self, hours: i64) {
        let mut guard = self.now.lock().unwrap();
        *guard += chrono::Duration::hours(hours);
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

type ValidateReply = (Option<Duration>, Result<ValidateResponse, ApiFailure>);

/// Scriptable network layer. Replies are consumed in order; when the
/// script runs dry, calls fail as unreachable.
pub struct FakeApi {
    validate_replies: Mutex<VecDeque<ValidateReply>>,
    activate_replies: Mutex<VecDeque<Result<ActivateResponse, ApiFailure>>>,
    pub validate_calls: AtomicU32,
}

impl FakeApi {
    pub fn new() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            validate_replies: Mutex::new(VecDeque::new()),
            activate_replies: Mutex::new(VecDeque::new()),
            validate_calls: AtomicU32::new(0),
        })
    }

    pub fn push_validate(&self, reply: Result<ValidateResponse, ApiFailure>) {
        self.validate_replies
            .lock()
            .unwrap()
            .push_back((None, reply));
    }

    /// Queues a reply that arrives only after `delay`.
    pub fn push_validate_delayed(
        &self,
        delay: Duration,
        reply: Result<ValidateResponse, ApiFailure>,
    ) {
        self.validate_replies
            .lock()
            .unwrap()
            .push_back((Some(delay), reply));
    }

    pub fn push_activate(&self, reply: Result<ActivateResponse, ApiFailure>) {
        self.activate_replies.lock().unwrap().push_back(reply);
    }
}

#[async_trait]
impl ValidationApi for FakeApi {
    async fn validate(
        &self,
        _key: &str,
        _request: &ValidateRequest,
    ) -> Result<ValidateResponse, ApiFailure> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.validate_replies.lock().unwrap().pop_front();
        match next {
            Some((delay, reply)) => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                reply
            }
            None => Err(network_down()),
        }
    }

    async fn activate(
        &self,
        _key: &str,
        _request: &ActivateRequest,
    ) -> Result<ActivateResponse, ApiFailure> {
        let next = self.activate_replies.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(network_down()))
    }
}
