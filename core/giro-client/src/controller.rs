//! The validation controller.
//!
//! Owns the client license state: answers `is_licensed()` from memory,
//! revalidates against the server in the background, and persists every
//! decision to the encrypted cache. Startup never blocks on the
//! network; the UI reads the cached decision immediately while a fresh
//! validation runs concurrently and reconciles.
//!
//! Ordering: every attempt takes a monotonically increasing sequence
//! number and a response is applied only if no newer response has been
//! applied already, so a slow request can never clobber a fresher
//! decision.

use crate::api::{ApiFailure, ValidationApi};
use crate::cache::StateCache;
use crate::error::{ClientError, ClientResult};
use crate::state::{
    cache_after_denial, cache_after_success, reconcile, state_from_cache, AttemptOutcome,
    CachedState, ClientState, InvalidReason,
};
use chrono::{DateTime, Utc};
use giro_license::protocol::{ActivateRequest, ErrorCode, ValidateRequest};
use giro_license::{Fingerprint, HostInfo, LicenseKey, LicenseStatus, VerifiedDecision};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Time source seam, so tests can drive the grace window directly.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Controller configuration.
pub struct ClientConfig {
    /// Where the encrypted state file lives.
    pub cache_path: PathBuf,
    /// How long cached state keeps the application running offline.
    pub grace_window: chrono::Duration,
    /// Background revalidation period.
    pub revalidate_interval: std::time::Duration,
    /// Public key for verifying decision tokens.
    pub decision_public_key: [u8; 32],
}

impl ClientConfig {
    /// Config with the default 72 h grace window and 4 h revalidation.
    #[must_use]
    pub fn new(cache_path: impl Into<PathBuf>, decision_public_key: [u8; 32]) -> Self {
        Self {
            cache_path: cache_path.into(),
            grace_window: chrono::Duration::hours(72),
            revalidate_interval: std::time::Duration::from_secs(4 * 60 * 60),
            decision_public_key,
        }
    }
}

/// Mutable session guarded by one lock: the persisted cache view plus
/// the highest applied sequence number.
struct Session {
    cached: Option<CachedState>,
    applied: u64,
}

struct Inner {
    config: ClientConfig,
    api: Arc<dyn ValidationApi>,
    clock: Arc<dyn Clock>,
    fingerprint: Fingerprint,
    cache: StateCache,
    state: RwLock<ClientState>,
    session: Mutex<Session>,
    seq: AtomicU64,
}

/// The client-side license state machine. Cheap to clone; all clones
/// share one state.
#[derive(Clone)]
pub struct ValidationController {
    inner: Arc<Inner>,
}

impl ValidationController {
    /// Builds a controller, loading (and signature-checking) any cached
    /// state. Does not touch the network.
    #[must_use]
    pub fn new(config: ClientConfig, api: Arc<dyn ValidationApi>, clock: Arc<dyn Clock>) -> Self {
        let fingerprint = Fingerprint::local();
        Self::with_fingerprint(config, api, clock, fingerprint)
    }

    /// Like [`ValidationController::new`] with an explicit fingerprint.
    #[must_use]
    pub fn with_fingerprint(
        config: ClientConfig,
        api: Arc<dyn ValidationApi>,
        clock: Arc<dyn Clock>,
        fingerprint: Fingerprint,
    ) -> Self {
        let cache = StateCache::new(&config.cache_path, &fingerprint);
        let cached = cache
            .load()
            .filter(|c| Self::cache_trustworthy(c, &config.decision_public_key, &fingerprint));

        let initial = state_from_cache(cached.as_ref(), clock.now());
        debug!(?initial, "controller starting from cached state");

        Self {
            inner: Arc::new(Inner {
                config,
                api,
                clock,
                fingerprint,
                cache,
                state: RwLock::new(initial),
                session: Mutex::new(Session { cached, applied: 0 }),
                seq: AtomicU64::new(0),
            }),
        }
    }

    /// A cache entry counts only if its decision token verifies and was
    /// issued to this machine for the cached key.
    fn cache_trustworthy(
        cached: &CachedState,
        public_key: &[u8; 32],
        fingerprint: &Fingerprint,
    ) -> bool {
        // Caches without a positive decision (e.g. persisted denials)
        // carry no entitlement and need no proof.
        if !cached.is_usable() {
            return true;
        }
        let (Some(token), Some(key)) = (&cached.decision, &cached.license_key) else {
            return false;
        };
        match VerifiedDecision::parse(token, public_key) {
            Ok(verified) => {
                let payload = verified.payload();
                payload.key == *key && payload.fingerprint == fingerprint.as_str()
            }
            Err(e) => {
                warn!("discarding cache with unverifiable decision: {e}");
                false
            }
        }
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn current(&self) -> ClientState {
        self.inner.state.read().unwrap().clone()
    }

    /// True when protected functionality may run right now.
    #[must_use]
    pub fn is_licensed(&self) -> bool {
        self.current().is_licensed()
    }

    /// This machine's fingerprint.
    #[must_use]
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.inner.fingerprint
    }

    /// Activates this machine against the server, then validates to
    /// obtain a signed decision. Creates the local state on success.
    pub async fn activate(&self, key: &LicenseKey) -> ClientResult<ClientState> {
        let host = HostInfo::collect();
        let request = ActivateRequest {
            fingerprint: self.inner.fingerprint.as_str().to_string(),
            hostname: host.hostname,
            os_descriptor: host.os_descriptor,
        };

        match self.inner.api.activate(key.as_str(), &request).await {
            Ok(response) => {
                info!(
                    key = key.as_str(),
                    already_bound = response.already_bound,
                    "activation accepted"
                );
                {
                    let mut session = self.inner.session.lock().unwrap();
                    let mut cached = session.cached.take().unwrap_or_else(CachedState::empty);
                    cached.license_key = Some(key.as_str().to_string());
                    cached.fingerprint = Some(self.inner.fingerprint.as_str().to_string());
                    self.inner.cache.save(&cached)?;
                    session.cached = Some(cached);
                }
                Ok(self.validate_now().await)
            }
            Err(ApiFailure::Denied {
                code: ErrorCode::HardwareQuotaExceeded,
                conflicting_fingerprints,
                ..
            }) => Err(ClientError::Quota {
                conflicting_fingerprints: conflicting_fingerprints.unwrap_or_default(),
            }),
            Err(failure) if failure.is_transient() => {
                Err(ClientError::Network(failure.to_string()))
            }
            Err(failure) => Err(ClientError::Denied(failure.to_string())),
        }
    }

    /// Runs one validation attempt and applies the outcome (unless a
    /// newer attempt finished first).
    pub async fn validate_now(&self) -> ClientState {
        let Some(key) = self.license_key() else {
            let state = ClientState::Invalid {
                reason: InvalidReason::NotActivated,
            };
            *self.inner.state.write().unwrap() = state.clone();
            return state;
        };

        let seq = self.inner.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let outcome = self.attempt(&key).await;
        self.apply(seq, outcome)
    }

    /// Destroys the local license state. The only sanctioned way to
    /// forget an activation.
    pub async fn deactivate(&self) -> ClientResult<()> {
        let mut session = self.inner.session.lock().unwrap();
        // Invalidate any in-flight responses.
        session.applied = self.inner.seq.load(Ordering::SeqCst);
        session.cached = None;
        self.inner.cache.destroy()?;
        *self.inner.state.write().unwrap() = ClientState::Invalid {
            reason: InvalidReason::NotActivated,
        };
        info!("local license state destroyed");
        Ok(())
    }

    /// Spawns the background revalidation task.
    ///
    /// The first validation fires immediately (startup validation), then
    /// every `revalidate_interval`. The returned handle cancels the task
    /// without persisting any partial result.
    #[must_use]
    pub fn start_background(&self) -> RevalidationHandle {
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let controller = self.clone();
        let interval = self.inner.config.revalidate_interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel_rx.changed() => break,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    _ = cancel_rx.changed() => break,
                    state = controller.validate_now() => {
                        debug!(?state, "background revalidation applied");
                    }
                }
            }
            debug!("revalidation task stopped");
        });

        RevalidationHandle {
            cancel: cancel_tx,
            task,
        }
    }

    fn license_key(&self) -> Option<String> {
        let session = self.inner.session.lock().unwrap();
        session.cached.as_ref().and_then(|c| c.license_key.clone())
    }

    async fn attempt(&self, key: &str) -> AttemptOutcome {
        let request = ValidateRequest {
            fingerprint: self.inner.fingerprint.as_str().to_string(),
            client_time: self.inner.clock.now(),
        };

        match self.inner.api.validate(key, &request).await {
            Ok(response) => self.outcome_from_decision(key, &response.decision),
            Err(failure) if failure.is_transient() => AttemptOutcome::Unreachable {
                message: failure.to_string(),
            },
            Err(ApiFailure::Denied { code, message, .. }) => match code {
                ErrorCode::HardwareMismatch => AttemptOutcome::Denied {
                    reason: InvalidReason::HardwareMismatch,
                },
                ErrorCode::AlreadyRevoked => AttemptOutcome::Denied {
                    reason: InvalidReason::Revoked,
                },
                ErrorCode::Expired => AttemptOutcome::Denied {
                    reason: InvalidReason::Expired,
                },
                ErrorCode::Suspended => AttemptOutcome::Denied {
                    reason: InvalidReason::Suspended,
                },
                ErrorCode::NotFound | ErrorCode::MalformedKey => AttemptOutcome::Denied {
                    reason: InvalidReason::NotActivated,
                },
                // An auth/config problem is not a license problem; let
                // the grace window absorb it and log loudly.
                _ => {
                    warn!("validation denied without a license decision: {message}");
                    AttemptOutcome::Unreachable { message }
                }
            },
            Err(failure) => AttemptOutcome::Unreachable {
                message: failure.to_string(),
            },
        }
    }

    /// Maps a signed decision token into an attempt outcome, verifying
    /// the signature and that it was issued to this machine for this
    /// key. A token that fails verification is treated as unreachable
    /// rather than as a decision.
    fn outcome_from_decision(&self, key: &str, token: &str) -> AttemptOutcome {
        let verified =
            match VerifiedDecision::parse(token, &self.inner.config.decision_public_key) {
                Ok(v) => v,
                Err(e) => {
                    warn!("decision token failed verification: {e}");
                    return AttemptOutcome::Unreachable {
                        message: format!("unverifiable decision: {e}"),
                    };
                }
            };
        let payload = verified.payload();
        if payload.key != key || payload.fingerprint != self.inner.fingerprint.as_str() {
            warn!("decision token issued for a different key or machine");
            return AttemptOutcome::Unreachable {
                message: "decision token mismatch".to_string(),
            };
        }

        match (payload.status, &payload.entitlement) {
            (LicenseStatus::Active, Some(entitlement)) => AttemptOutcome::Granted {
                entitlement: entitlement.clone(),
                server_time: DateTime::from_timestamp(payload.server_time, 0)
                    .unwrap_or(DateTime::UNIX_EPOCH),
                decision: token.to_string(),
            },
            (LicenseStatus::Revoked, _) => AttemptOutcome::Denied {
                reason: InvalidReason::Revoked,
            },
            (LicenseStatus::Expired, _) => AttemptOutcome::Denied {
                reason: InvalidReason::Expired,
            },
            (LicenseStatus::Suspended, _) => AttemptOutcome::Denied {
                reason: InvalidReason::Suspended,
            },
            _ => AttemptOutcome::Denied {
                reason: InvalidReason::NotActivated,
            },
        }
    }

    /// Applies an attempt outcome unless it is stale, persisting the new
    /// cache state in the same critical section.
    fn apply(&self, seq: u64, outcome: AttemptOutcome) -> ClientState {
        let mut session = self.inner.session.lock().unwrap();
        if seq <= session.applied {
            debug!(seq, applied = session.applied, "discarding stale response");
            return self.current();
        }
        session.applied = seq;

        let now = self.inner.clock.now();
        let next = reconcile(
            session.cached.as_ref(),
            &outcome,
            now,
            self.inner.config.grace_window,
        );

        match &outcome {
            AttemptOutcome::Granted {
                entitlement,
                server_time,
                decision,
            } => {
                let cached = cache_after_success(
                    session.cached.take().unwrap_or_else(CachedState::empty),
                    entitlement,
                    *server_time,
                    decision,
                    self.inner.config.grace_window,
                );
                if let Err(e) = self.inner.cache.save(&cached) {
                    warn!("failed to persist license cache: {e}");
                }
                session.cached = Some(cached);
            }
            AttemptOutcome::Denied { reason } => {
                let cached = cache_after_denial(
                    session.cached.take().unwrap_or_else(CachedState::empty),
                    *reason,
                );
                if let Err(e) = self.inner.cache.save(&cached) {
                    warn!("failed to persist license cache: {e}");
                }
                session.cached = Some(cached);
            }
            // Nothing new was learned; the grace deadline persisted with
            // the last success still stands.
            AttemptOutcome::Unreachable { .. } => {}
        }

        *self.inner.state.write().unwrap() = next.clone();
        next
    }
}

/// Explicit handle to the background revalidation task.
pub struct RevalidationHandle {
    cancel: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl RevalidationHandle {
    /// Stops the task. An attempt in flight is abandoned; partial
    /// results are never persisted.
    pub async fn shutdown(self) {
        let _ = self.cancel.send(true);
        let _ = self.task.await;
    }

    /// True while the task is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}
