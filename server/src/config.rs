//! Server configuration.
//!
//! Defaults are production values; every tunable can be overridden from
//! the environment so deployments never patch constants. The fraud
//! thresholds in particular are policy, not code.

use chrono::Duration;
use std::time::Duration as StdDuration;

/// Fraud and clock-drift policy.
#[derive(Debug, Clone)]
pub struct FraudPolicy {
    /// Absolute client/server clock difference that flags an attempt.
    pub drift_threshold: Duration,
    /// Rolling window over which flags are counted.
    pub window: Duration,
    /// Flag count within the window that escalates to a soft block.
    pub max_flags: u32,
    /// Two validations from different origins closer together than this
    /// flag potential credential sharing.
    pub min_origin_interval: Duration,
}

impl Default for FraudPolicy {
    fn default() -> Self {
        Self {
            drift_threshold: Duration::minutes(5),
            window: Duration::hours(24),
            max_flags: 3,
            min_origin_interval: Duration::minutes(10),
        }
    }
}

/// Everything the server reads at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub fraud: FraudPolicy,
    /// Admin session lifetime.
    pub session_ttl: Duration,
    /// Upper bound on non-revoked licenses per owner.
    pub max_licenses_per_owner: u32,
    /// Token-bucket refill rate per API key.
    pub rate_limit_per_minute: u32,
    /// Token-bucket burst capacity per API key.
    pub rate_limit_burst: u32,
    /// Hard timeout applied to every HTTP request.
    pub request_timeout: StdDuration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            fraud: FraudPolicy::default(),
            session_ttl: Duration::hours(8),
            max_licenses_per_owner: 500,
            rate_limit_per_minute: 60,
            rate_limit_burst: 10,
            request_timeout: StdDuration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// Loads the config, applying `GIRO_*` environment overrides on top
    /// of the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(secs) = env_i64("GIRO_DRIFT_THRESHOLD_SECS") {
            config.fraud.drift_threshold = Duration::seconds(secs);
        }
        if let Some(secs) = env_i64("GIRO_FRAUD_WINDOW_SECS") {
            config.fraud.window = Duration::seconds(secs);
        }
        if let Some(n) = env_u32("GIRO_FRAUD_MAX_FLAGS") {
            config.fraud.max_flags = n;
        }
        if let Some(secs) = env_i64("GIRO_MIN_ORIGIN_INTERVAL_SECS") {
            config.fraud.min_origin_interval = Duration::seconds(secs);
        }
        if let Some(secs) = env_i64("GIRO_SESSION_TTL_SECS") {
            config.session_ttl = Duration::seconds(secs);
        }
        if let Some(n) = env_u32("GIRO_MAX_LICENSES_PER_OWNER") {
            config.max_licenses_per_owner = n;
        }
        if let Some(n) = env_u32("GIRO_RATE_LIMIT_PER_MINUTE") {
            config.rate_limit_per_minute = n;
        }
        if let Some(n) = env_u32("GIRO_RATE_LIMIT_BURST") {
            config.rate_limit_burst = n;
        }
        if let Some(secs) = env_i64("GIRO_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = StdDuration::from_secs(secs.max(1) as u64);
        }

        config
    }
}

fn env_i64(name: &str) -> Option<i64> {
    std::env::var(name).ok()?.parse().ok()
}

fn env_u32(name: &str) -> Option<u32> {
    std::env::var(name).ok()?.parse().ok()
}
