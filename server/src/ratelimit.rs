//! Per-API-key token bucket.
//!
//! Bounds the cost of fraud probing and accidental client tight loops.
//! Tokens refill continuously at the configured per-minute rate up to
//! the burst capacity; each request consumes one token.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Keyed token-bucket rate limiter.
pub struct RateLimiter {
    refill_per_sec: f64,
    burst: f64,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(per_minute: u32, burst: u32) -> Self {
        Self {
            refill_per_sec: f64::from(per_minute) / 60.0,
            burst: f64::from(burst.max(1)),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Takes one token for `key`. False means the caller should be
    /// answered with `RateLimited`.
    pub fn try_acquire(&self, key: &str) -> bool {
        self.try_acquire_at(key, Instant::now())
    }

    fn try_acquire_at(&self, key: &str, now: Instant) -> bool {
        let mut buckets = self.buckets.lock().unwrap();
        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            tokens: self.burst,
            last_refill: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_refill);
        bucket.tokens =
            (bucket.tokens + elapsed.as_secs_f64() * self.refill_per_sec).min(self.burst);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn burst_then_empty() {
        let limiter = RateLimiter::new(60, 3);
        let now = Instant::now();
        assert!(limiter.try_acquire_at("k", now));
        assert!(limiter.try_acquire_at("k", now));
        assert!(limiter.try_acquire_at("k", now));
        assert!(!limiter.try_acquire_at("k", now));
    }

    #[test]
    fn refills_over_time() {
        let limiter = RateLimiter::new(60, 1); // one token per second
        let now = Instant::now();
        assert!(limiter.try_acquire_at("k", now));
        assert!(!limiter.try_acquire_at("k", now));
        assert!(limiter.try_acquire_at("k", now + Duration::from_secs(1)));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new(60, 1);
        let now = Instant::now();
        assert!(limiter.try_acquire_at("a", now));
        assert!(limiter.try_acquire_at("b", now));
        assert!(!limiter.try_acquire_at("a", now));
    }

    #[test]
    fn refill_caps_at_burst() {
        let limiter = RateLimiter::new(600, 2);
        let now = Instant::now();
        assert!(limiter.try_acquire_at("k", now));
        // A long idle period refills to the burst cap, not beyond.
        let later = now + Duration::from_secs(3600);
        assert!(limiter.try_acquire_at("k", later));
        assert!(limiter.try_acquire_at("k", later));
        assert!(!limiter.try_acquire_at("k", later));
    }
}
