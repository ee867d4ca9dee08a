//! Shared test helpers for store tests.

#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use giro_license::PlanTier;
use giro_store::{CreateOutcome, LicenseRecord, LicenseStore, NewLicense};

/// Fixed base instant so tests are deterministic.
pub fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_750_000_000, 0).unwrap()
}

/// t0 plus a number of hours.
pub fn t0_plus_hours(hours: i64) -> DateTime<Utc> {
    t0() + Duration::hours(hours)
}

pub fn fp(n: u32) -> String {
    // 64 lowercase hex chars, distinct per n.
    format!("{:064x}", n)
}

pub fn make_license(
    store: &LicenseStore,
    key: &str,
    max_seats: u32,
    expires_at: Option<DateTime<Utc>>,
) -> LicenseRecord {
    let new = NewLicense {
        key: key.to_string(),
        owner: "owner-1".to_string(),
        plan: PlanTier::Annual,
        max_seats,
        expires_at,
    };
    match store.create_license(&new, 100, t0()).unwrap() {
        CreateOutcome::Created(record) => record,
        other => panic!("create failed: {other:?}"),
    }
}
