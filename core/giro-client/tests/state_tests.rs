//! Pure state machine tests: no I/O, no controller.

mod common;

use chrono::Duration;
use common::{entitlement, t0};
use giro_client::{
    cache_after_denial, cache_after_success, reconcile, state_from_cache, AttemptOutcome,
    CachedState, ClientState, InvalidReason, CACHE_VERSION,
};
use giro_license::LicenseStatus;
use pretty_assertions::assert_eq;

fn usable_cache() -> CachedState {
    cache_after_success(
        {
            let mut c = CachedState::empty();
            c.license_key = Some(common::KEY.to_string());
            c.fingerprint = Some("fp".to_string());
            c
        },
        &entitlement(),
        t0(),
        "decision-token",
        Duration::hours(72),
    )
}

#[test]
fn empty_cache_starts_loading() {
    assert_eq!(state_from_cache(None, t0()), ClientState::Loading);
    assert_eq!(
        state_from_cache(Some(&CachedState::empty()), t0()),
        ClientState::Loading
    );
}

#[test]
fn usable_cache_starts_valid_inside_window() {
    let cache = usable_cache();
    let state = state_from_cache(Some(&cache), t0() + Duration::hours(10));
    assert!(matches!(state, ClientState::Valid { .. }));
}

#[test]
fn usable_cache_past_deadline_starts_invalid() {
    let cache = usable_cache();
    let state = state_from_cache(Some(&cache), t0() + Duration::hours(73));
    assert_eq!(
        state,
        ClientState::Invalid {
            reason: InvalidReason::GraceExhausted
        }
    );
}

#[test]
fn unreachable_with_fresh_cache_enters_grace() {
    let cache = usable_cache();
    let outcome = AttemptOutcome::Unreachable {
        message: "offline".into(),
    };
    let state = reconcile(
        Some(&cache),
        &outcome,
        t0() + Duration::hours(71),
        Duration::hours(72),
    );
    match state {
        ClientState::GracePeriod { deadline, .. } => {
            assert_eq!(deadline, t0() + Duration::hours(72));
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn unreachable_past_window_is_invalid() {
    let cache = usable_cache();
    let outcome = AttemptOutcome::Unreachable {
        message: "offline".into(),
    };
    let state = reconcile(
        Some(&cache),
        &outcome,
        t0() + Duration::hours(73),
        Duration::hours(72),
    );
    assert_eq!(
        state,
        ClientState::Invalid {
            reason: InvalidReason::GraceExhausted
        }
    );
}

#[test]
fn unreachable_without_cache_is_error() {
    let outcome = AttemptOutcome::Unreachable {
        message: "offline".into(),
    };
    let state = reconcile(None, &outcome, t0(), Duration::hours(72));
    assert!(matches!(state, ClientState::Error { .. }));
}

#[test]
fn denial_beats_fresh_cache() {
    let cache = usable_cache();
    let outcome = AttemptOutcome::Denied {
        reason: InvalidReason::Revoked,
    };
    // One minute after validation: cache could not be fresher, the
    // denial still wins.
    let state = reconcile(
        Some(&cache),
        &outcome,
        t0() + Duration::minutes(1),
        Duration::hours(72),
    );
    assert_eq!(
        state,
        ClientState::Invalid {
            reason: InvalidReason::Revoked
        }
    );
}

#[test]
fn grant_refreshes_the_window() {
    let cache = usable_cache();
    let outcome = AttemptOutcome::Granted {
        entitlement: entitlement(),
        server_time: t0() + Duration::hours(48),
        decision: "fresh-token".into(),
    };
    let state = reconcile(
        Some(&cache),
        &outcome,
        t0() + Duration::hours(48),
        Duration::hours(72),
    );
    assert!(matches!(state, ClientState::Valid { .. }));

    let updated = cache_after_success(
        cache,
        &entitlement(),
        t0() + Duration::hours(48),
        "fresh-token",
        Duration::hours(72),
    );
    assert_eq!(
        updated.grace_deadline,
        Some((t0() + Duration::hours(120)).timestamp())
    );
    assert_eq!(updated.decision.as_deref(), Some("fresh-token"));
}

#[test]
fn denial_clears_entitlement() {
    let cache = usable_cache();
    let updated = cache_after_denial(cache, InvalidReason::Revoked);
    assert_eq!(updated.status, Some(LicenseStatus::Revoked));
    assert!(updated.entitlement.is_none());
    assert!(updated.decision.is_none());
    assert!(!updated.is_usable());
}

// ── Cache format versioning ──────────────────────────────────────

#[test]
fn unknown_fields_are_ignored() {
    let json = format!(
        r#"{{"version":{CACHE_VERSION},"license_key":"{}","some_future_field":true}}"#,
        common::KEY
    );
    let parsed: CachedState = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.license_key.as_deref(), Some(common::KEY));
}

#[test]
fn missing_fields_require_revalidation() {
    let json = format!(r#"{{"version":{CACHE_VERSION}}}"#);
    let parsed: CachedState = serde_json::from_str(&json).unwrap();
    assert!(!parsed.is_usable());
    assert_eq!(state_from_cache(Some(&parsed), t0()), ClientState::Loading);
}
