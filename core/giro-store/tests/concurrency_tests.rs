//! Race tests for the seat-quota invariant.
//!
//! Two independent store handles (separate SQLite connections) against
//! the same database file, submitting activations simultaneously. The
//! `BEGIN IMMEDIATE` transaction in `activate_seat` must guarantee that
//! the number of successful bindings never exceeds `max_seats`,
//! regardless of timing.

mod common;

use common::{fp, make_license, t0};
use giro_store::{ActivateOutcome, LicenseStore};
use std::sync::{Arc, Barrier};
use std::thread;

const KEY: &str = "GIRO-AAAA-BBBB-CCCC-DDDD";

fn race_activations(store_path: &std::path::Path, fingerprints: Vec<String>) -> Vec<ActivateOutcome> {
    let barrier = Arc::new(Barrier::new(fingerprints.len()));
    let mut handles = Vec::new();

    for fingerprint in fingerprints {
        let path = store_path.to_path_buf();
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            let store = LicenseStore::open(&path).unwrap();
            barrier.wait();
            store
                .activate_seat(KEY, &fingerprint, "host", "linux 6.8", t0())
                .unwrap()
        }));
    }

    handles
        .into_iter()
        .map(|h| h.join().expect("activation thread panicked"))
        .collect()
}

#[test]
fn last_seat_race_admits_exactly_one() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("licenses.db");
    let store = LicenseStore::open(&path).unwrap();
    make_license(&store, KEY, 1, None);

    let outcomes = race_activations(&path, vec![fp(1), fp(2)]);

    let bound = outcomes
        .iter()
        .filter(|o| matches!(o, ActivateOutcome::Bound { .. }))
        .count();
    let rejected = outcomes
        .iter()
        .filter(|o| matches!(o, ActivateOutcome::QuotaExceeded { .. }))
        .count();
    assert_eq!(bound, 1, "exactly one activation wins the last seat");
    assert_eq!(rejected, 1, "the loser sees the quota, not a hang or a double seat");
}

#[test]
fn full_license_rejects_all_concurrent_newcomers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("licenses.db");
    let store = LicenseStore::open(&path).unwrap();
    make_license(&store, KEY, 2, None);
    store
        .activate_seat(KEY, &fp(1), "a", "linux", t0())
        .unwrap();
    store
        .activate_seat(KEY, &fp(2), "b", "linux", t0())
        .unwrap();

    let outcomes = race_activations(&path, vec![fp(3), fp(4), fp(5)]);

    for outcome in &outcomes {
        match outcome {
            ActivateOutcome::QuotaExceeded {
                active_fingerprints,
            } => {
                assert_eq!(active_fingerprints.len(), 2);
                assert!(active_fingerprints.contains(&fp(1)));
                assert!(active_fingerprints.contains(&fp(2)));
            }
            other => panic!("expected quota rejection, got {other:?}"),
        }
    }
}

#[test]
fn concurrent_same_fingerprint_is_idempotent_not_double() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("licenses.db");
    let store = LicenseStore::open(&path).unwrap();
    make_license(&store, KEY, 1, None);

    let outcomes = race_activations(&path, vec![fp(7), fp(7)]);

    // Both calls succeed (one creates, one replays) and only one binding
    // row exists afterward.
    assert!(outcomes
        .iter()
        .all(|o| matches!(o, ActivateOutcome::Bound { .. })));
    let (_, bindings) = store.license_with_bindings(KEY).unwrap().unwrap();
    assert_eq!(bindings.len(), 1);
}
