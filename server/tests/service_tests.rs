//! Service-level tests, driving LicenseService without HTTP.

mod common;

use common::{fp, spawn_app, spawn_default_app};
use giro_license::protocol::{CreateLicenseRequest, TransferRequest, ValidateRequest};
use giro_license::{LicenseStatus, PlanTier};
use giro_license_server::{ApiError, ServerConfig};

fn create_request(max_seats: u32) -> CreateLicenseRequest {
    CreateLicenseRequest {
        owner: "owner-1".to_string(),
        plan: PlanTier::Annual,
        max_seats: Some(max_seats),
        expires_at: None,
    }
}

fn validate_request(fingerprint: &str) -> ValidateRequest {
    ValidateRequest {
        fingerprint: fingerprint.to_string(),
        client_time: chrono::Utc::now(),
    }
}

fn skewed_request(fingerprint: &str, minutes: i64) -> ValidateRequest {
    ValidateRequest {
        fingerprint: fingerprint.to_string(),
        client_time: chrono::Utc::now() + chrono::Duration::minutes(minutes),
    }
}

// ── Fraud escalation ─────────────────────────────────────────────

#[tokio::test]
async fn repeated_drift_flags_escalate_to_suspension() {
    let mut config = ServerConfig::default();
    config.fraud.max_flags = 3;
    let app = spawn_app(config).await;

    let info = app.service.create(create_request(1)).await.unwrap();
    let key = info.key;
    app.activate(&key, &fp(1)).await;

    // Two flagged validations: advisory only, license stays active.
    for _ in 0..2 {
        let resp = app
            .service
            .validate(&key, skewed_request(&fp(1), 30), None)
            .await
            .unwrap();
        assert!(resp.drift_flagged);
        assert_eq!(resp.status, LicenseStatus::Active);
    }

    // Third flag inside the window crosses the policy threshold: the
    // license is soft-blocked pending review.
    let resp = app
        .service
        .validate(&key, skewed_request(&fp(1), 30), None)
        .await
        .unwrap();
    assert!(resp.drift_flagged);
    assert_eq!(resp.status, LicenseStatus::Suspended);
    assert!(resp.entitlement.is_none());

    // Administrative review lifts the suspension.
    let restored = app
        .store
        .set_status(&key, LicenseStatus::Active, chrono::Utc::now())
        .unwrap()
        .unwrap();
    assert_eq!(restored.status, LicenseStatus::Active);
    let resp = app
        .service
        .validate(&key, validate_request(&fp(1)), None)
        .await
        .unwrap();
    assert_eq!(resp.status, LicenseStatus::Active);
}

#[tokio::test]
async fn origin_shift_is_flagged() {
    let app = spawn_default_app().await;
    let info = app.service.create(create_request(1)).await.unwrap();
    let key = info.key;
    app.activate(&key, &fp(1)).await;

    // Validation from one origin, then another seconds later.
    app.service
        .validate(&key, validate_request(&fp(1)), Some("203.0.113.7".into()))
        .await
        .unwrap();
    let resp = app
        .service
        .validate(&key, validate_request(&fp(1)), Some("198.51.100.9".into()))
        .await
        .unwrap();
    // Advisory: the flag lands in the audit trail, status unchanged.
    assert_eq!(resp.status, LicenseStatus::Active);
    let rows = app.store.audit_for_license(&key, 20).unwrap();
    assert!(rows
        .iter()
        .any(|r| r.action == giro_store::AuditAction::OriginFlagged));
}

#[tokio::test]
async fn same_origin_is_never_flagged() {
    let app = spawn_default_app().await;
    let info = app.service.create(create_request(1)).await.unwrap();
    let key = info.key;
    app.activate(&key, &fp(1)).await;

    for _ in 0..3 {
        let resp = app
            .service
            .validate(&key, validate_request(&fp(1)), Some("203.0.113.7".into()))
            .await
            .unwrap();
        assert!(!resp.drift_flagged);
        assert_eq!(resp.status, LicenseStatus::Active);
    }
    let rows = app.store.audit_for_license(&key, 20).unwrap();
    assert!(!rows
        .iter()
        .any(|r| r.action == giro_store::AuditAction::OriginFlagged));
}

// ── Expiry ───────────────────────────────────────────────────────

#[tokio::test]
async fn expired_license_validates_negative() {
    let app = spawn_default_app().await;
    let request = CreateLicenseRequest {
        owner: "owner-1".to_string(),
        plan: PlanTier::Monthly,
        max_seats: Some(1),
        expires_at: Some(chrono::Utc::now() + chrono::Duration::hours(1)),
    };
    let key = app.service.create(request).await.unwrap().key;
    app.activate(&key, &fp(1)).await;

    // Within expiry: fine.
    let resp = app
        .service
        .validate(&key, validate_request(&fp(1)), None)
        .await
        .unwrap();
    assert_eq!(resp.status, LicenseStatus::Active);

    // Push expiry into the past directly in the store, then validate:
    // the lazy transition reports Expired in a signed decision.
    let expired_request = CreateLicenseRequest {
        owner: "owner-2".to_string(),
        plan: PlanTier::Monthly,
        max_seats: Some(1),
        expires_at: Some(chrono::Utc::now() - chrono::Duration::hours(1)),
    };
    let key2 = app.service.create(expired_request).await.unwrap().key;
    // Activation observes the lapse before binding anything.
    let resp = app.activate(&key2, &fp(2)).await;
    assert_eq!(resp.status(), 403);
    // And validate reports it as a signed negative decision.
    let resp = app
        .service
        .validate(&key2, validate_request(&fp(2)), None)
        .await;
    match resp {
        Ok(body) => assert_eq!(body.status, LicenseStatus::Expired),
        Err(e) => panic!("expected signed negative decision, got {e:?}"),
    }
}

// ── Owner quota ──────────────────────────────────────────────────

#[tokio::test]
async fn owner_quota_bounds_create() {
    let mut config = ServerConfig::default();
    config.max_licenses_per_owner = 2;
    let app = spawn_app(config).await;

    app.service.create(create_request(1)).await.unwrap();
    app.service.create(create_request(1)).await.unwrap();
    let third = app.service.create(create_request(1)).await;
    assert!(matches!(
        third,
        Err(ApiError::OwnerQuotaExceeded {
            current: 2,
            limit: 2
        })
    ));
}

// ── Transfer edge cases ──────────────────────────────────────────

#[tokio::test]
async fn transfer_from_unbound_fingerprint_fails() {
    let app = spawn_default_app().await;
    let key = app.service.create(create_request(1)).await.unwrap().key;
    app.activate(&key, &fp(1)).await;

    let result = app
        .service
        .transfer(
            &key,
            TransferRequest {
                old_fingerprint: fp(9),
                new_fingerprint: fp(2),
            },
        )
        .await;
    assert!(matches!(result, Err(ApiError::HardwareMismatch)));
}

#[tokio::test]
async fn transfer_on_revoked_license_fails() {
    let app = spawn_default_app().await;
    let key = app.service.create(create_request(1)).await.unwrap().key;
    app.activate(&key, &fp(1)).await;
    app.service.revoke(&key).await.unwrap();

    let result = app
        .service
        .transfer(
            &key,
            TransferRequest {
                old_fingerprint: fp(1),
                new_fingerprint: fp(2),
            },
        )
        .await;
    assert!(matches!(result, Err(ApiError::AlreadyRevoked)));
}

// ── Audit trail ──────────────────────────────────────────────────

#[tokio::test]
async fn lifecycle_leaves_an_audit_trail() {
    let app = spawn_default_app().await;
    let key = app.service.create(create_request(1)).await.unwrap().key;
    app.activate(&key, &fp(1)).await;
    app.service
        .validate(&key, validate_request(&fp(1)), Some("203.0.113.7".into()))
        .await
        .unwrap();
    app.service.revoke(&key).await.unwrap();

    let rows = app.store.audit_for_license(&key, 50).unwrap();
    let actions: Vec<_> = rows.iter().map(|r| r.action).collect();
    use giro_store::AuditAction::*;
    assert!(actions.contains(&Created));
    assert!(actions.contains(&Activated));
    assert!(actions.contains(&Validated));
    assert!(actions.contains(&Revoked));
}
