use giro_license::{
    DecisionPayload, DecisionSigner, Entitlement, LicenseStatus, PlanTier, VerifiedDecision,
};

fn test_signer() -> DecisionSigner {
    let seed: [u8; 32] = [
        1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24,
        25, 26, 27, 28, 29, 30, 31, 32,
    ];
    DecisionSigner::from_seed(&seed)
}

fn sample_payload() -> DecisionPayload {
    DecisionPayload {
        key: "GIRO-AAAA-BBBB-CCCC-DDDD".to_string(),
        fingerprint: "f".repeat(64),
        status: LicenseStatus::Active,
        entitlement: Some(Entitlement {
            plan: PlanTier::Annual,
            max_seats: 5,
            expires_at: Some(1_900_000_000),
        }),
        server_time: 1_750_000_000,
    }
}

#[test]
fn sign_then_verify_roundtrip() {
    let signer = test_signer();
    let payload = sample_payload();
    let token = signer.sign(&payload).unwrap();

    let verified = VerifiedDecision::parse(&token, &signer.public_key()).unwrap();
    assert_eq!(verified.payload(), &payload);
    assert_eq!(verified.raw(), token);
    assert!(verified.payload().is_positive());
}

#[test]
fn negative_decision_has_no_entitlement() {
    let signer = test_signer();
    let payload = DecisionPayload {
        status: LicenseStatus::Revoked,
        entitlement: None,
        ..sample_payload()
    };
    let token = signer.sign(&payload).unwrap();
    let verified = VerifiedDecision::parse(&token, &signer.public_key()).unwrap();
    assert!(!verified.payload().is_positive());
}

#[test]
fn tampered_payload_rejected() {
    let signer = test_signer();
    let token = signer.sign(&sample_payload()).unwrap();
    let parts: Vec<&str> = token.split('.').collect();
    let tampered = format!("X{}.{}", &parts[0][1..], parts[1]);
    assert!(VerifiedDecision::parse(&tampered, &signer.public_key()).is_err());
}

#[test]
fn tampered_signature_rejected() {
    let signer = test_signer();
    let token = signer.sign(&sample_payload()).unwrap();
    let parts: Vec<&str> = token.split('.').collect();
    let tampered = format!("{}.{}", parts[0], "A".repeat(86));
    assert!(VerifiedDecision::parse(&tampered, &signer.public_key()).is_err());
}

#[test]
fn wrong_public_key_rejected() {
    let signer = test_signer();
    let token = signer.sign(&sample_payload()).unwrap();
    let other = DecisionSigner::from_seed(&[9u8; 32]);
    assert!(VerifiedDecision::parse(&token, &other.public_key()).is_err());
}

#[test]
fn structurally_invalid_tokens_rejected() {
    let signer = test_signer();
    assert!(VerifiedDecision::parse("nodot", &signer.public_key()).is_err());
    assert!(VerifiedDecision::parse("a.b.c", &signer.public_key()).is_err());
    assert!(VerifiedDecision::parse("!!!.!!!", &signer.public_key()).is_err());
}
