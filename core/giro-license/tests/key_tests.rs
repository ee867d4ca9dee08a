use giro_license::{generate, validate_format, LicenseError, LicenseKey, KEY_ALPHABET};
use pretty_assertions::{assert_eq, assert_ne};

// ── Generation ───────────────────────────────────────────────────

#[test]
fn generated_keys_validate() {
    for _ in 0..50 {
        let key = generate();
        assert!(validate_format(key.as_str()).is_ok(), "{}", key);
    }
}

#[test]
fn generated_keys_are_distinct() {
    let a = generate();
    let b = generate();
    assert_ne!(a, b);
}

#[test]
fn generated_key_shape() {
    let key = generate();
    let s = key.as_str();
    assert_eq!(s.len(), 24);
    assert!(s.starts_with("GIRO-"));
    let groups: Vec<&str> = s.split('-').skip(1).collect();
    assert_eq!(groups.len(), 4);
    for group in groups {
        assert_eq!(group.len(), 4);
        for ch in group.bytes() {
            assert!(KEY_ALPHABET.contains(&ch), "unexpected char {}", ch as char);
        }
    }
}

// ── Checksum: every single-character mutation is caught ──────────

#[test]
fn single_character_mutations_fail() {
    for _ in 0..5 {
        let key = generate();
        let s = key.as_str();
        for (pos, original) in s.char_indices() {
            if original == '-' || pos < 5 {
                continue; // skip prefix and separators
            }
            for &replacement in KEY_ALPHABET.iter() {
                let replacement = replacement as char;
                if replacement == original {
                    continue;
                }
                let mut mutated: Vec<char> = s.chars().collect();
                mutated[pos] = replacement;
                let mutated: String = mutated.into_iter().collect();
                assert!(
                    validate_format(&mutated).is_err(),
                    "mutation at {pos} ({original} -> {replacement}) of {s} passed"
                );
            }
        }
    }
}

// ── Normalization ────────────────────────────────────────────────

#[test]
fn parse_is_case_insensitive() {
    let key = generate();
    let lower = key.as_str().to_ascii_lowercase();
    let parsed = LicenseKey::parse(&lower).unwrap();
    assert_eq!(parsed, key);
}

#[test]
fn parse_trims_whitespace() {
    let key = generate();
    let padded = format!("  {}\n", key.as_str());
    let parsed = LicenseKey::parse(&padded).unwrap();
    assert_eq!(parsed, key);
}

// ── Structural rejections ────────────────────────────────────────

#[test]
fn rejects_wrong_prefix() {
    let key = generate();
    let swapped = key.as_str().replacen("GIRO", "GYRO", 1);
    assert!(matches!(
        validate_format(&swapped),
        Err(LicenseError::MalformedKey(_))
    ));
}

#[test]
fn rejects_missing_group() {
    assert!(validate_format("GIRO-AAAA-BBBB-CCCC").is_err());
}

#[test]
fn rejects_extra_group() {
    let key = generate();
    let extended = format!("{}-2222", key.as_str());
    assert!(validate_format(&extended).is_err());
}

#[test]
fn rejects_short_group() {
    assert!(validate_format("GIRO-AAA-BBBB-CCCC-DDDD").is_err());
}

#[test]
fn rejects_ambiguous_characters() {
    // 0, 1, I, O are excluded from the alphabet.
    for bad in ["GIRO-0AAA-BBBB-CCCC-DDDD", "GIRO-1AAA-BBBB-CCCC-DDDD",
                "GIRO-IAAA-BBBB-CCCC-DDDD", "GIRO-OAAA-BBBB-CCCC-DDDD"] {
        assert!(
            matches!(validate_format(bad), Err(LicenseError::MalformedKey(_))),
            "{bad} should be malformed"
        );
    }
}

#[test]
fn rejects_empty_string() {
    assert!(validate_format("").is_err());
}

#[test]
fn rejects_checksum_mismatch_distinctly() {
    // A well-formed body with a wrong check character reports
    // ChecksumMismatch rather than MalformedKey.
    let key = generate();
    let s = key.as_str();
    let last = s.chars().last().unwrap();
    let replacement = KEY_ALPHABET
        .iter()
        .map(|&b| b as char)
        .find(|&c| c != last)
        .unwrap();
    let mut mutated: String = s[..s.len() - 1].to_string();
    mutated.push(replacement);
    assert!(matches!(
        validate_format(&mutated),
        Err(LicenseError::ChecksumMismatch)
    ));
}

// ── Serde ────────────────────────────────────────────────────────

#[test]
fn serde_roundtrip() {
    let key = generate();
    let json = serde_json::to_string(&key).unwrap();
    let restored: LicenseKey = serde_json::from_str(&json).unwrap();
    assert_eq!(key, restored);
}

#[test]
fn serde_rejects_invalid_key() {
    let result: Result<LicenseKey, _> = serde_json::from_str(r#""GIRO-XXXX""#);
    assert!(result.is_err());
}
