//! License key generation and format validation.
//!
//! Keys use the format `GIRO-XXXX-XXXX-XXXX-XXXX`: a fixed prefix plus
//! sixteen characters from a 32-character alphabet that excludes the
//! visually ambiguous `0`, `1`, `I` and `O`. The final character is a
//! Luhn mod-32 check character over the preceding fifteen, so any single
//! mistyped character is caught locally, before any store or network
//! access.

use crate::error::{LicenseError, LicenseResult};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed key prefix.
pub const KEY_PREFIX: &str = "GIRO";

/// Characters per group and groups per key (excluding the prefix).
pub const GROUP_LEN: usize = 4;
pub const GROUP_COUNT: usize = 4;

/// Key alphabet: 32 characters, no `0`, `1`, `I`, `O`.
pub const KEY_ALPHABET: &[u8; 32] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

const BODY_LEN: usize = GROUP_LEN * GROUP_COUNT;

/// A syntactically valid, checksum-verified license key.
///
/// Construction goes through [`LicenseKey::parse`] (or [`generate`]), so
/// holding a `LicenseKey` means the format and check character are known
/// good. It says nothing about the key existing on the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LicenseKey(String);

impl LicenseKey {
    /// Parses and checksum-validates a key string.
    ///
    /// Input is trimmed and upper-cased, so keys survive copy-paste from
    /// email clients and case-insensitive entry fields.
    ///
    /// # Errors
    ///
    /// [`LicenseError::MalformedKey`] for structural problems,
    /// [`LicenseError::ChecksumMismatch`] when the check character
    /// disagrees with the body.
    pub fn parse(input: &str) -> LicenseResult<Self> {
        let normalized = input.trim().to_ascii_uppercase();

        let mut parts = normalized.split('-');
        let prefix = parts
            .next()
            .ok_or_else(|| LicenseError::MalformedKey("empty key".into()))?;
        if prefix != KEY_PREFIX {
            return Err(LicenseError::MalformedKey(format!(
                "expected {KEY_PREFIX}- prefix"
            )));
        }

        let mut body = Vec::with_capacity(BODY_LEN);
        let mut groups = 0usize;
        for group in parts {
            groups += 1;
            if group.len() != GROUP_LEN {
                return Err(LicenseError::MalformedKey(format!(
                    "group {groups} has length {}, expected {GROUP_LEN}",
                    group.len()
                )));
            }
            for ch in group.bytes() {
                body.push(alphabet_index(ch).ok_or_else(|| {
                    LicenseError::MalformedKey(format!(
                        "character '{}' is not in the key alphabet",
                        ch as char
                    ))
                })?);
            }
        }
        if groups != GROUP_COUNT {
            return Err(LicenseError::MalformedKey(format!(
                "expected {GROUP_COUNT} groups, got {groups}"
            )));
        }

        if luhn32_sum(&body) != 0 {
            return Err(LicenseError::ChecksumMismatch);
        }

        Ok(Self(normalized))
    }

    /// Returns the canonical (upper-case, dash-grouped) key string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LicenseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for LicenseKey {
    type Error = LicenseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<LicenseKey> for String {
    fn from(key: LicenseKey) -> Self {
        key.0
    }
}

/// Generates a fresh random key with a valid check character.
///
/// Uses the OS CSPRNG; 15 random characters give 75 bits of entropy,
/// far beyond any realistic guessing budget for an online endpoint.
#[must_use]
pub fn generate() -> LicenseKey {
    let mut bytes = [0u8; BODY_LEN - 1];
    rand::rngs::OsRng.fill_bytes(&mut bytes);

    let mut body: Vec<u8> = bytes.iter().map(|b| b % 32).collect();
    body.push(luhn32_check_char(&body));

    LicenseKey(format_body(&body))
}

/// Validates a key string without constructing a [`LicenseKey`].
///
/// # Errors
///
/// Same as [`LicenseKey::parse`].
pub fn validate_format(input: &str) -> LicenseResult<()> {
    LicenseKey::parse(input).map(|_| ())
}

fn format_body(indices: &[u8]) -> String {
    let mut out = String::with_capacity(KEY_PREFIX.len() + GROUP_COUNT * (GROUP_LEN + 1));
    out.push_str(KEY_PREFIX);
    for (i, &idx) in indices.iter().enumerate() {
        if i % GROUP_LEN == 0 {
            out.push('-');
        }
        out.push(KEY_ALPHABET[idx as usize] as char);
    }
    out
}

fn alphabet_index(ch: u8) -> Option<u8> {
    KEY_ALPHABET.iter().position(|&a| a == ch).map(|i| i as u8)
}

/// Luhn mod-32 digit transform for positions that are doubled.
///
/// `2d` when it fits, otherwise the base-32 digit sum `2d - 31`. The map
/// is injective over 0..32, which is what guarantees that every single
/// character substitution changes the total.
fn luhn32_double(d: u32) -> u32 {
    let doubled = d * 2;
    if doubled >= 32 { doubled - 31 } else { doubled }
}

/// Luhn mod-32 sum over a full body (payload + check char, rightmost last).
///
/// Zero means the check character is consistent.
fn luhn32_sum(body: &[u8]) -> u32 {
    let mut sum = 0u32;
    for (i, &d) in body.iter().rev().enumerate() {
        let v = u32::from(d);
        sum += if i % 2 == 1 { luhn32_double(v) } else { v };
    }
    sum % 32
}

/// Computes the check character for a 15-character payload.
fn luhn32_check_char(payload: &[u8]) -> u8 {
    // The check char sits at position 0 from the right (not doubled), so
    // the payload's rightmost character is doubled.
    let mut sum = 0u32;
    for (i, &d) in payload.iter().rev().enumerate() {
        let v = u32::from(d);
        sum += if i % 2 == 0 { luhn32_double(v) } else { v };
    }
    ((32 - (sum % 32)) % 32) as u8
}
