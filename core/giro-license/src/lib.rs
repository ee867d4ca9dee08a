//! Licensing domain for GIRO.
//!
//! This crate holds everything the server and the desktop client agree
//! on:
//! - License key format, generation, and offline checksum validation
//! - Hardware fingerprinting for seat binding
//! - Plan tiers, license status, and the status transition rules
//! - Wire types for the license HTTP API
//! - Ed25519-signed validation decisions
//!
//! # License Key Format
//!
//! Keys look like `GIRO-XXXX-XXXX-XXXX-XXXX`, drawn from an alphabet
//! without `0`/`1`/`I`/`O` and closed by a Luhn mod-32 check character,
//! so a mistyped key is rejected before any network round trip.

mod decision;
mod device;
mod error;
mod key;
pub mod protocol;
mod types;

pub use decision::{DecisionPayload, DecisionSigner, VerifiedDecision};
pub use device::{Fingerprint, HostInfo};
pub use error::{LicenseError, LicenseResult};
pub use key::{generate, validate_format, LicenseKey, KEY_ALPHABET, KEY_PREFIX};
pub use types::{Entitlement, LicenseStatus, PlanTier};
