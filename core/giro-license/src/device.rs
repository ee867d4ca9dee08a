//! Hardware fingerprinting for seat binding.
//!
//! Derives a stable, opaque fingerprint from machine attributes. The
//! server only ever sees the one-way hash, never the attributes
//! themselves; hostname and OS descriptor travel alongside it in clear
//! text for display purposes only.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::env;

/// Domain separator hashed in front of the attribute list, so fingerprints
/// cannot be cross-correlated with other products hashing the same inputs.
const FINGERPRINT_CONTEXT: &str = "giro-fingerprint-v1";

/// Clear-text host information sent with activation requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    /// Machine hostname.
    pub hostname: String,
    /// OS descriptor, e.g. `linux 6.8` or `macos 15.1`.
    pub os_descriptor: String,
}

impl HostInfo {
    /// Collects host information for the current machine.
    #[must_use]
    pub fn collect() -> Self {
        Self {
            hostname: current_hostname(),
            os_descriptor: format!("{} {}", env::consts::OS, os_version()),
        }
    }
}

/// An opaque, comparable token identifying one machine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Derives the fingerprint for the current machine.
    ///
    /// Stable across reboots; changes when the machine identity (board
    /// machine-id) or install identity changes materially. Cloned disk
    /// images diverge as soon as the clone regenerates its machine-id,
    /// which provisioning tools do on first boot.
    #[must_use]
    pub fn local() -> Self {
        let components = collect_hardware_ids();
        Self::derive(&components)
    }

    /// Derives a fingerprint from an explicit component list.
    ///
    /// Deterministic; used directly by tests and by platforms that
    /// source their identifiers elsewhere.
    #[must_use]
    pub fn derive<S: AsRef<str>>(components: &[S]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(FINGERPRINT_CONTEXT.as_bytes());
        for c in components {
            hasher.update([0u8]);
            hasher.update(c.as_ref().as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// Accepts a fingerprint received over the wire.
    ///
    /// Returns None unless the value looks like a fingerprint this module
    /// produced (64 lowercase hex characters), which keeps junk out of
    /// the binding table.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let ok = value.len() == 64
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        ok.then(|| Self(value.to_string()))
    }

    /// Returns the opaque token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if this fingerprint still matches the current machine.
    #[must_use]
    pub fn matches_current(&self) -> bool {
        *self == Self::local()
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Collects the attribute set the fingerprint is derived from.
fn collect_hardware_ids() -> Vec<String> {
    let mut ids = Vec::new();

    ids.push(env::consts::OS.to_string());
    ids.push(env::consts::ARCH.to_string());
    ids.push(current_hostname());

    if let Some(machine_id) = machine_id() {
        ids.push(machine_id);
    }

    ids
}

fn current_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

fn os_version() -> String {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/etc/os-release")
            .ok()
            .and_then(|content| {
                content
                    .lines()
                    .find(|l| l.starts_with("VERSION_ID="))
                    .map(|l| l.trim_start_matches("VERSION_ID=").trim_matches('"').to_string())
            })
            .unwrap_or_else(|| "unknown".to_string())
    }

    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("sw_vers")
            .arg("-productVersion")
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        "unknown".to_string()
    }
}

/// Platform machine identifier, the most stable fingerprint component.
fn machine_id() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/etc/machine-id")
            .or_else(|_| std::fs::read_to_string("/var/lib/dbus/machine-id"))
            .ok()
            .map(|s| s.trim().to_string())
    }

    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("ioreg")
            .args(["-rd1", "-c", "IOPlatformExpertDevice"])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|output| {
                output
                    .lines()
                    .find(|l| l.contains("IOPlatformUUID"))
                    .and_then(|l| l.split('"').nth(3))
                    .map(String::from)
            })
    }

    #[cfg(target_os = "windows")]
    {
        // HKLM\SOFTWARE\Microsoft\Cryptography\MachineGuid via reg.exe,
        // avoiding a registry crate for one value.
        std::process::Command::new("reg")
            .args([
                "query",
                r"HKLM\SOFTWARE\Microsoft\Cryptography",
                "/v",
                "MachineGuid",
            ])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|output| {
                output
                    .split_whitespace()
                    .last()
                    .map(|guid| guid.to_string())
            })
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        None
    }
}
