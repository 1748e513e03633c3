//! Parsing of externally supplied device identifiers.
//!
//! Callers may name a device by its MAC in any common notation
//! (`AA:BB:CC:DD:EE:FF`, `aa-bb-cc-dd-ee-ff`, `aabb.ccdd.eeff`, `aabbccddeeff`)
//! or by a bare IPv4 address.

use std::net::Ipv4Addr;

/// Canonicalise a MAC address to lowercase colon-separated form.
///
/// Returns `None` unless the input is exactly twelve hex digits once `:`,
/// `-` and `.` separators are removed.
pub fn canonical_mac(raw: &str) -> Option<String> {
    let digits: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '.'))
        .collect();

    if digits.len() != 12 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let lower = digits.to_ascii_lowercase();
    let octets: Vec<&str> = (0..6).map(|i| &lower[i * 2..i * 2 + 2]).collect();
    Some(octets.join(":"))
}

/// A device identifier as supplied by a caller, in canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceQuery {
    raw: String,
    canonical: String,
}

impl DeviceQuery {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        // An address like 111.222.111.222 is also twelve hex digits.
        let canonical = if trimmed.parse::<Ipv4Addr>().is_ok() {
            trimmed.to_string()
        } else {
            canonical_mac(trimmed).unwrap_or_else(|| trimmed.to_string())
        };
        Self {
            raw: raw.to_string(),
            canonical,
        }
    }

    /// The identifier exactly as the caller supplied it.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Canonical form used for every comparison.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    pub fn matches_mac(&self, mac: Option<&str>) -> bool {
        mac.is_some_and(|m| m == self.canonical)
    }

    pub fn matches_ip(&self, ip: Ipv4Addr) -> bool {
        self.canonical.parse::<Ipv4Addr>().is_ok_and(|q| q == ip)
    }
}
