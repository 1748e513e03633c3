//! Core domain types for tracked network devices.

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A device tracked by one monitor instance.
///
/// The record's key in the device map is always [`DeviceRecord::identifier`]:
/// the MAC address when known, else the IP address. The registry owning the
/// map is responsible for re-keying a record when its MAC becomes known.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceRecord {
    /// Current IPv4 address.
    pub ip: Ipv4Addr,
    /// Link-layer address, lowercase colon-separated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    /// User-assigned name, preferred over everything else for display.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Consecutive failed probes since the last success.
    #[serde(default)]
    pub failed_checks: u32,
    /// Round-trip time of the last successful probe. Present iff `online`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    #[serde(default = "default_online")]
    pub online: bool,
    #[serde(default)]
    pub watched: bool,
}

fn default_online() -> bool {
    true
}

impl DeviceRecord {
    /// Create the record for a device seen for the first time.
    pub fn discovered(ip: Ipv4Addr, rtt_ms: f64, now: DateTime<Utc>) -> Self {
        Self {
            ip,
            mac: None,
            hostname: None,
            vendor: None,
            nickname: None,
            first_seen: now,
            last_seen: now,
            failed_checks: 0,
            latency_ms: Some(rtt_ms),
            online: true,
            watched: false,
        }
    }

    /// Unique key within one instance: MAC if known, else IP.
    pub fn identifier(&self) -> String {
        match &self.mac {
            Some(mac) => mac.clone(),
            None => self.ip.to_string(),
        }
    }

    /// Human-facing name: nickname, hostname, bare MAC, then underscored IP.
    pub fn display_name(&self) -> String {
        if let Some(nickname) = &self.nickname {
            return nickname.clone();
        }
        if let Some(hostname) = &self.hostname {
            return hostname.clone();
        }
        if let Some(mac) = &self.mac {
            return mac.replace(':', "").to_lowercase();
        }
        self.ip.to_string().replace('.', "_")
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Force `latency_ms` to agree with `online`.
    ///
    /// Records loaded from older or hand-edited state can claim to be online
    /// without a measured latency; those are demoted to offline so the next
    /// successful probe raises a proper online transition.
    pub fn normalise(&mut self) {
        if !self.online {
            self.latency_ms = None;
        } else if self.latency_ms.is_none() {
            self.online = false;
        }
    }
}
