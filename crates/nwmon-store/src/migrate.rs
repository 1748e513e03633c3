//! Forward migration of older state layouts.
//!
//! Version 1 stored devices as a list of flat records
//! (`ip_address`, `mac_address`, `is_online`, `last_latency_ms`, ...) and
//! had no `version` key. Version 2 stores a map keyed by identifier.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use nwmon_core::query::canonical_mac;
use nwmon_core::DeviceRecord;
use serde::Deserialize;
use serde_json::Value;

use crate::PersistedState;

#[derive(Debug, Deserialize)]
struct LegacyDevice {
    ip_address: String,
    #[serde(default)]
    mac_address: Option<String>,
    #[serde(default)]
    hostname: Option<String>,
    #[serde(default)]
    vendor: Option<String>,
    #[serde(default = "default_true")]
    is_online: bool,
    first_seen: String,
    last_seen: String,
    #[serde(default)]
    failed_checks: u32,
    #[serde(default)]
    last_latency_ms: Option<f64>,
    #[serde(default)]
    nickname: Option<String>,
    #[serde(default)]
    watched: bool,
}

fn default_true() -> bool {
    true
}

/// Parse an ISO-8601 timestamp, treating naive values as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

impl LegacyDevice {
    fn into_record(self) -> Result<DeviceRecord, String> {
        let ip: Ipv4Addr = self
            .ip_address
            .parse()
            .map_err(|e| format!("invalid ip_address {:?}: {e}", self.ip_address))?;
        let first_seen = parse_timestamp(&self.first_seen)
            .ok_or_else(|| format!("invalid first_seen {:?}", self.first_seen))?;
        let last_seen = parse_timestamp(&self.last_seen)
            .ok_or_else(|| format!("invalid last_seen {:?}", self.last_seen))?;

        let mut record = DeviceRecord {
            ip,
            mac: self.mac_address.as_deref().and_then(canonical_mac),
            hostname: self.hostname,
            vendor: self.vendor,
            nickname: self.nickname.filter(|n| !n.is_empty()),
            first_seen,
            last_seen,
            failed_checks: self.failed_checks,
            latency_ms: self.last_latency_ms,
            online: self.is_online,
            watched: self.watched,
        };
        record.normalise();
        Ok(record)
    }
}

/// Convert a version 1 document into the current layout.
///
/// Individual unreadable device entries are skipped with a warning; only a
/// document whose overall shape is wrong is an error.
pub fn from_v1(value: Value) -> Result<PersistedState, String> {
    let last_full_scan = match value.get("last_full_scan") {
        None | Some(Value::Null) => None,
        Some(Value::String(raw)) => parse_timestamp(raw),
        Some(other) => return Err(format!("last_full_scan is not a timestamp: {other}")),
    };

    let entries = match value.get("devices") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(entries)) => entries.clone(),
        Some(_) => return Err("devices is not a list".to_string()),
    };

    let mut devices = BTreeMap::new();
    for entry in entries {
        let record = serde_json::from_value::<LegacyDevice>(entry)
            .map_err(|e| e.to_string())
            .and_then(LegacyDevice::into_record);
        match record {
            Ok(record) => {
                devices.entry(record.identifier()).or_insert(record);
            }
            Err(reason) => tracing::warn!(reason = %reason, "Skipping unreadable legacy device"),
        }
    }

    Ok(PersistedState::new(devices, last_full_scan))
}

/// Re-key a device map by each record's identifier, normalising records and
/// their MAC notation.
///
/// A well-formed map is returned unchanged. When two entries resolve to the
/// same identifier the first one in key order wins.
pub fn rekey(devices: BTreeMap<String, DeviceRecord>) -> BTreeMap<String, DeviceRecord> {
    let mut rekeyed = BTreeMap::new();
    for (key, mut record) in devices {
        record.normalise();
        record.mac = record.mac.as_deref().and_then(canonical_mac);
        let identifier = record.identifier();
        if identifier != key {
            tracing::warn!(stored_key = %key, identifier = %identifier, "Re-keying device");
        }
        if rekeyed.contains_key(&identifier) {
            tracing::warn!(identifier = %identifier, "Dropping duplicate device entry");
            continue;
        }
        rekeyed.insert(identifier, record);
    }
    rekeyed
}
