//! Read-only projection of monitor state for presentation layers.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::DeviceRecord;

/// The attribute bag exposed for one device.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DeviceView {
    pub identifier: String,
    pub display_name: String,
    pub online: bool,
    pub ip: Ipv4Addr,
    pub mac: Option<String>,
    pub hostname: Option<String>,
    pub vendor: Option<String>,
    pub nickname: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub failed_checks: u32,
    pub latency_ms: Option<f64>,
    pub watched: bool,
}

impl DeviceView {
    pub fn project(identifier: &str, record: &DeviceRecord) -> Self {
        Self {
            identifier: identifier.to_string(),
            display_name: record.display_name(),
            online: record.is_online(),
            ip: record.ip,
            mac: record.mac.clone(),
            hostname: record.hostname.clone(),
            vendor: record.vendor.clone(),
            nickname: record.nickname.clone(),
            first_seen: record.first_seen,
            last_seen: record.last_seen,
            failed_checks: record.failed_checks,
            latency_ms: record.latency_ms,
            watched: record.watched,
        }
    }
}

/// Point-in-time view of one monitor instance.
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct Snapshot {
    pub instance: String,
    pub devices: Vec<DeviceView>,
    pub online_count: usize,
    pub total_count: usize,
    pub last_full_scan: Option<DateTime<Utc>>,
    /// Identifiers present now that were absent from the previous snapshot.
    pub added: Vec<String>,
}

impl Snapshot {
    pub fn build<'a>(
        instance: &str,
        devices: impl IntoIterator<Item = (&'a String, &'a DeviceRecord)>,
        last_full_scan: Option<DateTime<Utc>>,
        previous: Option<&Snapshot>,
    ) -> Self {
        let devices: Vec<DeviceView> = devices
            .into_iter()
            .map(|(id, record)| DeviceView::project(id, record))
            .collect();

        let known: BTreeSet<&str> = previous
            .map(|p| p.devices.iter().map(|d| d.identifier.as_str()).collect())
            .unwrap_or_default();
        let added = devices
            .iter()
            .filter(|d| !known.contains(d.identifier.as_str()))
            .map(|d| d.identifier.clone())
            .collect();

        Self {
            instance: instance.to_string(),
            online_count: devices.iter().filter(|d| d.online).count(),
            total_count: devices.len(),
            devices,
            last_full_scan,
            added,
        }
    }

    pub fn device(&self, identifier: &str) -> Option<&DeviceView> {
        self.devices.iter().find(|d| d.identifier == identifier)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn devices() -> BTreeMap<String, DeviceRecord> {
        let now = Utc::now();
        let mut map = BTreeMap::new();
        let online = DeviceRecord::discovered(Ipv4Addr::new(10, 0, 0, 1), 1.0, now);
        let mut offline = DeviceRecord::discovered(Ipv4Addr::new(10, 0, 0, 2), 1.0, now);
        offline.online = false;
        offline.latency_ms = None;
        map.insert("10.0.0.1".to_string(), online);
        map.insert("10.0.0.2".to_string(), offline);
        map
    }

    #[test]
    fn aggregates_counts() {
        let map = devices();
        let snap = Snapshot::build("home", &map, None, None);
        assert_eq!(snap.total_count, 2);
        assert_eq!(snap.online_count, 1);
        assert_eq!(snap.added.len(), 2);
        assert!(!snap.device("10.0.0.2").unwrap().online);
    }

    #[test]
    fn added_is_diff_against_previous() {
        let mut map = devices();
        let first = Snapshot::build("home", &map, None, None);

        map.insert(
            "10.0.0.3".to_string(),
            DeviceRecord::discovered(Ipv4Addr::new(10, 0, 0, 3), 1.0, Utc::now()),
        );
        let second = Snapshot::build("home", &map, None, Some(&first));
        assert_eq!(second.added, vec!["10.0.0.3".to_string()]);

        let third = Snapshot::build("home", &map, None, Some(&second));
        assert!(third.added.is_empty());
    }
}
