//! The per-instance device registry.
//!
//! Owns the identifier-keyed device map, applies scan results through the
//! online/offline state machine and produces the domain events for each
//! transition. Every method takes `&mut self`, so a caller holding the
//! coordinator's write lock applies each device update as one step.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use nwmon_core::{DeviceEvent, DeviceQuery, DeviceRecord};
use nwmon_store::PersistedState;

use crate::error::{MonitorError, Result};
use crate::scanner::{CheckResult, CheckTarget, DiscoveredHost};

/// What applying one scan did to the registry.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub events: Vec<DeviceEvent>,
    /// Devices seen for the first time.
    pub discovered: usize,
    /// IP-keyed records moved to (or folded into) a MAC key.
    pub migrated: usize,
}

#[derive(Debug, Clone)]
pub struct Registry {
    devices: BTreeMap<String, DeviceRecord>,
    offline_threshold: u32,
    last_full_scan: Option<DateTime<Utc>>,
}

impl Registry {
    pub fn new(offline_threshold: u32) -> Self {
        Self {
            devices: BTreeMap::new(),
            offline_threshold: offline_threshold.max(1),
            last_full_scan: None,
        }
    }

    pub fn from_state(state: PersistedState, offline_threshold: u32) -> Self {
        Self {
            devices: state.devices,
            offline_threshold: offline_threshold.max(1),
            last_full_scan: state.last_full_scan,
        }
    }

    pub fn to_state(&self) -> PersistedState {
        PersistedState::new(self.devices.clone(), self.last_full_scan)
    }

    pub fn devices(&self) -> &BTreeMap<String, DeviceRecord> {
        &self.devices
    }

    pub fn get(&self, identifier: &str) -> Option<&DeviceRecord> {
        self.devices.get(identifier)
    }

    pub fn last_full_scan(&self) -> Option<DateTime<Utc>> {
        self.last_full_scan
    }

    pub fn online_count(&self) -> usize {
        self.devices.values().filter(|r| r.is_online()).count()
    }

    /// Quick-check targets: every known device, online or not.
    pub fn check_targets(&self) -> Vec<CheckTarget> {
        self.devices
            .iter()
            .map(|(identifier, record)| CheckTarget {
                identifier: identifier.clone(),
                ip: record.ip,
                needs_mac: record.mac.is_none(),
            })
            .collect()
    }

    /// Apply a full scan. Known devices that did not answer count one failed check.
    pub fn apply_full_scan(&mut self, hosts: &[DiscoveredHost], now: DateTime<Utc>) -> CycleReport {
        let mut report = CycleReport::default();
        let mut seen = HashSet::new();

        for host in hosts {
            let key = match self.locate(host, &mut report) {
                Some(key) => {
                    if let Some(record) = self.devices.get_mut(&key) {
                        record.ip = host.ip;
                        if host.mac.is_some() {
                            record.mac = host.mac.clone();
                        }
                        if host.hostname.is_some() {
                            record.hostname = host.hostname.clone();
                        }
                        if host.vendor.is_some() {
                            record.vendor = host.vendor.clone();
                        }
                    }
                    self.record_success(&key, host.rtt_ms, now, &mut report.events);
                    key
                }
                None => {
                    let mut record = DeviceRecord::discovered(host.ip, host.rtt_ms, now);
                    record.mac = host.mac.clone();
                    record.hostname = host.hostname.clone();
                    record.vendor = host.vendor.clone();
                    let key = record.identifier();
                    tracing::info!(
                        identifier = %key,
                        ip = %host.ip,
                        display_name = %record.display_name(),
                        "Discovered new device"
                    );
                    self.devices.insert(key.clone(), record);
                    report.discovered += 1;
                    key
                }
            };
            seen.insert(key);
        }

        let missing: Vec<String> = self
            .devices
            .keys()
            .filter(|key| !seen.contains(*key))
            .cloned()
            .collect();
        for key in missing {
            self.record_failure(&key, &mut report.events);
        }

        self.last_full_scan = Some(now);
        report
    }

    /// Apply quick-check results. Results for devices removed since the
    /// targets were taken are ignored.
    ///
    /// A success wins over a failure for the same device within one batch:
    /// after a MAC backfill folds an IP-keyed record into an existing MAC
    /// record, that record's own target may still point at a stale address.
    pub fn apply_quick_check(&mut self, results: &[CheckResult], now: DateTime<Utc>) -> CycleReport {
        let mut report = CycleReport::default();
        let mut answered = HashSet::new();
        let mut unanswered = Vec::new();

        for result in results {
            if !self.devices.contains_key(&result.identifier) {
                continue;
            }

            let key = match &result.mac {
                Some(mac) => {
                    if self.adopt_mac(&result.identifier, mac, result.vendor.as_deref()) {
                        report.migrated += 1;
                    }
                    mac.clone()
                }
                None => result.identifier.clone(),
            };

            match result.outcome.rtt_ms() {
                Some(rtt_ms) => {
                    if let Some(record) = self.devices.get_mut(&key) {
                        record.ip = result.ip;
                    }
                    self.record_success(&key, rtt_ms, now, &mut report.events);
                    answered.insert(key);
                }
                None => unanswered.push(key),
            }
        }

        for key in unanswered {
            if !answered.contains(&key) {
                self.record_failure(&key, &mut report.events);
            }
        }

        report
    }

    /// Find the existing record a discovered host belongs to, moving an
    /// IP-keyed record to the host's MAC key first when needed.
    fn locate(&mut self, host: &DiscoveredHost, report: &mut CycleReport) -> Option<String> {
        let ip_key = host.ip.to_string();

        if let Some(mac) = &host.mac {
            let migrated = self.adopt_mac(&ip_key, mac, host.vendor.as_deref());
            if migrated {
                report.migrated += 1;
            }
            return self.devices.contains_key(mac).then(|| mac.clone());
        }

        if self.devices.contains_key(&ip_key) {
            return Some(ip_key);
        }

        // No MAC this time; fall back to a MAC-keyed device last seen at this address.
        self.devices
            .iter()
            .filter(|(_, record)| record.ip == host.ip && record.mac.is_some())
            .max_by_key(|(_, record)| record.last_seen)
            .map(|(key, _)| key.clone())
    }

    /// Move a MAC-less record keyed by `from` under `mac`, or fold it into an
    /// existing record with that key. Returns whether anything moved.
    fn adopt_mac(&mut self, from: &str, mac: &str, vendor: Option<&str>) -> bool {
        if from == mac {
            return false;
        }
        let is_ip_only = self.devices.get(from).is_some_and(|r| r.mac.is_none());
        if !is_ip_only {
            return false;
        }
        let Some(mut record) = self.devices.remove(from) else {
            return false;
        };

        match self.devices.get_mut(mac) {
            Some(target) => {
                fold_into(target, record);
                tracing::info!(from = %from, into = %mac, "Merged duplicate device record");
            }
            None => {
                record.mac = Some(mac.to_string());
                if record.vendor.is_none() {
                    record.vendor = vendor.map(String::from);
                }
                tracing::info!(ip = %record.ip, mac = %mac, "Device now has MAC address");
                self.devices.insert(mac.to_string(), record);
            }
        }
        true
    }

    fn record_success(&mut self, key: &str, rtt_ms: f64, now: DateTime<Utc>, events: &mut Vec<DeviceEvent>) {
        let Some(record) = self.devices.get_mut(key) else {
            return;
        };
        let was_offline = !record.online;

        record.failed_checks = 0;
        record.last_seen = now;
        record.latency_ms = Some(rtt_ms);
        record.online = true;

        if was_offline {
            tracing::info!(
                identifier = %key,
                ip = %record.ip,
                display_name = %record.display_name(),
                "Device came back online"
            );
            events.push(DeviceEvent::online(key, record));
        }
    }

    fn record_failure(&mut self, key: &str, events: &mut Vec<DeviceEvent>) {
        let threshold = self.offline_threshold;
        let Some(record) = self.devices.get_mut(key) else {
            return;
        };

        record.failed_checks = record.failed_checks.saturating_add(1);

        if !record.online {
            return;
        }
        if record.failed_checks < threshold {
            tracing::debug!(
                identifier = %key,
                failed_checks = record.failed_checks,
                threshold,
                "Device not responding"
            );
            return;
        }

        record.online = false;
        record.latency_ms = None;
        tracing::info!(
            identifier = %key,
            ip = %record.ip,
            display_name = %record.display_name(),
            watched = record.watched,
            "Device went offline"
        );
        events.push(DeviceEvent::offline(key, record));
        if record.watched {
            events.push(DeviceEvent::watched_offline(key, record));
        }
    }

    /// Resolve a caller-supplied identifier: exact key, then MAC, then IP.
    pub fn resolve(&self, query: &DeviceQuery) -> Option<&str> {
        if let Some((key, _)) = self.devices.get_key_value(query.canonical()) {
            return Some(key.as_str());
        }
        self.devices
            .iter()
            .find(|(_, r)| query.matches_mac(r.mac.as_deref()))
            .or_else(|| self.devices.iter().find(|(_, r)| query.matches_ip(r.ip)))
            .map(|(key, _)| key.as_str())
    }

    fn resolve_owned(&self, query: &DeviceQuery) -> Result<String> {
        self.resolve(query)
            .map(String::from)
            .ok_or_else(|| MonitorError::NotFound(query.raw().to_string()))
    }

    pub fn set_watched(&mut self, query: &DeviceQuery, watched: bool) -> Result<DeviceRecord> {
        let key = self.resolve_owned(query)?;
        let record = self
            .devices
            .get_mut(&key)
            .ok_or_else(|| MonitorError::NotFound(query.raw().to_string()))?;
        record.watched = watched;
        Ok(record.clone())
    }

    /// Set or, with `None` or an empty string, clear the nickname.
    pub fn set_nickname(&mut self, query: &DeviceQuery, nickname: Option<String>) -> Result<DeviceRecord> {
        let key = self.resolve_owned(query)?;
        let record = self
            .devices
            .get_mut(&key)
            .ok_or_else(|| MonitorError::NotFound(query.raw().to_string()))?;
        record.nickname = nickname
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        Ok(record.clone())
    }

    pub fn remove(&mut self, query: &DeviceQuery) -> Result<(String, DeviceRecord)> {
        let key = self.resolve_owned(query)?;
        self.devices
            .remove_entry(&key)
            .ok_or_else(|| MonitorError::NotFound(query.raw().to_string()))
    }
}

/// Merge a MAC-less duplicate into the record that owns the MAC key.
fn fold_into(target: &mut DeviceRecord, duplicate: DeviceRecord) {
    target.first_seen = target.first_seen.min(duplicate.first_seen);
    target.watched |= duplicate.watched;
    if target.nickname.is_none() {
        target.nickname = duplicate.nickname;
    }
    if target.hostname.is_none() {
        target.hostname = duplicate.hostname;
    }
    if target.vendor.is_none() {
        target.vendor = duplicate.vendor;
    }
}
