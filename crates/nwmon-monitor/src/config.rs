//! Configuration for the nwmon monitor.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{MonitorError, Result};
use crate::range;

/// Top-level monitor configuration.
///
/// Loaded from `nwmon.toml` `[monitor]` section or
/// `NWMON_MONITOR__` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Directory holding one state file per instance.
    #[serde(default = "default_state_dir")]
    pub state_dir: String,

    /// Maximum probes in flight per scan.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_probes: usize,

    /// Reverse-name lookup timeout in milliseconds.
    #[serde(default = "default_dns_timeout_ms")]
    pub dns_timeout_ms: u64,

    /// Largest number of addresses a single range may expand to.
    #[serde(default = "default_max_hosts")]
    pub max_hosts_per_range: usize,

    /// Buffered events per instance before slow subscribers start lagging.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Independently configured monitor instances, in registration order.
    #[serde(default)]
    pub instances: Vec<InstanceConfig>,
}

/// One monitor instance: a set of ranges and its cadence.
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceConfig {
    /// Unique name; also names the state file.
    pub name: String,

    /// CIDR ranges or bare addresses (e.g., "192.168.1.0/24").
    pub ranges: Vec<String>,

    #[serde(default = "default_full_scan_interval")]
    pub full_scan_interval_minutes: u64,

    #[serde(default = "default_quick_check_interval")]
    pub quick_check_interval_minutes: u64,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_seconds: f64,

    /// Consecutive failed checks before a device is declared offline.
    #[serde(default = "default_offline_threshold")]
    pub offline_threshold: u32,
}

impl InstanceConfig {
    pub fn new(name: &str, ranges: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            ranges: ranges.iter().map(|r| r.to_string()).collect(),
            full_scan_interval_minutes: default_full_scan_interval(),
            quick_check_interval_minutes: default_quick_check_interval(),
            probe_timeout_seconds: default_probe_timeout(),
            offline_threshold: default_offline_threshold(),
        }
    }

    pub fn full_scan_interval(&self) -> Duration {
        Duration::from_secs(self.full_scan_interval_minutes * 60)
    }

    pub fn quick_check_interval(&self) -> Duration {
        Duration::from_secs(self.quick_check_interval_minutes * 60)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.probe_timeout_seconds)
    }

    /// Number of quick ticks per full scan.
    pub fn cycle_ratio(&self) -> u32 {
        let ratio = self.full_scan_interval_minutes as f64 / self.quick_check_interval_minutes as f64;
        (ratio.round() as u32).max(1)
    }

    fn validate(&self, max_hosts: usize) -> Result<()> {
        let invalid = |msg: String| Err(MonitorError::InvalidConfig(format!("{}: {msg}", self.name)));

        if !(5..=1440).contains(&self.full_scan_interval_minutes) {
            return invalid("full_scan_interval_minutes must be within 5..=1440".to_string());
        }
        if !(1..=60).contains(&self.quick_check_interval_minutes) {
            return invalid("quick_check_interval_minutes must be within 1..=60".to_string());
        }
        if self.quick_check_interval_minutes >= self.full_scan_interval_minutes {
            return invalid(format!(
                "quick check interval ({}m) must be shorter than full scan interval ({}m)",
                self.quick_check_interval_minutes, self.full_scan_interval_minutes
            ));
        }
        if !(self.probe_timeout_seconds.is_finite() && self.probe_timeout_seconds > 0.0) {
            return invalid("probe_timeout_seconds must be positive".to_string());
        }
        if self.offline_threshold == 0 {
            return invalid("offline_threshold must be at least 1".to_string());
        }
        if self.ranges.is_empty() {
            return invalid("at least one range is required".to_string());
        }

        range::expand_ranges(&self.ranges, max_hosts)?;
        Ok(())
    }
}

fn default_state_dir() -> String {
    "./state".to_string()
}

fn default_max_concurrent() -> usize {
    50
}

fn default_dns_timeout_ms() -> u64 {
    2000
}

fn default_max_hosts() -> usize {
    65_536
}

fn default_event_capacity() -> usize {
    256
}

fn default_full_scan_interval() -> u64 {
    60
}

fn default_quick_check_interval() -> u64 {
    1
}

fn default_probe_timeout() -> f64 {
    1.0
}

fn default_offline_threshold() -> u32 {
    3
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            max_concurrent_probes: default_max_concurrent(),
            dns_timeout_ms: default_dns_timeout_ms(),
            max_hosts_per_range: default_max_hosts(),
            event_capacity: default_event_capacity(),
            instances: Vec::new(),
        }
    }
}

impl MonitorConfig {
    /// Check every instance up front. Range errors surface here, never
    /// while scanning.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_probes == 0 {
            return Err(MonitorError::InvalidConfig(
                "max_concurrent_probes must be at least 1".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(MonitorError::InvalidConfig(
                "event_capacity must be at least 1".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for instance in &self.instances {
            let name_ok = !instance.name.is_empty()
                && instance
                    .name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
            if !name_ok {
                return Err(MonitorError::InvalidConfig(format!(
                    "instance name {:?} must be non-empty and use only [A-Za-z0-9_-]",
                    instance.name
                )));
            }
            if !names.insert(instance.name.as_str()) {
                return Err(MonitorError::InvalidConfig(format!(
                    "duplicate instance name {:?}",
                    instance.name
                )));
            }
            instance.validate(self.max_hosts_per_range)?;
        }
        Ok(())
    }

    pub fn dns_timeout(&self) -> Duration {
        Duration::from_millis(self.dns_timeout_ms)
    }

    /// State file owned by the named instance.
    pub fn state_path(&self, instance: &str) -> PathBuf {
        PathBuf::from(&self.state_dir).join(format!("nwmon_{instance}.json"))
    }
}
