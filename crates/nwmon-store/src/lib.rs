//! nwmon-store: Durable device state for nwmon monitor instances.
//!
//! Each monitor instance owns one JSON document holding its device map and
//! the time of its last full scan. Documents carry a schema version; older
//! layouts are migrated forward on load, and writes replace the file
//! atomically so a crash never leaves a truncated document behind.

pub mod migrate;
pub mod store;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use nwmon_core::DeviceRecord;
use serde::{Deserialize, Serialize};

pub use store::{JsonFileStore, StateStore, StoreError};

/// Schema version written by this build.
pub const SCHEMA_VERSION: u32 = 2;

/// The persisted state of one monitor instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedState {
    pub version: u32,
    pub last_full_scan: Option<DateTime<Utc>>,
    /// Devices keyed by identifier (MAC if known, else IP).
    pub devices: BTreeMap<String, DeviceRecord>,
}

impl PersistedState {
    pub fn new(
        devices: BTreeMap<String, DeviceRecord>,
        last_full_scan: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            version: SCHEMA_VERSION,
            last_full_scan,
            devices,
        }
    }
}

impl Default for PersistedState {
    fn default() -> Self {
        Self::new(BTreeMap::new(), None)
    }
}
