//! Domain events raised by a monitor instance.
//!
//! Events are fanned out to in-process subscribers; each one is emitted
//! exactly once per state transition.

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::DeviceRecord;

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// An event emitted by a named monitor instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorEvent {
    pub id: EventId,
    pub instance: String,
    pub timestamp: DateTime<Utc>,
    pub payload: DeviceEvent,
}

impl MonitorEvent {
    pub fn new(instance: &str, payload: DeviceEvent) -> Self {
        Self {
            id: EventId::new(),
            instance: instance.to_string(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// The event payload, tagged by type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum DeviceEvent {
    /// A device answered again after having been declared offline.
    DeviceOnline {
        identifier: String,
        ip: Ipv4Addr,
        hostname: Option<String>,
    },
    /// A device crossed the failed-check threshold.
    DeviceOffline {
        identifier: String,
        ip: Ipv4Addr,
        hostname: Option<String>,
    },
    /// Priority companion of `DeviceOffline` for watched devices.
    WatchedDeviceOffline {
        identifier: String,
        ip: Ipv4Addr,
        display_name: String,
    },
}

impl DeviceEvent {
    pub fn online(identifier: &str, record: &DeviceRecord) -> Self {
        Self::DeviceOnline {
            identifier: identifier.to_string(),
            ip: record.ip,
            hostname: record.hostname.clone(),
        }
    }

    pub fn offline(identifier: &str, record: &DeviceRecord) -> Self {
        Self::DeviceOffline {
            identifier: identifier.to_string(),
            ip: record.ip,
            hostname: record.hostname.clone(),
        }
    }

    pub fn watched_offline(identifier: &str, record: &DeviceRecord) -> Self {
        Self::WatchedDeviceOffline {
            identifier: identifier.to_string(),
            ip: record.ip,
            display_name: record.display_name(),
        }
    }

    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::DeviceOnline { .. } => "device_online",
            Self::DeviceOffline { .. } => "device_offline",
            Self::WatchedDeviceOffline { .. } => "watched_device_offline",
        }
    }

    pub fn identifier(&self) -> &str {
        match self {
            Self::DeviceOnline { identifier, .. }
            | Self::DeviceOffline { identifier, .. }
            | Self::WatchedDeviceOffline { identifier, .. } => identifier,
        }
    }
}
