//! Command routing across monitor instances.
//!
//! The dispatcher never touches a registry itself. Each command is offered to
//! the instances in registration order and the first one that resolves the
//! identifier applies it through its own entrypoint.

use std::sync::Arc;

use futures::future::join_all;
use nwmon_core::{DeviceQuery, DeviceRecord, Snapshot};

use crate::coordinator::Coordinator;
use crate::error::{MonitorError, Result};

pub struct ServiceDispatcher {
    instances: Vec<Arc<Coordinator>>,
}

impl ServiceDispatcher {
    pub fn new(instances: Vec<Arc<Coordinator>>) -> Self {
        Self { instances }
    }

    pub fn instances(&self) -> &[Arc<Coordinator>] {
        &self.instances
    }

    /// Run an out-of-band full scan on every instance concurrently.
    pub async fn full_scan(&self) {
        tracing::info!(instances = self.instances.len(), "Full scan requested");
        join_all(self.instances.iter().map(|c| c.full_scan())).await;
    }

    pub async fn forget_device(&self, raw_id: &str) -> Result<DeviceRecord> {
        let query = DeviceQuery::parse(raw_id);
        for instance in &self.instances {
            match instance.forget(&query).await {
                Err(e) if e.is_not_found() => continue,
                other => return other,
            }
        }
        Err(not_found(&query))
    }

    pub async fn watch_device(&self, raw_id: &str, watched: bool) -> Result<DeviceRecord> {
        let query = DeviceQuery::parse(raw_id);
        for instance in &self.instances {
            match instance.set_watched(&query, watched).await {
                Err(e) if e.is_not_found() => continue,
                other => return other,
            }
        }
        Err(not_found(&query))
    }

    /// Set a nickname; `None` or an empty string clears it.
    pub async fn name_device(&self, raw_id: &str, nickname: Option<String>) -> Result<DeviceRecord> {
        let query = DeviceQuery::parse(raw_id);
        for instance in &self.instances {
            match instance.set_nickname(&query, nickname.clone()).await {
                Err(e) if e.is_not_found() => continue,
                other => return other,
            }
        }
        Err(not_found(&query))
    }

    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.instances.iter().map(|c| c.snapshot()).collect()
    }
}

fn not_found(query: &DeviceQuery) -> MonitorError {
    tracing::warn!(device_id = %query.raw(), "No instance owns device");
    MonitorError::NotFound(query.raw().to_string())
}
