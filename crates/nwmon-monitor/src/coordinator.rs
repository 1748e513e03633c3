//! Per-instance monitor coordinator.
//!
//! A coordinator owns one instance's registry and state file. It runs the
//! scans the scheduler asks for, applies the results, persists, and
//! publishes events and snapshots. At most one scan per instance is in
//! flight at any time: scheduled ticks skip while the scan gate is held,
//! out-of-band full scans wait for it.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{broadcast, watch, Mutex, RwLock};

use nwmon_core::{DeviceEvent, DeviceQuery, DeviceRecord, MonitorEvent, Snapshot};
use nwmon_store::StateStore;

use crate::config::InstanceConfig;
use crate::error::Result;
use crate::range;
use crate::registry::{CycleReport, Registry};
use crate::scanner::Scanner;
use crate::scheduler::{CycleCounter, ScanKind};

pub struct Coordinator {
    name: String,
    config: InstanceConfig,
    targets: Vec<Ipv4Addr>,
    scanner: Arc<Scanner>,
    registry: RwLock<Registry>,
    store: Arc<dyn StateStore>,
    scan_gate: Mutex<CycleCounter>,
    persist_lock: Mutex<()>,
    events: broadcast::Sender<MonitorEvent>,
    snapshot: watch::Sender<Snapshot>,
}

impl Coordinator {
    /// Build a coordinator. Ranges are expanded here, so a bad range fails
    /// construction rather than a later scan.
    pub fn new(
        config: &InstanceConfig,
        scanner: Arc<Scanner>,
        store: Arc<dyn StateStore>,
        max_hosts_per_range: usize,
        event_capacity: usize,
    ) -> Result<Self> {
        let targets = range::expand_ranges(&config.ranges, max_hosts_per_range)?;
        let (events, _) = broadcast::channel(event_capacity.max(1));
        let (snapshot, _) = watch::channel(Snapshot {
            instance: config.name.clone(),
            ..Default::default()
        });

        Ok(Self {
            name: config.name.clone(),
            config: config.clone(),
            targets,
            scanner,
            registry: RwLock::new(Registry::new(config.offline_threshold)),
            store,
            scan_gate: Mutex::new(CycleCounter::new(config.cycle_ratio())),
            persist_lock: Mutex::new(()),
            events,
            snapshot,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn quick_check_interval(&self) -> Duration {
        self.config.quick_check_interval()
    }

    /// Number of addresses a full scan probes.
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Restore persisted state. Unreadable state is logged once and the
    /// instance starts with an empty device map.
    pub async fn load(&self) -> usize {
        let loaded = match self.store.load().await {
            Ok(Some(state)) => Some(state),
            Ok(None) => {
                tracing::info!(instance = %self.name, "No saved state, starting empty");
                None
            }
            Err(e) if e.is_unrecoverable_state() => {
                tracing::warn!(
                    instance = %self.name,
                    error = %e,
                    "Saved state unusable, starting with an empty device map"
                );
                None
            }
            Err(e) => {
                tracing::warn!(
                    instance = %self.name,
                    error = %e,
                    "Failed to read saved state, starting with an empty device map"
                );
                None
            }
        };

        let count = {
            let mut registry = self.registry.write().await;
            if let Some(state) = loaded {
                *registry = Registry::from_state(state, self.config.offline_threshold);
            }
            registry.devices().len()
        };

        tracing::info!(instance = %self.name, devices = count, "Loaded device state");
        self.publish_snapshot().await;
        count
    }

    /// Scheduled tick. Returns `None` when the previous scan is still running.
    pub async fn tick(&self) -> Option<ScanKind> {
        let Ok(mut gate) = self.scan_gate.try_lock() else {
            tracing::debug!(instance = %self.name, "Previous scan still running, skipping tick");
            return None;
        };
        let kind = gate.next_kind();
        self.run_scan(kind).await;
        Some(kind)
    }

    /// Out-of-band full scan. Waits for an in-flight scan instead of
    /// skipping, and leaves the scheduled cycle untouched.
    pub async fn full_scan(&self) {
        let _gate = self.scan_gate.lock().await;
        self.run_scan(ScanKind::Full).await;
    }

    async fn run_scan(&self, kind: ScanKind) {
        let start = Instant::now();

        let report = match kind {
            ScanKind::Full => {
                let hosts = self.scanner.full_scan(&self.targets).await;
                self.registry.write().await.apply_full_scan(&hosts, Utc::now())
            }
            ScanKind::Quick => {
                let targets = self.registry.read().await.check_targets();
                let results = self.scanner.check_devices(&targets).await;
                self.registry.write().await.apply_quick_check(&results, Utc::now())
            }
        };

        let CycleReport {
            events,
            discovered,
            migrated,
        } = report;
        let event_count = events.len();
        self.publish_events(events);
        self.persist().await;
        let snapshot = self.publish_snapshot().await;

        tracing::info!(
            instance = %self.name,
            kind = kind.as_str(),
            online = snapshot.online_count,
            total = snapshot.total_count,
            discovered,
            migrated,
            events = event_count,
            duration_ms = start.elapsed().as_millis(),
            "Scan cycle complete"
        );
    }

    /// Save the current registry. A failed write is logged and the instance
    /// keeps running on its in-memory state.
    pub async fn persist(&self) {
        let _guard = self.persist_lock.lock().await;
        let state = self.registry.read().await.to_state();
        if let Err(e) = self.store.save(&state).await {
            tracing::error!(instance = %self.name, error = %e, "Failed to persist device state");
        }
    }

    fn publish_events(&self, events: Vec<DeviceEvent>) {
        for payload in events {
            // Sending only fails when nobody is subscribed.
            let _ = self.events.send(MonitorEvent::new(&self.name, payload));
        }
    }

    async fn publish_snapshot(&self) -> Snapshot {
        let registry = self.registry.read().await;
        let snapshot = {
            let previous = self.snapshot.borrow();
            Snapshot::build(
                &self.name,
                registry.devices(),
                registry.last_full_scan(),
                Some(&*previous),
            )
        };
        self.snapshot.send_replace(snapshot.clone());
        snapshot
    }

    async fn after_command(&self) {
        self.persist().await;
        self.publish_snapshot().await;
    }

    pub async fn forget(&self, query: &DeviceQuery) -> Result<DeviceRecord> {
        let (identifier, record) = self.registry.write().await.remove(query)?;
        tracing::info!(
            instance = %self.name,
            identifier = %identifier,
            display_name = %record.display_name(),
            "Forgot device"
        );
        self.after_command().await;
        Ok(record)
    }

    pub async fn set_watched(&self, query: &DeviceQuery, watched: bool) -> Result<DeviceRecord> {
        let record = self.registry.write().await.set_watched(query, watched)?;
        tracing::info!(
            instance = %self.name,
            identifier = %record.identifier(),
            watched,
            "Updated watch flag"
        );
        self.after_command().await;
        Ok(record)
    }

    pub async fn set_nickname(&self, query: &DeviceQuery, nickname: Option<String>) -> Result<DeviceRecord> {
        let record = self.registry.write().await.set_nickname(query, nickname)?;
        tracing::info!(
            instance = %self.name,
            identifier = %record.identifier(),
            nickname = record.nickname.as_deref().unwrap_or(""),
            "Updated nickname"
        );
        self.after_command().await;
        Ok(record)
    }

    pub async fn device(&self, identifier: &str) -> Option<DeviceRecord> {
        self.registry.read().await.get(identifier).cloned()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.subscribe()
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }
}
