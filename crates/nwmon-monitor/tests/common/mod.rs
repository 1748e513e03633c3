//! In-memory fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use nwmon_store::{PersistedState, StateStore, StoreError};

use nwmon_monitor::config::InstanceConfig;
use nwmon_monitor::coordinator::Coordinator;
use nwmon_monitor::enrich::HostEnricher;
use nwmon_monitor::probe::{Probe, ProbeOutcome};
use nwmon_monitor::scanner::Scanner;

/// Prober answering from a mutable table of reachable addresses.
#[derive(Default)]
pub struct ScriptedProber {
    up: Mutex<HashMap<Ipv4Addr, f64>>,
    delay_ms: AtomicU64,
    pub calls: AtomicUsize,
}

impl ScriptedProber {
    pub fn set_up(&self, ip: Ipv4Addr, rtt_ms: f64) {
        self.up.lock().unwrap().insert(ip, rtt_ms);
    }

    pub fn set_down(&self, ip: Ipv4Addr) {
        self.up.lock().unwrap().remove(&ip);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl Probe for ScriptedProber {
    async fn probe(&self, ip: Ipv4Addr) -> ProbeOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        match self.up.lock().unwrap().get(&ip) {
            Some(&rtt_ms) => ProbeOutcome::Reachable { rtt_ms },
            None => ProbeOutcome::Unreachable,
        }
    }
}

/// Enricher with a mutable neighbor table and fixed names.
#[derive(Default)]
pub struct FakeEnricher {
    neighbors: Mutex<HashMap<Ipv4Addr, String>>,
    names: Mutex<HashMap<Ipv4Addr, String>>,
}

impl FakeEnricher {
    pub fn set_mac(&self, ip: Ipv4Addr, mac: &str) {
        self.neighbors.lock().unwrap().insert(ip, mac.to_string());
    }

    pub fn set_name(&self, ip: Ipv4Addr, name: &str) {
        self.names.lock().unwrap().insert(ip, name.to_string());
    }
}

#[async_trait]
impl HostEnricher for FakeEnricher {
    async fn neighbor_table(&self) -> HashMap<Ipv4Addr, String> {
        self.neighbors.lock().unwrap().clone()
    }

    async fn reverse_name(&self, ip: Ipv4Addr) -> Option<String> {
        self.names.lock().unwrap().get(&ip).cloned()
    }

    fn vendor(&self, _mac: &str) -> Option<String> {
        Some("Acme Networks".to_string())
    }
}

/// Store keeping the last saved state in memory.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<Option<PersistedState>>,
    corrupt: AtomicBool,
    fail_saves: AtomicBool,
    pub saves: AtomicUsize,
}

impl MemoryStore {
    pub fn with_state(state: PersistedState) -> Self {
        let store = Self::default();
        *store.state.lock().unwrap() = Some(state);
        store
    }

    pub fn corrupt() -> Self {
        let store = Self::default();
        store.corrupt.store(true, Ordering::SeqCst);
        store
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn saved(&self) -> Option<PersistedState> {
        self.state.lock().unwrap().clone()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load(&self) -> Result<Option<PersistedState>, StoreError> {
        if self.corrupt.load(Ordering::SeqCst) {
            return Err(StoreError::CorruptState {
                path: "memory".to_string(),
                reason: "truncated document".to_string(),
            });
        }
        Ok(self.saved())
    }

    async fn save(&self, state: &PersistedState) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )));
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.state.lock().unwrap() = Some(state.clone());
        Ok(())
    }
}

pub fn ip(last: u8) -> Ipv4Addr {
    Ipv4Addr::new(192, 168, 50, last)
}

/// One coordinator wired to fakes.
pub struct Harness {
    pub prober: Arc<ScriptedProber>,
    pub enricher: Arc<FakeEnricher>,
    pub store: Arc<MemoryStore>,
    pub coordinator: Arc<Coordinator>,
}

impl Harness {
    pub async fn new(name: &str, range: &str, store: MemoryStore) -> Self {
        let mut config = InstanceConfig::new(name, &[range]);
        config.full_scan_interval_minutes = 10;
        config.quick_check_interval_minutes = 1;
        Self::with_config(config, store).await
    }

    pub async fn with_config(config: InstanceConfig, store: MemoryStore) -> Self {
        let prober = Arc::new(ScriptedProber::default());
        let enricher = Arc::new(FakeEnricher::default());
        let store = Arc::new(store);
        let scanner = Arc::new(Scanner::new(prober.clone(), enricher.clone(), 8));
        let coordinator = Coordinator::new(&config, scanner, store.clone(), 65_536, 64)
            .expect("valid test config");
        coordinator.load().await;
        Self {
            prober,
            enricher,
            store,
            coordinator: Arc::new(coordinator),
        }
    }
}
