//! Dual-cadence scan scheduling.
//!
//! Spawns one tokio task per monitor instance. Each task ticks at the
//! instance's quick-check interval; every `cycle_ratio`-th tick (and the
//! first one) runs a full scan instead of a quick check.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::coordinator::Coordinator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    Full,
    Quick,
}

impl ScanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Quick => "quick",
        }
    }
}

/// Decides which kind of scan a scheduled tick runs.
#[derive(Debug, Clone)]
pub struct CycleCounter {
    ratio: u32,
    count: u32,
    started: bool,
}

impl CycleCounter {
    pub fn new(ratio: u32) -> Self {
        Self {
            ratio: ratio.max(1),
            count: 0,
            started: false,
        }
    }

    pub fn next_kind(&mut self) -> ScanKind {
        if !self.started {
            self.started = true;
            return ScanKind::Full;
        }
        self.count += 1;
        if self.count >= self.ratio {
            self.count = 0;
            ScanKind::Full
        } else {
            ScanKind::Quick
        }
    }
}

/// Runs every instance's scan loop.
pub struct MonitorScheduler {
    coordinators: Vec<Arc<Coordinator>>,
}

impl MonitorScheduler {
    pub fn new(coordinators: Vec<Arc<Coordinator>>) -> Self {
        Self { coordinators }
    }

    /// Spawn one loop per instance and return their handles.
    pub fn spawn(&self) -> Vec<JoinHandle<()>> {
        let handles: Vec<JoinHandle<()>> = self
            .coordinators
            .iter()
            .map(|coordinator| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move { run_instance_loop(coordinator).await })
            })
            .collect();

        tracing::info!(instance_count = handles.len(), "Scheduler started");
        handles
    }

    /// Run until every loop ends, which only happens on runtime shutdown.
    pub async fn run(&self) {
        for handle in self.spawn() {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Instance loop panicked");
            }
        }
    }
}

/// Per-instance loop. Ticks are handed to their own task so a slow full scan
/// never delays the ticker; the coordinator skips ticks that overlap.
async fn run_instance_loop(coordinator: Arc<Coordinator>) {
    let mut ticker = interval(coordinator.quick_check_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            coordinator.tick().await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_tick_is_full_then_every_ratio() {
        let mut counter = CycleCounter::new(60);
        assert_eq!(counter.next_kind(), ScanKind::Full);
        for tick in 2..=60 {
            assert_eq!(counter.next_kind(), ScanKind::Quick, "tick {tick}");
        }
        assert_eq!(counter.next_kind(), ScanKind::Full);
        assert_eq!(counter.next_kind(), ScanKind::Quick);
    }

    #[test]
    fn test_ratio_one_is_always_full() {
        let mut counter = CycleCounter::new(1);
        for _ in 0..5 {
            assert_eq!(counter.next_kind(), ScanKind::Full);
        }
    }

    #[test]
    fn test_zero_ratio_is_clamped() {
        let mut counter = CycleCounter::new(0);
        counter.next_kind();
        assert_eq!(counter.next_kind(), ScanKind::Full);
    }
}
