//! Concurrent probing of address sets.
//!
//! A full scan probes every address of an instance's ranges and enriches the
//! responders; a quick check only probes already-known devices. Both run
//! probes through a bounded `buffer_unordered` stream and settle every probe
//! before returning.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use uuid::Uuid;

use crate::enrich::HostEnricher;
use crate::probe::{Probe, ProbeOutcome};

/// A responder found by a full scan.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredHost {
    pub ip: Ipv4Addr,
    pub mac: Option<String>,
    pub hostname: Option<String>,
    pub vendor: Option<String>,
    pub rtt_ms: f64,
}

/// A known device to re-probe during a quick check.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckTarget {
    pub identifier: String,
    pub ip: Ipv4Addr,
    /// The device has no MAC yet; try to backfill one.
    pub needs_mac: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub identifier: String,
    pub ip: Ipv4Addr,
    pub outcome: ProbeOutcome,
    pub mac: Option<String>,
    pub vendor: Option<String>,
}

/// Probes address sets with bounded parallelism.
pub struct Scanner {
    prober: Arc<dyn Probe>,
    enricher: Arc<dyn HostEnricher>,
    max_concurrent: usize,
}

impl Scanner {
    pub fn new(prober: Arc<dyn Probe>, enricher: Arc<dyn HostEnricher>, max_concurrent: usize) -> Self {
        Self {
            prober,
            enricher,
            max_concurrent: max_concurrent.max(1),
        }
    }

    async fn probe_all(&self, ips: &[Ipv4Addr]) -> Vec<(Ipv4Addr, ProbeOutcome)> {
        stream::iter(ips.iter().copied())
            .map(|ip| async move { (ip, self.prober.probe(ip).await) })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await
    }

    /// Probe every address and enrich the ones that answered.
    ///
    /// The neighbor table is read after probing so that entries created by
    /// the probes themselves are visible.
    pub async fn full_scan(&self, ips: &[Ipv4Addr]) -> Vec<DiscoveredHost> {
        let scan_id = Uuid::new_v4();
        let start = Instant::now();

        tracing::info!(scan_id = %scan_id, addresses = ips.len(), "Starting full scan");

        let responders: Vec<(Ipv4Addr, f64)> = self
            .probe_all(ips)
            .await
            .into_iter()
            .filter_map(|(ip, outcome)| outcome.rtt_ms().map(|rtt| (ip, rtt)))
            .collect();

        let neighbors = if responders.is_empty() {
            HashMap::new()
        } else {
            self.enricher.neighbor_table().await
        };
        let neighbors = &neighbors;

        let mut hosts: Vec<DiscoveredHost> = stream::iter(responders)
            .map(|(ip, rtt_ms)| async move {
                let mac = neighbors.get(&ip).cloned();
                let vendor = mac.as_deref().and_then(|m| self.enricher.vendor(m));
                let hostname = self.enricher.reverse_name(ip).await;
                DiscoveredHost {
                    ip,
                    mac,
                    hostname,
                    vendor,
                    rtt_ms,
                }
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        hosts.sort_by_key(|h| h.ip);

        tracing::info!(
            scan_id = %scan_id,
            addresses = ips.len(),
            hosts_up = hosts.len(),
            duration_ms = start.elapsed().as_millis(),
            "Full scan complete"
        );

        hosts
    }

    /// Re-probe known devices. Hostname and vendor are not re-resolved,
    /// except for the vendor of a newly backfilled MAC.
    pub async fn check_devices(&self, targets: &[CheckTarget]) -> Vec<CheckResult> {
        if targets.is_empty() {
            return Vec::new();
        }

        let outcomes: HashMap<Ipv4Addr, ProbeOutcome> = {
            let mut unique: Vec<Ipv4Addr> = targets.iter().map(|t| t.ip).collect();
            unique.sort();
            unique.dedup();
            self.probe_all(&unique).await.into_iter().collect()
        };

        let wants_neighbors = targets.iter().any(|t| {
            t.needs_mac && outcomes.get(&t.ip).is_some_and(ProbeOutcome::is_reachable)
        });
        let neighbors = if wants_neighbors {
            self.enricher.neighbor_table().await
        } else {
            HashMap::new()
        };

        let results: Vec<CheckResult> = targets
            .iter()
            .map(|target| {
                let outcome = outcomes
                    .get(&target.ip)
                    .copied()
                    .unwrap_or(ProbeOutcome::Unreachable);
                let mac = if target.needs_mac && outcome.is_reachable() {
                    neighbors.get(&target.ip).cloned()
                } else {
                    None
                };
                let vendor = mac.as_deref().and_then(|m| self.enricher.vendor(m));
                CheckResult {
                    identifier: target.identifier.clone(),
                    ip: target.ip,
                    outcome,
                    mac,
                    vendor,
                }
            })
            .collect();

        let online = results.iter().filter(|r| r.outcome.is_reachable()).count();
        tracing::debug!(online, total = results.len(), "Quick check complete");

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SetProber {
        up: HashSet<Ipv4Addr>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Probe for SetProber {
        async fn probe(&self, ip: Ipv4Addr) -> ProbeOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.up.contains(&ip) {
                ProbeOutcome::Reachable { rtt_ms: 1.25 }
            } else {
                ProbeOutcome::Unreachable
            }
        }
    }

    struct TableEnricher {
        neighbors: HashMap<Ipv4Addr, String>,
    }

    #[async_trait]
    impl HostEnricher for TableEnricher {
        async fn neighbor_table(&self) -> HashMap<Ipv4Addr, String> {
            self.neighbors.clone()
        }

        async fn reverse_name(&self, ip: Ipv4Addr) -> Option<String> {
            (ip.octets()[3] == 1).then(|| "router".to_string())
        }

        fn vendor(&self, _mac: &str) -> Option<String> {
            Some("Acme".to_string())
        }
    }

    fn ip(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, last)
    }

    fn scanner(up: &[u8], neighbors: &[(u8, &str)]) -> (Scanner, Arc<SetProber>) {
        let prober = Arc::new(SetProber {
            up: up.iter().map(|&l| ip(l)).collect(),
            calls: AtomicUsize::new(0),
        });
        let enricher = Arc::new(TableEnricher {
            neighbors: neighbors.iter().map(|&(l, m)| (ip(l), m.to_string())).collect(),
        });
        (Scanner::new(prober.clone(), enricher, 4), prober)
    }

    #[tokio::test]
    async fn test_full_scan_enriches_responders() {
        let (scanner, prober) = scanner(&[1, 5], &[(1, "aa:bb:cc:dd:ee:01")]);
        let ips: Vec<Ipv4Addr> = (1..=20).map(ip).collect();

        let hosts = scanner.full_scan(&ips).await;

        assert_eq!(prober.calls.load(Ordering::SeqCst), 20);
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts[0].ip, ip(1));
        assert_eq!(hosts[0].mac.as_deref(), Some("aa:bb:cc:dd:ee:01"));
        assert_eq!(hosts[0].hostname.as_deref(), Some("router"));
        assert_eq!(hosts[0].vendor.as_deref(), Some("Acme"));
        assert_eq!(hosts[0].rtt_ms, 1.25);

        assert_eq!(hosts[1].ip, ip(5));
        assert_eq!(hosts[1].mac, None);
        assert_eq!(hosts[1].vendor, None);
        assert_eq!(hosts[1].hostname, None);
    }

    #[tokio::test]
    async fn test_full_scan_nothing_up() {
        let (scanner, _) = scanner(&[], &[]);
        assert!(scanner.full_scan(&[ip(1), ip(2)]).await.is_empty());
    }

    #[tokio::test]
    async fn test_check_devices_backfills_missing_mac() {
        let (scanner, prober) = scanner(&[2, 3], &[(2, "aa:bb:cc:dd:ee:02"), (3, "aa:bb:cc:dd:ee:03")]);
        let targets = vec![
            CheckTarget {
                identifier: "10.0.0.2".to_string(),
                ip: ip(2),
                needs_mac: true,
            },
            CheckTarget {
                identifier: "aa:bb:cc:dd:ee:03".to_string(),
                ip: ip(3),
                needs_mac: false,
            },
            CheckTarget {
                identifier: "10.0.0.4".to_string(),
                ip: ip(4),
                needs_mac: true,
            },
        ];

        let results = scanner.check_devices(&targets).await;

        assert_eq!(prober.calls.load(Ordering::SeqCst), 3);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].mac.as_deref(), Some("aa:bb:cc:dd:ee:02"));
        assert_eq!(results[0].vendor.as_deref(), Some("Acme"));
        assert!(results[1].outcome.is_reachable());
        assert_eq!(results[1].mac, None);
        assert_eq!(results[2].outcome, ProbeOutcome::Unreachable);
        assert_eq!(results[2].mac, None);
    }

    #[tokio::test]
    async fn test_check_devices_empty() {
        let (scanner, prober) = scanner(&[1], &[]);
        assert!(scanner.check_devices(&[]).await.is_empty());
        assert_eq!(prober.calls.load(Ordering::SeqCst), 0);
    }
}
