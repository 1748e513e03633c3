//! Host enrichment: neighbor table, reverse names and OUI vendors.
//!
//! Every lookup here is best-effort. A failure leaves the corresponding
//! field absent and never affects reachability.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use mac_oui::Oui;
use nwmon_core::query::canonical_mac;

const PROC_NET_ARP: &str = "/proc/net/arp";
const EMPTY_MAC: &str = "00:00:00:00:00:00";

/// Vendor label for locally administered (randomised) MACs.
pub const PRIVATE_VENDOR: &str = "Private (randomized MAC)";

static OUI_DB: OnceLock<Option<Oui>> = OnceLock::new();

fn oui_db() -> Option<&'static Oui> {
    OUI_DB
        .get_or_init(|| match Oui::default() {
            Ok(db) => Some(db),
            Err(e) => {
                tracing::warn!(error = %e, "OUI database unavailable, vendors will be absent");
                None
            }
        })
        .as_ref()
}

#[async_trait]
pub trait HostEnricher: Send + Sync {
    /// Current IPv4 to MAC mapping for same-segment hosts.
    async fn neighbor_table(&self) -> HashMap<Ipv4Addr, String>;

    async fn reverse_name(&self, ip: Ipv4Addr) -> Option<String>;

    fn vendor(&self, mac: &str) -> Option<String>;
}

/// Enricher backed by the host operating system.
pub struct SystemEnricher {
    dns_timeout: Duration,
}

impl SystemEnricher {
    pub fn new(dns_timeout: Duration) -> Self {
        Self { dns_timeout }
    }

    async fn arp_command(&self) -> HashMap<Ipv4Addr, String> {
        let output = tokio::process::Command::new("arp")
            .arg("-an")
            .stdin(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .output()
            .await;

        match output {
            Ok(out) => parse_arp_an(&String::from_utf8_lossy(&out.stdout)),
            Err(e) => {
                tracing::debug!(error = %e, "arp command unavailable");
                HashMap::new()
            }
        }
    }
}

#[async_trait]
impl HostEnricher for SystemEnricher {
    async fn neighbor_table(&self) -> HashMap<Ipv4Addr, String> {
        match tokio::fs::read_to_string(PROC_NET_ARP).await {
            Ok(content) => parse_proc_net_arp(&content),
            Err(e) => {
                tracing::debug!(error = %e, "Falling back to arp -an");
                self.arp_command().await
            }
        }
    }

    async fn reverse_name(&self, ip: Ipv4Addr) -> Option<String> {
        let lookup = tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&IpAddr::V4(ip)));

        match tokio::time::timeout(self.dns_timeout, lookup).await {
            Ok(Ok(Ok(name))) => short_hostname(&name, ip),
            Ok(Ok(Err(e))) => {
                tracing::debug!(ip = %ip, error = %e, "Reverse lookup failed");
                None
            }
            Ok(Err(e)) => {
                tracing::debug!(ip = %ip, error = %e, "Reverse lookup task failed");
                None
            }
            Err(_) => {
                tracing::debug!(ip = %ip, "Reverse lookup timed out");
                None
            }
        }
    }

    fn vendor(&self, mac: &str) -> Option<String> {
        if is_locally_administered(mac) {
            return Some(PRIVATE_VENDOR.to_string());
        }
        match oui_db()?.lookup_by_mac(mac) {
            Ok(Some(entry)) => Some(entry.company_name.clone()),
            _ => None,
        }
    }
}

/// Parse the Linux `/proc/net/arp` table.
pub fn parse_proc_net_arp(content: &str) -> HashMap<Ipv4Addr, String> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                return None;
            }
            neighbor_entry(fields[0], fields[3])
        })
        .collect()
}

/// Parse BSD/macOS style `arp -an` output, e.g.
/// `? (192.168.1.1) at aa:bb:cc:dd:ee:ff on en0 ifscope [ethernet]`.
pub fn parse_arp_an(output: &str) -> HashMap<Ipv4Addr, String> {
    output
        .lines()
        .filter_map(|line| {
            let open = line.find('(')?;
            let close = line[open..].find(')')? + open;
            let ip = &line[open + 1..close];
            let rest = line[close + 1..].trim_start().strip_prefix("at ")?;
            let mac = rest.split_whitespace().next()?;
            neighbor_entry(ip, mac)
        })
        .collect()
}

fn neighbor_entry(ip: &str, mac: &str) -> Option<(Ipv4Addr, String)> {
    let ip = ip.parse::<Ipv4Addr>().ok()?;
    let mac = canonical_mac(&pad_octets(mac))?;
    if mac == EMPTY_MAC {
        return None;
    }
    Some((ip, mac))
}

/// `arp` on macOS prints octets without leading zeros (`0:1c:42:...`).
fn pad_octets(mac: &str) -> String {
    if !mac.contains(':') {
        return mac.to_string();
    }
    mac.split(':')
        .map(|octet| format!("{octet:0>2}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Keep the first label of a resolved name unless it is purely numeric.
fn short_hostname(name: &str, ip: Ipv4Addr) -> Option<String> {
    if name.is_empty() || name == ip.to_string() {
        return None;
    }
    let labels: Vec<&str> = name.split('.').collect();
    if labels.len() > 1 && !labels.iter().all(|l| l.chars().all(|c| c.is_ascii_digit())) {
        return Some(labels[0].to_string());
    }
    Some(name.to_string())
}

/// Bit 0x02 of the first octet marks a locally administered address.
pub fn is_locally_administered(mac: &str) -> bool {
    let first: String = mac.chars().filter(|c| c.is_ascii_hexdigit()).take(2).collect();
    match u8::from_str_radix(&first, 16) {
        Ok(byte) if first.len() == 2 => byte & 0x02 != 0,
        _ => false,
    }
}
