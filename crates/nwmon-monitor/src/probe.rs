//! ICMP echo probing.
//!
//! ICMP availability is decided once at startup. The surge-ping client opens
//! an unprivileged datagram socket when the host allows it and a raw socket
//! otherwise; when neither can be opened every probe reports unreachable and
//! a single warning is logged.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use surge_ping::{Client, Config, PingIdentifier, PingSequence, ICMP};

const PAYLOAD: [u8; 56] = [0; 56];

/// Result of probing one address.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProbeOutcome {
    Reachable { rtt_ms: f64 },
    Unreachable,
}

impl ProbeOutcome {
    /// A reachable outcome with the RTT rounded to two decimals.
    pub fn from_rtt(rtt: Duration) -> Self {
        let ms = rtt.as_secs_f64() * 1000.0;
        Self::Reachable {
            rtt_ms: (ms * 100.0).round() / 100.0,
        }
    }

    pub fn is_reachable(&self) -> bool {
        matches!(self, Self::Reachable { .. })
    }

    pub fn rtt_ms(&self) -> Option<f64> {
        match self {
            Self::Reachable { rtt_ms } => Some(*rtt_ms),
            Self::Unreachable => None,
        }
    }
}

/// A single reachability probe. Network failures are `Unreachable`, never errors.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, ip: Ipv4Addr) -> ProbeOutcome;
}

/// How this process sends ICMP echo requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMode {
    /// Datagram ICMP socket, no special privileges.
    Unprivileged,
    /// Raw ICMP socket, needs root or CAP_NET_RAW.
    Privileged,
    Unavailable,
}

impl ProbeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unprivileged => "unprivileged",
            Self::Privileged => "privileged",
            Self::Unavailable => "unavailable",
        }
    }
}

/// The probing strategy selected for the lifetime of the process.
pub struct ProbeCapability {
    mode: ProbeMode,
    client: Option<Client>,
}

impl ProbeCapability {
    /// Detect the usable probing mode. Must run inside a tokio runtime.
    pub fn detect() -> Self {
        let config = Config::builder().kind(ICMP::V4).build();
        match Client::new(&config) {
            Ok(client) => {
                // The client falls back from the hinted socket type on its own.
                let mode = if client.get_socket().get_type() == config.sock_type_hint {
                    ProbeMode::Unprivileged
                } else {
                    ProbeMode::Privileged
                };
                tracing::info!(mode = mode.as_str(), "ICMP probing available");
                Self {
                    mode,
                    client: Some(client),
                }
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Neither unprivileged nor raw ICMP sockets are usable; \
                     every probe will report unreachable"
                );
                Self::unavailable()
            }
        }
    }

    pub fn unavailable() -> Self {
        Self {
            mode: ProbeMode::Unavailable,
            client: None,
        }
    }

    pub fn mode(&self) -> ProbeMode {
        self.mode
    }
}

/// ICMP echo prober with a fixed per-probe timeout.
pub struct IcmpProber {
    client: Option<Client>,
    timeout: Duration,
    next_id: AtomicU16,
}

impl IcmpProber {
    pub fn new(capability: &ProbeCapability, timeout: Duration) -> Self {
        Self {
            client: capability.client.clone(),
            timeout,
            next_id: AtomicU16::new(1),
        }
    }
}

#[async_trait]
impl Probe for IcmpProber {
    async fn probe(&self, ip: Ipv4Addr) -> ProbeOutcome {
        let Some(client) = &self.client else {
            return ProbeOutcome::Unreachable;
        };

        let id = PingIdentifier(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut pinger = client.pinger(IpAddr::V4(ip), id).await;
        pinger.timeout(self.timeout);

        match pinger.ping(PingSequence(0), &PAYLOAD).await {
            Ok((_packet, rtt)) => ProbeOutcome::from_rtt(rtt),
            Err(e) => {
                tracing::debug!(ip = %ip, error = %e, "Probe failed");
                ProbeOutcome::Unreachable
            }
        }
    }
}
