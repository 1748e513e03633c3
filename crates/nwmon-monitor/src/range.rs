//! Range expansion: turn configured range expressions into probe targets.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};

use ipnet::{IpNet, Ipv4Net};

use crate::error::{MonitorError, Result};

/// Parse one range expression into an IPv4 network.
///
/// Accepts CIDR notation (host bits are truncated, so `192.168.1.7/24`
/// denotes `192.168.1.0/24`) or a bare address, which is a single-host range.
pub fn parse_range(raw: &str) -> Result<Ipv4Net> {
    let trimmed = raw.trim();
    let invalid = |reason: &str| MonitorError::InvalidRange {
        range: raw.to_string(),
        reason: reason.to_string(),
    };

    match trimmed.parse::<IpNet>() {
        Ok(IpNet::V4(net)) => Ok(net.trunc()),
        Ok(IpNet::V6(_)) => Err(invalid("only IPv4 ranges are supported")),
        Err(_) => match trimmed.parse::<IpAddr>() {
            Ok(IpAddr::V4(addr)) => Ipv4Net::new(addr, 32).map_err(|e| invalid(&e.to_string())),
            Ok(IpAddr::V6(_)) => Err(invalid("only IPv4 ranges are supported")),
            Err(_) => Err(invalid("not a CIDR range or IP address")),
        },
    }
}

/// Expand one range into its usable host addresses, in ascending order.
///
/// Network and broadcast addresses are excluded for prefixes up to /30;
/// /31 and /32 ranges yield every address.
pub fn expand_range(raw: &str, max_hosts: usize) -> Result<Vec<Ipv4Addr>> {
    let net = parse_range(raw)?;

    let host_bits = 32 - u32::from(net.prefix_len());
    let size = 1u64 << host_bits;
    if size > max_hosts as u64 {
        return Err(MonitorError::InvalidRange {
            range: raw.to_string(),
            reason: format!("{size} addresses exceeds the limit of {max_hosts}"),
        });
    }

    Ok(net.hosts().collect())
}

/// Expand several ranges, dropping addresses repeated across ranges.
pub fn expand_ranges(ranges: &[String], max_hosts: usize) -> Result<Vec<Ipv4Addr>> {
    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    for raw in ranges {
        for ip in expand_range(raw, max_hosts)? {
            if seen.insert(ip) {
                targets.push(ip);
            }
        }
    }
    Ok(targets)
}
