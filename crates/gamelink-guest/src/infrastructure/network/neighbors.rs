//! IPv6 neighbor table access.
//!
//! A /24 sweep cannot find IPv6-only hosts, so the subnet probe adds every
//! usable entry from the kernel's neighbor table (`ip -6 neigh show`).
//! To refresh stale entries it can first flush the cache and ping the
//! all-nodes multicast group once.  Both priming steps usually need extra
//! privileges; failures are logged and ignored.

use std::net::IpAddr;
use std::time::Duration;

use gamelink_core::HostAddress;
use tokio::process::Command;
use tracing::debug;

use crate::infrastructure::process::run_with_timeout;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(3);

/// Parses `ip -6 neigh show` output into addresses worth probing.
///
/// ```text
/// fe80::1 dev eth0 lladdr aa:bb:cc:dd:ee:ff router REACHABLE
/// 2001:db8::20 dev eth0 lladdr 11:22:33:44:55:66 STALE
/// fe80::9 dev eth0 FAILED
/// ```
///
/// `FAILED` and `INCOMPLETE` entries are skipped.  Link-local entries are
/// scoped with the interface after `dev`.
pub fn parse_neighbors(table: &str) -> Vec<HostAddress> {
    let mut found = Vec::new();
    for line in table.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let Some(first) = fields.first() else {
            continue;
        };
        if fields
            .iter()
            .any(|f| *f == "FAILED" || *f == "INCOMPLETE")
        {
            continue;
        }
        let Ok(ip) = first.parse::<IpAddr>() else {
            continue;
        };
        if !ip.is_ipv6() || ip.is_loopback() || ip.is_multicast() {
            continue;
        }
        let dev = fields
            .windows(2)
            .find(|pair| pair[0] == "dev")
            .map(|pair| pair[1]);
        let address = HostAddress::from_ip(ip, dev);
        if !found.contains(&address) {
            found.push(address);
        }
    }
    found
}

/// Reads the current IPv6 neighbor table.  Empty on any failure.
pub async fn read_neighbor_table() -> Vec<HostAddress> {
    let mut cmd = Command::new("ip");
    cmd.args(["-6", "neigh", "show"]);
    match run_with_timeout(cmd, COMMAND_TIMEOUT).await {
        Ok(output) if output.status.success() => {
            parse_neighbors(&String::from_utf8_lossy(&output.stdout))
        }
        Ok(output) => {
            debug!(status = %output.status, "ip -6 neigh show failed");
            Vec::new()
        }
        Err(e) => {
            debug!(error = %e, "Neighbor table unavailable");
            Vec::new()
        }
    }
}

/// Flushes the neighbor cache and pings `ff02::1` on `interface`.
///
/// Best effort: both steps are skipped silently on failure.
pub async fn prime_neighbor_cache(interface: Option<&str>) {
    let mut flush = Command::new("ip");
    flush.args(["-6", "neigh", "flush", "all"]);
    match run_with_timeout(flush, COMMAND_TIMEOUT).await {
        Ok(output) if !output.status.success() => {
            debug!(status = %output.status, "Neighbor flush refused");
        }
        Err(e) => debug!(error = %e, "Neighbor flush failed"),
        Ok(_) => {}
    }

    let target = match interface {
        Some(iface) => format!("ff02::1%{iface}"),
        None => "ff02::1".to_string(),
    };
    let mut ping = Command::new("ping");
    ping.args(["-6", "-c", "1", "-W", "1", &target]);
    if let Err(e) = run_with_timeout(ping, COMMAND_TIMEOUT).await {
        debug!(error = %e, "All-nodes ping failed");
    }
}
