//! Fallback discovery: TCP-probe the host control port across the LAN.
//!
//! # Target set
//!
//! - `127.0.0.1` and `::1`, so a host on this very machine is found;
//! - all 254 host addresses of the local IPv4 /24, our own included;
//! - every usable entry of the IPv6 neighbor table.
//!
//! # Concurrency
//!
//! Each target gets one TCP connect with a short timeout.  At most
//! `max_workers` connects are in flight at once (a [`Semaphore`] gates the
//! spawned tasks), so a full /24 with nobody listening finishes in roughly
//! one timeout when the cap covers it, instead of 254 timeouts in a row.
//!
//! A reachable address gets one best-effort reverse-DNS lookup for a
//! friendlier display name; the literal address is used otherwise.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gamelink_core::{HostAddress, HostCandidate};
use ipnet::Ipv4Net;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::{interfaces, neighbors};
use crate::application::discover::FallbackScanner;

/// Upper bound on a reverse-DNS lookup.
const REVERSE_DNS_TIMEOUT: Duration = Duration::from_secs(1);

/// Why one target did not count as a host.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("connect timed out after {0:?}")]
    TimedOut(Duration),

    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),
}

/// One target that did not answer.
#[derive(Debug)]
pub struct ProbeFailure {
    pub address: HostAddress,
    pub error: ProbeError,
}

/// Outcome of one scan, in target order.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub candidates: Vec<HostCandidate>,
    pub failures: Vec<ProbeFailure>,
}

/// Tunables of the probe.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub port: u16,
    pub timeout: Duration,
    pub max_workers: usize,
    pub include_neighbors: bool,
    pub prime_neighbor_cache: bool,
    pub reverse_dns: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            port: gamelink_core::HOST_CONTROL_PORT,
            timeout: Duration::from_millis(800),
            max_workers: 256,
            include_neighbors: true,
            prime_neighbor_cache: true,
            reverse_dns: true,
        }
    }
}

/// Builds the ordered, de-duplicated target list.
pub fn build_targets(local_v4: Option<Ipv4Addr>, neighbors: &[HostAddress]) -> Vec<HostAddress> {
    let mut targets = vec![
        HostAddress::V4(Ipv4Addr::LOCALHOST),
        HostAddress::from_ip(IpAddr::V6(Ipv6Addr::LOCALHOST), None),
    ];

    if let Some(local) = local_v4.filter(|ip| !ip.is_loopback()) {
        // A /24 prefix length is always valid.
        if let Ok(net) = Ipv4Net::new(local, 24) {
            targets.extend(net.trunc().hosts().map(HostAddress::V4));
        }
    }

    for neighbor in neighbors {
        if !targets.contains(neighbor) {
            targets.push(neighbor.clone());
        }
    }
    targets
}

/// TCP-connect scanner over the local network.
pub struct SubnetProbe {
    config: ProbeConfig,
}

impl SubnetProbe {
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    /// Scans the network around `local_v4` (and the IPv6 neighbors).
    pub async fn scan_network(&self, local_v4: Option<Ipv4Addr>) -> ScanReport {
        let neighbors = if self.config.include_neighbors {
            self.collect_neighbors().await
        } else {
            Vec::new()
        };
        let targets = build_targets(local_v4, &neighbors);
        info!(
            targets = targets.len(),
            port = self.config.port,
            "Probing local network"
        );
        self.probe_all(targets).await
    }

    async fn collect_neighbors(&self) -> Vec<HostAddress> {
        let mut known = neighbors::read_neighbor_table().await;
        if self.config.prime_neighbor_cache {
            let iface = interfaces::default_route_interface();
            neighbors::prime_neighbor_cache(iface.as_deref()).await;
            for fresh in neighbors::read_neighbor_table().await {
                if !known.contains(&fresh) {
                    known.push(fresh);
                }
            }
        }
        debug!(count = known.len(), "IPv6 neighbors collected");
        known
    }

    /// Probes every target with bounded concurrency.
    pub async fn probe_all(&self, targets: Vec<HostAddress>) -> ScanReport {
        let semaphore = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let mut tasks = JoinSet::new();

        for (index, address) in targets.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let port = self.config.port;
            let timeout = self.config.timeout;
            let reverse_dns = self.config.reverse_dns;
            tasks.spawn(async move {
                // The semaphore is never closed.
                let _permit = semaphore.acquire_owned().await.ok();
                let result = match probe_one(&address, port, timeout).await {
                    Ok(()) => {
                        let name = if reverse_dns {
                            reverse_name(address.ip()).await
                        } else {
                            None
                        };
                        Ok(candidate_for(address.clone(), port, name))
                    }
                    Err(error) => Err(ProbeFailure { address, error }),
                };
                (index, result)
            });
        }

        let mut found = Vec::new();
        let mut failed = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(candidate))) => found.push((index, candidate)),
                Ok((index, Err(failure))) => failed.push((index, failure)),
                Err(e) => warn!(error = %e, "Probe task failed"),
            }
        }
        found.sort_by_key(|(index, _)| *index);
        failed.sort_by_key(|(index, _)| *index);

        let report = ScanReport {
            candidates: found.into_iter().map(|(_, c)| c).collect(),
            failures: failed.into_iter().map(|(_, f)| f).collect(),
        };
        info!(
            found = report.candidates.len(),
            unreachable = report.failures.len(),
            "Probe complete"
        );
        report
    }
}

#[async_trait]
impl FallbackScanner for SubnetProbe {
    async fn scan(&self) -> Vec<HostCandidate> {
        self.scan_network(interfaces::local_ipv4()).await.candidates
    }
}

async fn probe_one(address: &HostAddress, port: u16, timeout: Duration) -> Result<(), ProbeError> {
    let target = interfaces::socket_addr(address, port);
    match tokio::time::timeout(timeout, TcpStream::connect(target)).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(ProbeError::Connect(e)),
        Err(_) => Err(ProbeError::TimedOut(timeout)),
    }
}

/// Reverse DNS name for `ip`, if one exists and arrives in time.
async fn reverse_name(ip: IpAddr) -> Option<String> {
    let lookup = tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&ip));
    match tokio::time::timeout(REVERSE_DNS_TIMEOUT, lookup).await {
        Ok(Ok(Ok(name))) if name != ip.to_string() => Some(name),
        _ => None,
    }
}

fn candidate_for(address: HostAddress, port: u16, name: Option<String>) -> HostCandidate {
    let display = name.clone().unwrap_or_else(|| address.to_string());
    HostCandidate::new(display, address, port, name)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
