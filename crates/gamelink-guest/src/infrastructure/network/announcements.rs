//! Service-announcement browsing through `avahi-browse`.
//!
//! `avahi-browse -p -r -t _nvstream._tcp` prints one parseable record per
//! resolved address and exits once the cache is exhausted.  The records are
//! parsed by [`gamelink_core::parse_announcements`]; hosts announced only
//! over IPv6 get one forward lookup of their hostname for an IPv4 address.
//!
//! A missing `avahi-browse` (or a non-running daemon) simply yields no
//! candidates, which sends discovery down the subnet-probe path.

use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::time::Duration;

use async_trait::async_trait;
use gamelink_core::{parse_announcements, HostCandidate, HostResolver, ParseReport};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::application::discover::AnnouncementSource;
use crate::infrastructure::process::run_with_timeout;

/// DNS-SD service type of the streaming host.
pub const SERVICE_TYPE: &str = "_nvstream._tcp";

/// Resolves hostnames through the system resolver (blocking).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl HostResolver for SystemResolver {
    fn resolve_ipv4(&self, hostname: &str) -> Option<Ipv4Addr> {
        let addrs = match (hostname, 0).to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                debug!(hostname, error = %e, "Forward lookup failed");
                return None;
            }
        };
        addrs.into_iter().find_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(*v4.ip()),
            SocketAddr::V6(_) => None,
        })
    }
}

/// Browses announcements by running `avahi-browse`.
#[derive(Debug, Clone)]
pub struct AvahiBrowser {
    program: String,
    leading_args: Vec<String>,
    service_type: String,
    timeout: Duration,
}

impl AvahiBrowser {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: "avahi-browse".to_string(),
            leading_args: Vec::new(),
            service_type: SERVICE_TYPE.to_string(),
            timeout,
        }
    }

    /// Overrides the browser executable and any arguments placed before
    /// the browse flags.
    pub fn with_command(mut self, program: impl Into<String>, leading_args: Vec<String>) -> Self {
        self.program = program.into();
        self.leading_args = leading_args;
        self
    }

    /// Runs one browse and returns the full parse report.
    pub async fn browse_report(&self) -> ParseReport {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args);
        cmd.args(["-p", "-r", "-t", &self.service_type]);

        let output = match run_with_timeout(cmd, self.timeout).await {
            Ok(output) => output,
            Err(e) => {
                info!(error = %e, "Announcement browsing unavailable");
                return ParseReport::default();
            }
        };
        if !output.status.success() {
            debug!(status = %output.status, "avahi-browse exited with failure");
        }

        let raw = String::from_utf8_lossy(&output.stdout).into_owned();
        // Parsing may perform blocking forward lookups.
        let parsed =
            tokio::task::spawn_blocking(move || parse_announcements(&raw, &SystemResolver)).await;
        match parsed {
            Ok(report) => {
                for skipped in &report.skipped {
                    debug!(line = skipped.line, reason = %skipped.reason, "Skipped announcement record");
                }
                report
            }
            Err(e) => {
                warn!(error = %e, "Announcement parser task failed");
                ParseReport::default()
            }
        }
    }
}

#[async_trait]
impl AnnouncementSource for AvahiBrowser {
    async fn browse(&self) -> Vec<HostCandidate> {
        self.browse_report().await.candidates
    }
}
