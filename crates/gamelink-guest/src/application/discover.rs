//! DiscoverUseCase: find streaming hosts on the LAN.
//!
//! Two strategies run side by side:
//!
//! 1. **Announcements** – hosts that advertise the streaming service over
//!    multicast DNS.  Fast and carries friendly names, but only works when
//!    the host and the guest's resolver daemon both cooperate.
//! 2. **Subnet probe** – a TCP connect to the control port of every address
//!    in the local /24 plus known IPv6 neighbors.  Slower, always works.
//!
//! Announcements win whenever they produce at least one candidate; the probe
//! result is used only as a fallback.  The caller receives exactly one
//! [`DiscoveryResult`].

use std::sync::Arc;

use async_trait::async_trait;
use gamelink_core::HostCandidate;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Source of announced hosts.
#[async_trait]
pub trait AnnouncementSource: Send + Sync {
    /// Browses once and returns the candidates found (possibly none).
    async fn browse(&self) -> Vec<HostCandidate>;
}

/// Fallback scanner used when nobody announces.
#[async_trait]
pub trait FallbackScanner: Send + Sync {
    /// Scans once and returns every responsive host.
    async fn scan(&self) -> Vec<HostCandidate>;
}

/// Which strategy produced the candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoverySource {
    Announcements,
    SubnetProbe,
}

/// The single result handed back per discovery run.
#[derive(Debug, Clone)]
pub struct DiscoveryResult {
    pub source: DiscoverySource,
    pub candidates: Vec<HostCandidate>,
}

/// Callback receiving the one result of [`DiscoverUseCase::spawn`].
pub type DiscoveryCallback = Box<dyn FnOnce(DiscoveryResult) + Send>;

/// Runs both discovery strategies and picks a winner.
pub struct DiscoverUseCase {
    announcements: Arc<dyn AnnouncementSource>,
    scanner: Arc<dyn FallbackScanner>,
}

impl DiscoverUseCase {
    pub fn new(
        announcements: Arc<dyn AnnouncementSource>,
        scanner: Arc<dyn FallbackScanner>,
    ) -> Self {
        Self {
            announcements,
            scanner,
        }
    }

    /// Runs one discovery pass.
    ///
    /// The probe starts immediately so that its latency overlaps with the
    /// browse; it is aborted if announcements already produced hosts.
    pub async fn discover(&self) -> DiscoveryResult {
        let scanner = Arc::clone(&self.scanner);
        let probe = tokio::spawn(async move { scanner.scan().await });

        let announced = self.announcements.browse().await;
        if !announced.is_empty() {
            probe.abort();
            info!(count = announced.len(), "Discovered hosts via announcements");
            return DiscoveryResult {
                source: DiscoverySource::Announcements,
                candidates: announced,
            };
        }

        debug!("No announcements; waiting for subnet probe");
        let candidates = match probe.await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "Subnet probe task failed");
                Vec::new()
            }
        };
        info!(count = candidates.len(), "Discovered hosts via subnet probe");
        DiscoveryResult {
            source: DiscoverySource::SubnetProbe,
            candidates,
        }
    }

    /// Runs discovery in the background and delivers the result once.
    pub fn spawn(self: Arc<Self>, on_complete: DiscoveryCallback) -> JoinHandle<()> {
        tokio::spawn(async move {
            let result = self.discover().await;
            on_complete(result);
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use gamelink_core::HostAddress;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct FixedAnnouncements(Vec<HostCandidate>);

    #[async_trait]
    impl AnnouncementSource for FixedAnnouncements {
        async fn browse(&self) -> Vec<HostCandidate> {
            self.0.clone()
        }
    }

    struct SlowScanner {
        result: Vec<HostCandidate>,
        delay: Duration,
        finished: Arc<AtomicBool>,
    }

    #[async_trait]
    impl FallbackScanner for SlowScanner {
        async fn scan(&self) -> Vec<HostCandidate> {
            tokio::time::sleep(self.delay).await;
            self.finished.store(true, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn candidate(name: &str, last_octet: u8) -> HostCandidate {
        HostCandidate::new(
            name,
            HostAddress::V4(Ipv4Addr::new(192, 168, 1, last_octet)),
            gamelink_core::HOST_CONTROL_PORT,
            None,
        )
    }

    #[tokio::test]
    async fn test_announcements_win_when_non_empty() {
        // Arrange
        let finished = Arc::new(AtomicBool::new(false));
        let use_case = DiscoverUseCase::new(
            Arc::new(FixedAnnouncements(vec![candidate("Living Room", 40)])),
            Arc::new(SlowScanner {
                result: vec![candidate("192.168.1.41", 41)],
                delay: Duration::from_millis(200),
                finished: Arc::clone(&finished),
            }),
        );

        // Act
        let result = use_case.discover().await;

        // Assert
        assert_eq!(result.source, DiscoverySource::Announcements);
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.candidates[0].display_name(), "Living Room");
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!finished.load(Ordering::SeqCst), "probe should have been aborted");
    }

    #[tokio::test]
    async fn test_probe_used_when_no_announcements() {
        let use_case = DiscoverUseCase::new(
            Arc::new(FixedAnnouncements(vec![])),
            Arc::new(SlowScanner {
                result: vec![candidate("192.168.1.41", 41)],
                delay: Duration::from_millis(10),
                finished: Arc::new(AtomicBool::new(false)),
            }),
        );

        let result = use_case.discover().await;

        assert_eq!(result.source, DiscoverySource::SubnetProbe);
        assert_eq!(result.candidates[0].display_name(), "192.168.1.41");
    }

    #[tokio::test]
    async fn test_empty_network_yields_empty_probe_result() {
        let use_case = DiscoverUseCase::new(
            Arc::new(FixedAnnouncements(vec![])),
            Arc::new(SlowScanner {
                result: vec![],
                delay: Duration::ZERO,
                finished: Arc::new(AtomicBool::new(false)),
            }),
        );

        let result = use_case.discover().await;

        assert_eq!(result.source, DiscoverySource::SubnetProbe);
        assert!(result.candidates.is_empty());
    }

    #[tokio::test]
    async fn test_spawn_delivers_exactly_one_result() {
        let use_case = Arc::new(DiscoverUseCase::new(
            Arc::new(FixedAnnouncements(vec![candidate("Den", 7)])),
            Arc::new(SlowScanner {
                result: vec![],
                delay: Duration::ZERO,
                finished: Arc::new(AtomicBool::new(false)),
            }),
        ));
        let (tx, rx) = tokio::sync::oneshot::channel();

        let handle = use_case.spawn(Box::new(move |result| {
            let _ = tx.send(result);
        }));
        handle.await.unwrap();

        let result = rx.await.unwrap();
        assert_eq!(result.candidates[0].display_name(), "Den");
    }
}
