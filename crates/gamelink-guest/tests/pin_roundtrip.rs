//! End-to-end PIN exchange over loopback.
//!
//! A real host-side announcer answers on an ephemeral port; the guest-side
//! resolver is pointed straight at it instead of at broadcast/multicast so
//! the test works without a LAN.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use gamelink_core::{HostAddress, PinToken};
use gamelink_guest::application::connect::PinLookup;
use gamelink_guest::infrastructure::network::pin_resolver::{
    PinExchangeError, PinResolver, PinResolverConfig,
};
use gamelink_host::infrastructure::network::pin_announcer::{AnnouncerConfig, PinAnnouncer};
use tokio_test::{assert_err, assert_ok};

fn announce(pin: &str, name: &str, enable_ipv6: bool) -> PinAnnouncer {
    let config = AnnouncerConfig {
        port: 0,
        poll_interval: Duration::from_millis(50),
        enable_ipv6,
        ..AnnouncerConfig::new(name)
    };
    PinAnnouncer::start(PinToken::parse(pin).unwrap(), config).expect("announcer must start")
}

fn resolver_v4(port: u16, timeout: Duration) -> PinResolver {
    PinResolver::new(PinResolverConfig {
        timeout,
        ipv4_target: Some(SocketAddr::from((Ipv4Addr::LOCALHOST, port))),
        ipv6_target: None,
    })
}

fn ipv6_loopback_available() -> bool {
    UdpSocket::bind("[::1]:0").is_ok()
}

#[tokio::test]
async fn test_guest_finds_host_by_pin() {
    // Arrange
    let announcer = announce("482910", "Den PC", false);
    let resolver = resolver_v4(announcer.ipv4_addr().port(), Duration::from_secs(2));

    // Act
    let found = assert_ok!(resolver.resolve("482910").await);

    // Assert
    let host = found.expect("the announcer must answer");
    assert_eq!(host.address, HostAddress::V4(Ipv4Addr::LOCALHOST));
    assert_eq!(host.name, "Den PC");
}

#[tokio::test]
async fn test_wrong_pin_times_out_with_no_host() {
    // Arrange
    let announcer = announce("482910", "Den PC", false);
    let timeout = Duration::from_millis(300);
    let resolver = resolver_v4(announcer.ipv4_addr().port(), timeout);

    // Act
    let started = Instant::now();
    let found = assert_ok!(resolver.resolve("000000").await);

    // Assert
    assert!(found.is_none());
    assert!(started.elapsed() >= timeout);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_malformed_pin_is_rejected_before_sending() {
    let resolver = resolver_v4(9, Duration::from_millis(100));

    let result = resolver.resolve("12ab56").await;

    assert!(matches!(assert_err!(result), PinExchangeError::InvalidPin(_)));
}

#[tokio::test]
async fn test_ipv6_answer_is_used_when_ipv4_is_silent() {
    if !ipv6_loopback_available() {
        return;
    }
    // Arrange: IPv4 is aimed at a port nobody answers on.
    let announcer = announce("135790", "Study", true);
    let Some(v6) = announcer.ipv6_addr() else {
        return;
    };
    let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
    let resolver = PinResolver::new(PinResolverConfig {
        timeout: Duration::from_millis(500),
        ipv4_target: Some(silent.local_addr().unwrap()),
        ipv6_target: Some(SocketAddr::from((Ipv6Addr::LOCALHOST, v6.port()))),
    });

    // Act
    let found = assert_ok!(resolver.resolve("135790").await);

    // Assert
    let host = found.expect("the IPv6 listener must answer");
    assert_eq!(host.address.ip(), IpAddr::V6(Ipv6Addr::LOCALHOST));
    assert_eq!(host.name, "Study");
}

#[tokio::test]
async fn test_resolver_serves_as_connect_pin_lookup() {
    let announcer = announce("246810", "Attic", false);
    let resolver = resolver_v4(announcer.ipv4_addr().port(), Duration::from_secs(2));
    let lookup: &dyn PinLookup = &resolver;

    let address = lookup.lookup(&PinToken::parse("246810").unwrap()).await;

    assert_eq!(address, Ok(Some(HostAddress::V4(Ipv4Addr::LOCALHOST))));
}

#[tokio::test]
async fn test_stopped_announcer_no_longer_answers() {
    let announcer = announce("482910", "Den PC", false);
    let port = announcer.ipv4_addr().port();
    announcer.stop();
    let resolver = resolver_v4(port, Duration::from_millis(300));

    let found = assert_ok!(resolver.resolve("482910").await);

    assert!(found.is_none());
}
