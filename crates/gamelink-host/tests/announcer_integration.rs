//! Integration tests for the PIN announcer.
//!
//! These drive the announcer through its public API over real loopback UDP
//! sockets, the same way a guest on the LAN would.

use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use gamelink_core::{PinMessage, PinToken};
use gamelink_host::application::pin_code::generate_pin;
use gamelink_host::infrastructure::network::pin_announcer::{
    AnnouncerConfig, AnnouncerError, PinAnnouncer,
};
use tokio_test::{assert_err, assert_ok};

fn start(pin: &str, name: &str) -> PinAnnouncer {
    let config = AnnouncerConfig {
        port: 0,
        poll_interval: Duration::from_millis(50),
        enable_ipv6: false,
        ..AnnouncerConfig::new(name)
    };
    assert_ok!(PinAnnouncer::start(PinToken::parse(pin).unwrap(), config))
}

fn loopback(announcer: &PinAnnouncer) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, announcer.ipv4_addr().port()))
}

fn ask(target: SocketAddr, pin: &str, wait: Duration) -> Option<PinMessage> {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.set_read_timeout(Some(wait)).unwrap();
    let request = PinMessage::request(&PinToken::parse(pin).unwrap()).encode();
    socket.send_to(&request, target).unwrap();
    let mut buf = [0u8; 512];
    let (len, _) = socket.recv_from(&mut buf).ok()?;
    PinMessage::decode(&buf[..len])
}

#[test]
fn test_generated_pin_is_answered_with_host_name() {
    // Arrange
    let pin = generate_pin();
    let announcer = start(&pin, "Living Room PC");

    // Act
    let reply = ask(loopback(&announcer), &pin, Duration::from_secs(2));

    // Assert
    assert_eq!(reply, Some(PinMessage::IHavePin("Living Room PC".into())));
}

#[test]
fn test_two_hosts_only_the_owner_answers() {
    // Arrange: two hosts on the same machine, each with its own PIN.
    let first = start("111111", "First");
    let second = start("222222", "Second");

    // Act
    let to_first = ask(loopback(&first), "222222", Duration::from_millis(300));
    let to_second = ask(loopback(&second), "222222", Duration::from_secs(2));

    // Assert
    assert!(to_first.is_none());
    assert_eq!(to_second, Some(PinMessage::IHavePin("Second".into())));
}

#[test]
fn test_repeated_requests_are_each_answered() {
    let announcer = start("482910", "Den PC");
    let target = loopback(&announcer);

    for _ in 0..3 {
        assert!(ask(target, "482910", Duration::from_secs(2)).is_some());
    }
}

#[test]
fn test_dropping_the_announcer_releases_the_port() {
    // Arrange
    let announcer = start("482910", "Den PC");
    let port = announcer.ipv4_addr().port();

    // Act
    drop(announcer);

    // Assert: the port can be bound again once the listener is gone.
    assert_ok!(UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))));
}

#[test]
fn test_second_announcer_on_the_same_port_fails_to_bind() {
    // Arrange
    let first = start("482910", "Den PC");
    let config = AnnouncerConfig {
        port: first.ipv4_addr().port(),
        enable_ipv6: false,
        ..AnnouncerConfig::new("Intruder")
    };

    // Act
    let result = PinAnnouncer::start(PinToken::parse("135790").unwrap(), config);

    // Assert
    assert!(matches!(
        assert_err!(result),
        AnnouncerError::BindFailed { .. }
    ));
}
