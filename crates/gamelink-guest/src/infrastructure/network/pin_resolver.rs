//! PIN exchange, requesting side.
//!
//! # Protocol (for beginners)
//!
//! The host shows a six-digit PIN on screen and listens on UDP 48010.  The
//! guest asks the whole LAN who holds that PIN:
//!
//! ```text
//!   guest ── "WHO_HAS_PIN 482910" ──▶ 255.255.255.255:48010   (IPv4 broadcast)
//!   guest ── "WHO_HAS_PIN 482910" ──▶ [ff02::1%eth0]:48010    (IPv6 all-nodes)
//!   host  ── "I_HAVE_PIN Living Room PC" ──▶ guest
//! ```
//!
//! The host's address is taken from the *source* of the reply; the reply
//! body only carries a display name.  Both families are asked concurrently,
//! each with its own timeout.  An IPv4 answer wins; an IPv6 answer is used
//! when IPv4 stays silent.  Nobody answering is a normal, empty result.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV6};
use std::time::Duration;

use async_trait::async_trait;
use gamelink_core::{HostAddress, PinError, PinMessage, PinToken, PIN_EXCHANGE_PORT};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::interfaces;
use crate::application::connect::PinLookup;

/// IPv6 link-local all-nodes multicast group.
pub const ALL_NODES: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 1);

/// Default per-family wait for a reply.
pub const DEFAULT_PIN_TIMEOUT: Duration = Duration::from_secs(3);

const MAX_DATAGRAM: usize = 512;

/// Pause after a failed receive before trying again.
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Errors of a PIN lookup.  Silence on the network is *not* an error.
#[derive(Debug, Error)]
pub enum PinExchangeError {
    #[error("invalid PIN: {0}")]
    InvalidPin(#[from] PinError),

    #[error("could not send the PIN request on any address family")]
    NoTransport,
}

/// The host that answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHost {
    /// Source address of the `I_HAVE_PIN` datagram.
    pub address: HostAddress,
    /// Display name from the reply body.
    pub name: String,
}

/// Where requests go and how long to wait.
#[derive(Debug, Clone)]
pub struct PinResolverConfig {
    pub timeout: Duration,
    pub ipv4_target: Option<SocketAddr>,
    pub ipv6_target: Option<SocketAddr>,
}

impl PinResolverConfig {
    /// Broadcast and all-nodes multicast on `port`.  The multicast scope is
    /// the default-route interface.
    pub fn lan(port: u16, timeout: Duration) -> Self {
        let scope_id = interfaces::link_local_scope()
            .and_then(|scope| interfaces::scope_index(&scope))
            .unwrap_or(0);
        Self {
            timeout,
            ipv4_target: Some(SocketAddr::from((Ipv4Addr::BROADCAST, port))),
            ipv6_target: Some(SocketAddr::V6(SocketAddrV6::new(ALL_NODES, port, 0, scope_id))),
        }
    }
}

impl Default for PinResolverConfig {
    fn default() -> Self {
        Self::lan(PIN_EXCHANGE_PORT, DEFAULT_PIN_TIMEOUT)
    }
}

type FamilyResult = io::Result<Option<ResolvedHost>>;

/// Sends `WHO_HAS_PIN` and collects the answer.
#[derive(Debug, Clone)]
pub struct PinResolver {
    config: PinResolverConfig,
}

impl PinResolver {
    pub fn new(config: PinResolverConfig) -> Self {
        Self { config }
    }

    /// Resolves `pin` to a host.
    ///
    /// # Errors
    ///
    /// [`PinExchangeError::InvalidPin`] before any packet is sent when `pin`
    /// is not six digits; [`PinExchangeError::NoTransport`] when neither
    /// family could send.
    pub async fn resolve(&self, pin: &str) -> Result<Option<ResolvedHost>, PinExchangeError> {
        let pin = PinToken::parse(pin)?;
        self.resolve_token(&pin).await
    }

    /// Resolves an already validated PIN.
    pub async fn resolve_token(
        &self,
        pin: &PinToken,
    ) -> Result<Option<ResolvedHost>, PinExchangeError> {
        let v4 = self.ask(self.config.ipv4_target, pin);
        let v6 = self.ask(self.config.ipv6_target, pin);
        tokio::pin!(v4, v6);

        let mut early_v6: Option<FamilyResult> = None;
        let v4_result = loop {
            tokio::select! {
                r = &mut v4 => break r,
                r = &mut v6, if early_v6.is_none() => early_v6 = Some(r),
            }
        };

        if let Ok(Some(host)) = &v4_result {
            info!(address = %host.address, name = %host.name, "PIN answered over IPv4");
            return Ok(Some(host.clone()));
        }

        let v6_result = match early_v6 {
            Some(r) => r,
            None => v6.await,
        };
        match (v4_result, v6_result) {
            (_, Ok(Some(host))) => {
                info!(address = %host.address, name = %host.name, "PIN answered over IPv6");
                Ok(Some(host))
            }
            (Err(e4), Err(e6)) => {
                warn!(ipv4 = %e4, ipv6 = %e6, "PIN request could not be sent");
                Err(PinExchangeError::NoTransport)
            }
            _ => {
                debug!("No host answered the PIN request");
                Ok(None)
            }
        }
    }

    /// Asks one address family.  `Ok(None)` covers both "no target" and
    /// "no answer before the timeout".
    async fn ask(&self, target: Option<SocketAddr>, pin: &PinToken) -> FamilyResult {
        let Some(target) = target else {
            return Ok(None);
        };
        let socket = open_socket(&target).map_err(|e| {
            debug!(%target, error = %e, "Could not open PIN request socket");
            e
        })?;
        socket
            .send_to(&PinMessage::request(pin).encode(), target)
            .await
            .map_err(|e| {
                debug!(%target, error = %e, "Could not send PIN request");
                e
            })?;
        debug!(%target, "PIN request sent");

        let deadline = Instant::now() + self.config.timeout;
        let mut buf = [0u8; MAX_DATAGRAM];
        loop {
            let (len, source) =
                match tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await {
                    Err(_) => return Ok(None),
                    Ok(Err(e)) => {
                        debug!(%target, error = %e, "Receive error while waiting for PIN reply");
                        back_off(deadline).await;
                        continue;
                    }
                    Ok(Ok(received)) => received,
                };
            match PinMessage::decode(&buf[..len]) {
                Some(PinMessage::IHavePin(name)) => {
                    return Ok(Some(ResolvedHost {
                        address: interfaces::host_from_source(source),
                        name,
                    }))
                }
                _ => debug!(%source, "Ignoring unrelated datagram"),
            }
        }
    }
}

/// Sleeps for [`RECV_ERROR_BACKOFF`], but never past `deadline`, so a
/// receive error that repeats immediately cannot spin the loop.
async fn back_off(deadline: Instant) {
    tokio::time::sleep_until(deadline.min(Instant::now() + RECV_ERROR_BACKOFF)).await;
}

#[async_trait]
impl PinLookup for PinResolver {
    async fn lookup(&self, pin: &PinToken) -> Result<Option<HostAddress>, String> {
        self.resolve_token(pin)
            .await
            .map(|found| found.map(|host| host.address))
            .map_err(|e| e.to_string())
    }
}

/// Opens an unbound-port request socket suitable for `target`.
fn open_socket(target: &SocketAddr) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(*target), Type::DGRAM, Some(Protocol::UDP))?;
    match target {
        SocketAddr::V4(_) => {
            socket.set_broadcast(true)?;
            socket.bind(&SockAddr::from(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))))?;
        }
        SocketAddr::V6(v6) => {
            socket.set_only_v6(true)?;
            if v6.ip().is_multicast() && v6.scope_id() != 0 {
                socket.set_multicast_if_v6(v6.scope_id())?;
            }
            socket.bind(&SockAddr::from(SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))))?;
        }
    }
    socket.set_nonblocking(true)?;
    UdpSocket::from_std(socket.into())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
