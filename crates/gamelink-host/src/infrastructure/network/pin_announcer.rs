//! PIN exchange, answering side.
//!
//! The host binds UDP port 48010 on both `0.0.0.0` and `[::]` and waits for
//! `WHO_HAS_PIN <pin>` datagrams.  A request for *our* PIN is answered with
//! `I_HAVE_PIN <display name>`, unicast back to the request's source; the
//! guest reads our address from that source.  Anything else is ignored.
//!
//! # Threads and shutdown
//!
//! Each address family gets its own thread doing blocking `recv_from` with a
//! short read timeout.  On every timeout the thread checks the shared
//! `running` flag, so [`PinAnnouncer::stop`] takes effect within one poll
//! interval.  `stop` is idempotent and joins the threads.
//!
//! The IPv6 socket sets `IPV6_V6ONLY` so it can share the port number with
//! the IPv4 socket.  If IPv6 is unavailable the announcer runs IPv4-only.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use gamelink_core::{PinMessage, PinToken, PIN_EXCHANGE_PORT};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Default read timeout between shutdown checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Error type for the PIN announcer.
#[derive(Debug, Error)]
pub enum AnnouncerError {
    /// The IPv4 socket could not be bound.
    #[error("failed to bind PIN listener on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// A socket option could not be applied.
    #[error("failed to configure PIN listener socket: {0}")]
    Socket(#[source] io::Error),

    /// A listener thread could not be started.
    #[error("failed to spawn PIN listener thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Settings of one announcer.
#[derive(Debug, Clone)]
pub struct AnnouncerConfig {
    /// UDP port; `0` picks an ephemeral port (shared by both families).
    pub port: u16,
    /// Name sent in `I_HAVE_PIN`.
    pub host_name: String,
    pub poll_interval: Duration,
    /// Whether to also listen on `[::]`.
    pub enable_ipv6: bool,
}

impl AnnouncerConfig {
    pub fn new(host_name: impl Into<String>) -> Self {
        Self {
            port: PIN_EXCHANGE_PORT,
            host_name: host_name.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            enable_ipv6: true,
        }
    }
}

/// A running PIN announcer.  Stops (and joins its threads) on drop.
#[derive(Debug)]
pub struct PinAnnouncer {
    running: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    ipv4_addr: SocketAddr,
    ipv6_addr: Option<SocketAddr>,
}

impl PinAnnouncer {
    /// Binds the listeners and starts answering requests for `pin`.
    ///
    /// # Errors
    ///
    /// Returns [`AnnouncerError::BindFailed`] if the IPv4 socket cannot be
    /// bound.  An IPv6 bind failure is logged and tolerated.
    pub fn start(pin: PinToken, config: AnnouncerConfig) -> Result<Self, AnnouncerError> {
        let v4_bind = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
        let v4_socket = UdpSocket::bind(v4_bind).map_err(|source| AnnouncerError::BindFailed {
            addr: v4_bind,
            source,
        })?;
        v4_socket
            .set_read_timeout(Some(config.poll_interval))
            .map_err(AnnouncerError::Socket)?;
        let ipv4_addr = v4_socket.local_addr().map_err(AnnouncerError::Socket)?;

        // The IPv6 listener shares the (possibly ephemeral) IPv4 port.
        let v6_socket = if config.enable_ipv6 {
            match bind_ipv6(ipv4_addr.port(), config.poll_interval) {
                Ok(socket) => Some(socket),
                Err(e) => {
                    warn!("IPv6 PIN listener unavailable, continuing IPv4-only: {e}");
                    None
                }
            }
        } else {
            None
        };
        let ipv6_addr = v6_socket.as_ref().and_then(|s| s.local_addr().ok());

        let running = Arc::new(AtomicBool::new(true));
        let reply = Arc::new(PinMessage::IHavePin(config.host_name.clone()).encode());
        let mut workers = Vec::new();

        let sockets = std::iter::once(("v4", v4_socket))
            .chain(v6_socket.map(|socket| ("v6", socket)));
        for (family, socket) in sockets {
            let ctx = AnswerContext {
                pin: pin.clone(),
                reply: Arc::clone(&reply),
                running: Arc::clone(&running),
                family,
            };
            let spawned = std::thread::Builder::new()
                .name(format!("pin-announcer-{family}"))
                .spawn(move || answer_loop(socket, ctx));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    running.store(false, Ordering::SeqCst);
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(AnnouncerError::Spawn(e));
                }
            }
        }

        info!(
            "PIN announcer listening on UDP {ipv4_addr}{}",
            ipv6_addr.map(|a| format!(" and {a}")).unwrap_or_default()
        );
        Ok(Self {
            running,
            workers: Mutex::new(workers),
            ipv4_addr,
            ipv6_addr,
        })
    }

    /// Bound IPv4 address (useful when started on port 0).
    pub fn ipv4_addr(&self) -> SocketAddr {
        self.ipv4_addr
    }

    /// Bound IPv6 address, if the IPv6 listener is up.
    pub fn ipv6_addr(&self) -> Option<SocketAddr> {
        self.ipv6_addr
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stops answering and joins the listener threads.  Safe to call more
    /// than once.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handles = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        if handles.is_empty() {
            return;
        }
        for handle in handles {
            if handle.join().is_err() {
                error!("PIN announcer thread panicked");
            }
        }
        info!("PIN announcer stopped");
    }
}

impl Drop for PinAnnouncer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn bind_ipv6(port: u16, poll_interval: Duration) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_only_v6(true)?;
    socket.bind(&SockAddr::from(SocketAddr::from((Ipv6Addr::UNSPECIFIED, port))))?;
    let socket: UdpSocket = socket.into();
    socket.set_read_timeout(Some(poll_interval))?;
    Ok(socket)
}

struct AnswerContext {
    pin: PinToken,
    reply: Arc<Vec<u8>>,
    running: Arc<AtomicBool>,
    family: &'static str,
}

/// The receive loop executed on each listener thread.
fn answer_loop(socket: UdpSocket, ctx: AnswerContext) {
    let mut buf = [0u8; 512];

    while ctx.running.load(Ordering::SeqCst) {
        let (len, src) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) if is_timeout_error(&e) => continue,
            Err(e) => {
                debug!("PIN listener ({}) recv error: {e}", ctx.family);
                continue;
            }
        };

        if PinMessage::is_request_for(&buf[..len], &ctx.pin) {
            match socket.send_to(&ctx.reply, src) {
                Ok(_) => info!("answered PIN request from {src}"),
                Err(e) => warn!("failed to answer PIN request from {src}: {e}"),
            }
        } else {
            debug!("ignoring {len}-byte datagram from {src}");
        }
    }

    debug!("PIN listener ({}) exiting", ctx.family);
}

/// Returns `true` for OS timeout / would-block errors that should be retried.
fn is_timeout_error(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
