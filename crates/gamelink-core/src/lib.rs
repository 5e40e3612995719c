//! # gamelink-core
//!
//! Shared library for GameLink containing the domain types, address
//! classification rules, and the plain-text wire formats spoken between a
//! guest and a game-streaming host on the same LAN.
//!
//! This crate is used by both the guest and host applications.
//! It has zero dependencies on OS APIs, sockets, or subprocesses.
//!
//! # Architecture overview (for beginners)
//!
//! GameLink lets a *guest* machine find a game-streaming *host* on the local
//! network and pair with it without anybody copying certificates around.
//! The heavy lifting (video, audio, encryption) is done by an external
//! streaming client; GameLink only finds the host and drives that client.
//!
//! This crate (`gamelink-core`) is the shared foundation.  It defines:
//!
//! - **`domain`** – What a discovered host looks like (`HostCandidate`),
//!   how its addresses are typed (IPv4 / IPv6 global / IPv6 link-local), and
//!   the parameters a stream is launched with.
//!
//! - **`protocol`** – The text formats that cross process or network
//!   boundaries: service-announcement records, the `WHO_HAS_PIN` /
//!   `I_HAVE_PIN` datagrams, and the pairing transcript printed by the
//!   streaming client.

pub mod domain;
pub mod protocol;

pub use domain::address::{classify, normalize_with, parse_address, AddressError, AddressKind};
pub use domain::host::{HostAddress, HostCandidate};
pub use domain::stream::{DisplayMode, StreamParams, VideoDecoder};
pub use protocol::announcement::{parse_announcements, HostResolver, ParseReport};
pub use protocol::pin::{PinError, PinMessage, PinToken};

/// TCP port of the streaming host's control (HTTP) service.
pub const HOST_CONTROL_PORT: u16 = 47989;

/// UDP port the PIN-exchange protocol listens and broadcasts on.
pub const PIN_EXCHANGE_PORT: u16 = 48010;
