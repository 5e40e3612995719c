//! gamelink-guest library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does the guest do? (for beginners)
//!
//! The *guest* is the machine that wants to watch and play a stream coming
//! from a *host*.  Before the external streaming client can do that, three
//! things must happen:
//!
//! 1. **Find the host.**  Listen to service announcements; if nobody
//!    announces, probe the local /24 and the IPv6 neighbor table for the
//!    host's control port.  Alternatively, ask the LAN who holds a six-digit
//!    PIN (`WHO_HAS_PIN`).
//! 2. **Pair with it.**  Run the client's `pair` command, spot the PIN it
//!    prints, and hand that PIN to whoever has to type it on the host.
//! 3. **Connect.**  Check that the host now accepts us (its app list is
//!    readable) and launch the stream.
//!
//! The `application` layer sequences these steps; the `infrastructure`
//! layer owns every socket and subprocess.

/// Application layer: discovery and connection use cases.
pub mod application;

/// Infrastructure layer: sockets, subprocesses, OS lookups, config.
pub mod infrastructure;
