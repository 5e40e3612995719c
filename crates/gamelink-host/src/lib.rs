//! gamelink-host library entry point.
//!
//! The host side of the PIN exchange: show a six-digit PIN to the person at
//! the host, and answer `WHO_HAS_PIN <pin>` datagrams from guests with
//! `I_HAVE_PIN <display name>` so the guest learns the host's address.
//!
//! Re-exports all public modules so that integration tests in `tests/` and
//! the binary entry point in `main.rs` share the same module tree.

/// Application layer: PIN generation.
pub mod application;

/// Infrastructure layer: the UDP PIN announcer.
pub mod infrastructure;
