//! Infrastructure layer for the guest.
//!
//! Contains OS-facing adapters: UDP and TCP sockets, interface and
//! routing-table lookups, the external streaming client's subprocesses,
//! and the configuration file.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `gamelink_core`, but MUST NOT be imported by the `application` layer.

pub mod client;
pub mod network;
pub mod process;
pub mod storage;
