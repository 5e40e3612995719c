//! Application layer use cases for the guest.
//!
//! Use cases in this layer orchestrate domain types and depend only on
//! traits, never on concrete sockets or processes:
//!
//! - **`stream_client`** – The port to the external streaming client
//!   (capability probe, pairing, stream launch) and its shared result types.
//!
//! - **`connect`** – The connection state machine: probe, pair if needed,
//!   retry, launch, with cancellation and a single in-flight sequence.
//!
//! - **`discover`** – Runs service-announcement browsing and the subnet
//!   probe side by side and returns whichever yields hosts.

pub mod connect;
pub mod discover;
pub mod stream_client;
