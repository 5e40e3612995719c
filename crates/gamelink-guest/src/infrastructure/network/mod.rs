//! Network infrastructure for the guest.
//!
//! # Sub-modules
//!
//! - **`interfaces`** – Default-route interface lookup, link-local scope
//!   resolution, the local IPv4 address, and scoped socket addresses.
//!
//! - **`neighbors`** – Reads (and optionally primes) the IPv6 neighbor
//!   table so the subnet probe can reach IPv6-only hosts.
//!
//! - **`subnet_probe`** – Bounded-concurrency TCP connect scan of the local
//!   /24, loopback, and IPv6 neighbors.
//!
//! - **`announcements`** – Browses multicast-DNS service announcements via
//!   `avahi-browse` and turns them into candidates.
//!
//! - **`pin_resolver`** – Sends `WHO_HAS_PIN` over IPv4 broadcast and IPv6
//!   all-nodes multicast and waits for `I_HAVE_PIN`.

pub mod announcements;
pub mod interfaces;
pub mod neighbors;
pub mod pin_resolver;
pub mod subnet_probe;
