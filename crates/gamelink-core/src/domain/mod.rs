//! Domain entities for GameLink.
//!
//! This module contains pure logic with no infrastructure dependencies: it
//! can be compiled and tested on any platform without a network.
//!
//! - [`address`] – parsing and classifying literal addresses, including
//!   IPv6 link-local scope handling.
//! - [`host`] – the `HostCandidate` produced by every discovery path.
//! - [`stream`] – caller-supplied stream parameters and their CLI mapping.

pub mod address;
pub mod host;
pub mod stream;
