//! Address parsing and reachability classification.
//!
//! Raw addresses reach GameLink from several places: user input, service
//! announcements, neighbor tables, and UDP packet sources.  This module turns
//! them into a typed [`HostAddress`].
//!
//! # IPv6 link-local scopes (for beginners)
//!
//! Every IPv6 interface has a *link-local* address in `fe80::/10`.  Because
//! each network card has one, the same `fe80::…` address can exist on two
//! different links at once, so the OS needs to be told which interface to
//! use: `fe80::1%eth0`.  The `%eth0` part is the *scope* (or *zone*).
//!
//! A link-local address without a scope usually cannot be connected to.
//! [`normalize_with`] fills a missing scope from a caller-supplied lookup
//! (the guest infrastructure asks the OS for the default-route interface).
//! The lookup is injected so this module stays free of OS calls.

use std::net::{IpAddr, Ipv6Addr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::host::HostAddress;

/// First 16 bits of an IPv6 link-local address.
pub const LINK_LOCAL_PREFIX: u16 = 0xfe80;

/// Errors produced while parsing a raw address string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,
    #[error("not a valid IP address: {0:?}")]
    Invalid(String),
}

/// Reachability scope of an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressKind {
    Ipv4,
    Ipv6Global,
    Ipv6LinkLocal,
}

/// Returns `true` when the first 16 bits of `ip` equal `fe80`.
pub fn is_link_local_v6(ip: &Ipv6Addr) -> bool {
    ip.segments()[0] == LINK_LOCAL_PREFIX
}

/// Classifies a bare IP address.
pub fn classify(ip: &IpAddr) -> AddressKind {
    match ip {
        IpAddr::V4(_) => AddressKind::Ipv4,
        IpAddr::V6(v6) if is_link_local_v6(v6) => AddressKind::Ipv6LinkLocal,
        IpAddr::V6(_) => AddressKind::Ipv6Global,
    }
}

/// Removes one pair of surrounding brackets, as in `[fe80::1%eth0]`.
pub fn strip_brackets(raw: &str) -> &str {
    raw.strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(raw)
}

/// Parses a literal address, honouring an explicit `%scope` suffix.
///
/// # Errors
///
/// Returns [`AddressError::Empty`] for blank input and
/// [`AddressError::Invalid`] when the text is not an IP literal.
pub fn parse_address(raw: &str) -> Result<HostAddress, AddressError> {
    let trimmed = strip_brackets(raw.trim());
    if trimmed.is_empty() {
        return Err(AddressError::Empty);
    }

    let (ip_text, scope) = match trimmed.split_once('%') {
        Some((ip, scope)) => (ip, Some(scope)),
        None => (trimmed, None),
    };

    let ip: IpAddr = ip_text
        .parse()
        .map_err(|_| AddressError::Invalid(raw.to_string()))?;

    Ok(HostAddress::from_ip(ip, scope))
}

/// Parses `raw` and, for an unscoped link-local address, asks `scope_lookup`
/// for an interface to attach.
///
/// The lookup is only invoked when a scope is actually missing.  If it
/// returns `None` or an empty string the address is returned unscoped; an
/// empty scope is never attached.
///
/// # Errors
///
/// Same as [`parse_address`].
pub fn normalize_with<F>(raw: &str, scope_lookup: F) -> Result<HostAddress, AddressError>
where
    F: FnOnce() -> Option<String>,
{
    match parse_address(raw)? {
        HostAddress::V6LinkLocal { addr, scope: None } => {
            let scope = scope_lookup().filter(|s| !s.is_empty());
            Ok(HostAddress::V6LinkLocal { addr, scope })
        }
        other => Ok(other),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
