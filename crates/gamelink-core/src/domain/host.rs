//! Typed host addresses and the `HostCandidate` discovery result.
//!
//! Every discovery path (service announcements, the subnet probe, the PIN
//! exchange) produces the same [`HostCandidate`] type so the caller can show
//! them in one list.  A single logical host may appear several times, once
//! per usable address; merging those rows is left to the UI.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

use super::address::{classify, AddressKind};

/// A literal host address tagged with its reachability scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HostAddress {
    /// Any IPv4 address.
    V4(Ipv4Addr),
    /// An IPv6 address outside `fe80::/16`.
    V6Global(Ipv6Addr),
    /// An IPv6 link-local address.  `scope` names the interface (or holds
    /// its numeric index) and is `None` only when no interface could be
    /// determined; such an address is unlikely to be connectable.
    V6LinkLocal {
        addr: Ipv6Addr,
        scope: Option<String>,
    },
}

impl HostAddress {
    /// Builds a `HostAddress` from a bare IP, attaching `scope` only when the
    /// address turns out to be link-local.  Empty scopes are dropped.
    pub fn from_ip(ip: IpAddr, scope: Option<&str>) -> Self {
        match ip {
            IpAddr::V4(v4) => HostAddress::V4(v4),
            IpAddr::V6(v6) => match classify(&ip) {
                AddressKind::Ipv6LinkLocal => HostAddress::V6LinkLocal {
                    addr: v6,
                    scope: scope.filter(|s| !s.is_empty()).map(str::to_string),
                },
                _ => HostAddress::V6Global(v6),
            },
        }
    }

    /// The address family and scope of this address.
    pub fn kind(&self) -> AddressKind {
        match self {
            HostAddress::V4(_) => AddressKind::Ipv4,
            HostAddress::V6Global(_) => AddressKind::Ipv6Global,
            HostAddress::V6LinkLocal { .. } => AddressKind::Ipv6LinkLocal,
        }
    }

    /// The bare IP without any scope.
    pub fn ip(&self) -> IpAddr {
        match self {
            HostAddress::V4(v4) => IpAddr::V4(*v4),
            HostAddress::V6Global(v6) => IpAddr::V6(*v6),
            HostAddress::V6LinkLocal { addr, .. } => IpAddr::V6(*addr),
        }
    }

    /// The interface scope of a link-local address.
    pub fn scope(&self) -> Option<&str> {
        match self {
            HostAddress::V6LinkLocal { scope, .. } => scope.as_deref(),
            _ => None,
        }
    }

    /// Returns `true` for loopback addresses of either family.
    pub fn is_loopback(&self) -> bool {
        self.ip().is_loopback()
    }

    /// Formats the address for use as the host part of a URI or CLI target:
    /// IPv6 literals are wrapped in brackets, IPv4 is left bare.
    pub fn to_uri_host(&self) -> String {
        match self {
            HostAddress::V4(_) => self.to_string(),
            _ => format!("[{self}]"),
        }
    }
}

impl fmt::Display for HostAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostAddress::V4(v4) => write!(f, "{v4}"),
            HostAddress::V6Global(v6) => write!(f, "{v6}"),
            HostAddress::V6LinkLocal {
                addr,
                scope: Some(scope),
            } => write!(f, "{addr}%{scope}"),
            HostAddress::V6LinkLocal { addr, scope: None } => write!(f, "{addr}"),
        }
    }
}

/// One discovered path to a streaming host.
///
/// Immutable once constructed; all fields are read through accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostCandidate {
    display_name: String,
    address: HostAddress,
    port: u16,
    source_hostname: Option<String>,
}

impl HostCandidate {
    pub fn new(
        display_name: impl Into<String>,
        address: HostAddress,
        port: u16,
        source_hostname: Option<String>,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            address,
            port,
            source_hostname,
        }
    }

    /// Human-readable name, possibly carrying an address qualifier such as
    /// `" (IPv6 Local)"`.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn address(&self) -> &HostAddress {
        &self.address
    }

    /// The host's control port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The hostname the address was announced or resolved under, if any.
    pub fn source_hostname(&self) -> Option<&str> {
        self.source_hostname.as_deref()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
