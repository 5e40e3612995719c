//! Local network interface lookups.
//!
//! # Link-local scope (for beginners)
//!
//! Every IPv6-capable interface has an `fe80::/10` address, and the same
//! `fe80::` address can exist on several links at once.  Such an address is
//! only usable together with a *scope* naming the link, written
//! `fe80::1%eth0`.  When a user types a bare `fe80::1`, the guest fills in
//! the scope with the interface that carries the default route, or failing
//! that, the first interface that is up and not loopback.
//!
//! Route tables are read from `/proc/net/ipv6_route` and `/proc/net/route`
//! on Linux and from `route -n get default` on macOS.  Other platforms fall
//! back to interface enumeration only.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV6};

use gamelink_core::{normalize_with, AddressError, HostAddress};
use tracing::debug;

/// Parses the interface of the IPv4 default route from `/proc/net/route`.
///
/// A default route has destination `00000000` and mask `00000000`.
pub fn parse_ipv4_default_route(table: &str) -> Option<String> {
    table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() >= 8 && fields[1] == "00000000" && fields[7] == "00000000" {
            Some(fields[0].to_string())
        } else {
            None
        }
    })
}

/// Parses the interface of the IPv6 default route from `/proc/net/ipv6_route`.
///
/// The file has no header.  Columns are destination, prefix length, source,
/// source prefix length, next hop, metric, refcount, use, flags, interface.
/// The kernel's catch-all "unreachable" default on `lo` is ignored.
pub fn parse_ipv6_default_route(table: &str) -> Option<String> {
    table.lines().find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 {
            return None;
        }
        let is_default = fields[0].chars().all(|c| c == '0') && fields[1] == "00";
        let iface = fields[9];
        if is_default && iface != "lo" {
            Some(iface.to_string())
        } else {
            None
        }
    })
}

/// Parses the `interface:` line of macOS `route -n get default`.
pub fn parse_route_get_interface(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        line.trim()
            .strip_prefix("interface:")
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
    })
}

/// Name of the interface carrying the default route, if any.
pub fn default_route_interface() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        let v6 = std::fs::read_to_string("/proc/net/ipv6_route")
            .ok()
            .and_then(|t| parse_ipv6_default_route(&t));
        v6.or_else(|| {
            std::fs::read_to_string("/proc/net/route")
                .ok()
                .and_then(|t| parse_ipv4_default_route(&t))
        })
    }

    #[cfg(target_os = "macos")]
    {
        let output = std::process::Command::new("route")
            .args(["-n", "get", "default"])
            .output()
            .ok()?;
        parse_route_get_interface(&String::from_utf8_lossy(&output.stdout))
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

#[cfg(target_os = "linux")]
fn is_up(name: &str) -> bool {
    const IFF_UP: u32 = 0x1;
    std::fs::read_to_string(format!("/sys/class/net/{name}/flags"))
        .ok()
        .and_then(|raw| u32::from_str_radix(raw.trim().trim_start_matches("0x"), 16).ok())
        .map_or(true, |flags| flags & IFF_UP != 0)
}

#[cfg(not(target_os = "linux"))]
fn is_up(_name: &str) -> bool {
    true
}

/// First interface that is up and not loopback.
pub fn first_up_interface() -> Option<String> {
    let interfaces = if_addrs::get_if_addrs().ok()?;
    interfaces
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .map(|iface| iface.name)
        .find(|name| is_up(name))
}

/// Scope to attach to an unscoped link-local address.
pub fn link_local_scope() -> Option<String> {
    let scope = default_route_interface().or_else(first_up_interface);
    debug!(?scope, "Resolved link-local scope");
    scope
}

/// Parses and normalizes a user-supplied host address.
///
/// Unscoped link-local IPv6 addresses get [`link_local_scope`] attached.
pub fn normalize(raw: &str) -> Result<HostAddress, AddressError> {
    normalize_with(raw, link_local_scope)
}

/// First non-loopback IPv4 address of this machine.
pub fn local_ipv4() -> Option<Ipv4Addr> {
    let interfaces = if_addrs::get_if_addrs().ok()?;
    interfaces.into_iter().find_map(|iface| match iface.ip() {
        IpAddr::V4(v4) if !v4.is_loopback() => Some(v4),
        _ => None,
    })
}

/// Kernel interface index for a scope string (name or number).
pub fn scope_index(scope: &str) -> Option<u32> {
    if let Ok(index) = scope.parse::<u32>() {
        return Some(index);
    }
    if_addrs::get_if_addrs()
        .ok()?
        .into_iter()
        .find(|iface| iface.name == scope)
        .and_then(|iface| iface.index)
}

/// Interface name for a kernel interface index.
pub fn interface_name(index: u32) -> Option<String> {
    if_addrs::get_if_addrs()
        .ok()?
        .into_iter()
        .find(|iface| iface.index == Some(index))
        .map(|iface| iface.name)
}

/// Socket address for connecting to `address`, with the link-local scope
/// translated to an interface index.
pub fn socket_addr(address: &HostAddress, port: u16) -> SocketAddr {
    match address {
        HostAddress::V4(v4) => SocketAddr::from((*v4, port)),
        HostAddress::V6Global(v6) => SocketAddr::from((*v6, port)),
        HostAddress::V6LinkLocal { addr, scope } => {
            let scope_id = scope.as_deref().and_then(scope_index).unwrap_or(0);
            SocketAddr::V6(SocketAddrV6::new(*addr, port, 0, scope_id))
        }
    }
}

/// Converts a datagram source address back into a [`HostAddress`],
/// naming the interface for link-local sources.
pub fn host_from_source(source: SocketAddr) -> HostAddress {
    match source {
        SocketAddr::V4(v4) => HostAddress::V4(*v4.ip()),
        SocketAddr::V6(v6) => {
            let scope = match v6.scope_id() {
                0 => None,
                id => Some(interface_name(id).unwrap_or_else(|| id.to_string())),
            };
            match v6.ip().to_ipv4_mapped() {
                Some(v4) => HostAddress::V4(v4),
                None => HostAddress::from_ip(IpAddr::V6(*v6.ip()), scope.as_deref()),
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
