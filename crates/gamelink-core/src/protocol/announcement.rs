//! Service-announcement record parser.
//!
//! Streaming hosts announce themselves over DNS-SD.  The system service
//! browser prints one semicolon-delimited record per *resolved address*:
//!
//! ```text
//! =;eth0;IPv6;Living\032Room;_nvstream._tcp;local;living-room.local;fe80::1c;47989;"..."
//! │ │    │    │              │              │     │                 │         │
//! │ │    │    instance name  service type   domain hostname         address   port
//! │ │    protocol
//! │ announcing interface
//! event ('=' = resolved)
//! ```
//!
//! Records are grouped by instance name into one logical host, each address
//! is typed (IPv4 / IPv6 global / IPv6 link-local, the latter scoped with the
//! announcing interface), and the result is flattened back into one
//! [`HostCandidate`] per address so every usable path can be shown.
//!
//! A host that announced no IPv4 address gets one best-effort forward
//! lookup of its hostname through the injected [`HostResolver`].

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};

use thiserror::Error;
use tracing::debug;

use crate::domain::address::AddressKind;
use crate::domain::host::{HostAddress, HostCandidate};

const MIN_FIELDS: usize = 9;

/// Why a single record was skipped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnnouncementError {
    #[error("record is not a resolved entry (event {0:?})")]
    NotResolved(String),
    #[error("record has {found} fields, expected at least {MIN_FIELDS}")]
    MissingFields { found: usize },
    #[error("required field `{0}` is empty")]
    EmptyField(&'static str),
    #[error("invalid address {0:?}")]
    BadAddress(String),
    #[error("invalid port {0:?}")]
    BadPort(String),
}

/// Forward name resolution used to enrich IPv6-only hosts.
#[cfg_attr(test, mockall::automock)]
pub trait HostResolver {
    /// Resolves `hostname` to an IPv4 address, if it has one.
    fn resolve_ipv4(&self, hostname: &str) -> Option<Ipv4Addr>;
}

/// A resolver that never resolves anything.
pub struct NoResolver;

impl HostResolver for NoResolver {
    fn resolve_ipv4(&self, _hostname: &str) -> Option<Ipv4Addr> {
        None
    }
}

/// One parsed announcement line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnouncementRecord {
    pub instance: String,
    pub interface: String,
    pub hostname: String,
    pub address: IpAddr,
    pub port: u16,
}

/// A record that could not be parsed, kept for diagnostics.
#[derive(Debug, PartialEq, Eq)]
pub struct SkippedRecord {
    /// 1-based line number in the input.
    pub line: usize,
    pub reason: AnnouncementError,
}

/// All addresses announced under one instance name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnouncedHost {
    pub name: String,
    pub hostname: String,
    pub port: u16,
    pub addresses: Vec<HostAddress>,
}

/// Output of [`parse_announcements`].
#[derive(Debug, Default)]
pub struct ParseReport {
    pub candidates: Vec<HostCandidate>,
    pub skipped: Vec<SkippedRecord>,
}

/// Parses one record line.
///
/// # Errors
///
/// Returns an [`AnnouncementError`] describing the first problem found.
pub fn parse_record(line: &str) -> Result<AnnouncementRecord, AnnouncementError> {
    let fields: Vec<&str> = line.split(';').collect();
    if fields[0] != "=" {
        return Err(AnnouncementError::NotResolved(fields[0].to_string()));
    }
    if fields.len() < MIN_FIELDS {
        return Err(AnnouncementError::MissingFields {
            found: fields.len(),
        });
    }

    let interface = required(fields[1], "interface")?;
    let instance = unescape(required(fields[3], "name")?);
    let hostname = required(fields[6], "hostname")?;
    let address_text = required(fields[7], "address")?;
    let port_text = required(fields[8], "port")?;

    let address: IpAddr = address_text
        .parse()
        .map_err(|_| AnnouncementError::BadAddress(address_text.to_string()))?;
    let port: u16 = port_text
        .parse()
        .map_err(|_| AnnouncementError::BadPort(port_text.to_string()))?;

    Ok(AnnouncementRecord {
        instance,
        interface: interface.to_string(),
        hostname: hostname.trim_end_matches('.').to_string(),
        address,
        port,
    })
}

fn required<'a>(value: &'a str, name: &'static str) -> Result<&'a str, AnnouncementError> {
    let value = value.trim();
    if value.is_empty() {
        Err(AnnouncementError::EmptyField(name))
    } else {
        Ok(value)
    }
}

/// Decodes the browser's label escaping: `\DDD` is a decimal byte value and
/// `\X` is a literal `X`.
pub fn unescape(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 1 < bytes.len() {
            let digits = bytes.get(i + 1..i + 4);
            if let Some(d) = digits.filter(|d| d.iter().all(u8::is_ascii_digit)) {
                let value = d.iter().fold(0u16, |acc, b| acc * 10 + u16::from(b - b'0'));
                if let Ok(byte) = u8::try_from(value) {
                    out.push(byte);
                    i += 4;
                    continue;
                }
            }
            out.push(bytes[i + 1]);
            i += 2;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Groups records by instance name, preserving first-seen order and
/// dropping duplicate addresses.
pub fn group_records(records: Vec<AnnouncementRecord>) -> Vec<AnnouncedHost> {
    let mut hosts: Vec<AnnouncedHost> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        let address = HostAddress::from_ip(record.address, Some(&record.interface));
        let slot = *index.entry(record.instance.clone()).or_insert_with(|| {
            hosts.push(AnnouncedHost {
                name: record.instance.clone(),
                hostname: record.hostname.clone(),
                port: record.port,
                addresses: Vec::new(),
            });
            hosts.len() - 1
        });
        let host = &mut hosts[slot];
        if !host.addresses.contains(&address) {
            host.addresses.push(address);
        }
    }
    hosts
}

/// Appends one resolved, non-loopback IPv4 address to a host that has none.
pub fn enrich_with_ipv4(host: &mut AnnouncedHost, resolver: &dyn HostResolver) {
    if host.addresses.iter().any(|a| a.kind() == AddressKind::Ipv4) {
        return;
    }
    if host.hostname.is_empty() {
        return;
    }
    match resolver.resolve_ipv4(&host.hostname) {
        Some(v4) if !v4.is_loopback() => {
            debug!("resolved {} to {v4} for IPv6-only host", host.hostname);
            host.addresses.push(HostAddress::V4(v4));
        }
        Some(v4) => debug!("ignoring loopback {v4} for {}", host.hostname),
        None => debug!("no IPv4 address for {}", host.hostname),
    }
}

/// Flattens a host into one candidate per address.
///
/// The primary address (first IPv4, otherwise the first address) comes first
/// and carries the plain name.  Other IPv6 addresses are qualified with
/// `" (IPv6 Global)"` or `" (IPv6 Local)"`.
pub fn expand_candidates(host: &AnnouncedHost) -> Vec<HostCandidate> {
    let primary = host
        .addresses
        .iter()
        .position(|a| a.kind() == AddressKind::Ipv4)
        .unwrap_or(0);

    let ordered = host
        .addresses
        .get(primary)
        .into_iter()
        .chain(
            host.addresses
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != primary)
                .map(|(_, a)| a),
        );

    ordered
        .enumerate()
        .map(|(i, address)| {
            let name = match (i, address.kind()) {
                (0, _) | (_, AddressKind::Ipv4) => host.name.clone(),
                (_, AddressKind::Ipv6Global) => format!("{} (IPv6 Global)", host.name),
                (_, AddressKind::Ipv6LinkLocal) => format!("{} (IPv6 Local)", host.name),
            };
            HostCandidate::new(
                name,
                address.clone(),
                host.port,
                Some(host.hostname.clone()),
            )
        })
        .collect()
}

/// Parses browser output into host candidates.
///
/// Blank lines are ignored; every other malformed line is recorded in
/// [`ParseReport::skipped`] and never aborts the rest of the input.
pub fn parse_announcements(raw: &str, resolver: &dyn HostResolver) -> ParseReport {
    let mut records = Vec::new();
    let mut skipped = Vec::new();

    for (n, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_record(line) {
            Ok(record) => records.push(record),
            Err(reason) => skipped.push(SkippedRecord { line: n + 1, reason }),
        }
    }

    let candidates = group_records(records)
        .into_iter()
        .flat_map(|mut host| {
            enrich_with_ipv4(&mut host, resolver);
            expand_candidates(&host)
        })
        .collect();

    ParseReport {
        candidates,
        skipped,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const V4_LINE: &str =
        "=;eth0;IPv4;Living\\032Room;_nvstream._tcp;local;living-room.local;192.168.1.40;47989;\"\"";
    const LL_LINE: &str =
        "=;eth0;IPv6;Living\\032Room;_nvstream._tcp;local;living-room.local;fe80::1c;47989;\"\"";
    const GLOBAL_LINE: &str =
        "=;eth0;IPv6;Living\\032Room;_nvstream._tcp;local;living-room.local;2001:db8::40;47989;\"\"";

    #[test]
    fn test_parse_record_extracts_fields() {
        let record = parse_record(V4_LINE).unwrap();
        assert_eq!(record.instance, "Living Room");
        assert_eq!(record.interface, "eth0");
        assert_eq!(record.hostname, "living-room.local");
        assert_eq!(record.address, "192.168.1.40".parse::<IpAddr>().unwrap());
        assert_eq!(record.port, 47989);
    }

    #[test]
    fn test_parse_record_rejects_unresolved_and_short_lines() {
        assert_eq!(
            parse_record("+;eth0;IPv4;Living Room;_nvstream._tcp;local"),
            Err(AnnouncementError::NotResolved("+".into()))
        );
        assert_eq!(
            parse_record("=;eth0;IPv4;x"),
            Err(AnnouncementError::MissingFields { found: 4 })
        );
    }

    #[test]
    fn test_parse_record_rejects_bad_values() {
        let bad_addr = V4_LINE.replace("192.168.1.40", "192.168.1");
        assert!(matches!(
            parse_record(&bad_addr),
            Err(AnnouncementError::BadAddress(_))
        ));
        let bad_port = V4_LINE.replace("47989", "99999");
        assert!(matches!(
            parse_record(&bad_port),
            Err(AnnouncementError::BadPort(_))
        ));
        let no_host = V4_LINE.replace("living-room.local", "");
        assert_eq!(
            parse_record(&no_host),
            Err(AnnouncementError::EmptyField("hostname"))
        );
    }

    #[test]
    fn test_unescape_decodes_decimal_and_literal_escapes() {
        assert_eq!(unescape("My\\032PC"), "My PC");
        assert_eq!(unescape("a\\.b\\\\c"), "a.b\\c");
        assert_eq!(unescape("trailing\\"), "trailing\\");
    }

    #[test]
    fn test_group_scopes_link_local_with_announcing_interface() {
        let hosts = group_records(vec![parse_record(LL_LINE).unwrap()]);
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].addresses[0].to_string(), "fe80::1c%eth0");
    }

    #[test]
    fn test_group_merges_same_instance_and_dedups() {
        // Arrange
        let records = [V4_LINE, LL_LINE, V4_LINE, GLOBAL_LINE]
            .iter()
            .map(|l| parse_record(l).unwrap())
            .collect();

        // Act
        let hosts = group_records(records);

        // Assert
        assert_eq!(hosts.len(), 1, "one instance name means one logical host");
        assert_eq!(hosts[0].addresses.len(), 3);
    }

    #[test]
    fn test_parse_emits_one_candidate_per_address_with_qualifiers() {
        // Arrange
        let raw = [LL_LINE, GLOBAL_LINE, V4_LINE].join("\n");
        let mut resolver = MockHostResolver::new();
        resolver.expect_resolve_ipv4().never();

        // Act
        let report = parse_announcements(&raw, &resolver);

        // Assert
        let names: Vec<&str> = report.candidates.iter().map(|c| c.display_name()).collect();
        assert_eq!(
            names,
            vec![
                "Living Room",
                "Living Room (IPv6 Local)",
                "Living Room (IPv6 Global)"
            ]
        );
        assert_eq!(report.candidates[0].address().kind(), AddressKind::Ipv4);
    }

    #[test]
    fn test_parse_enriches_ipv6_only_host_once() {
        // Arrange
        let raw = [LL_LINE, GLOBAL_LINE].join("\n");
        let mut resolver = MockHostResolver::new();
        resolver
            .expect_resolve_ipv4()
            .withf(|h| h == "living-room.local")
            .times(1)
            .return_const(Some(Ipv4Addr::new(192, 168, 1, 40)));

        // Act
        let report = parse_announcements(&raw, &resolver);

        // Assert
        let v4: Vec<_> = report
            .candidates
            .iter()
            .filter(|c| c.address().kind() == AddressKind::Ipv4)
            .collect();
        assert_eq!(v4.len(), 1);
        assert_eq!(report.candidates[0].display_name(), "Living Room");
        assert_eq!(report.candidates.len(), 3);
    }

    #[test]
    fn test_parse_ignores_loopback_resolution() {
        let mut resolver = MockHostResolver::new();
        resolver
            .expect_resolve_ipv4()
            .times(1)
            .return_const(Some(Ipv4Addr::LOCALHOST));

        let report = parse_announcements(GLOBAL_LINE, &resolver);

        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.candidates[0].address().kind(), AddressKind::Ipv6Global);
        // Sole address is primary and keeps the plain name.
        assert_eq!(report.candidates[0].display_name(), "Living Room");
    }

    #[test]
    fn test_parse_skips_malformed_lines_without_aborting() {
        // Arrange
        let raw = format!("garbage\n\n{V4_LINE}\n=;eth0;IPv4;short\n");

        // Act
        let report = parse_announcements(&raw, &NoResolver);

        // Assert
        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(report.skipped[0].line, 1);
        assert_eq!(report.skipped[1].line, 4);
    }

    #[test]
    fn test_parse_keeps_hosts_separate_by_instance() {
        let other = V4_LINE
            .replace("Living\\032Room", "Office")
            .replace("192.168.1.40", "192.168.1.41");
        let raw = format!("{V4_LINE}\n{other}");

        let report = parse_announcements(&raw, &NoResolver);

        assert_eq!(report.candidates.len(), 2);
        assert_eq!(report.candidates[1].display_name(), "Office");
    }
}
