//! # Scan Target Model
//!
//! Defines the possible inputs for a bypass scan.
//!
//! A target can be:
//! * A single IPv4 address (`52.4.10.14`).
//! * A hostname (`origin.example.com`).
//! * An IPv4 Range (`192.168.1.1-100`, `10.0.0.1-10.0.1.20`).
//! * A CIDR block (`192.168.1.0/24`), expanded to its usable hosts.
//! * A comma separated mix of the above.

use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::network::range::{self, Ipv4Range};

const MAX_HOSTNAME_LEN: usize = 253;
/// Largest range accepted in one target, a /16.
pub const MAX_RANGE_HOSTS: usize = 1 << 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Host { target_addr: Ipv4Addr },
    Domain { name: String },
    Range { ipv4_range: Ipv4Range },
    Multi { targets: Vec<Target> },
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s: &str = s.trim();
        if s.is_empty() {
            return Err("empty target".to_string());
        }

        if s.contains(',') {
            return parse_commas(s);
        }

        if let Some(target) = parse_host(s) {
            return Ok(target);
        }

        if let Some(target) = parse_cidr_range(s)? {
            return Ok(target);
        }

        if let Some(target) = parse_ip_range(s)? {
            return Ok(target);
        }

        if let Some(target) = parse_domain(s) {
            return Ok(target);
        }

        Err(format!("invalid target: {s}"))
    }
}

impl Target {
    /// Flattens the target into the origin strings the scanner probes, in
    /// input order.
    pub fn to_origins(&self) -> Vec<String> {
        let mut origins: Vec<String> = Vec::new();
        self.collect_origins(&mut origins);
        origins
    }

    fn collect_origins(&self, origins: &mut Vec<String>) {
        match self {
            Target::Host { target_addr } => origins.push(target_addr.to_string()),
            Target::Domain { name } => origins.push(name.clone()),
            Target::Range { ipv4_range } => {
                origins.extend(ipv4_range.iter().map(|ip| ip.to_string()))
            }
            Target::Multi { targets } => {
                for target in targets {
                    target.collect_origins(origins);
                }
            }
        }
    }
}

/// Parses free text (e.g. the contents of a targets file). Tokens are split on
/// whitespace and commas; blank lines and `#` comments are skipped.
pub fn targets_from_text(text: &str) -> Result<Target, String> {
    let mut targets: Vec<Target> = Vec::new();
    for line in text.lines() {
        let line: &str = line.split('#').next().unwrap_or_default();
        for token in line.split(|c: char| c.is_whitespace() || c == ',') {
            if token.is_empty() {
                continue;
            }
            targets.push(Target::from_str(token)?);
        }
    }
    Ok(Target::Multi { targets })
}

/// Parses a comma-separated list of targets (e.g., "52.4.10.14, 10.0.0.1-50").
fn parse_commas(s: &str) -> Result<Target, String> {
    let mut targets: Vec<Target> = Vec::new();

    for part in s.split(',') {
        let part: &str = part.trim();
        if part.is_empty() {
            continue;
        }

        let target = Target::from_str(part)
            .map_err(|e| format!("Failed to parse target '{part}': {e}"))?;
        targets.push(target);
    }

    Ok(Target::Multi { targets })
}

fn parse_host(s: &str) -> Option<Target> {
    s.parse::<Ipv4Addr>()
        .ok()
        .map(|target_addr| Target::Host { target_addr })
}

/// Parses a range string like "1.1.1.1-2.2.2.2" or "1.1.1.1-50".
///
/// Strings whose left side is not an address (hostnames with dashes) are not
/// ranges and yield `Ok(None)`.
fn parse_ip_range(s: &str) -> Result<Option<Target>, String> {
    let Some((start_str, end_str)) = s.split_once('-') else {
        return Ok(None);
    };

    let Ok(start_addr) = start_str.parse::<Ipv4Addr>() else {
        return Ok(None);
    };

    let end_addr: Ipv4Addr = parse_range_end_addr(end_str, &start_addr, s)?;

    if u32::from(end_addr) < u32::from(start_addr) {
        return Err(format!("Range end is before its start: {s}"));
    }

    let ipv4_range = Ipv4Range::new(start_addr, end_addr);
    check_size(&ipv4_range, s)?;
    Ok(Some(Target::Range { ipv4_range }))
}

/// Helper to parse the end address of a range.
///
/// Handles abbreviated forms like "192.168.1.1-50" (implies 192.168.1.50)
/// and full forms like "192.168.1.1-192.168.1.255".
fn parse_range_end_addr(
    end_str: &str,
    start_addr: &Ipv4Addr,
    original_s: &str,
) -> Result<Ipv4Addr, String> {
    if let Ok(full_addr) = end_str.parse::<Ipv4Addr>() {
        return Ok(full_addr);
    }

    if end_str.is_empty() {
        return Err(format!("End range cannot be empty: {original_s}"));
    }

    let mut end_octets: [u8; 4] = start_addr.octets();
    let partial_octets: Vec<u8> = end_str
        .split('.')
        .map(|octet_str| octet_str.parse::<u8>())
        .collect::<Result<Vec<u8>, _>>()
        .map_err(|e| format!("Invalid end range '{end_str}': {e}"))?;

    if partial_octets.len() > 4 {
        return Err(format!("End range has too many octets: {end_str}"));
    }

    let start_index: usize = 4 - partial_octets.len();
    end_octets[start_index..].copy_from_slice(&partial_octets);

    Ok(Ipv4Addr::from(end_octets))
}

/// Parses CIDR notation like "192.168.1.0/24" into its usable hosts.
fn parse_cidr_range(s: &str) -> Result<Option<Target>, String> {
    let Some((ip_str, prefix_str)) = s.split_once('/') else {
        return Ok(None);
    };

    let ipv4_addr = ip_str
        .parse::<Ipv4Addr>()
        .map_err(|e| format!("Invalid IP in CIDR '{ip_str}': {e}"))?;

    let prefix = prefix_str
        .parse::<u8>()
        .map_err(|e| format!("Invalid prefix in CIDR '{prefix_str}': {e}"))?;

    let ipv4_range: Ipv4Range =
        range::usable_hosts(ipv4_addr, prefix).map_err(|e| e.to_string())?;
    check_size(&ipv4_range, s)?;

    Ok(Some(Target::Range { ipv4_range }))
}

fn check_size(ipv4_range: &Ipv4Range, s: &str) -> Result<(), String> {
    if ipv4_range.len() > MAX_RANGE_HOSTS {
        return Err(format!(
            "{s} covers {} addresses, split it into blocks of at most {MAX_RANGE_HOSTS}",
            ipv4_range.len()
        ));
    }
    Ok(())
}

fn parse_domain(s: &str) -> Option<Target> {
    is_hostname(s).then(|| Target::Domain {
        name: s.to_ascii_lowercase(),
    })
}

/// RFC 1123 hostname check: dot separated labels of letters, digits and
/// inner dashes. At least one label must contain a letter so bare numbers
/// are never treated as names.
pub fn is_hostname(s: &str) -> bool {
    if s.is_empty() || s.len() > MAX_HOSTNAME_LEN {
        return false;
    }

    let labels_ok: bool = s.trim_end_matches('.').split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });

    labels_ok && s.chars().any(|c| c.is_ascii_alphabetic())
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
