//! IP literals cannot be used as a CDN origin, so they are turned into a name
//! served by a wildcard DNS zone that answers with the embedded address:
//! `52.4.10.14` becomes `52-4-10-14.sslip.io`.

use std::net::Ipv4Addr;

use cdn_proxy_common::network::ip::parse_ipv4_literal;
use cdn_proxy_common::network::target::is_hostname;

use crate::rewrite::RewriteError;

pub const WILDCARD_DNS_ZONE: &str = "sslip.io";

pub fn hostname_for_ip(ip: Ipv4Addr) -> String {
    let [a, b, c, d] = ip.octets();
    format!("{a}-{b}-{c}-{d}.{WILDCARD_DNS_ZONE}")
}

/// Turns a requested origin into the domain name written into the request.
pub fn resolve_origin(raw: &str) -> Result<String, RewriteError> {
    let raw: &str = raw.trim();

    if let Some(ip) = parse_ipv4_literal(raw) {
        return Ok(hostname_for_ip(ip));
    }

    if is_hostname(raw) {
        return Ok(raw.to_ascii_lowercase());
    }

    Err(RewriteError::InvalidOrigin(raw.to_string()))
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ip_literals_map_to_wildcard_names() {
        assert_eq!(
            hostname_for_ip(Ipv4Addr::new(52, 4, 10, 14)),
            "52-4-10-14.sslip.io"
        );
        assert_eq!(resolve_origin(" 52.4.10.14 ").unwrap(), "52-4-10-14.sslip.io");
    }

    #[test]
    fn hostnames_pass_through_lowercased() {
        assert_eq!(resolve_origin("Origin.Example.com").unwrap(), "origin.example.com");
    }

    #[test]
    fn garbage_is_rejected() {
        for bad in ["", "example.com:8443", "http://example.com", "a b.com", "x/y"] {
            assert!(
                matches!(resolve_origin(bad), Err(RewriteError::InvalidOrigin(_))),
                "{bad:?} should be rejected"
            );
        }
        let long: String = format!("{}.com", "a.".repeat(130));
        assert!(resolve_origin(&long).is_err());
    }
}
