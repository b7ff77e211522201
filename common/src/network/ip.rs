use std::net::Ipv4Addr;

/// `(network, prefix)` blocks that are never routable on the public internet.
const NON_PUBLIC_V4: &[(Ipv4Addr, u8)] = &[
    (Ipv4Addr::new(0, 0, 0, 0), 8),       // "this" network
    (Ipv4Addr::new(10, 0, 0, 0), 8),      // private
    (Ipv4Addr::new(100, 64, 0, 0), 10),   // carrier-grade NAT
    (Ipv4Addr::new(127, 0, 0, 0), 8),     // loopback
    (Ipv4Addr::new(169, 254, 0, 0), 16),  // link-local
    (Ipv4Addr::new(172, 16, 0, 0), 12),   // private
    (Ipv4Addr::new(192, 0, 0, 0), 24),    // IETF protocol assignments
    (Ipv4Addr::new(192, 0, 2, 0), 24),    // TEST-NET-1
    (Ipv4Addr::new(192, 88, 99, 0), 24),  // 6to4 relay anycast
    (Ipv4Addr::new(192, 168, 0, 0), 16),  // private
    (Ipv4Addr::new(198, 18, 0, 0), 15),   // benchmarking
    (Ipv4Addr::new(198, 51, 100, 0), 24), // TEST-NET-2
    (Ipv4Addr::new(203, 0, 113, 0), 24),  // TEST-NET-3
    (Ipv4Addr::new(224, 0, 0, 0), 4),     // multicast
    (Ipv4Addr::new(240, 0, 0, 0), 4),     // reserved + broadcast
];

/// True when `ip` is a publicly routable unicast address.
pub fn is_public_v4(ip: Ipv4Addr) -> bool {
    let addr: u32 = u32::from(ip);
    !NON_PUBLIC_V4.iter().any(|&(network, prefix)| {
        let mask: u32 = u32::MAX << (32 - u32::from(prefix));
        addr & mask == u32::from(network)
    })
}

/// Parses a bare dotted-quad IPv4 literal. Anything else (ports, CIDR
/// suffixes, hostnames) is rejected.
pub fn parse_ipv4_literal(s: &str) -> Option<Ipv4Addr> {
    s.parse::<Ipv4Addr>().ok()
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
    fn rejects_non_public_ranges() {
        for ip in [
            Ipv4Addr::new(0, 1, 2, 3),
            Ipv4Addr::new(10, 20, 30, 40),
            Ipv4Addr::new(100, 64, 0, 1),
            Ipv4Addr::new(127, 0, 0, 1),
            Ipv4Addr::new(169, 254, 169, 254),
            Ipv4Addr::new(172, 31, 255, 255),
            Ipv4Addr::new(192, 0, 2, 7),
            Ipv4Addr::new(192, 168, 1, 1),
            Ipv4Addr::new(198, 19, 0, 1),
            Ipv4Addr::new(224, 0, 0, 251),
            Ipv4Addr::new(239, 255, 255, 250),
            Ipv4Addr::new(240, 0, 0, 1),
            Ipv4Addr::BROADCAST,
        ] {
            assert!(!is_public_v4(ip), "{ip} should not be public");
        }
    }

    #[test]
    fn accepts_public_addresses() {
        for ip in [
            Ipv4Addr::new(1, 1, 1, 1),
            Ipv4Addr::new(52, 4, 10, 14),
            Ipv4Addr::new(172, 32, 0, 1),
            Ipv4Addr::new(223, 255, 255, 254),
        ] {
            assert!(is_public_v4(ip), "{ip} should be public");
        }
    }

    #[test]
    fn literal_parsing_is_strict() {
        assert_eq!(parse_ipv4_literal("52.4.10.14"), Some(Ipv4Addr::new(52, 4, 10, 14)));
        assert_eq!(parse_ipv4_literal("52.4.10.14:443"), None);
        assert_eq!(parse_ipv4_literal("52.4.10.14.sslip.io"), None);
        assert_eq!(parse_ipv4_literal("999.4.10.14"), None);
    }
}
