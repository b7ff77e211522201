//! # IPv4 Range Model
//!
//! Continuous, inclusive ranges of IPv4 addresses such as `192.168.1.1-100` or
//! the usable hosts of a CIDR block.

use std::net::Ipv4Addr;

use pnet::ipnetwork::Ipv4Network;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Range {
    pub start_addr: Ipv4Addr,
    pub end_addr: Ipv4Addr,
}

impl Ipv4Range {
    pub fn new(start_addr: Ipv4Addr, end_addr: Ipv4Addr) -> Self {
        Self {
            start_addr,
            end_addr,
        }
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = Ipv4Addr> + Clone + use<> {
        let start: u32 = u32::from(self.start_addr);
        let end: u32 = u32::from(self.end_addr);
        (start..=end).map(Ipv4Addr::from)
    }

    pub fn len(&self) -> usize {
        let start: u32 = u32::from(self.start_addr);
        let end: u32 = u32::from(self.end_addr);
        if end < start {
            0
        } else {
            (end - start) as usize + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Range covering the whole block, network and broadcast included.
pub fn cidr_range(ip: Ipv4Addr, prefix: u8) -> anyhow::Result<Ipv4Range> {
    let network = Ipv4Network::new(ip, prefix)?;
    Ok(Ipv4Range::new(network.network(), network.broadcast()))
}

/// Range of assignable hosts in a block: network and broadcast addresses are
/// dropped. `/31` point-to-point links and `/32` single hosts keep every
/// address since neither has a network or broadcast address to exclude.
pub fn usable_hosts(ip: Ipv4Addr, prefix: u8) -> anyhow::Result<Ipv4Range> {
    let full: Ipv4Range = cidr_range(ip, prefix)?;
    if prefix >= 31 {
        return Ok(full);
    }

    let start: u32 = u32::from(full.start_addr).saturating_add(1);
    let end: u32 = u32::from(full.end_addr).saturating_sub(1);
    Ok(Ipv4Range::new(Ipv4Addr::from(start), Ipv4Addr::from(end)))
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
    fn slash_30_yields_two_usable_hosts() {
        let range = usable_hosts(Ipv4Addr::new(192, 168, 1, 0), 30).unwrap();
        let hosts: Vec<Ipv4Addr> = range.iter().collect();
        assert_eq!(
            hosts,
            vec![Ipv4Addr::new(192, 168, 1, 1), Ipv4Addr::new(192, 168, 1, 2)]
        );
    }

    #[test]
    fn host_bits_in_cidr_are_ignored() {
        let range = usable_hosts(Ipv4Addr::new(10, 0, 0, 77), 24).unwrap();
        assert_eq!(range.start_addr, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(range.end_addr, Ipv4Addr::new(10, 0, 0, 254));
        assert_eq!(range.len(), 254);
    }

    #[test]
    fn small_blocks_keep_every_address() {
        let single = usable_hosts(Ipv4Addr::new(52, 4, 10, 14), 32).unwrap();
        assert_eq!(single.iter().collect::<Vec<_>>(), vec![Ipv4Addr::new(52, 4, 10, 14)]);

        let pair = usable_hosts(Ipv4Addr::new(52, 4, 10, 14), 31).unwrap();
        assert_eq!(pair.len(), 2);
    }

    #[test]
    fn invalid_prefix_is_an_error() {
        assert!(cidr_range(Ipv4Addr::new(10, 0, 0, 0), 33).is_err());
    }

    #[test]
    fn inverted_range_is_empty() {
        let range = Ipv4Range::new(Ipv4Addr::new(10, 0, 0, 5), Ipv4Addr::new(10, 0, 0, 1));
        assert!(range.is_empty());
        assert_eq!(range.iter().count(), 0);
    }
}
