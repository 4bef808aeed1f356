// IPv4 network targets (CIDR blocks and address ranges)

use std::fmt;
use std::net::Ipv4Addr;

/// Canonical IPv4 CIDR block (host bits cleared)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    /// Returns None when prefix > 32. Host bits of `addr` are cleared.
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Option<Self> {
        if prefix > 32 {
            return None;
        }
        let network = Ipv4Addr::from(u32::from(addr) & mask(prefix));
        Some(Self { network, prefix })
    }

    /// Parse `a.b.c.d/n` or a bare address (treated as /32)
    pub fn parse(s: &str) -> Option<Self> {
        match s.split_once('/') {
            Some((addr, prefix)) => {
                let addr = addr.parse::<Ipv4Addr>().ok()?;
                if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                Self::new(addr, prefix.parse().ok()?)
            }
            None => Self::new(s.parse().ok()?, 32),
        }
    }

    /// Smallest block containing every address in `start..=end`
    pub fn covering(start: Ipv4Addr, end: Ipv4Addr) -> Option<Self> {
        if start > end {
            return None;
        }
        (0..=32u8)
            .rev()
            .filter_map(|prefix| Self::new(start, prefix))
            .find(|block| block.first() <= start && block.last() >= end)
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn first(&self) -> Ipv4Addr {
        self.network
    }

    pub fn last(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network) | !mask(self.prefix))
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & mask(self.prefix) == u32::from(self.network)
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

fn mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

/// Parse `a.b.c.d-e.f.g.h`; None if malformed or reversed
pub fn parse_ipv4_range(s: &str) -> Option<(Ipv4Addr, Ipv4Addr)> {
    let (start, end) = s.split_once('-')?;
    let start = start.trim().parse::<Ipv4Addr>().ok()?;
    let end = end.trim().parse::<Ipv4Addr>().ok()?;
    (start <= end).then_some((start, end))
}

/// Resolve any accepted network notation to a CIDR block.
///
/// Ranges become the smallest covering block, so the block may be wider
/// than the range itself.
pub fn parse_ipv4_network(s: &str) -> Option<Ipv4Cidr> {
    let s = s.trim();
    if s.contains('-') {
        let (start, end) = parse_ipv4_range(s)?;
        return Ipv4Cidr::covering(start, end);
    }
    Ipv4Cidr::parse(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cidr_is_canonicalized() {
        let cidr = Ipv4Cidr::parse("192.168.1.77/24").unwrap();
        assert_eq!(cidr.to_string(), "192.168.1.0/24");
        assert_eq!(cidr.last(), Ipv4Addr::new(192, 168, 1, 255));
    }

    #[test]
    fn test_bare_address_is_host_block() {
        let cidr = Ipv4Cidr::parse("10.1.2.3").unwrap();
        assert_eq!(cidr.to_string(), "10.1.2.3/32");
    }

    #[test]
    fn test_rejects_malformed_networks() {
        assert!(parse_ipv4_network("not-a-cidr").is_none());
        assert!(parse_ipv4_network("10.0.0.0/33").is_none());
        assert!(parse_ipv4_network("10.0.0.0/").is_none());
        assert!(parse_ipv4_network("10.0.0.0/+8").is_none());
        assert!(parse_ipv4_network("256.0.0.1").is_none());
        assert!(parse_ipv4_network("10.0.0.9-10.0.0.1").is_none());
    }

    #[test]
    fn test_range_becomes_covering_block() {
        let cidr = parse_ipv4_network("10.0.0.1-10.0.0.50").unwrap();
        assert_eq!(cidr.to_string(), "10.0.0.0/26");
        assert!(cidr.contains(Ipv4Addr::new(10, 0, 0, 50)));

        let wide = parse_ipv4_network("10.0.0.255-10.0.1.0").unwrap();
        assert_eq!(wide.to_string(), "10.0.0.0/23");
    }

    #[test]
    fn test_zero_prefix_covers_everything() {
        let all = Ipv4Cidr::parse("0.0.0.0/0").unwrap();
        assert_eq!(all.last(), Ipv4Addr::new(255, 255, 255, 255));
        assert!(all.contains(Ipv4Addr::new(8, 8, 8, 8)));
    }
}
