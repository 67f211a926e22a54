//! Loopback address classification.
//!
//! The kernel can present the local host under several representations:
//! `127.0.0.0/8` for IPv4 sockets, `::1` for IPv6 sockets, and the IPv4-mapped
//! form `::ffff:127.0.0.0/104` for dual-stack IPv6 sockets (`IPV6_V6ONLY=0`)
//! talking over the IPv4 loopback interface. A rule matching one of these does
//! not match the others, so every loopback intent is expanded into the full
//! set of literal patterns here.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::error::{Result, SandboxError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    fn max_prefix_len(self) -> u8 {
        match self {
            AddressFamily::Ipv4 => 32,
            AddressFamily::Ipv6 => 128,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::Ipv4 => f.write_str("ipv4"),
            AddressFamily::Ipv6 => f.write_str("ipv6"),
        }
    }
}

/// What the caller means by "loopback" for one kind of socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopbackIntent {
    /// A plain `AF_INET` socket.
    Ipv4,
    /// An `AF_INET6` socket, dual-stack or not.
    Ipv6,
    /// An `AF_INET6` socket addressing the IPv4 loopback through the mapped form.
    Ipv4MappedIpv6,
}

/// A literal loopback block, in CIDR form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoopbackPattern {
    network: IpAddr,
    prefix_len: u8,
}

impl LoopbackPattern {
    /// `127.0.0.0/8`
    pub const IPV4_LOOPBACK: Self = Self {
        network: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 0)),
        prefix_len: 8,
    };

    /// `::1`
    pub const IPV6_LOOPBACK: Self = Self {
        network: IpAddr::V6(Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 1)),
        prefix_len: 128,
    };

    /// `::ffff:127.0.0.0/104`
    pub const IPV4_MAPPED_LOOPBACK: Self = Self {
        network: IpAddr::V6(Ipv6Addr::new(0, 0, 0, 0, 0, 0xffff, 0x7f00, 0)),
        prefix_len: 104,
    };

    pub fn network(&self) -> IpAddr {
        self.network
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Socket family that sees this pattern. The mapped block belongs to IPv6.
    pub fn family(&self) -> AddressFamily {
        family_of(&self.network)
    }

    pub fn is_ipv4_mapped(&self) -> bool {
        *self == Self::IPV4_MAPPED_LOOPBACK
    }

    /// Whether `addr` falls inside this block. Addresses of the other family never match.
    pub fn contains(&self, addr: &IpAddr) -> bool {
        match (self.network, addr) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = prefix_mask_v4(self.prefix_len);
                u32::from(net) & mask == u32::from(*addr) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let mask = prefix_mask_v6(self.prefix_len);
                u128::from(net) & mask == u128::from(*addr) & mask
            }
            _ => false,
        }
    }

    /// Whether the whole block `addr/prefix_len` lies inside this pattern.
    pub fn contains_block(&self, addr: &IpAddr, prefix_len: u8) -> bool {
        prefix_len >= self.prefix_len && self.contains(addr)
    }
}

impl fmt::Display for LoopbackPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefix_len == self.family().max_prefix_len() {
            write!(f, "{}", self.network)
        } else {
            write!(f, "{}/{}", self.network, self.prefix_len)
        }
    }
}

/// Result of classifying an address against the loopback equivalence class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressClass {
    Loopback(AddressFamily),
    Restricted,
}

impl AddressClass {
    pub fn is_loopback(&self) -> bool {
        matches!(self, AddressClass::Loopback(_))
    }
}

impl fmt::Display for AddressClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressClass::Loopback(family) => write!(f, "loopback ({family})"),
            AddressClass::Restricted => f.write_str("restricted"),
        }
    }
}

/// All literal loopback patterns a socket of `family` can be matched against.
pub fn loopback_patterns(family: AddressFamily) -> &'static [LoopbackPattern] {
    match family {
        AddressFamily::Ipv4 => &[LoopbackPattern::IPV4_LOOPBACK],
        AddressFamily::Ipv6 => &[
            LoopbackPattern::IPV6_LOOPBACK,
            LoopbackPattern::IPV4_MAPPED_LOOPBACK,
        ],
    }
}

/// Literal patterns realizing a single loopback intent.
pub fn expand(intent: LoopbackIntent) -> &'static [LoopbackPattern] {
    match intent {
        LoopbackIntent::Ipv4 => loopback_patterns(AddressFamily::Ipv4),
        LoopbackIntent::Ipv6 => loopback_patterns(AddressFamily::Ipv6),
        LoopbackIntent::Ipv4MappedIpv6 => &[LoopbackPattern::IPV4_MAPPED_LOOPBACK],
    }
}

/// Every loopback pattern across both families, IPv4 first.
pub fn all_loopback_patterns() -> Vec<LoopbackPattern> {
    [AddressFamily::Ipv4, AddressFamily::Ipv6]
        .into_iter()
        .flat_map(|family| loopback_patterns(family).iter().copied())
        .collect()
}

/// Classify an address, socket address (`addr:port`, `[addr]:port`) or CIDR block.
///
/// A CIDR block is loopback only when the entire block sits inside one loopback
/// pattern; `0.0.0.0/0` is restricted even though it contains `127.0.0.1`.
pub fn classify(input: &str) -> Result<AddressClass> {
    let (addr, prefix_len) = parse_address(input)?;

    let class = all_loopback_patterns()
        .iter()
        .find(|pattern| pattern.contains_block(&addr, prefix_len))
        .map(|pattern| AddressClass::Loopback(pattern.family()))
        .unwrap_or(AddressClass::Restricted);

    Ok(class)
}

/// Like [`classify`], for an already-parsed single address.
pub fn is_loopback(addr: &IpAddr) -> bool {
    all_loopback_patterns()
        .iter()
        .any(|pattern| pattern.contains(addr))
}

fn parse_address(input: &str) -> Result<(IpAddr, u8)> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(SandboxError::PolicyValidation(
            "address must not be empty".to_string(),
        ));
    }

    if let Some((addr, prefix)) = trimmed.split_once('/') {
        let addr = parse_host(addr).ok_or_else(|| invalid_address(input))?;
        let prefix_len: u8 = prefix.parse().map_err(|_| invalid_address(input))?;
        if prefix_len > family_of(&addr).max_prefix_len() {
            return Err(SandboxError::PolicyValidation(format!(
                "prefix length /{prefix_len} is too long for {} address '{input}'",
                family_of(&addr)
            )));
        }
        return Ok((addr, prefix_len));
    }

    let addr = parse_host(trimmed)
        .or_else(|| trimmed.parse::<SocketAddr>().ok().map(|sa| sa.ip()))
        .ok_or_else(|| invalid_address(input))?;
    Ok((addr, family_of(&addr).max_prefix_len()))
}

fn parse_host(host: &str) -> Option<IpAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Some(ip);
    }
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .and_then(|inner| inner.parse::<Ipv6Addr>().ok())
        .map(IpAddr::V6)
}

fn family_of(addr: &IpAddr) -> AddressFamily {
    match addr {
        IpAddr::V4(_) => AddressFamily::Ipv4,
        IpAddr::V6(_) => AddressFamily::Ipv6,
    }
}

fn invalid_address(input: &str) -> SandboxError {
    SandboxError::PolicyValidation(format!("'{input}' is not an IP address or CIDR block"))
}

fn prefix_mask_v4(prefix_len: u8) -> u32 {
    match prefix_len {
        0 => 0,
        n => u32::MAX << (32 - u32::from(n.min(32))),
    }
}

fn prefix_mask_v6(prefix_len: u8) -> u128 {
    match prefix_len {
        0 => 0,
        n => u128::MAX << (128 - u32::from(n.min(128))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4_family_expands_to_loopback_block() {
        let patterns = loopback_patterns(AddressFamily::Ipv4);
        assert_eq!(patterns, &[LoopbackPattern::IPV4_LOOPBACK]);
        assert_eq!(patterns[0].to_string(), "127.0.0.0/8");
    }

    #[test]
    fn test_ipv6_family_includes_mapped_block() {
        let rendered: Vec<String> = loopback_patterns(AddressFamily::Ipv6)
            .iter()
            .map(|p| p.to_string())
            .collect();
        assert_eq!(rendered, vec!["::1", "::ffff:127.0.0.0/104"]);
    }

    #[test]
    fn test_expand_mapped_intent() {
        let patterns = expand(LoopbackIntent::Ipv4MappedIpv6);
        assert_eq!(patterns.len(), 1);
        assert!(patterns[0].is_ipv4_mapped());
        assert_eq!(patterns[0].family(), AddressFamily::Ipv6);
    }

    #[test]
    fn test_all_patterns_are_ordered_and_unique() {
        assert_eq!(
            all_loopback_patterns(),
            vec![
                LoopbackPattern::IPV4_LOOPBACK,
                LoopbackPattern::IPV6_LOOPBACK,
                LoopbackPattern::IPV4_MAPPED_LOOPBACK,
            ]
        );
    }

    #[test]
    fn test_classify_plain_loopback_addresses() {
        assert_eq!(
            classify("127.0.0.1").unwrap(),
            AddressClass::Loopback(AddressFamily::Ipv4)
        );
        assert_eq!(
            classify("127.255.0.3").unwrap(),
            AddressClass::Loopback(AddressFamily::Ipv4)
        );
        assert_eq!(
            classify("::1").unwrap(),
            AddressClass::Loopback(AddressFamily::Ipv6)
        );
        assert_eq!(
            classify("[::1]").unwrap(),
            AddressClass::Loopback(AddressFamily::Ipv6)
        );
    }

    #[test]
    fn test_classify_mapped_loopback_is_ipv6() {
        assert_eq!(
            classify("::ffff:127.0.0.1").unwrap(),
            AddressClass::Loopback(AddressFamily::Ipv6)
        );
        assert_eq!(
            classify("[::ffff:127.0.0.1]:8080").unwrap(),
            AddressClass::Loopback(AddressFamily::Ipv6)
        );
    }

    #[test]
    fn test_classify_socket_addresses() {
        assert!(classify("127.0.0.1:0").unwrap().is_loopback());
        assert_eq!(classify("8.8.8.8:53").unwrap(), AddressClass::Restricted);
        assert_eq!(classify("[2001:db8::1]:443").unwrap(), AddressClass::Restricted);
    }

    #[test]
    fn test_classify_non_loopback_is_restricted() {
        for addr in [
            "8.8.8.8",
            "0.0.0.0",
            "::",
            "10.0.0.1",
            "128.0.0.1",
            "::ffff:8.8.8.8",
            "::2",
            "fe80::1",
        ] {
            assert_eq!(
                classify(addr).unwrap(),
                AddressClass::Restricted,
                "{addr} should be restricted"
            );
        }
    }

    #[test]
    fn test_classify_cidr_must_fit_inside_loopback() {
        assert!(classify("127.0.0.0/8").unwrap().is_loopback());
        assert!(classify("127.1.0.0/16").unwrap().is_loopback());
        assert!(classify("::ffff:127.0.0.0/104").unwrap().is_loopback());
        assert!(classify("::1/128").unwrap().is_loopback());

        assert_eq!(classify("0.0.0.0/0").unwrap(), AddressClass::Restricted);
        assert_eq!(classify("126.0.0.0/7").unwrap(), AddressClass::Restricted);
        assert_eq!(classify("::/0").unwrap(), AddressClass::Restricted);
        assert_eq!(classify("::/127").unwrap(), AddressClass::Restricted);
        assert_eq!(
            classify("::ffff:0.0.0.0/96").unwrap(),
            AddressClass::Restricted
        );
    }

    #[test]
    fn test_classify_rejects_garbage() {
        assert!(classify("").is_err());
        assert!(classify("localhost").is_err());
        assert!(classify("127.0.0.1/33").is_err());
        assert!(classify("::1/129").is_err());
        assert!(classify("127.0.0.1/abc").is_err());
    }

    #[test]
    fn test_contains_never_crosses_families() {
        let v4: IpAddr = "127.0.0.1".parse().unwrap();
        let mapped: IpAddr = "::ffff:127.0.0.1".parse().unwrap();
        assert!(LoopbackPattern::IPV4_LOOPBACK.contains(&v4));
        assert!(!LoopbackPattern::IPV4_LOOPBACK.contains(&mapped));
        assert!(LoopbackPattern::IPV4_MAPPED_LOOPBACK.contains(&mapped));
        assert!(!LoopbackPattern::IPV4_MAPPED_LOOPBACK.contains(&v4));
    }

    #[test]
    fn test_is_loopback() {
        assert!(is_loopback(&"127.0.0.1".parse().unwrap()));
        assert!(is_loopback(&"::1".parse().unwrap()));
        assert!(is_loopback(&"::ffff:127.0.0.1".parse().unwrap()));
        assert!(!is_loopback(&"::ffff:10.0.0.1".parse().unwrap()));
    }
}
