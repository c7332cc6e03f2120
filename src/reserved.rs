//! Special-purpose networks
//!
//! Blocks from the IANA special-purpose registries that are not globally
//! routable, and the IPv6 prefixes that embed IPv4 addresses.

use crate::mmdb::IpVersion;
use ipnet::IpNet;

const RESERVED_IPV4: &[&str] = &[
    "0.0.0.0/8",
    "10.0.0.0/8",
    "100.64.0.0/10",
    "127.0.0.0/8",
    "169.254.0.0/16",
    "172.16.0.0/12",
    "192.0.0.0/29",
    "192.0.2.0/24",
    "192.88.99.0/24",
    "192.168.0.0/16",
    "198.18.0.0/15",
    "198.51.100.0/24",
    "203.0.113.0/24",
    "224.0.0.0/4",
    "240.0.0.0/4",
    "255.255.255.255/32",
];

// 2001::/23 is listed without 2001::/32, which is aliased (Teredo)
const RESERVED_IPV6: &[&str] = &[
    "100::/64",
    "2001:1::/32",
    "2001:2::/31",
    "2001:4::/30",
    "2001:8::/29",
    "2001:10::/28",
    "2001:20::/27",
    "2001:40::/26",
    "2001:80::/25",
    "2001:100::/24",
    "2001:db8::/32",
    "fc00::/7",
    "fe80::/10",
    "ff00::/8",
];

/// Where the IPv4 address space lives in an IPv6 tree
pub const IPV4_SUBTREE: &str = "::/96";

/// Prefixes that lead to the IPv4 subtree: IPv4-mapped, Teredo and 6to4
pub const IPV4_ALIASES: &[&str] = &["::ffff:0:0/96", "2001::/32", "2002::/16"];

/// Reserved networks for a tree of the given version
///
/// IPv6 trees carry the IPv4 list too, since IPv4 inserts land under
/// `::/96` there.
pub fn reserved_networks(ip_version: IpVersion) -> Vec<IpNet> {
    let v6 = match ip_version {
        IpVersion::V4 => &[][..],
        IpVersion::V6 => RESERVED_IPV6,
    };
    RESERVED_IPV4
        .iter()
        .chain(v6)
        .filter_map(|s| s.parse().ok())
        .collect()
}

/// Alias prefixes as networks
pub fn alias_networks() -> Vec<IpNet> {
    IPV4_ALIASES.iter().filter_map(|s| s.parse().ok()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lists_parse() {
        assert_eq!(reserved_networks(IpVersion::V4).len(), RESERVED_IPV4.len());
        assert_eq!(
            reserved_networks(IpVersion::V6).len(),
            RESERVED_IPV4.len() + RESERVED_IPV6.len()
        );
        assert_eq!(alias_networks().len(), 3);
        assert!(IPV4_SUBTREE.parse::<IpNet>().is_ok());
    }

    #[test]
    fn test_teredo_carved_out() {
        let teredo: IpNet = "2001::/32".parse().unwrap();
        for net in reserved_networks(IpVersion::V6) {
            assert!(!net.contains(&teredo) && !teredo.contains(&net), "{}", net);
        }
        // The pieces cover the rest of 2001::/23
        let total: u128 = reserved_networks(IpVersion::V6)
            .iter()
            .filter(|n| "2001::/23".parse::<IpNet>().unwrap().contains(*n))
            .map(|n| 1u128 << (32 - n.prefix_len()))
            .sum();
        assert_eq!(total, (1 << 9) - 1);
    }
}
