//! Private address-space classification.
//!
//! The probe must never be pointed at the host network: any destination in
//! these ranges is rejected before a single packet leaves the machine, and
//! hops inside them are excluded from ASN enrichment.

use ipnet::{Ipv4Net, Ipv6Net};
use std::net::IpAddr;
use std::sync::LazyLock;

static PRIVATE_V4: LazyLock<Vec<Ipv4Net>> = LazyLock::new(|| {
    [
        "0.0.0.0/8",       // "this network"
        "10.0.0.0/8",      // RFC1918
        "100.64.0.0/10",   // CGNAT
        "127.0.0.0/8",     // loopback
        "169.254.0.0/16",  // link-local
        "172.16.0.0/12",   // RFC1918
        "192.0.0.0/24",    // IETF protocol assignments
        "192.0.2.0/24",    // TEST-NET-1
        "192.168.0.0/16",  // RFC1918
        "198.18.0.0/15",   // benchmarking
        "198.51.100.0/24", // TEST-NET-2
        "203.0.113.0/24",  // TEST-NET-3
        "224.0.0.0/4",     // multicast
        "240.0.0.0/4",     // reserved
    ]
    .iter()
    .map(|net| net.parse().expect("static network literal"))
    .collect()
});

static PRIVATE_V6: LazyLock<Vec<Ipv6Net>> = LazyLock::new(|| {
    [
        "::/128",         // unspecified
        "::1/128",        // loopback
        "fc00::/7",       // unique-local
        "fe80::/10",      // link-local
        "ff00::/8",       // multicast
        "2001:db8::/32",  // documentation
        "::ffff:0:0/96",  // v4-mapped (checked as v4 by callers, blocked here too)
    ]
    .iter()
    .map(|net| net.parse().expect("static network literal"))
    .collect()
});

/// Whether the address falls inside a private, reserved or otherwise
/// non-routable range.
pub fn is_private_ip(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => PRIVATE_V4.iter().any(|net| net.contains(&v4)),
        IpAddr::V6(v6) => PRIVATE_V6.iter().any(|net| net.contains(&v6)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_rfc1918_is_private() {
        assert!(is_private_ip(ip("10.0.0.1")));
        assert!(is_private_ip(ip("172.16.30.1")));
        assert!(is_private_ip(ip("192.168.1.1")));
    }

    #[test]
    fn test_special_ranges_are_private() {
        assert!(is_private_ip(ip("127.0.0.1")));
        assert!(is_private_ip(ip("169.254.10.10")));
        assert!(is_private_ip(ip("100.64.0.1")));
        assert!(is_private_ip(ip("224.0.0.251")));
        assert!(is_private_ip(ip("240.0.0.1")));
        assert!(is_private_ip(ip("192.0.2.1")));
    }

    #[test]
    fn test_public_is_not_private() {
        assert!(!is_private_ip(ip("8.8.8.8")));
        assert!(!is_private_ip(ip("1.1.1.1")));
        assert!(!is_private_ip(ip("142.250.74.46")));
        assert!(!is_private_ip(ip("2606:4700:4700::1111")));
    }

    #[test]
    fn test_v6_special_ranges() {
        assert!(is_private_ip(ip("::1")));
        assert!(is_private_ip(ip("fe80::1")));
        assert!(is_private_ip(ip("fd12:3456::1")));
        assert!(is_private_ip(ip("ff02::1")));
        assert!(is_private_ip(ip("2001:db8::1")));
    }
}
