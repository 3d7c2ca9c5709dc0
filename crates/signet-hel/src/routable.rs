// SPDX-License-Identifier: MIT OR Apache-2.0

//! Public-routability classification for resolved addresses.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// The well-known cloud instance-metadata address.
const METADATA_V4: Ipv4Addr = Ipv4Addr::new(169, 254, 169, 254);

/// Whether an address may be contacted by the forwarder.
///
/// Rejects loopback, RFC 1918 private, link-local, multicast, broadcast,
/// unspecified, carrier-grade NAT (100.64/10), the reserved 0/8 and 240/4
/// blocks, unique-local and link-local IPv6, and the instance-metadata
/// address. IPv4-mapped IPv6 addresses are classified by their embedded
/// IPv4 address.
#[must_use]
pub fn is_publicly_routable(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_routable_v4(v4),
        IpAddr::V6(v6) => is_routable_v6(v6),
    }
}

fn is_routable_v4(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();
    if ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_broadcast()
        || ip.is_multicast()
        || ip == METADATA_V4
    {
        return false;
    }
    // 0.0.0.0/8 ("this network") and 240.0.0.0/4 (reserved).
    if octets[0] == 0 || octets[0] >= 240 {
        return false;
    }
    // Carrier-grade NAT: 100.64.0.0/10.
    if octets[0] == 100 && (octets[1] & 0xc0) == 64 {
        return false;
    }
    true
}

fn is_routable_v6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_routable_v4(v4);
    }
    if ip.is_loopback() || ip.is_unspecified() || ip.is_multicast() {
        return false;
    }
    let segments = ip.segments();
    // Unique local fc00::/7.
    if (segments[0] & 0xfe00) == 0xfc00 {
        return false;
    }
    // Link-local fe80::/10.
    if (segments[0] & 0xffc0) == 0xfe80 {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn public_addresses_are_routable() {
        assert!(is_publicly_routable(v4("203.0.113.9")));
        assert!(is_publicly_routable(v4("93.184.216.34")));
        assert!(is_publicly_routable(v4("8.8.8.8")));
        assert!(is_publicly_routable("2606:4700::1111".parse().unwrap()));
    }

    #[test]
    fn loopback_rejected() {
        assert!(!is_publicly_routable(v4("127.0.0.1")));
        assert!(!is_publicly_routable(v4("127.8.8.8")));
        assert!(!is_publicly_routable("::1".parse().unwrap()));
    }

    #[test]
    fn rfc1918_rejected() {
        assert!(!is_publicly_routable(v4("10.0.0.5")));
        assert!(!is_publicly_routable(v4("172.16.0.1")));
        assert!(!is_publicly_routable(v4("172.31.255.1")));
        assert!(!is_publicly_routable(v4("192.168.1.1")));
        // Just outside 172.16/12.
        assert!(is_publicly_routable(v4("172.32.0.1")));
    }

    #[test]
    fn link_local_and_metadata_rejected() {
        assert!(!is_publicly_routable(v4("169.254.0.1")));
        assert!(!is_publicly_routable(v4("169.254.169.254")));
        assert!(!is_publicly_routable("fe80::1".parse().unwrap()));
    }

    #[test]
    fn multicast_broadcast_unspecified_rejected() {
        assert!(!is_publicly_routable(v4("224.0.0.1")));
        assert!(!is_publicly_routable(v4("255.255.255.255")));
        assert!(!is_publicly_routable(v4("0.0.0.0")));
        assert!(!is_publicly_routable("ff02::1".parse().unwrap()));
        assert!(!is_publicly_routable("::".parse().unwrap()));
    }

    #[test]
    fn cgnat_rejected() {
        assert!(!is_publicly_routable(v4("100.64.0.1")));
        assert!(!is_publicly_routable(v4("100.127.255.254")));
        // Outside the /10.
        assert!(is_publicly_routable(v4("100.63.0.1")));
        assert!(is_publicly_routable(v4("100.128.0.1")));
    }

    #[test]
    fn reserved_blocks_rejected() {
        assert!(!is_publicly_routable(v4("0.1.2.3")));
        assert!(!is_publicly_routable(v4("240.0.0.1")));
        assert!(!is_publicly_routable(v4("250.9.9.9")));
    }

    #[test]
    fn unique_local_v6_rejected() {
        assert!(!is_publicly_routable("fc00::1".parse().unwrap()));
        assert!(!is_publicly_routable("fd00:ec2::254".parse().unwrap()));
    }

    #[test]
    fn v4_mapped_v6_classified_by_inner_address() {
        assert!(!is_publicly_routable("::ffff:10.0.0.5".parse().unwrap()));
        assert!(!is_publicly_routable("::ffff:169.254.169.254".parse().unwrap()));
        assert!(is_publicly_routable("::ffff:203.0.113.9".parse().unwrap()));
    }
}
