//! Address arithmetic shared by the v4 lease database and the v6 pool engine.
//!
//! `ipnet` already supplies subnet containment and netmask math; this module
//! adds the bit-level operations the scope engine and allocators need that
//! `ipnet` doesn't expose directly (broadcast address, host-bit masking, u-bit
//! clearing for IPv6 interface identifiers).

use std::net::{Ipv4Addr, Ipv6Addr};

use ipnet::{Ipv4Net, Ipv6Net};

/// Broadcast address of a v4 subnet (all host bits set).
pub fn broadcast_of(net: &Ipv4Net) -> Ipv4Addr {
    let base = u32::from(net.network());
    let host_bits = 32 - net.prefix_len() as u32;
    let mask = if host_bits == 32 {
        u32::MAX
    } else {
        (1u32 << host_bits) - 1
    };
    Ipv4Addr::from(base | mask)
}

/// Number of usable host addresses in a v4 subnet (excludes network/broadcast
/// for prefixes shorter than /31, matches ISC `dhcpd`'s range validation).
pub fn host_count(net: &Ipv4Net) -> u32 {
    let host_bits = 32 - net.prefix_len() as u32;
    match host_bits {
        0 => 1,
        1 => 2,
        n => (1u32 << n) - 2,
    }
}

/// Iterates the usable host addresses of a v4 subnet (network/broadcast
/// excluded for prefixes shorter than /31, matching [`host_count`]).
pub fn host_range(net: &Ipv4Net) -> impl Iterator<Item = Ipv4Addr> {
    let host_bits = 32 - net.prefix_len() as u32;
    let base = u32::from(net.network());
    let (first, count) = match host_bits {
        0 => (base, 1u32),
        1 => (base, 2u32),
        n => (base + 1, (1u32 << n) - 2),
    };
    (0..count).map(move |i| Ipv4Addr::from(first + i))
}

/// Overlay the network bits of `net_bits` onto `addr`'s low bits, replicating
/// `build_address6`'s byte/bit splice from the original `dhcpd` (`server/mdb6.c`).
/// `addr` is expected to already hold 16 bytes of hashed "random" material; the
/// top `net_bits` bits are replaced by the pool's network prefix.
pub fn overlay_prefix6(hashed: [u8; 16], net_start: Ipv6Addr, net_bits: u8) -> Ipv6Addr {
    let mut out = hashed;
    let net_bytes = net_start.octets();
    let whole_bytes = (net_bits / 8) as usize;
    out[..whole_bytes].copy_from_slice(&net_bytes[..whole_bytes]);

    let rem = net_bits % 8;
    if rem != 0 {
        let i = whole_bytes;
        let keep_mask: u8 = 0xFFu8 << (8 - rem); // top `rem` bits from the network
        out[i] = (out[i] & !keep_mask) | (net_bytes[i] & keep_mask);
    }

    // Clear the universal/local ("u") bit for /64 allocations (RFC 4291 §2.5.1).
    if net_bits == 64 {
        out[8] &= !0x02;
    }

    Ipv6Addr::from(out)
}

/// Zero the host bits of an IPv6 address below `prefix_len`, used when handing
/// out a delegated prefix (the allocation length, not the pool's base length).
pub fn mask_host_bits6(addr: Ipv6Addr, prefix_len: u8) -> Ipv6Addr {
    let net = Ipv6Net::new(addr, prefix_len).expect("prefix_len <= 128");
    net.network()
}

/// True if `iid` (the low 64 bits of an address) is one of the reserved
/// interface identifiers from draft-krishnan-ipv6-reserved-iids: the
/// Subnet-Router Anycast (all-zero) or the Subnet Anycast range
/// `fdff:ffff:ffff:ff80/121`.
pub fn is_reserved_iid(addr: &Ipv6Addr) -> bool {
    let o = addr.octets();
    let iid = &o[8..16];
    if iid == [0u8; 8] {
        return true;
    }
    iid[..7] == [0xfd, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff] && (iid[7] & 0x80) == 0x80
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_of_slash24() {
        let net: Ipv4Net = "192.168.1.0/24".parse().unwrap();
        assert_eq!(broadcast_of(&net), Ipv4Addr::new(192, 168, 1, 255));
    }

    #[test]
    fn broadcast_of_slash30() {
        let net: Ipv4Net = "10.0.0.0/30".parse().unwrap();
        assert_eq!(broadcast_of(&net), Ipv4Addr::new(10, 0, 0, 3));
    }

    #[test]
    fn host_count_matches_rfc_usable_range() {
        let net: Ipv4Net = "10.0.0.0/24".parse().unwrap();
        assert_eq!(host_count(&net), 254);
        let slash31: Ipv4Net = "10.0.0.0/31".parse().unwrap();
        assert_eq!(host_count(&slash31), 2);
    }

    #[test]
    fn overlay_prefix6_clears_u_bit_for_slash64() {
        let net_start: Ipv6Addr = "2001:db8::".parse().unwrap();
        let hashed = [0xffu8; 16];
        let addr = overlay_prefix6(hashed, net_start, 64);
        let octets = addr.octets();
        assert_eq!(&octets[..8], &net_start.octets()[..8]);
        assert_eq!(octets[8] & 0x02, 0);
    }

    #[test]
    fn reserved_iid_detects_subnet_router_anycast() {
        let addr: Ipv6Addr = "2001:db8::".parse().unwrap();
        assert!(is_reserved_iid(&addr));
    }

    #[test]
    fn reserved_iid_detects_subnet_anycast_range() {
        let addr: Ipv6Addr = "2001:db8::fdff:ffff:ffff:ff80".parse().unwrap();
        assert!(is_reserved_iid(&addr));
        let not_reserved: Ipv6Addr = "2001:db8::1".parse().unwrap();
        assert!(!is_reserved_iid(&not_reserved));
    }
}
