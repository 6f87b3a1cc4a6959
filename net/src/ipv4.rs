//! IPv4 header construction and next-hop selection.
//!
//! Outbound datagrams never carry options and are never fragmented, so the
//! header is always 20 bytes with a zero flags/fragment field. The
//! identification field comes from a per-stack counter that advances on
//! every transmitted datagram.

use crate::checksum::{checksum, put_be16, put_bytes};
use crate::frame::IPV4_HEADER_LEN;
use crate::types::{IpProtocol, Ipv4Addr};

/// Version 4, five 32-bit header words.
pub const IP_VHL: u8 = 0x45;
pub const IP_TTL: u8 = 100;

/// Write a 20-byte IPv4 header into `buf[..20]` for a payload of `dlen` bytes.
///
/// The checksum covers the header only and is computed last, over a zeroed
/// checksum field. Returns the header length, or 0 if `buf` is too short.
pub fn add_ip_hdr(
    buf: &mut [u8],
    src: Ipv4Addr,
    dst: Ipv4Addr,
    proto: IpProtocol,
    ident: u16,
    dlen: usize,
) -> usize {
    let Some(hdr) = buf.get_mut(..IPV4_HEADER_LEN) else {
        return 0;
    };
    hdr[0] = IP_VHL;
    hdr[1] = 0;
    put_be16(hdr, 2, (IPV4_HEADER_LEN + dlen) as u16);
    put_be16(hdr, 4, ident);
    put_be16(hdr, 6, 0);
    hdr[8] = IP_TTL;
    hdr[9] = proto.as_u8();
    put_be16(hdr, 10, 0);
    put_bytes(hdr, 12, &src.0);
    put_bytes(hdr, 16, &dst.0);
    let check = checksum(hdr);
    put_be16(hdr, 10, check);
    IPV4_HEADER_LEN
}

/// Address whose MAC a datagram for `dst` must be sent to.
///
/// Destinations on the local subnet are reached directly. Everything else
/// goes through the router, unless no netmask or router is known yet, in which
/// case the destination is assumed to be on-link.
pub fn next_hop(dst: Ipv4Addr, my_ip: Ipv4Addr, netmask: Ipv4Addr, router: Ipv4Addr) -> Ipv4Addr {
    if netmask.is_unspecified() || router.is_unspecified() {
        return dst;
    }
    if Ipv4Addr::in_subnet(dst, my_ip, netmask) {
        dst
    } else {
        router
    }
}
