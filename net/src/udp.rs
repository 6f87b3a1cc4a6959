//! UDP header construction and inbound datagram parsing.

use tinyip_lib::klog_debug;

use crate::checksum::{get_be16, put_be16, put_bytes, transport_checksum, transport_verify};
use crate::frame::{Frame, UDP_DATA_OFFSET, UDP_HEADER_LEN, check_ip_frame};
use crate::types::{IpProtocol, Ipv4Addr, MacAddr};

/// Write a UDP header plus `data` at the start of `buf`.
///
/// The checksum covers the pseudo-header, so the IP addresses are needed
/// here even though they are written by the IP layer. A computed checksum of
/// zero is sent as `0xffff`, zero on the wire meaning "no checksum".
/// Returns the segment length, 0 if `buf` is too small.
pub fn add_udp(
    buf: &mut [u8],
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    sport: u16,
    dport: u16,
    data: &[u8],
) -> usize {
    let len = UDP_HEADER_LEN + data.len();
    let Some(seg) = buf.get_mut(..len) else {
        return 0;
    };
    put_be16(seg, 0, sport);
    put_be16(seg, 2, dport);
    put_be16(seg, 4, len as u16);
    put_be16(seg, 6, 0);
    put_bytes(seg, UDP_HEADER_LEN, data);
    let check = match transport_checksum(src_ip, dst_ip, IpProtocol::Udp.as_u8(), seg) {
        0 => 0xffff,
        c => c,
    };
    put_be16(seg, 6, check);
    len
}

/// A received datagram, borrowing the frame it arrived in.
#[derive(Clone, Copy, Debug)]
pub struct UdpDatagram<'a> {
    pub src_mac: MacAddr,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    pub payload: &'a [u8],
}

impl<'a> UdpDatagram<'a> {
    /// Parse a UDP datagram out of an admitted IP frame.
    ///
    /// The payload is bounded by both the UDP length field and the IP total
    /// length, whichever is shorter. A nonzero checksum must verify against
    /// the pseudo-header; zero means the sender did not compute one.
    pub fn parse(frame: &Frame<'a>, my_mac: MacAddr, my_ip: Ipv4Addr) -> Option<Self> {
        if frame.ip_proto() != IpProtocol::Udp.as_u8() {
            return None;
        }
        if !check_ip_frame(frame, my_mac, my_ip) || frame.len() <= UDP_DATA_OFFSET {
            return None;
        }
        let seg = frame.l4();
        if seg.len() < UDP_HEADER_LEN {
            return None;
        }
        let udp_len = (get_be16(seg, 4) as usize).clamp(UDP_HEADER_LEN, seg.len());
        let (src_ip, dst_ip) = (frame.ip_src(), frame.ip_dst());
        if get_be16(seg, 6) != 0
            && !transport_verify(src_ip, dst_ip, IpProtocol::Udp.as_u8(), &seg[..udp_len])
        {
            klog_debug!("udp: bad checksum from {}", src_ip);
            return None;
        }
        Some(Self {
            src_mac: frame.eth_src(),
            src_ip,
            dst_ip,
            src_port: get_be16(seg, 0),
            dst_port: get_be16(seg, 2),
            payload: &seg[UDP_HEADER_LEN..udp_len],
        })
    }
}
