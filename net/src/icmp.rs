//! ICMP echo: answering pings and sending our own.
//!
//! Echo requests are answered by rewriting a copy of the received frame:
//! addresses are swapped, the type byte changes from 8 to 0 and the ICMP
//! checksum is patched incrementally for that one-byte change. The IP header
//! checksum stays valid as-is, since its source/destination words are only
//! swapped and the destination was our own address.

use crate::checksum::{add_csum, adjust_for_decrease, get_be16, put_be16, put_bytes, verify};
use crate::frame::{
    ETH_HEADER_LEN, Frame, ICMP_HEADER_LEN, IP_DATA_OFFSET, IPV4_HEADER_LEN, check_ip_frame,
};
use crate::types::{IpProtocol, Ipv4Addr, MacAddr};

pub const ICMP_ECHO_REPLY: u8 = 0;
pub const ICMP_ECHO_REQUEST: u8 = 8;

// Offsets relative to the frame start. Only option-free IP headers are
// accepted, so the ICMP header always sits at `IP_DATA_OFFSET`.
const ICMP_TYPE: usize = IP_DATA_OFFSET;
const ICMP_CHECK: usize = IP_DATA_OFFSET + 2;
const IP_SRC: usize = ETH_HEADER_LEN + 12;
const IP_DST: usize = ETH_HEADER_LEN + 16;

/// Write an ICMP header plus `data` at the start of `buf`.
///
/// Returns the number of bytes written, 0 if `buf` is too small.
pub fn add_icmp(buf: &mut [u8], typ: u8, code: u8, ident: u16, seq: u16, data: &[u8]) -> usize {
    let len = ICMP_HEADER_LEN + data.len();
    let Some(msg) = buf.get_mut(..len) else {
        return 0;
    };
    msg[0] = typ;
    msg[1] = code;
    put_be16(msg, 2, 0);
    put_be16(msg, 4, ident);
    put_be16(msg, 6, seq);
    put_bytes(msg, ICMP_HEADER_LEN, data);
    let check = !add_csum(0, msg);
    put_be16(msg, 2, check);
    len
}

/// What an inbound ICMP frame asks of the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IcmpAction {
    /// Echo request: build a reply from a copy of the frame.
    ReplyToEcho,
    /// Echo reply for our own ping.
    EchoReply { from: Ipv4Addr, seq: u16 },
    /// Consumed, nothing to do.
    Ignored,
}

/// Classify an inbound frame; `None` if it is not ICMP addressed to us, carries
/// IP options, or fails its checksum.
pub fn handle_rx(frame: &Frame<'_>, my_mac: MacAddr, my_ip: Ipv4Addr) -> Option<IcmpAction> {
    if frame.ip_proto() != IpProtocol::Icmp.as_u8() {
        return None;
    }
    if !check_ip_frame(frame, my_mac, my_ip) || frame.ip_dst() != my_ip {
        return None;
    }
    if frame.ip_header_len() != IPV4_HEADER_LEN {
        return None;
    }
    if frame.len() <= ETH_HEADER_LEN + IPV4_HEADER_LEN + ICMP_HEADER_LEN {
        return None;
    }
    if !verify(frame.l4()) {
        return None;
    }
    let action = match frame.byte(ICMP_TYPE) {
        ICMP_ECHO_REQUEST => IcmpAction::ReplyToEcho,
        ICMP_ECHO_REPLY => IcmpAction::EchoReply {
            from: frame.ip_src(),
            seq: frame.be16(IP_DATA_OFFSET + 6),
        },
        _ => IcmpAction::Ignored,
    };
    Some(action)
}

/// Turn a copied echo request in `buf` into the matching reply.
///
/// Returns the reply length: the Ethernet header plus the IP total length.
pub fn make_echo_reply(buf: &mut [u8], my_mac: MacAddr, my_ip: Ipv4Addr) -> usize {
    let total = ETH_HEADER_LEN + get_be16(buf, ETH_HEADER_LEN + 2) as usize;
    if buf.len() < total || total < IP_DATA_OFFSET + ICMP_HEADER_LEN {
        return 0;
    }
    let peer_mac = MacAddr::read_from(buf, 6);
    let peer_ip = Ipv4Addr::read_from(buf, IP_SRC);
    put_bytes(buf, 0, &peer_mac.0);
    put_bytes(buf, 6, &my_mac.0);
    put_bytes(buf, IP_SRC, &my_ip.0);
    put_bytes(buf, IP_DST, &peer_ip.0);

    // Type 8 -> 0 lowers the first ICMP word by 0x0800.
    let check = get_be16(buf, ICMP_CHECK);
    let delta = u16::from_be_bytes([ICMP_ECHO_REQUEST - ICMP_ECHO_REPLY, 0]);
    put_be16(buf, ICMP_CHECK, adjust_for_decrease(check, delta));
    buf[ICMP_TYPE] = ICMP_ECHO_REPLY;
    total
}

// =============================================================================
// Ping client
// =============================================================================

/// State of the single outstanding ping.
#[derive(Clone, Copy, Debug, Default)]
pub struct PingState {
    seq: u16,
    tx_time: Option<u32>,
    rx_time: Option<u32>,
}

impl PingState {
    pub const fn new() -> Self {
        Self {
            seq: 0,
            tx_time: None,
            rx_time: None,
        }
    }

    /// Sequence number for the next echo request, starting at 1.
    pub fn next_seq(&mut self) -> u16 {
        self.seq = self.seq.wrapping_add(1);
        self.seq
    }

    pub fn record_tx(&mut self, now: u32) {
        self.tx_time = Some(now);
        self.rx_time = None;
    }

    pub fn record_rx(&mut self, now: u32) {
        self.rx_time = Some(now);
    }

    /// Round trip of the last ping, once its reply has arrived.
    pub fn rtt_usec(&self) -> Option<u32> {
        match (self.tx_time, self.rx_time) {
            (Some(tx), Some(rx)) => Some(rx.wrapping_sub(tx)),
            _ => None,
        }
    }
}
