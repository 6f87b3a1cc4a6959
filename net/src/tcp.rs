//! TCP header codec, flags and connection states.
//!
//! The connection engine itself lives in [`crate::tcp_socket`]; this module
//! only knows the wire format. Outbound segments carry no options except an
//! MSS option on SYN segments, and always advertise the same fixed window.

use core::fmt;

use bitflags::bitflags;
use tinyip_lib::klog_debug;

use crate::checksum::{
    get_be16, get_be32, put_be16, put_be32, put_bytes, transport_checksum, transport_verify,
};
use crate::frame::{Frame, TCP_DATA_OFFSET, TCP_HEADER_LEN, check_ip_frame};
use crate::types::{IpProtocol, Ipv4Addr, MacAddr};

// =============================================================================
// Constants
// =============================================================================

/// Maximum segment size advertised on SYN, and the per-socket transmit bound.
pub const TCP_MSS: usize = 1460;
/// Fixed receive window.
pub const TCP_WINDOW: u16 = 1460;

/// Retransmissions allowed before a connection is reset.
pub const TCP_TRIES: u32 = 5;
/// Handshake and close retransmit interval.
pub const TCP_RETRY_USEC: u32 = 2_000_000;
/// Established-state keepalive interval.
pub const TCP_CHECK_USEC: u32 = 10_000_000;

pub const TCP_OPT_MSS: u8 = 2;
pub const TCP_OPT_MSS_LEN: u8 = 4;

/// Room for application data in one segment.
pub const TCP_MAX_DATA: usize = TCP_MSS - TCP_DATA_OFFSET;

bitflags! {
    /// Flag bits from byte 13 of the TCP header.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct TcpFlags: u8 {
        const FIN = 0x01;
        const SYN = 0x02;
        const RST = 0x04;
        const PSH = 0x08;
        const ACK = 0x10;
        const URG = 0x20;
    }
}

impl fmt::Display for TcpFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "<>");
        }
        for (name, _) in self.iter_names() {
            write!(f, "<{}>", name)?;
        }
        Ok(())
    }
}

// =============================================================================
// Connection state
// =============================================================================

/// Connection state of a stream socket.
///
/// `Closed` marks a slot the sweep leaves alone. `Finished` and `Failed` are
/// terminal: the next poll clears the socket back to `Listen`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TcpState {
    #[default]
    Closed,
    Listen,
    SynSent,
    SynReceived,
    Established,
    FinWait1,
    FinWait2,
    CloseWait,
    Closing,
    LastAck,
    TimeWait,
    Finished,
    Failed,
}

impl TcpState {
    /// Human-readable name for logging.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Listen => "LISTEN",
            Self::SynSent => "SYN_SENT",
            Self::SynReceived => "SYN_RCVD",
            Self::Established => "ESTABLISHED",
            Self::FinWait1 => "FIN_WAIT_1",
            Self::FinWait2 => "FIN_WAIT_2",
            Self::CloseWait => "CLOSE_WAIT",
            Self::Closing => "CLOSING",
            Self::LastAck => "LAST_ACK",
            Self::TimeWait => "TIME_WAIT",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
        }
    }

    /// States swept back to a clean `Listen` on the next poll.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::TimeWait | Self::Finished | Self::Failed)
    }
}

impl fmt::Display for TcpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Inbound segments
// =============================================================================

/// A received TCP segment, borrowing the frame it arrived in.
#[derive(Clone, Copy, Debug)]
pub struct TcpSegment<'a> {
    pub src_mac: MacAddr,
    pub src_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    pub flags: TcpFlags,
    pub window: u16,
    pub payload: &'a [u8],
}

impl<'a> TcpSegment<'a> {
    /// Parse a segment addressed to `my_ip`.
    ///
    /// The frame is trimmed to its declared IP length first, so link padding
    /// never shows up as payload. Segments whose checksum does not verify are
    /// rejected. Only FIN, SYN, RST and ACK are kept from the flag byte.
    pub fn parse(frame: &Frame<'a>, my_mac: MacAddr, my_ip: Ipv4Addr) -> Option<Self> {
        if frame.ip_proto() != IpProtocol::Tcp.as_u8() {
            return None;
        }
        if frame.ip_dst() != my_ip || !check_ip_frame(frame, my_mac, my_ip) {
            return None;
        }
        if frame.len() < TCP_DATA_OFFSET {
            return None;
        }
        let seg = frame.l4();
        if seg.len() < TCP_HEADER_LEN {
            return None;
        }
        let hlen = ((seg[12] >> 4) as usize) * 4;
        if hlen < TCP_HEADER_LEN || hlen > seg.len() {
            return None;
        }
        if !transport_verify(frame.ip_src(), frame.ip_dst(), IpProtocol::Tcp.as_u8(), seg) {
            klog_debug!("tcp: bad checksum from {}", frame.ip_src());
            return None;
        }
        let flags = TcpFlags::from_bits_truncate(seg[13])
            & (TcpFlags::FIN | TcpFlags::SYN | TcpFlags::RST | TcpFlags::ACK);
        Some(Self {
            src_mac: frame.eth_src(),
            src_ip: frame.ip_src(),
            src_port: get_be16(seg, 0),
            dst_port: get_be16(seg, 2),
            seq: get_be32(seg, 4),
            ack: get_be32(seg, 8),
            flags,
            window: get_be16(seg, 14),
            payload: &seg[hlen..],
        })
    }

    /// Destination port, readable before the full parse.
    pub fn peek_dst_port(frame: &Frame<'_>) -> u16 {
        frame.be16(frame.l4_offset() + 2)
    }
}

// =============================================================================
// Outbound segments
// =============================================================================

/// Header fields of one outbound segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TcpOut {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    pub flags: TcpFlags,
}

/// Write a TCP header, MSS option when SYN is set, and `data` into `buf`.
///
/// The checksum is computed last over header and data plus the pseudo-header.
/// Returns the segment length, 0 if `buf` is too small.
pub fn add_tcp(
    buf: &mut [u8],
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    out: &TcpOut,
    data: &[u8],
) -> usize {
    let hlen = if out.flags.contains(TcpFlags::SYN) {
        TCP_HEADER_LEN + TCP_OPT_MSS_LEN as usize
    } else {
        TCP_HEADER_LEN
    };
    let len = hlen + data.len();
    let Some(seg) = buf.get_mut(..len) else {
        return 0;
    };
    put_be16(seg, 0, out.src_port);
    put_be16(seg, 2, out.dst_port);
    put_be32(seg, 4, out.seq);
    put_be32(seg, 8, out.ack);
    seg[12] = ((hlen / 4) as u8) << 4;
    seg[13] = out.flags.bits();
    put_be16(seg, 14, TCP_WINDOW);
    put_be16(seg, 16, 0);
    put_be16(seg, 18, 0);
    if hlen > TCP_HEADER_LEN {
        seg[20] = TCP_OPT_MSS;
        seg[21] = TCP_OPT_MSS_LEN;
        put_be16(seg, 22, TCP_MSS as u16);
    }
    put_bytes(seg, hlen, data);
    let check = transport_checksum(src_ip, dst_ip, IpProtocol::Tcp.as_u8(), seg);
    put_be16(seg, 16, check);
    len
}
