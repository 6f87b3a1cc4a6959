//! Frame layout constants and the borrowed view of one received frame.
//!
//! A [`Frame`] borrows the stack's receive buffer for the duration of a
//! single dispatch call. Protocol handlers read fields through its
//! bounds-checked accessors and copy out whatever they need to keep; nothing
//! holds on to the borrow once dispatch returns.

use tinyip_lib::klog_debug;

use crate::checksum::{get_be16, verify};
use crate::link::Channel;
use crate::types::{EtherType, Ipv4Addr, MacAddr};

// =============================================================================
// Layout
// =============================================================================

pub const ETH_HEADER_LEN: usize = 14;
pub const ARP_PACKET_LEN: usize = 28;
pub const IPV4_HEADER_LEN: usize = 20;
pub const ICMP_HEADER_LEN: usize = 8;
pub const UDP_HEADER_LEN: usize = 8;
pub const TCP_HEADER_LEN: usize = 20;

/// Offset of the transport header in a frame without IP options.
pub const IP_DATA_OFFSET: usize = ETH_HEADER_LEN + IPV4_HEADER_LEN;
/// Offset of UDP payload.
pub const UDP_DATA_OFFSET: usize = IP_DATA_OFFSET + UDP_HEADER_LEN;
/// Offset of TCP payload when the header carries no options.
pub const TCP_DATA_OFFSET: usize = IP_DATA_OFFSET + TCP_HEADER_LEN;

/// Largest IP datagram the stack builds or accepts.
pub const MAX_IP_LEN: usize = 1500;
/// Largest Ethernet frame (no FCS).
pub const MAX_FRAME_LEN: usize = ETH_HEADER_LEN + MAX_IP_LEN;

// Ethernet field offsets.
const ETH_DST: usize = 0;
const ETH_SRC: usize = 6;
const ETH_TYPE: usize = 12;

// IPv4 field offsets, relative to the frame start.
const IP_VHL: usize = ETH_HEADER_LEN;
const IP_LEN: usize = ETH_HEADER_LEN + 2;
const IP_PROTO: usize = ETH_HEADER_LEN + 9;
const IP_SRC: usize = ETH_HEADER_LEN + 12;
const IP_DST: usize = ETH_HEADER_LEN + 16;

// =============================================================================
// Frame
// =============================================================================

/// One inbound block, valid for a single dispatch.
#[derive(Clone, Copy)]
pub struct Frame<'a> {
    channel: Channel,
    data: &'a [u8],
}

impl<'a> Frame<'a> {
    #[inline]
    pub fn new(channel: Channel, data: &'a [u8]) -> Self {
        Self { channel, data }
    }

    #[inline]
    pub fn channel(&self) -> Channel {
        self.channel
    }

    #[inline]
    pub fn bytes(&self) -> &'a [u8] {
        self.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn is_data(&self) -> bool {
        self.channel == Channel::Data
    }

    #[inline]
    pub fn byte(&self, off: usize) -> u8 {
        self.data.get(off).copied().unwrap_or(0)
    }

    #[inline]
    pub fn be16(&self, off: usize) -> u16 {
        get_be16(self.data, off)
    }

    /// Bytes from `off` to the end, empty if out of range.
    #[inline]
    pub fn tail(&self, off: usize) -> &'a [u8] {
        self.data.get(off..).unwrap_or(&[])
    }

    // --- Ethernet -----------------------------------------------------------

    #[inline]
    pub fn eth_dst(&self) -> MacAddr {
        MacAddr::read_from(self.data, ETH_DST)
    }

    #[inline]
    pub fn eth_src(&self) -> MacAddr {
        MacAddr::read_from(self.data, ETH_SRC)
    }

    #[inline]
    pub fn ethertype(&self) -> u16 {
        self.be16(ETH_TYPE)
    }

    /// Destination MAC is broadcast or ours.
    #[inline]
    pub fn eth_for_us(&self, my_mac: MacAddr) -> bool {
        let dst = self.eth_dst();
        dst.is_broadcast() || dst == my_mac
    }

    // --- IPv4 ---------------------------------------------------------------

    /// Header length in bytes from the IHL nibble.
    #[inline]
    pub fn ip_header_len(&self) -> usize {
        ((self.byte(IP_VHL) & 0x0f) as usize) * 4
    }

    #[inline]
    pub fn ip_total_len(&self) -> usize {
        self.be16(IP_LEN) as usize
    }

    #[inline]
    pub fn ip_proto(&self) -> u8 {
        self.byte(IP_PROTO)
    }

    #[inline]
    pub fn ip_src(&self) -> Ipv4Addr {
        Ipv4Addr::read_from(self.data, IP_SRC)
    }

    #[inline]
    pub fn ip_dst(&self) -> Ipv4Addr {
        Ipv4Addr::read_from(self.data, IP_DST)
    }

    /// The IPv4 header including options, empty if the IHL is short or
    /// runs past the frame.
    pub fn ip_header(&self) -> &'a [u8] {
        let ihl = self.ip_header_len();
        if ihl < IPV4_HEADER_LEN {
            return &[];
        }
        self.data.get(ETH_HEADER_LEN..ETH_HEADER_LEN + ihl).unwrap_or(&[])
    }

    /// Offset of the transport header.
    #[inline]
    pub fn l4_offset(&self) -> usize {
        ETH_HEADER_LEN + self.ip_header_len().max(IPV4_HEADER_LEN)
    }

    /// The transport segment, trimmed to the declared IP total length.
    pub fn l4(&self) -> &'a [u8] {
        let start = self.l4_offset();
        let end = (ETH_HEADER_LEN + self.ip_total_len()).min(self.data.len());
        self.data.get(start..end).unwrap_or(&[])
    }
}

/// Admission check applied by every IP-level handler.
///
/// The frame must be long enough to hold at least an ARP packet, be addressed
/// to our MAC or broadcast, carry IPv4, be sent to our IP or broadcast (or
/// arrive while we have no address yet, so DHCP replies get through),
/// declare a total length that fits in what was received, and carry a valid
/// header checksum.
pub fn check_ip_frame(frame: &Frame<'_>, my_mac: MacAddr, my_ip: Ipv4Addr) -> bool {
    if frame.len() < ETH_HEADER_LEN + ARP_PACKET_LEN {
        return false;
    }
    if !frame.eth_for_us(my_mac) {
        return false;
    }
    if EtherType::from_u16(frame.ethertype()) != Some(EtherType::Ipv4) {
        return false;
    }
    let dst = frame.ip_dst();
    if !(dst.is_broadcast() || dst == my_ip || my_ip.is_unspecified()) {
        return false;
    }
    let hdr = frame.ip_header();
    if hdr.is_empty() || frame.ip_total_len() < hdr.len() {
        return false;
    }
    if ETH_HEADER_LEN + frame.ip_total_len() > frame.len() {
        return false;
    }
    if !verify(hdr) {
        klog_debug!("ipv4: bad header checksum from {}", frame.ip_src());
        return false;
    }
    true
}
