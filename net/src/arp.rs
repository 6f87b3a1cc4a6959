//! ARP packet codec and the IP-to-MAC resolution cache.
//!
//! The cache is a fixed ring of [`NUM_ARP_ENTRIES`] bindings. Every save
//! overwrites the slot under the write cursor; lookups walk backwards from the
//! newest entry, so a newer binding for an IP shadows any older one still in
//! the ring. Entries never age out; they only disappear once ten newer
//! bindings have been written over them.
//!
//! Inbound handling is split the same way as the rest of the stack: this
//! module decides what to do with an ARP frame and returns an [`ArpAction`],
//! and the caller performs the transmit.

use core::fmt;

use tinyip_lib::RingBuffer;

use crate::checksum::{get_be16, put_be16, put_bytes};
use crate::ethernet::add_eth;
use crate::frame::{ARP_PACKET_LEN, ETH_HEADER_LEN, Frame};
use crate::types::{EtherType, Ipv4Addr, MacAddr};

// =============================================================================
// Constants
// =============================================================================

pub const NUM_ARP_ENTRIES: usize = 10;

const ARP_HTYPE_ETHERNET: u16 = 1;
const ARP_PTYPE_IPV4: u16 = 0x0800;

/// ARP operation codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum ArpOp {
    Request = 1,
    Response = 2,
}

impl ArpOp {
    #[inline]
    pub const fn from_u16(val: u16) -> Option<Self> {
        match val {
            1 => Some(Self::Request),
            2 => Some(Self::Response),
            _ => None,
        }
    }
}

// Offsets inside the 28-byte ARP packet.
const ARP_OP: usize = 6;
const ARP_SMAC: usize = 8;
const ARP_SIP: usize = 14;
const ARP_DMAC: usize = 18;
const ARP_DIP: usize = 24;

// =============================================================================
// Packet codec
// =============================================================================

/// Decoded ARP packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArpPacket {
    pub op: u16,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

impl ArpPacket {
    /// Parse the ARP body (the bytes after the Ethernet header).
    pub fn parse(body: &[u8]) -> Option<Self> {
        if body.len() < ARP_PACKET_LEN {
            return None;
        }
        Some(Self {
            op: get_be16(body, ARP_OP),
            sender_mac: MacAddr::read_from(body, ARP_SMAC),
            sender_ip: Ipv4Addr::read_from(body, ARP_SIP),
            target_mac: MacAddr::read_from(body, ARP_DMAC),
            target_ip: Ipv4Addr::read_from(body, ARP_DIP),
        })
    }
}

/// Build a complete ARP frame into `buf`, returning its length.
///
/// Requests go to the broadcast MAC (in both the Ethernet header and the
/// target hardware field); responses go to `peer_mac`.
pub fn build_arp(
    buf: &mut [u8],
    op: ArpOp,
    my_mac: MacAddr,
    my_ip: Ipv4Addr,
    peer_mac: MacAddr,
    peer_ip: Ipv4Addr,
) -> usize {
    if buf.len() < ETH_HEADER_LEN + ARP_PACKET_LEN {
        return 0;
    }
    let dst = match op {
        ArpOp::Request => MacAddr::BROADCAST,
        ArpOp::Response => peer_mac,
    };
    let n = add_eth(buf, dst, my_mac, EtherType::Arp);
    let body = &mut buf[n..n + ARP_PACKET_LEN];
    put_be16(body, 0, ARP_HTYPE_ETHERNET);
    put_be16(body, 2, ARP_PTYPE_IPV4);
    body[4] = 6;
    body[5] = 4;
    put_be16(body, ARP_OP, op as u16);
    put_bytes(body, ARP_SMAC, &my_mac.0);
    put_bytes(body, ARP_SIP, &my_ip.0);
    put_bytes(body, ARP_DMAC, &dst.0);
    put_bytes(body, ARP_DIP, &peer_ip.0);
    n + ARP_PACKET_LEN
}

// =============================================================================
// Cache
// =============================================================================

/// One IP-to-MAC binding.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct ArpEntry {
    pub mac: MacAddr,
    pub ip: Ipv4Addr,
}

impl fmt::Debug for ArpEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.ip, self.mac)
    }
}

/// Fixed-capacity, newest-wins ARP cache.
pub struct ArpCache {
    entries: RingBuffer<ArpEntry, NUM_ARP_ENTRIES>,
}

impl ArpCache {
    pub fn new() -> Self {
        Self {
            entries: RingBuffer::new(),
        }
    }

    /// Store a binding in the next ring slot.
    pub fn save(&mut self, mac: MacAddr, ip: Ipv4Addr) {
        self.entries.push_overwrite(ArpEntry { mac, ip });
    }

    /// Most recent binding for `ip`.
    pub fn find(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        self.entries
            .iter_newest_first()
            .find(|e| e.ip == ip)
            .map(|e| e.mac)
    }

    pub fn len(&self) -> usize {
        self.entries.len() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.reset();
    }
}

impl Default for ArpCache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Inbound handling
// =============================================================================

/// What the caller must do after an ARP frame was consumed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArpAction {
    /// Answer a request for our address.
    SendReply { mac: MacAddr, ip: Ipv4Addr },
    /// A response was stored in the cache.
    Saved { mac: MacAddr, ip: Ipv4Addr },
    /// Addressed to us but nothing to do (unknown opcode).
    None,
}

/// Handle one inbound frame; `None` if it is not an ARP packet for us.
///
/// Only packets whose target IP is our address are consumed. Requests get a
/// unicast reply to the Ethernet source; responses are saved and never
/// answered.
pub fn handle_rx(
    frame: &Frame<'_>,
    cache: &mut ArpCache,
    my_mac: MacAddr,
    my_ip: Ipv4Addr,
) -> Option<ArpAction> {
    if frame.len() < ETH_HEADER_LEN + ARP_PACKET_LEN {
        return None;
    }
    if EtherType::from_u16(frame.ethertype()) != Some(EtherType::Arp) {
        return None;
    }
    if !frame.eth_for_us(my_mac) {
        return None;
    }
    let pkt = ArpPacket::parse(frame.tail(ETH_HEADER_LEN))?;
    if my_ip.is_unspecified() || pkt.target_ip != my_ip {
        return None;
    }

    let action = match ArpOp::from_u16(pkt.op) {
        Some(ArpOp::Request) => ArpAction::SendReply {
            mac: frame.eth_src(),
            ip: pkt.sender_ip,
        },
        Some(ArpOp::Response) => {
            cache.save(pkt.sender_mac, pkt.sender_ip);
            ArpAction::Saved {
                mac: pkt.sender_mac,
                ip: pkt.sender_ip,
            }
        }
        None => ArpAction::None,
    };
    Some(action)
}
