//! In-memory link, manual clock and frame builders for the test suites.

use core::cell::Cell;
use std::collections::VecDeque;
use std::vec::Vec;

use crate::arp::{ArpOp, build_arp};
use crate::clock::Clock;
use crate::config::NetConfig;
use crate::ethernet::add_eth;
use crate::frame::{Frame, IP_DATA_OFFSET, MAX_FRAME_LEN};
use crate::icmp::add_icmp;
use crate::ipv4::add_ip_hdr;
use crate::link::{Channel, Link, LinkStatus};
use crate::stack::NetStack;
use crate::tcp::{TcpOut, TcpSegment, add_tcp};
use crate::types::{EtherType, IpProtocol, Ipv4Addr, MacAddr, NetError};
use crate::udp::{UdpDatagram, add_udp};

pub const MY_MAC: MacAddr = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
pub const MY_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 10);
pub const NETMASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);
pub const ROUTER_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);
pub const DNS_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 2);

pub const PEER_MAC: MacAddr = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x42]);
pub const PEER_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 77);
pub const ROUTER_MAC: MacAddr = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0xfe]);

/// Scripted link: records every transmitted frame and replays queued ones.
pub struct LoopLink {
    pub sent: Vec<Vec<u8>>,
    pub rx: VecDeque<(Channel, Vec<u8>)>,
    pub status: LinkStatus,
    pub fail_tx: bool,
}

impl LoopLink {
    pub fn new() -> Self {
        Self {
            sent: Vec::new(),
            rx: VecDeque::new(),
            status: LinkStatus::Up,
            fail_tx: false,
        }
    }

    pub fn push_rx(&mut self, frame: Vec<u8>) {
        self.rx.push_back((Channel::Data, frame));
    }

    /// Drain the transmit log.
    pub fn take_sent(&mut self) -> Vec<Vec<u8>> {
        core::mem::take(&mut self.sent)
    }
}

impl Link for LoopLink {
    fn transmit(&mut self, frame: &[u8]) -> Result<(), NetError> {
        if self.fail_tx {
            return Err(NetError::LinkDown);
        }
        self.sent.push(frame.to_vec());
        Ok(())
    }

    fn poll_rx(&mut self, buf: &mut [u8]) -> Option<(Channel, usize)> {
        let (channel, frame) = self.rx.pop_front()?;
        let n = frame.len().min(buf.len());
        buf[..n].copy_from_slice(&frame[..n]);
        Some((channel, n))
    }

    fn link_check(&mut self) -> LinkStatus {
        self.status
    }
}

/// Clock that only moves when told to, plus `step` on every reading.
pub struct ManualClock {
    now: Cell<u32>,
    step: Cell<u32>,
}

impl ManualClock {
    pub fn new(start: u32) -> Self {
        Self {
            now: Cell::new(start),
            step: Cell::new(0),
        }
    }

    pub fn set(&self, usec: u32) {
        self.now.set(usec);
    }

    pub fn advance(&self, usec: u32) {
        self.now.set(self.now.get().wrapping_add(usec));
    }

    /// Advance by `usec` each time the clock is read.
    pub fn set_step(&self, usec: u32) {
        self.step.set(usec);
    }
}

impl Clock for ManualClock {
    fn now_usec(&self) -> u32 {
        let now = self.now.get();
        self.now.set(now.wrapping_add(self.step.get()));
        now
    }
}

pub type TestStack<'c> = NetStack<LoopLink, &'c ManualClock>;

/// Stack with the static test addressing and DHCP off.
pub fn static_stack(clock: &ManualClock) -> TestStack<'_> {
    let config = NetConfig::new(MY_MAC).with_static_ip(MY_IP, NETMASK, ROUTER_IP, DNS_IP);
    NetStack::new(config, LoopLink::new(), clock)
}

// =============================================================================
// Frame builders
// =============================================================================

/// Ethernet + IPv4 around an already built transport part.
pub fn ip_frame(
    dst_mac: MacAddr,
    src_mac: MacAddr,
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    proto: IpProtocol,
    l4: &[u8],
) -> Vec<u8> {
    let mut buf = std::vec![0u8; IP_DATA_OFFSET + l4.len()];
    let n = add_eth(&mut buf, dst_mac, src_mac, EtherType::Ipv4);
    add_ip_hdr(&mut buf[n..], src_ip, dst_ip, proto, 0x1234, l4.len());
    buf[IP_DATA_OFFSET..].copy_from_slice(l4);
    buf
}

pub fn udp_frame(
    src_mac: MacAddr,
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    sport: u16,
    dport: u16,
    data: &[u8],
) -> Vec<u8> {
    let mut l4 = [0u8; MAX_FRAME_LEN];
    let n = add_udp(&mut l4, src_ip, dst_ip, sport, dport, data);
    ip_frame(MY_MAC, src_mac, src_ip, dst_ip, IpProtocol::Udp, &l4[..n])
}

/// Segment from the test peer to us.
pub fn tcp_frame(out: &TcpOut, data: &[u8]) -> Vec<u8> {
    let mut l4 = [0u8; MAX_FRAME_LEN];
    let n = add_tcp(&mut l4, PEER_IP, MY_IP, out, data);
    ip_frame(MY_MAC, PEER_MAC, PEER_IP, MY_IP, IpProtocol::Tcp, &l4[..n])
}

pub fn icmp_frame(src_mac: MacAddr, src_ip: Ipv4Addr, typ: u8, seq: u16, data: &[u8]) -> Vec<u8> {
    let mut l4 = [0u8; MAX_FRAME_LEN];
    let n = add_icmp(&mut l4, typ, 0, 0x77, seq, data);
    ip_frame(MY_MAC, src_mac, src_ip, MY_IP, IpProtocol::Icmp, &l4[..n])
}

/// ARP packet as `sender` would build it.
pub fn arp_frame(
    op: ArpOp,
    sender_mac: MacAddr,
    sender_ip: Ipv4Addr,
    target_mac: MacAddr,
    target_ip: Ipv4Addr,
) -> Vec<u8> {
    let mut buf = [0u8; MAX_FRAME_LEN];
    let n = build_arp(&mut buf, op, sender_mac, sender_ip, target_mac, target_ip);
    buf[..n].to_vec()
}

// =============================================================================
// Decoding sent frames
// =============================================================================

/// Parse a transmitted frame as a segment addressed to `peer`.
pub fn sent_tcp(frame: &[u8]) -> Option<TcpSegment<'_>> {
    TcpSegment::parse(&Frame::new(Channel::Data, frame), PEER_MAC, PEER_IP)
}

/// Parse a transmitted frame as a datagram, as seen by `mac`/`ip`.
pub fn sent_udp(frame: &[u8], mac: MacAddr, ip: Ipv4Addr) -> Option<UdpDatagram<'_>> {
    UdpDatagram::parse(&Frame::new(Channel::Data, frame), mac, ip)
}
