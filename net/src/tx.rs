//! Outbound frame assembly over the single shared transmit buffer.
//!
//! [`TxPath`] owns the buffer and the IP identification counter. A [`Tx`]
//! borrows it together with the link for the length of one handler call, so
//! a handler can transmit while it also holds the socket table or the ARP
//! cache mutably. The buffer holds nothing useful between sends.

use tinyip_lib::klog_warn;

use crate::arp::{ArpOp, build_arp};
use crate::ethernet::add_eth;
use crate::frame::{ETH_HEADER_LEN, IP_DATA_OFFSET, IPV4_HEADER_LEN, MAX_FRAME_LEN};
use crate::icmp::add_icmp;
use crate::ipv4::add_ip_hdr;
use crate::link::Link;
use crate::tcp::{TcpOut, add_tcp};
use crate::types::{EtherType, IpProtocol, Ipv4Addr, MacAddr, NetError};
use crate::udp::add_udp;

/// The shared transmit buffer and the per-datagram identification counter.
pub struct TxPath {
    buf: [u8; MAX_FRAME_LEN],
    ident: u16,
    sent: u32,
    errors: u32,
}

impl TxPath {
    pub const fn new() -> Self {
        Self {
            buf: [0; MAX_FRAME_LEN],
            ident: 1,
            sent: 0,
            errors: 0,
        }
    }

    /// Borrow the buffer and `link` for one round of transmits.
    pub fn begin<'a>(&'a mut self, link: &'a mut dyn Link, mac: MacAddr, ip: Ipv4Addr) -> Tx<'a> {
        Tx {
            link,
            path: self,
            mac,
            ip,
        }
    }

    pub fn frames_sent(&self) -> u32 {
        self.sent
    }

    pub fn tx_errors(&self) -> u32 {
        self.errors
    }
}

impl Default for TxPath {
    fn default() -> Self {
        Self::new()
    }
}

/// One transmit session: our addresses, the buffer, the link.
pub struct Tx<'a> {
    link: &'a mut dyn Link,
    path: &'a mut TxPath,
    mac: MacAddr,
    ip: Ipv4Addr,
}

impl Tx<'_> {
    #[inline]
    pub fn my_ip(&self) -> Ipv4Addr {
        self.ip
    }

    #[inline]
    pub fn my_mac(&self) -> MacAddr {
        self.mac
    }

    /// Hand `buf[..len]` to the link.
    fn flush(&mut self, len: usize) -> Result<(), NetError> {
        if len == 0 {
            return Err(NetError::NoBufferSpace);
        }
        match self.link.transmit(&self.path.buf[..len]) {
            Ok(()) => {
                self.path.sent = self.path.sent.wrapping_add(1);
                Ok(())
            }
            Err(e) => {
                self.path.errors = self.path.errors.wrapping_add(1);
                klog_warn!("tx: link refused {}-byte frame: {}", len, e);
                Err(e)
            }
        }
    }

    /// Ethernet and IP headers for a datagram whose transport part is
    /// `l4_len` bytes and already sits at `IP_DATA_OFFSET`.
    fn finish_ip(
        &mut self,
        dst_mac: MacAddr,
        dst_ip: Ipv4Addr,
        proto: IpProtocol,
        l4_len: usize,
    ) -> usize {
        if l4_len == 0 {
            return 0;
        }
        let ident = self.path.ident;
        self.path.ident = ident.wrapping_add(1);
        let buf = &mut self.path.buf;
        let n = add_eth(buf, dst_mac, self.mac, EtherType::Ipv4);
        let n = n + add_ip_hdr(&mut buf[n..], self.ip, dst_ip, proto, ident, l4_len);
        n + l4_len
    }

    pub fn send_arp(
        &mut self,
        op: ArpOp,
        peer_mac: MacAddr,
        peer_ip: Ipv4Addr,
    ) -> Result<(), NetError> {
        let len = build_arp(&mut self.path.buf, op, self.mac, self.ip, peer_mac, peer_ip);
        self.flush(len)
    }

    pub fn send_udp(
        &mut self,
        dst_mac: MacAddr,
        dst_ip: Ipv4Addr,
        sport: u16,
        dport: u16,
        data: &[u8],
    ) -> Result<(), NetError> {
        let l4 = add_udp(
            &mut self.path.buf[IP_DATA_OFFSET..],
            self.ip,
            dst_ip,
            sport,
            dport,
            data,
        );
        let len = self.finish_ip(dst_mac, dst_ip, IpProtocol::Udp, l4);
        self.flush(len)
    }

    pub fn send_tcp(
        &mut self,
        dst_mac: MacAddr,
        dst_ip: Ipv4Addr,
        out: &TcpOut,
        data: &[u8],
    ) -> Result<(), NetError> {
        let l4 = add_tcp(
            &mut self.path.buf[IP_DATA_OFFSET..],
            self.ip,
            dst_ip,
            out,
            data,
        );
        let len = self.finish_ip(dst_mac, dst_ip, IpProtocol::Tcp, l4);
        self.flush(len)
    }

    pub fn send_icmp(
        &mut self,
        dst_mac: MacAddr,
        dst_ip: Ipv4Addr,
        typ: u8,
        seq: u16,
        data: &[u8],
    ) -> Result<(), NetError> {
        let l4 = add_icmp(&mut self.path.buf[IP_DATA_OFFSET..], typ, 0, 0, seq, data);
        let len = self.finish_ip(dst_mac, dst_ip, IpProtocol::Icmp, l4);
        self.flush(len)
    }

    /// Copy `frame` into the buffer, let `edit` rewrite it in place, and send
    /// the number of bytes `edit` returns.
    pub fn send_rewritten(
        &mut self,
        frame: &[u8],
        edit: impl FnOnce(&mut [u8], MacAddr, Ipv4Addr) -> usize,
    ) -> Result<(), NetError> {
        let n = frame.len().min(MAX_FRAME_LEN);
        if n < ETH_HEADER_LEN + IPV4_HEADER_LEN {
            return Err(NetError::InvalidArgument);
        }
        self.path.buf[..n].copy_from_slice(&frame[..n]);
        let len = edit(&mut self.path.buf[..n], self.mac, self.ip);
        self.flush(len)
    }
}
