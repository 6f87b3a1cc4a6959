//! The unified socket table shared by UDP and TCP.
//!
//! A fixed arena of [`NUM_NET_SOCKETS`] slots indexed by [`SocketHandle`].
//! Datagram and stream sockets share the slot layout; the stream-only
//! connection state lives in [`TcpControl`]. Each slot holds at most one
//! pending receive buffer, copied out of the frame at delivery time: a second
//! arrival before the first is read replaces it.

use core::array;

use tinyip_abi::net::NUM_NET_SOCKETS;

use crate::frame::{IPV4_HEADER_LEN, MAX_IP_LEN, UDP_HEADER_LEN};
use crate::router::RequestFn;
use crate::tcp::{TCP_MAX_DATA, TcpFlags, TcpState};
use crate::types::{Ipv4Addr, MacAddr, NetError, SockAddr, SocketHandle};

/// Largest payload a pending receive buffer holds.
pub const SOCK_RX_MAX: usize = MAX_IP_LEN - IPV4_HEADER_LEN - UDP_HEADER_LEN;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SockKind {
    Datagram,
    Stream,
}

/// Per-connection TCP bookkeeping.
#[derive(Clone, Copy, Default)]
pub struct TcpControl {
    pub state: TcpState,
    /// Next sequence number we send.
    pub seq: u32,
    /// Next sequence number we expect from the peer.
    pub ack: u32,
    /// Our first data sequence number.
    pub start_seq: u32,
    pub rx_seq: u32,
    pub rx_ack: u32,
    pub last_rx_ack: u32,
    pub rx_flags: TcpFlags,
    pub tries: u32,
    pub errors: u32,
    /// Cooperative close request from the application.
    pub close: bool,
    /// Route handler attached by the first matching request.
    pub route: Option<RequestFn>,
}

#[derive(Clone, Copy)]
struct RxSlot {
    pending: bool,
    len: usize,
    from: SockAddr,
    data: [u8; SOCK_RX_MAX],
}

impl RxSlot {
    const fn new() -> Self {
        Self {
            pending: false,
            len: 0,
            from: SockAddr::new(Ipv4Addr::UNSPECIFIED, 0),
            data: [0; SOCK_RX_MAX],
        }
    }
}

/// One socket slot.
#[derive(Clone, Copy)]
pub struct Socket {
    pub kind: Option<SockKind>,
    pub loc_port: u16,
    pub rem_port: u16,
    pub rem_ip: Ipv4Addr,
    pub rem_mac: MacAddr,
    /// Receive timeout, 0 waits forever.
    pub timeout_usec: u32,
    pub ticks: u32,
    pub tcp: TcpControl,
    /// Terminal state the last connection reached before the slot went back
    /// to `Listen`, kept until the application takes it.
    pub last_end: Option<TcpState>,
    rx: RxSlot,
    tx: [u8; TCP_MAX_DATA],
    tx_len: usize,
}

impl Socket {
    pub const fn new() -> Self {
        Self {
            kind: None,
            loc_port: 0,
            rem_port: 0,
            rem_ip: Ipv4Addr::UNSPECIFIED,
            rem_mac: MacAddr::ZERO,
            timeout_usec: 0,
            ticks: 0,
            tcp: TcpControl {
                state: TcpState::Closed,
                seq: 0,
                ack: 0,
                start_seq: 0,
                rx_seq: 0,
                rx_ack: 0,
                last_rx_ack: 0,
                rx_flags: TcpFlags::empty(),
                tries: 0,
                errors: 0,
                close: false,
                route: None,
            },
            last_end: None,
            rx: RxSlot::new(),
            tx: [0; TCP_MAX_DATA],
            tx_len: 0,
        }
    }

    /// Unused: no ports and never handed out.
    pub fn is_free(&self) -> bool {
        self.kind.is_none() && self.loc_port == 0 && self.rem_port == 0
    }

    pub fn is_stream(&self) -> bool {
        self.kind == Some(SockKind::Stream)
    }

    pub fn is_datagram(&self) -> bool {
        self.kind == Some(SockKind::Datagram)
    }

    pub fn remote(&self) -> SockAddr {
        SockAddr::new(self.rem_ip, self.rem_port)
    }

    // --- receive ------------------------------------------------------------

    /// Copy `data` into the pending buffer, replacing anything unread.
    ///
    /// Returns false if an unread buffer was overwritten.
    pub fn deliver(&mut self, from: SockAddr, data: &[u8]) -> bool {
        let lost = self.rx.pending;
        let n = data.len().min(SOCK_RX_MAX);
        self.rx.data[..n].copy_from_slice(&data[..n]);
        self.rx.len = n;
        self.rx.from = from;
        self.rx.pending = true;
        !lost
    }

    pub fn has_pending(&self) -> bool {
        self.rx.pending
    }

    /// Sender of the most recent delivery, read or not.
    pub fn last_sender(&self) -> SockAddr {
        self.rx.from
    }

    /// Move the pending buffer out: at most `buf.len()` bytes, the rest is
    /// discarded.
    pub fn take_pending(&mut self, buf: &mut [u8]) -> Option<(usize, SockAddr)> {
        if !self.rx.pending {
            return None;
        }
        let n = self.rx.len.min(buf.len());
        buf[..n].copy_from_slice(&self.rx.data[..n]);
        self.rx.pending = false;
        self.rx.len = 0;
        Some((n, self.rx.from))
    }

    // --- transmit -----------------------------------------------------------

    /// Append to the transmit buffer; all or nothing.
    pub fn add_tx_data(&mut self, data: &[u8]) -> usize {
        if data.is_empty() || self.tx_len + data.len() > TCP_MAX_DATA {
            return 0;
        }
        self.tx[self.tx_len..self.tx_len + data.len()].copy_from_slice(data);
        self.tx_len += data.len();
        data.len()
    }

    pub fn tx_len(&self) -> usize {
        self.tx_len
    }

    pub fn tx_data(&self) -> &[u8] {
        &self.tx[..self.tx_len]
    }

    pub fn clear_tx(&mut self) {
        self.tx_len = 0;
    }

    /// Reset to a clean slot that keeps its local port, kind and timeout.
    pub fn clear_connection(&mut self) {
        let (kind, port, timeout) = (self.kind, self.loc_port, self.timeout_usec);
        *self = Self::new();
        self.kind = kind;
        self.loc_port = port;
        self.timeout_usec = timeout;
    }
}

impl Default for Socket {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed socket arena.
pub struct SocketTable {
    slots: [Socket; NUM_NET_SOCKETS],
}

impl SocketTable {
    pub fn new() -> Self {
        Self {
            slots: array::from_fn(|_| Socket::new()),
        }
    }

    /// First free slot, marked with `kind`.
    pub fn alloc(&mut self, kind: SockKind) -> Result<SocketHandle, NetError> {
        let idx = self
            .slots
            .iter()
            .position(Socket::is_free)
            .ok_or(NetError::NoFreeSocket)?;
        self.slots[idx] = Socket::new();
        self.slots[idx].kind = Some(kind);
        Ok(SocketHandle(idx))
    }

    pub fn release(&mut self, handle: SocketHandle) {
        if let Some(slot) = self.slots.get_mut(handle.0) {
            *slot = Socket::new();
        }
    }

    pub fn get(&self, handle: SocketHandle) -> Result<&Socket, NetError> {
        match self.slots.get(handle.0) {
            Some(s) if s.kind.is_some() => Ok(s),
            _ => Err(NetError::BadSocket),
        }
    }

    pub fn get_mut(&mut self, handle: SocketHandle) -> Result<&mut Socket, NetError> {
        match self.slots.get_mut(handle.0) {
            Some(s) if s.kind.is_some() => Ok(s),
            _ => Err(NetError::BadSocket),
        }
    }

    /// Direct slot access for the engine, which iterates by index.
    pub(crate) fn slot_mut(&mut self, idx: usize) -> Option<&mut Socket> {
        self.slots.get_mut(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SocketHandle, &Socket)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, s)| (SocketHandle(i), s))
    }

    pub fn capacity(&self) -> usize {
        NUM_NET_SOCKETS
    }

    /// Datagram socket for an inbound datagram.
    ///
    /// The local port must match, and the socket must either accept any
    /// sender (no remote IP recorded) or be bound to exactly this sender.
    pub fn udp_match(&self, rem_ip: Ipv4Addr, rem_port: u16, loc_port: u16) -> Option<usize> {
        self.slots.iter().position(|s| {
            s.is_datagram()
                && s.loc_port == loc_port
                && (s.rem_ip.is_unspecified() || (s.rem_ip == rem_ip && s.rem_port == rem_port))
        })
    }

    /// Stream socket for an inbound segment.
    ///
    /// A SYN may land on a listening socket with no peer yet, or on the
    /// socket already talking to this peer (a retransmitted SYN). Anything
    /// else needs the exact port/address triple.
    pub fn tcp_match(
        &self,
        rem_ip: Ipv4Addr,
        rem_port: u16,
        loc_port: u16,
        flags: TcpFlags,
    ) -> Option<usize> {
        self.slots.iter().position(|s| {
            if !s.is_stream() || s.loc_port != loc_port {
                return false;
            }
            let same_peer = s.rem_port == rem_port && s.rem_ip == rem_ip;
            if flags.contains(TcpFlags::SYN) {
                (s.rem_port == 0 && s.tcp.state == TcpState::Listen) || same_peer
            } else {
                same_peer
            }
        })
    }

    /// Is `port` owned by a datagram socket other than `except`?
    pub fn udp_port_in_use(&self, port: u16, except: SocketHandle) -> bool {
        self.iter()
            .any(|(h, s)| h != except && s.is_datagram() && s.loc_port == port)
    }
}

impl Default for SocketTable {
    fn default() -> Self {
        Self::new()
    }
}
