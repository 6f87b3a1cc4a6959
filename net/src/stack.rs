//! The network stack: interface state, the poll cycle and the socket API.
//!
//! [`NetStack`] owns the link, the clock, one receive buffer and one transmit
//! path. Everything runs from [`NetStack::poll`]: read at most one inbound
//! frame and run it through the handler chain, drive DHCP while the link is
//! up, then sweep every stream socket through its timers. Calls that wait
//! (`recvfrom`, `resolve`) spin on `poll` until they are satisfied or time
//! out.

use core::fmt;

use tinyip_abi::net::{
    AF_INET, NetInfo, SO_RCVTIMEO, SOCK_DGRAM, SOCK_STREAM, SOL_SOCKET, SockAddrIn, TimeVal,
};
use tinyip_lib::{klog_debug, klog_info};

use crate::arp::{self, ArpAction, ArpCache, ArpOp};
use crate::clock::{Clock, ustimeout};
use crate::config::NetConfig;
use crate::dhcp::{
    self, DHCP_MSG_MAX, DhcpAction, DhcpClient, DhcpEvent, DhcpLease, UDP_PORT_CLIENT,
    UDP_PORT_SERVER,
};
use crate::dns::{DNS_MAX_MESSAGE, DNS_PORT, DnsResolver};
use crate::event::{Handler, HandlerChain};
use crate::frame::{Frame, MAX_FRAME_LEN};
use crate::icmp::{self, ICMP_ECHO_REQUEST, IcmpAction, PingState};
use crate::ipv4::next_hop;
use crate::link::{Channel, Link};
use crate::router::{RequestFn, RequestRouter};
use crate::socket::{SOCK_RX_MAX, SockKind, SocketTable};
use crate::tcp::{TcpFlags, TcpSegment, TcpState};
use crate::tcp_socket::{TcpContext, flush_tx, send_reset, sock_step};
use crate::tx::{Tx, TxPath};
use crate::types::{IpProtocol, Ipv4Addr, MacAddr, NetError, SockAddr, SocketHandle};
use crate::udp::UdpDatagram;

/// Interval between repeated ARP requests or queries in [`NetStack::resolve`].
const RESOLVE_RETRY_USEC: u32 = 1_000_000;

// =============================================================================
// Interface configuration
// =============================================================================

/// Current addressing of the single interface.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct IfaceConfig {
    pub mac: MacAddr,
    pub ipv4_addr: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub dns: Ipv4Addr,
}

impl IfaceConfig {
    #[inline]
    pub fn is_local(&self, ip: Ipv4Addr) -> bool {
        Ipv4Addr::in_subnet(ip, self.ipv4_addr, self.netmask)
    }

    /// Leading one bits of the netmask.
    #[inline]
    pub fn prefix_len(&self) -> u8 {
        self.netmask.to_u32_be().leading_ones() as u8
    }

    pub fn is_configured(&self) -> bool {
        !self.ipv4_addr.is_unspecified()
    }

    fn apply_lease(&mut self, lease: &DhcpLease) {
        self.ipv4_addr = lease.ipv4;
        self.netmask = lease.subnet_mask;
        self.gateway = lease.router;
        self.dns = lease.dns;
    }
}

impl fmt::Debug for IfaceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IfaceConfig {{ mac={}, ip={}/{}, gw={}, dns={} }}",
            self.mac,
            self.ipv4_addr,
            self.prefix_len(),
            self.gateway,
            self.dns,
        )
    }
}

impl fmt::Display for IfaceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}/{} gw {} dns {}",
            self.mac,
            self.ipv4_addr,
            self.prefix_len(),
            self.gateway,
            self.dns,
        )
    }
}

/// Frame counters kept by the dispatcher.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NetCounters {
    pub rx_frames: u32,
    pub rx_control: u32,
    pub rx_event: u32,
    /// Data frames no handler consumed.
    pub rx_unhandled: u32,
    pub tx_frames: u32,
    pub tx_errors: u32,
}

// =============================================================================
// Protocol state
// =============================================================================

/// Everything a handler may touch, kept apart from the link and buffers so
/// a frame borrowed from the receive buffer can be dispatched against it.
struct NetState {
    iface: IfaceConfig,
    dhcp_enabled: bool,
    arp: ArpCache,
    sockets: SocketTable,
    dhcp: DhcpClient,
    dns: DnsResolver,
    ping: PingState,
    chain: HandlerChain,
    routes: RequestRouter,
    accepted: Option<SocketHandle>,
    counters: NetCounters,
}

impl NetState {
    /// Offer one frame to the handler chain. Returns true if it was consumed.
    fn dispatch(&mut self, tx: &mut Tx<'_>, frame: &Frame<'_>, now: u32) -> bool {
        match frame.channel() {
            Channel::Control => {
                self.counters.rx_control = self.counters.rx_control.wrapping_add(1);
                return false;
            }
            Channel::Event => {
                self.counters.rx_event = self.counters.rx_event.wrapping_add(1);
                return false;
            }
            Channel::Data => {}
        }
        self.counters.rx_frames = self.counters.rx_frames.wrapping_add(1);

        let chain = self.chain;
        for handler in chain.iter() {
            if self.run_handler(handler, tx, frame, now) {
                return true;
            }
        }

        self.counters.rx_unhandled = self.counters.rx_unhandled.wrapping_add(1);
        if let Some(seg) = TcpSegment::parse(frame, self.iface.mac, self.iface.ipv4_addr) {
            if !seg.flags.contains(TcpFlags::RST) {
                send_reset(tx, seg.src_mac, seg.src_ip, &seg);
            }
            return false;
        }
        klog_debug!(
            "net: unhandled {}-byte frame type {:#06x}",
            frame.len(),
            frame.ethertype()
        );
        false
    }

    fn run_handler(
        &mut self,
        handler: Handler,
        tx: &mut Tx<'_>,
        frame: &Frame<'_>,
        now: u32,
    ) -> bool {
        let (my_mac, my_ip) = (self.iface.mac, self.iface.ipv4_addr);
        match handler {
            Handler::Arp => {
                let Some(action) = arp::handle_rx(frame, &mut self.arp, my_mac, my_ip) else {
                    return false;
                };
                match action {
                    ArpAction::SendReply { mac, ip } => {
                        klog_debug!("arp: reply to {} ({})", ip, mac);
                        let _ = tx.send_arp(ArpOp::Response, mac, ip);
                    }
                    ArpAction::Saved { mac, ip } => klog_debug!("arp: {} is at {}", ip, mac),
                    ArpAction::None => {}
                }
                true
            }

            Handler::Icmp => {
                let Some(action) = icmp::handle_rx(frame, my_mac, my_ip) else {
                    return false;
                };
                match action {
                    IcmpAction::ReplyToEcho => {
                        let _ = tx.send_rewritten(frame.bytes(), icmp::make_echo_reply);
                    }
                    IcmpAction::EchoReply { from, seq } => {
                        self.ping.record_rx(now);
                        klog_debug!("icmp: echo reply from {} seq {}", from, seq);
                    }
                    IcmpAction::Ignored => {}
                }
                true
            }

            Handler::Dhcp => {
                if !self.dhcp_enabled {
                    return false;
                }
                match self.dhcp.handle_rx(frame, my_mac, my_ip) {
                    Some(DhcpEvent::Bound(lease)) => {
                        self.iface.apply_lease(&lease);
                        klog_info!("net: configured {}", self.iface);
                        true
                    }
                    Some(_) => true,
                    None => false,
                }
            }

            Handler::Udp => {
                let Some(dgram) = UdpDatagram::parse(frame, my_mac, my_ip) else {
                    return false;
                };
                if dgram.src_port == DNS_PORT && dgram.dst_port == self.dns.port() {
                    self.dns.handle_response(dgram.payload);
                    return true;
                }
                let Some(idx) = self
                    .sockets
                    .udp_match(dgram.src_ip, dgram.src_port, dgram.dst_port)
                else {
                    return false;
                };
                let Some(sock) = self.sockets.slot_mut(idx) else {
                    return false;
                };
                sock.rem_mac = dgram.src_mac;
                let from = SockAddr::new(dgram.src_ip, dgram.src_port);
                if !sock.deliver(from, dgram.payload) {
                    klog_debug!("udp: sock {} unread datagram overwritten", idx);
                }
                true
            }

            Handler::TcpServer(port) => {
                if frame.ip_proto() != IpProtocol::Tcp.as_u8()
                    || TcpSegment::peek_dst_port(frame) != port
                {
                    return false;
                }
                let Some(seg) = TcpSegment::parse(frame, my_mac, my_ip) else {
                    return false;
                };
                let Some(idx) =
                    self.sockets
                        .tcp_match(seg.src_ip, seg.src_port, seg.dst_port, seg.flags)
                else {
                    return false;
                };
                let Some(sock) = self.sockets.slot_mut(idx) else {
                    return false;
                };
                let mut ctx = TcpContext {
                    tx,
                    routes: &self.routes,
                    now,
                };
                if sock_step(sock, SocketHandle(idx), Some(&seg), &mut ctx) {
                    self.accepted = Some(SocketHandle(idx));
                }
                true
            }
        }
    }

    /// Step every stream socket that has a connection state.
    fn tcp_sweep(&mut self, tx: &mut Tx<'_>, now: u32) {
        let mut ctx = TcpContext {
            tx,
            routes: &self.routes,
            now,
        };
        for idx in 0..self.sockets.capacity() {
            if let Some(sock) = self.sockets.slot_mut(idx) {
                if sock.is_stream() && sock.tcp.state != TcpState::Closed {
                    sock_step(sock, SocketHandle(idx), None, &mut ctx);
                }
            }
        }
    }

    fn next_hop(&self, ip: Ipv4Addr) -> Ipv4Addr {
        next_hop(ip, self.iface.ipv4_addr, self.iface.netmask, self.iface.gateway)
    }
}

// =============================================================================
// NetStack
// =============================================================================

pub struct NetStack<L: Link, C: Clock> {
    link: L,
    clock: C,
    rx_buf: [u8; MAX_FRAME_LEN],
    tx: TxPath,
    state: NetState,
}

impl<L: Link, C: Clock> NetStack<L, C> {
    pub fn new(config: NetConfig, link: L, clock: C) -> Self {
        let iface = IfaceConfig {
            mac: config.mac,
            ipv4_addr: config.ipv4.addr,
            netmask: config.ipv4.netmask,
            gateway: config.ipv4.router,
            dns: config.ipv4.dns,
        };
        klog_info!(
            "net: init {} dhcp {}",
            iface,
            if config.dhcp { "on" } else { "off" }
        );
        Self {
            link,
            clock,
            rx_buf: [0; MAX_FRAME_LEN],
            tx: TxPath::new(),
            state: NetState {
                iface,
                dhcp_enabled: config.dhcp,
                arp: ArpCache::new(),
                sockets: SocketTable::new(),
                dhcp: DhcpClient::new(),
                dns: DnsResolver::new(config.dns_port),
                ping: PingState::new(),
                chain: HandlerChain::new(),
                routes: RequestRouter::new(),
                accepted: None,
                counters: NetCounters::default(),
            },
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn iface(&self) -> &IfaceConfig {
        &self.state.iface
    }

    pub fn arp_cache(&self) -> &ArpCache {
        &self.state.arp
    }

    pub fn sockets(&self) -> &SocketTable {
        &self.state.sockets
    }

    pub fn dhcp(&self) -> &DhcpClient {
        &self.state.dhcp
    }

    pub fn counters(&self) -> NetCounters {
        NetCounters {
            tx_frames: self.tx.frames_sent(),
            tx_errors: self.tx.tx_errors(),
            ..self.state.counters
        }
    }

    // --- poll cycle ---------------------------------------------------------

    /// One pass: at most one inbound frame, DHCP, then the TCP timer sweep.
    pub fn poll(&mut self) {
        let Self {
            link,
            clock,
            rx_buf,
            tx,
            state,
        } = self;
        let now = clock.now_usec();

        if let Some((channel, len)) = link.poll_rx(&mut rx_buf[..]) {
            let frame = Frame::new(channel, &rx_buf[..len.min(MAX_FRAME_LEN)]);
            let mut tx = tx.begin(&mut *link, state.iface.mac, state.iface.ipv4_addr);
            state.dispatch(&mut tx, &frame, now);
        }

        if state.dhcp_enabled && link.link_check().is_up() {
            if let Some(action) = state.dhcp.poll(now) {
                if matches!(action, DhcpAction::SendDiscover { .. }) {
                    state.iface.ipv4_addr = Ipv4Addr::UNSPECIFIED;
                }
                let mut msg = [0u8; DHCP_MSG_MAX];
                let (len, dst_mac) = match action {
                    DhcpAction::SendDiscover { xid } => (
                        dhcp::build_discover(state.iface.mac, xid, &mut msg),
                        MacAddr::BROADCAST,
                    ),
                    DhcpAction::SendRequest {
                        xid,
                        requested,
                        server_id,
                        server_mac,
                    } => (
                        dhcp::build_request(state.iface.mac, xid, requested, server_id, &mut msg),
                        server_mac,
                    ),
                };
                let mut tx = tx.begin(&mut *link, state.iface.mac, state.iface.ipv4_addr);
                let _ = tx.send_udp(
                    dst_mac,
                    Ipv4Addr::BROADCAST,
                    UDP_PORT_CLIENT,
                    UDP_PORT_SERVER,
                    &msg[..len],
                );
            }
        }

        let mut tx = tx.begin(&mut *link, state.iface.mac, state.iface.ipv4_addr);
        state.tcp_sweep(&mut tx, now);
    }

    /// Run one block from the link through the handler chain.
    pub fn dispatch(&mut self, channel: Channel, bytes: &[u8]) -> bool {
        let now = self.clock.now_usec();
        let frame = Frame::new(channel, bytes);
        let mut tx = self
            .tx
            .begin(&mut self.link, self.state.iface.mac, self.state.iface.ipv4_addr);
        self.state.dispatch(&mut tx, &frame, now)
    }

    /// True exactly once after a DHCP lease has been acknowledged.
    pub fn take_lease_complete(&mut self) -> bool {
        self.state.dhcp.take_lease_complete()
    }

    pub fn add_handler(&mut self, handler: Handler) -> bool {
        self.state.chain.add(handler)
    }

    pub fn add_route(&mut self, prefix: &'static str, handler: RequestFn) -> bool {
        self.state.routes.add(prefix, handler)
    }

    // --- sockets ------------------------------------------------------------

    pub fn socket(&mut self, domain: u16, kind: u16) -> Result<SocketHandle, NetError> {
        if domain != AF_INET {
            return Err(NetError::AddressFamilyNotSupported);
        }
        let kind = match kind {
            SOCK_DGRAM => SockKind::Datagram,
            SOCK_STREAM => SockKind::Stream,
            _ => return Err(NetError::InvalidArgument),
        };
        let handle = self.state.sockets.alloc(kind)?;
        klog_debug!("net: sock {} {:?}", handle, kind);
        Ok(handle)
    }

    pub fn bind(&mut self, sock: SocketHandle, addr: &SockAddrIn) -> Result<(), NetError> {
        let addr = SockAddr::from_user(addr)?;
        if addr.port == 0 {
            return Err(NetError::InvalidArgument);
        }
        let sockets = &mut self.state.sockets;
        let s = sockets.get(sock)?;
        if s.is_datagram() && sockets.udp_port_in_use(addr.port, sock) {
            return Err(NetError::AddressInUse);
        }
        if s.is_stream() && s.tcp.state != TcpState::Closed {
            return Err(NetError::InvalidArgument);
        }
        sockets.get_mut(sock)?.loc_port = addr.port;
        Ok(())
    }

    /// Listen on the bound port with `backlog` sockets in total.
    pub fn listen(&mut self, sock: SocketHandle, backlog: usize) -> Result<(), NetError> {
        let state = &mut self.state;
        let s = state.sockets.get_mut(sock)?;
        if !s.is_stream() {
            return Err(NetError::OperationNotSupported);
        }
        if s.loc_port == 0 {
            return Err(NetError::NotBound);
        }
        let (port, timeout) = (s.loc_port, s.timeout_usec);
        s.tcp.state = TcpState::Listen;

        for _ in 1..backlog {
            let Ok(clone) = state.sockets.alloc(SockKind::Stream) else {
                klog_debug!("tcp: backlog for port {} cut short", port);
                break;
            };
            let c = state.sockets.get_mut(clone)?;
            c.loc_port = port;
            c.timeout_usec = timeout;
            c.tcp.state = TcpState::Listen;
        }

        let handler = Handler::TcpServer(port);
        if !state.chain.contains(handler) && !state.chain.add(handler) {
            return Err(NetError::NoBufferSpace);
        }
        klog_debug!("tcp: listening on port {}", port);
        Ok(())
    }

    /// Latest passive open on the same port as `sock`.
    pub fn accept(&mut self, sock: SocketHandle) -> Result<(SocketHandle, SockAddr), NetError> {
        let state = &mut self.state;
        let s = state.sockets.get(sock)?;
        if !s.is_stream() {
            return Err(NetError::OperationNotSupported);
        }
        let port = s.loc_port;
        match state.accepted {
            Some(h) => {
                let conn = state.sockets.get(h)?;
                if conn.loc_port != port {
                    return Err(NetError::WouldBlock);
                }
                state.accepted = None;
                Ok((h, conn.remote()))
            }
            None => Err(NetError::WouldBlock),
        }
    }

    /// Wait for the pending buffer, polling the stack meanwhile.
    ///
    /// A zero receive timeout waits forever; otherwise the timer starts at
    /// this call.
    pub fn recvfrom(
        &mut self,
        sock: SocketHandle,
        buf: &mut [u8],
    ) -> Result<(usize, SockAddr), NetError> {
        let timeout = self.state.sockets.get(sock)?.timeout_usec;
        let mut ticks = self.clock.now_usec();
        loop {
            if let Some(got) = self.state.sockets.get_mut(sock)?.take_pending(buf) {
                return Ok(got);
            }
            if timeout != 0 && ustimeout(&mut ticks, self.clock.now_usec(), timeout) {
                return Err(NetError::TimedOut);
            }
            self.poll();
        }
    }

    pub fn recv(&mut self, sock: SocketHandle, buf: &mut [u8]) -> Result<usize, NetError> {
        self.recvfrom(sock, buf).map(|(n, _)| n)
    }

    /// Send one datagram to `to`.
    pub fn sendto(
        &mut self,
        sock: SocketHandle,
        data: &[u8],
        to: &SockAddr,
    ) -> Result<usize, NetError> {
        let s = self.state.sockets.get(sock)?;
        if !s.is_datagram() {
            return Err(NetError::OperationNotSupported);
        }
        if s.loc_port == 0 {
            return Err(NetError::NotBound);
        }
        if data.len() > SOCK_RX_MAX {
            return Err(NetError::NoBufferSpace);
        }
        let (loc_port, last, last_mac) = (s.loc_port, s.last_sender(), s.rem_mac);

        let dst_mac = if *to == last && !last_mac.is_zero() {
            last_mac
        } else if to.ip.is_broadcast() {
            MacAddr::BROADCAST
        } else {
            self.resolve_mac(to.ip)
                .map_err(|_| NetError::HostUnreachable)?
        };

        let mut tx = self
            .tx
            .begin(&mut self.link, self.state.iface.mac, self.state.iface.ipv4_addr);
        tx.send_udp(dst_mac, to.ip, loc_port, to.port, data)?;
        Ok(data.len())
    }

    /// Datagram to the last sender, or stream data sent at once with ACK.
    pub fn send(&mut self, sock: SocketHandle, data: &[u8]) -> Result<usize, NetError> {
        let s = self.state.sockets.get(sock)?;
        if s.is_datagram() {
            let to = s.last_sender();
            if to.port == 0 {
                return Err(NetError::NotConnected);
            }
            return self.sendto(sock, data, &to);
        }

        let now = self.clock.now_usec();
        let Self {
            link, tx, state, ..
        } = self;
        let s = state.sockets.get_mut(sock)?;
        if s.tcp.state != TcpState::Established {
            return Err(NetError::NotConnected);
        }
        if s.add_tx_data(data) == 0 {
            return Err(NetError::NoBufferSpace);
        }
        let mut tx = tx.begin(&mut *link, state.iface.mac, state.iface.ipv4_addr);
        let mut ctx = TcpContext {
            tx: &mut tx,
            routes: &state.routes,
            now,
        };
        flush_tx(s, &mut ctx);
        Ok(data.len())
    }

    pub fn setsockopt(
        &mut self,
        sock: SocketHandle,
        level: u16,
        optname: u16,
        value: &TimeVal,
    ) -> Result<(), NetError> {
        if level != SOL_SOCKET || optname != SO_RCVTIMEO {
            return Err(NetError::InvalidArgument);
        }
        self.set_recv_timeout(sock, value.as_usec())
    }

    pub fn set_recv_timeout(&mut self, sock: SocketHandle, usec: u32) -> Result<(), NetError> {
        self.state.sockets.get_mut(sock)?.timeout_usec = usec;
        Ok(())
    }

    /// Release a datagram socket or an idle stream socket; a connected stream
    /// closes once its current exchange completes.
    pub fn close(&mut self, sock: SocketHandle) -> Result<(), NetError> {
        let state = &mut self.state;
        let s = state.sockets.get_mut(sock)?;
        if s.is_stream() && !matches!(s.tcp.state, TcpState::Closed | TcpState::Listen) {
            s.tcp.close = true;
            return Ok(());
        }
        state.sockets.release(sock);
        if state.accepted == Some(sock) {
            state.accepted = None;
        }
        Ok(())
    }

    pub fn socket_state(&self, sock: SocketHandle) -> Result<TcpState, NetError> {
        Ok(self.state.sockets.get(sock)?.tcp.state)
    }

    /// How the socket's last connection ended (`TimeWait`, `Finished` or
    /// `Failed`), once. The slot is already listening again by the time a
    /// `poll` returns, so this is where a caller sees a reset or a timeout.
    pub fn take_connection_end(
        &mut self,
        sock: SocketHandle,
    ) -> Result<Option<TcpState>, NetError> {
        Ok(self.state.sockets.get_mut(sock)?.last_end.take())
    }

    pub fn net_info(&mut self) -> NetInfo {
        let iface = self.state.iface;
        NetInfo {
            ipv4: iface.ipv4_addr.0,
            subnet_mask: iface.netmask.0,
            gateway: iface.gateway.0,
            dns: iface.dns.0,
            mac: iface.mac.0,
            link_up: u8::from(self.link.link_check().is_up()),
            configured: u8::from(iface.is_configured()),
        }
    }

    // --- ARP and ping -------------------------------------------------------

    /// Gateway for `ip`, or `ip` itself when it is on the local subnet.
    pub fn next_hop(&self, ip: Ipv4Addr) -> Ipv4Addr {
        self.state.next_hop(ip)
    }

    pub fn arp_lookup(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        self.state.arp.find(ip)
    }

    pub fn arp_request(&mut self, ip: Ipv4Addr) -> Result<(), NetError> {
        let mut tx = self
            .tx
            .begin(&mut self.link, self.state.iface.mac, self.state.iface.ipv4_addr);
        tx.send_arp(ArpOp::Request, MacAddr::BROADCAST, ip)
    }

    /// Cached MAC of the next hop towards `ip`; on a miss an ARP request
    /// goes out and the caller should retry.
    fn resolve_mac(&mut self, ip: Ipv4Addr) -> Result<MacAddr, NetError> {
        let hop = self.state.next_hop(ip);
        match self.state.arp.find(hop) {
            Some(mac) => Ok(mac),
            None => {
                self.arp_request(hop)?;
                Err(NetError::WouldBlock)
            }
        }
    }

    /// Send an echo request, returning its sequence number.
    pub fn ping(&mut self, ip: Ipv4Addr, data: &[u8]) -> Result<u16, NetError> {
        let mac = self.resolve_mac(ip)?;
        let now = self.clock.now_usec();
        let seq = self.state.ping.next_seq();
        let mut tx = self
            .tx
            .begin(&mut self.link, self.state.iface.mac, self.state.iface.ipv4_addr);
        tx.send_icmp(mac, ip, ICMP_ECHO_REQUEST, seq, data)?;
        self.state.ping.record_tx(now);
        Ok(seq)
    }

    pub fn ping_rtt(&self) -> Option<u32> {
        self.state.ping.rtt_usec()
    }

    // --- DNS ----------------------------------------------------------------

    /// Send an A query for `name` to the configured server.
    pub fn dns_query(&mut self, name: &str) -> Result<(), NetError> {
        self.send_dns_query(name, false)
    }

    /// With `retry`, the outstanding query goes out again under the same id.
    fn send_dns_query(&mut self, name: &str, retry: bool) -> Result<(), NetError> {
        let server = self.state.iface.dns;
        if server.is_unspecified() {
            return Err(NetError::HostUnreachable);
        }
        let mac = self.resolve_mac(server)?;
        let mut msg = [0u8; DNS_MAX_MESSAGE];
        let dns = &mut self.state.dns;
        let built = if retry {
            dns.retry_query(name.as_bytes(), &mut msg)
        } else {
            dns.start_query(name.as_bytes(), &mut msg)
        };
        let len = built.ok_or(NetError::InvalidArgument)?;
        let port = self.state.dns.port();
        let mut tx = self
            .tx
            .begin(&mut self.link, self.state.iface.mac, self.state.iface.ipv4_addr);
        tx.send_udp(mac, server, port, DNS_PORT, &msg[..len])
    }

    pub fn dns_answer(&self) -> Option<Ipv4Addr> {
        self.state.dns.answer()
    }

    /// Query and poll until an answer arrives or `timeout_usec` passes.
    ///
    /// Retries go out once a second under the first query's id, so an answer
    /// to any copy is taken.
    pub fn resolve(&mut self, name: &str, timeout_usec: u32) -> Result<Ipv4Addr, NetError> {
        let start = self.clock.now_usec();
        let mut retry = start;
        let mut first = true;
        let mut sent = false;
        loop {
            if sent {
                if let Some(addr) = self.state.dns.answer() {
                    return Ok(addr);
                }
            }
            let now = self.clock.now_usec();
            if first || ustimeout(&mut retry, now, RESOLVE_RETRY_USEC) {
                match self.send_dns_query(name, sent) {
                    Ok(()) => sent = true,
                    Err(NetError::WouldBlock) => {}
                    Err(e) => return Err(e),
                }
                first = false;
            }
            if now.wrapping_sub(start) >= timeout_usec {
                klog_debug!("dns: {} timed out", name);
                return Err(NetError::TimedOut);
            }
            self.poll();
        }
    }
}
