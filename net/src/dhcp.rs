//! DHCP client: message construction, parsing and the lease state machine.
//!
//! The client walks Idle -> Discover -> Offer -> Request -> Ack. [`DhcpClient::poll`]
//! decides what to transmit and returns it as a [`DhcpAction`];
//! [`DhcpClient::handle_rx`] consumes server replies. Any state short of
//! `Ack` that sees no progress for [`DHCP_TIMEOUT_USEC`] starts over with a
//! fresh Discover.

use tinyip_lib::{klog_debug, klog_info};

use crate::checksum::{get_be32, put_be16, put_be32, put_bytes};
use crate::clock::ustimeout;
use crate::frame::Frame;
use crate::types::{Ipv4Addr, MacAddr};
use crate::udp::UdpDatagram;

pub const UDP_PORT_SERVER: u16 = 67;
pub const UDP_PORT_CLIENT: u16 = 68;

pub const DHCP_TIMEOUT_USEC: u32 = 2_000_000;

const BOOTREQUEST: u8 = 1;
const FLAGS_BROADCAST: u16 = 0x8000;
const MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];

const OPTION_PAD: u8 = 0;
const OPTION_SUBNET_MASK: u8 = 1;
const OPTION_ROUTER: u8 = 3;
const OPTION_DNS: u8 = 6;
const OPTION_HOSTNAME: u8 = 15;
const OPTION_REQUESTED_IP: u8 = 50;
const OPTION_MSG_TYPE: u8 = 53;
const OPTION_SERVER_ID: u8 = 54;
const OPTION_PARAM_REQ_LIST: u8 = 55;
const OPTION_END: u8 = 255;

pub const MSG_DISCOVER: u8 = 1;
pub const MSG_OFFER: u8 = 2;
pub const MSG_REQUEST: u8 = 3;
pub const MSG_ACK: u8 = 5;

/// Fixed BOOTP part, up to and including the magic cookie.
pub const BOOTP_HEADER_LEN: usize = 240;
pub const DHCP_MSG_MAX: usize = 320;

// BOOTP field offsets.
const BOOTP_XID: usize = 4;
const BOOTP_FLAGS: usize = 10;
const BOOTP_YIADDR: usize = 16;
const BOOTP_CHADDR: usize = 28;
const BOOTP_COOKIE: usize = 236;

// =============================================================================
// Packet construction
// =============================================================================

/// Write the BOOTP header shared by Discover and Request. Returns the offset
/// where options begin.
fn write_bootp_header(out: &mut [u8; DHCP_MSG_MAX], mac: MacAddr, xid: u32) -> usize {
    out.fill(0);
    out[0] = BOOTREQUEST;
    out[1] = 1; // htype: Ethernet
    out[2] = 6; // hlen: 6-byte MAC
    put_be32(out, BOOTP_XID, xid);
    put_be16(out, BOOTP_FLAGS, FLAGS_BROADCAST);
    put_bytes(out, BOOTP_CHADDR, &mac.0);
    put_bytes(out, BOOTP_COOKIE, &MAGIC_COOKIE);
    BOOTP_HEADER_LEN
}

/// Discover asking for subnet mask, router, DNS server and host name.
pub fn build_discover(mac: MacAddr, xid: u32, out: &mut [u8; DHCP_MSG_MAX]) -> usize {
    let mut i = write_bootp_header(out, mac, xid);
    out[i..i + 3].copy_from_slice(&[OPTION_MSG_TYPE, 1, MSG_DISCOVER]);
    i += 3;
    out[i..i + 6].copy_from_slice(&[
        OPTION_PARAM_REQ_LIST,
        4,
        OPTION_SUBNET_MASK,
        OPTION_ROUTER,
        OPTION_DNS,
        OPTION_HOSTNAME,
    ]);
    i += 6;
    out[i] = OPTION_END;
    i + 1
}

/// Request for the offered address, naming the offering server when known.
pub fn build_request(
    mac: MacAddr,
    xid: u32,
    requested: Ipv4Addr,
    server_id: Ipv4Addr,
    out: &mut [u8; DHCP_MSG_MAX],
) -> usize {
    let mut i = write_bootp_header(out, mac, xid);
    out[i..i + 3].copy_from_slice(&[OPTION_MSG_TYPE, 1, MSG_REQUEST]);
    i += 3;

    out[i] = OPTION_REQUESTED_IP;
    out[i + 1] = 4;
    out[i + 2..i + 6].copy_from_slice(&requested.0);
    i += 6;

    if !server_id.is_unspecified() {
        out[i] = OPTION_SERVER_ID;
        out[i + 1] = 4;
        out[i + 2..i + 6].copy_from_slice(&server_id.0);
        i += 6;
    }

    out[i] = OPTION_END;
    i + 1
}

// =============================================================================
// Parsing
// =============================================================================

#[derive(Clone, Copy, Default)]
struct DhcpOptions {
    message_type: u8,
    server_id: Ipv4Addr,
    subnet_mask: Option<Ipv4Addr>,
    router: Option<Ipv4Addr>,
    dns: Option<Ipv4Addr>,
}

/// Walk the option TLVs up to END or the end of `options`.
///
/// Unknown codes are skipped by their length; a TLV running past the end
/// stops the walk.
fn parse_options(options: &[u8]) -> DhcpOptions {
    let mut opts = DhcpOptions::default();
    let mut i = 0usize;
    while i < options.len() {
        let code = options[i];
        if code == OPTION_END {
            break;
        }
        if code == OPTION_PAD {
            i += 1;
            continue;
        }
        if i + 1 >= options.len() {
            break;
        }
        let len = options[i + 1] as usize;
        if i + 2 + len > options.len() {
            break;
        }

        let data = &options[i + 2..i + 2 + len];
        let first_addr = (len >= 4).then(|| Ipv4Addr::read_from(data, 0));
        match code {
            OPTION_MSG_TYPE if len >= 1 => opts.message_type = data[0],
            OPTION_SERVER_ID => opts.server_id = first_addr.unwrap_or(Ipv4Addr::UNSPECIFIED),
            OPTION_SUBNET_MASK => opts.subnet_mask = first_addr,
            OPTION_ROUTER => opts.router = first_addr,
            OPTION_DNS => opts.dns = first_addr,
            _ => {}
        }

        i += 2 + len;
    }
    opts
}

// =============================================================================
// Client state machine
// =============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DhcpState {
    #[default]
    Idle,
    Discover,
    Offer,
    Request,
    Ack,
}

/// Addresses handed out by the server. Absent options stay unspecified.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DhcpLease {
    pub ipv4: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    pub router: Ipv4Addr,
    pub dns: Ipv4Addr,
}

impl DhcpLease {
    pub fn is_valid(&self) -> bool {
        !self.ipv4.is_unspecified()
    }
}

/// Transmit requested by [`DhcpClient::poll`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DhcpAction {
    /// Broadcast a Discover. Our address is dropped until a new lease.
    SendDiscover { xid: u32 },
    /// Request the offered address from the host that offered it, at the
    /// broadcast IP.
    SendRequest {
        xid: u32,
        requested: Ipv4Addr,
        server_id: Ipv4Addr,
        server_mac: MacAddr,
    },
}

/// Outcome of a consumed server reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DhcpEvent {
    Offered(Ipv4Addr),
    Bound(DhcpLease),
    /// For us, but not the reply the current state waits for.
    Ignored,
}

/// Two-valued latch behind [`DhcpClient::take_lease_complete`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum LeaseLatch {
    #[default]
    Waiting,
    Completed,
    Reported,
}

pub struct DhcpClient {
    state: DhcpState,
    next_xid: u32,
    xid: u32,
    offered: Ipv4Addr,
    server_id: Ipv4Addr,
    host_mac: MacAddr,
    ticks: u32,
    lease: DhcpLease,
    latch: LeaseLatch,
}

impl DhcpClient {
    pub const fn new() -> Self {
        Self {
            state: DhcpState::Idle,
            next_xid: 1,
            xid: 0,
            offered: Ipv4Addr::UNSPECIFIED,
            server_id: Ipv4Addr::UNSPECIFIED,
            host_mac: MacAddr::BROADCAST,
            ticks: 0,
            lease: DhcpLease {
                ipv4: Ipv4Addr::UNSPECIFIED,
                subnet_mask: Ipv4Addr::UNSPECIFIED,
                router: Ipv4Addr::UNSPECIFIED,
                dns: Ipv4Addr::UNSPECIFIED,
            },
            latch: LeaseLatch::Waiting,
        }
    }

    pub fn state(&self) -> DhcpState {
        self.state
    }

    pub fn lease(&self) -> Option<DhcpLease> {
        (self.state == DhcpState::Ack).then_some(self.lease)
    }

    fn take_xid(&mut self) -> u32 {
        self.xid = self.next_xid;
        self.next_xid = self.next_xid.wrapping_add(1);
        self.xid
    }

    /// Decide the next transmit, if any.
    pub fn poll(&mut self, now: u32) -> Option<DhcpAction> {
        let timed_out = self.state != DhcpState::Ack
            && ustimeout(&mut self.ticks, now, DHCP_TIMEOUT_USEC);
        if self.state == DhcpState::Idle || timed_out {
            self.ticks = now;
            self.state = DhcpState::Discover;
            let xid = self.take_xid();
            klog_debug!("dhcp: discover xid {}", xid);
            Some(DhcpAction::SendDiscover { xid })
        } else if self.state == DhcpState::Offer {
            self.ticks = now;
            self.state = DhcpState::Request;
            let xid = self.take_xid();
            klog_debug!("dhcp: request {} xid {}", self.offered, xid);
            Some(DhcpAction::SendRequest {
                xid,
                requested: self.offered,
                server_id: self.server_id,
                server_mac: self.host_mac,
            })
        } else {
            None
        }
    }

    /// Consume a reply addressed to the client port.
    ///
    /// Returns `None` when the frame is not a DHCP reply for our hardware
    /// address, so the rest of the chain still sees it.
    pub fn handle_rx(
        &mut self,
        frame: &Frame<'_>,
        my_mac: MacAddr,
        my_ip: Ipv4Addr,
    ) -> Option<DhcpEvent> {
        let dgram = UdpDatagram::parse(frame, my_mac, my_ip)?;
        if dgram.dst_port != UDP_PORT_CLIENT {
            return None;
        }
        let msg = dgram.payload;
        if msg.len() < BOOTP_HEADER_LEN || MacAddr::read_from(msg, BOOTP_CHADDR) != my_mac {
            return None;
        }
        self.host_mac = dgram.src_mac;

        if get_be32(msg, BOOTP_XID) != self.xid || msg[BOOTP_COOKIE..BOOTP_HEADER_LEN] != MAGIC_COOKIE
        {
            klog_debug!("dhcp: stale or malformed reply dropped");
            return Some(DhcpEvent::Ignored);
        }
        let opts = parse_options(&msg[BOOTP_HEADER_LEN..]);
        let yiaddr = Ipv4Addr::read_from(msg, BOOTP_YIADDR);

        match (self.state, opts.message_type) {
            (DhcpState::Discover, MSG_OFFER) => {
                self.offered = yiaddr;
                self.server_id = opts.server_id;
                self.state = DhcpState::Offer;
                klog_debug!("dhcp: offer {} from {}", yiaddr, dgram.src_ip);
                Some(DhcpEvent::Offered(yiaddr))
            }
            (DhcpState::Request, MSG_ACK) => {
                let unset = Ipv4Addr::UNSPECIFIED;
                self.lease = DhcpLease {
                    ipv4: yiaddr,
                    subnet_mask: opts.subnet_mask.unwrap_or(unset),
                    router: opts.router.unwrap_or(unset),
                    dns: opts.dns.unwrap_or(unset),
                };
                self.state = DhcpState::Ack;
                self.latch = LeaseLatch::Completed;
                klog_info!(
                    "dhcp: lease {} mask {} router {} dns {}",
                    self.lease.ipv4,
                    self.lease.subnet_mask,
                    self.lease.router,
                    self.lease.dns
                );
                Some(DhcpEvent::Bound(self.lease))
            }
            _ => Some(DhcpEvent::Ignored),
        }
    }

    /// True exactly once after a lease has been acknowledged.
    pub fn take_lease_complete(&mut self) -> bool {
        if self.latch == LeaseLatch::Completed {
            self.latch = LeaseLatch::Reported;
            return true;
        }
        false
    }
}

impl Default for DhcpClient {
    fn default() -> Self {
        Self::new()
    }
}
