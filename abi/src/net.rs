/// Snapshot of the interface addressing, as reported to applications.
#[repr(C)]
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct NetInfo {
    pub ipv4: [u8; 4],
    pub subnet_mask: [u8; 4],
    pub gateway: [u8; 4],
    pub dns: [u8; 4],
    pub mac: [u8; 6],
    pub link_up: u8,
    /// 1 once a DHCP lease (or a static address) is in place.
    pub configured: u8,
}

// =============================================================================
// Socket ABI types
// =============================================================================

/// Address family: IPv4 Internet protocols.
pub const AF_INET: u16 = 2;

/// Socket type: byte-stream (TCP).
pub const SOCK_STREAM: u16 = 1;
/// Socket type: datagram (UDP).
pub const SOCK_DGRAM: u16 = 2;

/// Wildcard local address for `bind`.
pub const INADDR_ANY: [u8; 4] = [0; 4];

/// Socket-level option namespace for `setsockopt`.
pub const SOL_SOCKET: u16 = 0xFFF;
/// Receive timeout option; the value is a [`TimeVal`].
pub const SO_RCVTIMEO: u16 = 0;

/// IPv4 socket address in POSIX `sockaddr_in` layout.
#[repr(C)]
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct SockAddrIn {
    pub family: u16,
    /// Port in **network** byte order (big-endian).
    pub port: u16,
    /// IPv4 address in network byte order.
    pub addr: [u8; 4],
    pub _pad: [u8; 8],
}

impl SockAddrIn {
    /// Build an `AF_INET` address from a host-order port.
    pub const fn new(addr: [u8; 4], port: u16) -> Self {
        Self {
            family: AF_INET,
            port: port.to_be(),
            addr,
            _pad: [0; 8],
        }
    }
}

/// Timeout value for [`SO_RCVTIMEO`].
#[repr(C)]
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct TimeVal {
    pub tv_sec: u32,
    pub tv_usec: u32,
}

impl TimeVal {
    /// Total microseconds, saturating at `u32::MAX`.
    pub const fn as_usec(&self) -> u32 {
        self.tv_sec.saturating_mul(1_000_000).saturating_add(self.tv_usec)
    }
}

/// Number of socket slots shared by datagram and stream sockets.
pub const NUM_NET_SOCKETS: usize = 5;
