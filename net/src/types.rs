//! Type-safe network primitives for the tinyip stack.
//!
//! Newtype wrappers for addresses and ports keep byte-order and
//! address/port confusion out of the protocol code. Addresses are stored
//! byte-wise in wire order, so they can be copied straight out of (and into)
//! unaligned frame buffers.

use core::fmt;

use tinyip_abi::net::{AF_INET, SockAddrIn};

// =============================================================================
// Addresses
// =============================================================================

/// IPv4 address stored in **network byte order** (`[u8; 4]`).
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Ipv4Addr(pub [u8; 4]);

impl Ipv4Addr {
    /// `0.0.0.0`, not yet configured.
    pub const UNSPECIFIED: Self = Self([0, 0, 0, 0]);
    /// `255.255.255.255`, the limited broadcast address.
    pub const BROADCAST: Self = Self([255, 255, 255, 255]);

    #[inline]
    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Self([a, b, c, d])
    }

    /// Construct from a big-endian `u32`.
    #[inline]
    pub const fn from_u32_be(val: u32) -> Self {
        Self(val.to_be_bytes())
    }

    /// Return the address as a big-endian `u32`.
    #[inline]
    pub const fn to_u32_be(self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// `true` if the address is `255.255.255.255`.
    #[inline]
    pub const fn is_broadcast(&self) -> bool {
        (self.0[0] & self.0[1] & self.0[2] & self.0[3]) == 0xff
    }

    /// `true` if the address is `0.0.0.0`.
    #[inline]
    pub const fn is_unspecified(&self) -> bool {
        (self.0[0] | self.0[1] | self.0[2] | self.0[3]) == 0
    }

    /// `true` if `addr` and `network` agree on every bit set in `mask`.
    #[inline]
    pub const fn in_subnet(addr: Ipv4Addr, network: Ipv4Addr, mask: Ipv4Addr) -> bool {
        let m = mask.to_u32_be();
        (addr.to_u32_be() & m) == (network.to_u32_be() & m)
    }

    /// Read four bytes at `off`, or `UNSPECIFIED` if the slice is too short.
    #[inline]
    pub fn read_from(buf: &[u8], off: usize) -> Self {
        match buf.get(off..off + 4) {
            Some(b) => Self([b[0], b[1], b[2], b[3]]),
            None => Self::UNSPECIFIED,
        }
    }

    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Debug for Ipv4Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

impl fmt::Display for Ipv4Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

/// Ethernet MAC address (6 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// `ff:ff:ff:ff:ff:ff`, the broadcast address.
    pub const BROADCAST: Self = Self([0xff; 6]);
    /// `00:00:00:00:00:00`, the zero or unset address.
    pub const ZERO: Self = Self([0; 6]);

    #[inline]
    pub const fn is_broadcast(&self) -> bool {
        (self.0[0] & self.0[1] & self.0[2] & self.0[3] & self.0[4] & self.0[5]) == 0xff
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        (self.0[0] | self.0[1] | self.0[2] | self.0[3] | self.0[4] | self.0[5]) == 0
    }

    /// Read six bytes at `off`, or `ZERO` if the slice is too short.
    #[inline]
    pub fn read_from(buf: &[u8], off: usize) -> Self {
        match buf.get(off..off + 6) {
            Some(b) => Self([b[0], b[1], b[2], b[3], b[4], b[5]]),
            None => Self::ZERO,
        }
    }

    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// Index into the socket table.
///
/// Cannot be confused with a port number or a byte count.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SocketHandle(pub usize);

impl fmt::Display for SocketHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// SockAddr
// =============================================================================

/// Socket address combining an [`Ipv4Addr`] and a host-order port.
///
/// The single conversion point to and from the application-visible
/// [`SockAddrIn`] layout.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SockAddr {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl SockAddr {
    #[inline]
    pub const fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Parse from a [`SockAddrIn`], validating `family == AF_INET`.
    pub fn from_user(raw: &SockAddrIn) -> Result<Self, NetError> {
        if raw.family != AF_INET {
            return Err(NetError::AddressFamilyNotSupported);
        }
        Ok(Self {
            ip: Ipv4Addr(raw.addr),
            // SockAddrIn.port stores htons(port).
            port: u16::from_be(raw.port),
        })
    }

    pub fn to_user(&self) -> SockAddrIn {
        SockAddrIn::new(self.ip.0, self.port)
    }
}

impl fmt::Debug for SockAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl fmt::Display for SockAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

// =============================================================================
// EtherType and IpProtocol
// =============================================================================

/// Ethernet frame type field values handled by the stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum EtherType {
    Ipv4 = 0x0800,
    Arp = 0x0806,
}

impl EtherType {
    #[inline]
    pub const fn from_u16(val: u16) -> Option<Self> {
        match val {
            0x0800 => Some(Self::Ipv4),
            0x0806 => Some(Self::Arp),
            _ => None,
        }
    }

    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}

/// IPv4 protocol numbers handled by the stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum IpProtocol {
    Icmp = 1,
    Tcp = 6,
    Udp = 17,
}

impl IpProtocol {
    #[inline]
    pub const fn from_u8(val: u8) -> Option<Self> {
        match val {
            1 => Some(Self::Icmp),
            6 => Some(Self::Tcp),
            17 => Some(Self::Udp),
            _ => None,
        }
    }

    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

// =============================================================================
// NetError
// =============================================================================

/// Error type for the socket-facing API.
///
/// Protocol-data problems never show up here: malformed frames are dropped
/// and protocol failures become socket states. These variants cover misuse
/// of the API and conditions the caller has to react to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetError {
    /// Nothing to return yet; poll again (EAGAIN).
    WouldBlock,
    /// The receive timeout elapsed (ETIMEDOUT).
    TimedOut,
    /// Invalid argument (EINVAL).
    InvalidArgument,
    /// Socket handle out of range or not allocated (EBADF).
    BadSocket,
    /// Every socket slot is in use (EMFILE).
    NoFreeSocket,
    /// Another socket already owns the port (EADDRINUSE).
    AddressInUse,
    /// `bind()` has not been called (EINVAL).
    NotBound,
    /// Stream socket has no established peer (ENOTCONN).
    NotConnected,
    /// Operation not supported on this socket kind (EOPNOTSUPP).
    OperationNotSupported,
    /// Address family not supported (EAFNOSUPPORT).
    AddressFamilyNotSupported,
    /// No link-layer address known for the next hop yet (EHOSTUNREACH).
    HostUnreachable,
    /// Data does not fit in the transmit buffer (ENOBUFS).
    NoBufferSpace,
    /// The link layer refused the frame (ENETDOWN).
    LinkDown,
}

impl NetError {
    /// Convert to a negative POSIX errno value.
    pub const fn to_errno(&self) -> i32 {
        match self {
            Self::WouldBlock => -11,                // EAGAIN
            Self::TimedOut => -110,                 // ETIMEDOUT
            Self::InvalidArgument => -22,           // EINVAL
            Self::BadSocket => -9,                  // EBADF
            Self::NoFreeSocket => -24,              // EMFILE
            Self::AddressInUse => -98,              // EADDRINUSE
            Self::NotBound => -22,                  // EINVAL
            Self::NotConnected => -107,             // ENOTCONN
            Self::OperationNotSupported => -95,     // EOPNOTSUPP
            Self::AddressFamilyNotSupported => -97, // EAFNOSUPPORT
            Self::HostUnreachable => -113,          // EHOSTUNREACH
            Self::NoBufferSpace => -105,            // ENOBUFS
            Self::LinkDown => -100,                 // ENETDOWN
        }
    }
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WouldBlock => write!(f, "operation would block"),
            Self::TimedOut => write!(f, "operation timed out"),
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::BadSocket => write!(f, "bad socket handle"),
            Self::NoFreeSocket => write!(f, "no free socket slot"),
            Self::AddressInUse => write!(f, "address already in use"),
            Self::NotBound => write!(f, "socket not bound"),
            Self::NotConnected => write!(f, "socket not connected"),
            Self::OperationNotSupported => write!(f, "operation not supported"),
            Self::AddressFamilyNotSupported => write!(f, "address family not supported"),
            Self::HostUnreachable => write!(f, "host unreachable"),
            Self::NoBufferSpace => write!(f, "no buffer space available"),
            Self::LinkDown => write!(f, "link down"),
        }
    }
}
