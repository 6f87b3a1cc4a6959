//! Ordered chain of protocol handlers for inbound frames.
//!
//! Every data-channel frame is offered to each handler in turn until one
//! consumes it. The chain starts as ARP, ICMP, DHCP, UDP; `listen` appends a
//! TCP server handler per listening port.

use core::fmt;

pub const MAX_HANDLERS: usize = 20;

/// A protocol handler in the inbound chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handler {
    Arp,
    Icmp,
    Dhcp,
    Udp,
    /// Segments whose destination port is this port.
    TcpServer(u16),
}

impl fmt::Display for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arp => write!(f, "arp"),
            Self::Icmp => write!(f, "icmp"),
            Self::Dhcp => write!(f, "dhcp"),
            Self::Udp => write!(f, "udp"),
            Self::TcpServer(port) => write!(f, "tcp:{}", port),
        }
    }
}

#[derive(Clone, Copy)]
pub struct HandlerChain {
    handlers: [Option<Handler>; MAX_HANDLERS],
    len: usize,
}

impl HandlerChain {
    pub const fn empty() -> Self {
        Self {
            handlers: [None; MAX_HANDLERS],
            len: 0,
        }
    }

    /// The default chain: ARP, ICMP, DHCP, UDP.
    pub fn new() -> Self {
        let mut chain = Self::empty();
        for h in [Handler::Arp, Handler::Icmp, Handler::Dhcp, Handler::Udp] {
            chain.add(h);
        }
        chain
    }

    /// Append a handler; false when the chain is full.
    pub fn add(&mut self, handler: Handler) -> bool {
        if self.len >= MAX_HANDLERS {
            return false;
        }
        self.handlers[self.len] = Some(handler);
        self.len += 1;
        true
    }

    pub fn contains(&self, handler: Handler) -> bool {
        self.iter().any(|h| h == handler)
    }

    pub fn iter(&self) -> impl Iterator<Item = Handler> + '_ {
        self.handlers[..self.len].iter().flatten().copied()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for HandlerChain {
    fn default() -> Self {
        Self::new()
    }
}
