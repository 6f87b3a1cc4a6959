//! tinyip: a small polled Ethernet/IPv4 stack for a single link.
//!
//! ARP, ICMP echo, UDP and passive TCP, with a DHCP client and a DNS stub
//! resolver, driven from one [`NetStack::poll`](stack::NetStack::poll) loop.
//! All state lives in fixed-size tables; nothing allocates.

#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_code)]

pub mod arp;
pub mod checksum;
pub mod clock;
pub mod config;
pub mod dhcp;
pub mod dns;
pub mod ethernet;
pub mod event;
pub mod frame;
pub mod icmp;
pub mod ipv4;
pub mod link;
pub mod router;
pub mod socket;
pub mod stack;
pub mod tcp;
pub mod tcp_socket;
pub mod tx;
pub mod types;
pub mod udp;

#[cfg(test)]
mod testkit;

#[cfg(test)]
mod router_tests;
#[cfg(test)]
mod socket_tests;
#[cfg(test)]
mod tcp_tests;

#[cfg(test)]
mod suites;

pub use clock::Clock;
pub use config::NetConfig;
pub use link::{Channel, Link, LinkStatus};
pub use stack::NetStack;
pub use types::{Ipv4Addr, MacAddr, NetError, SockAddr, SocketHandle};
