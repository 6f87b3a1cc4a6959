//! Link-layer collaborator interface.
//!
//! The chip-specific transport that moves raw Ethernet frames lives outside
//! the protocol core. It hands the stack at most one inbound block per poll
//! and accepts opaque outbound frames.

use crate::types::NetError;

/// Which path of the link transport a received block arrived on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    /// Command/response traffic of the transport itself.
    Control,
    /// Asynchronous transport events (join, link changes).
    Event,
    /// Ethernet frames.
    Data,
}

/// Result of [`Link::link_check`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkStatus {
    Up,
    Down,
    Failed,
}

impl LinkStatus {
    #[inline]
    pub const fn is_up(self) -> bool {
        matches!(self, Self::Up)
    }
}

pub trait Link {
    /// Send one complete Ethernet frame.
    fn transmit(&mut self, frame: &[u8]) -> Result<(), NetError>;

    /// Copy at most one pending block into `buf`, returning its channel and length.
    fn poll_rx(&mut self, buf: &mut [u8]) -> Option<(Channel, usize)>;

    /// Current association state of the link.
    fn link_check(&mut self) -> LinkStatus;
}
