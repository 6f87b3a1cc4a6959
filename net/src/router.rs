//! Prefix routing of TCP request data to application handlers.
//!
//! A stream socket that receives in-order data looks the data up here. The
//! first route whose prefix matches gets to fill the socket's transmit
//! buffer through a [`Responder`], and stays attached to the socket so the
//! engine can call it again on idle polls to stream further data.

use core::fmt;

use crate::socket::Socket;
use crate::types::{SockAddr, SocketHandle};

/// Most routes a router holds.
pub const MAX_ROUTES: usize = 5;

/// Request handler: gets the request bytes (empty on follow-up calls) and the
/// number of data bytes already sent on this connection. Returns how many
/// bytes it queued; zero means nothing to send.
pub type RequestFn = fn(&mut Responder<'_>, &[u8], u32) -> usize;

#[derive(Clone, Copy)]
struct Route {
    prefix: &'static [u8],
    handler: RequestFn,
}

/// Fixed table of `(prefix, handler)` routes, matched in insertion order.
#[derive(Clone, Copy, Default)]
pub struct RequestRouter {
    routes: [Option<Route>; MAX_ROUTES],
}

impl RequestRouter {
    pub const fn new() -> Self {
        Self {
            routes: [None; MAX_ROUTES],
        }
    }

    /// Add a route; false when the table is full.
    pub fn add(&mut self, prefix: &'static str, handler: RequestFn) -> bool {
        match self.routes.iter_mut().find(|r| r.is_none()) {
            Some(slot) => {
                *slot = Some(Route {
                    prefix: prefix.as_bytes(),
                    handler,
                });
                true
            }
            None => false,
        }
    }

    /// Handler of the first route whose prefix starts `request`.
    pub fn find(&self, request: &[u8]) -> Option<RequestFn> {
        self.routes
            .iter()
            .flatten()
            .find(|r| request.starts_with(r.prefix))
            .map(|r| r.handler)
    }

    pub fn len(&self) -> usize {
        self.routes.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A handler's view of the connection it is answering.
pub struct Responder<'a> {
    sock: &'a mut Socket,
    handle: SocketHandle,
}

impl<'a> Responder<'a> {
    pub(crate) fn new(sock: &'a mut Socket, handle: SocketHandle) -> Self {
        Self { sock, handle }
    }

    /// Queue bytes for the next segment. All or nothing: returns 0 if they
    /// would not fit in one maximum-size segment.
    pub fn add_data(&mut self, data: &[u8]) -> usize {
        self.sock.add_tx_data(data)
    }

    pub fn add_str(&mut self, s: &str) -> usize {
        self.add_data(s.as_bytes())
    }

    /// Bytes queued so far.
    pub fn queued(&self) -> usize {
        self.sock.tx_len()
    }

    /// Ask for the connection to be closed once the queued data is out.
    pub fn close(&mut self) {
        self.sock.tcp.close = true;
    }

    pub fn socket(&self) -> SocketHandle {
        self.handle
    }

    pub fn peer(&self) -> SockAddr {
        SockAddr::new(self.sock.rem_ip, self.sock.rem_port)
    }
}

impl fmt::Write for Responder<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if s.is_empty() || self.add_str(s) == s.len() {
            Ok(())
        } else {
            Err(fmt::Error)
        }
    }
}
