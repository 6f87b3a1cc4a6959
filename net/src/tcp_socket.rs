//! Per-socket TCP connection engine.
//!
//! [`sock_step`] advances one stream socket, either with a segment that
//! matched it or with no segment at all (the timer sweep). Only the passive
//! side is driven: a listening socket answers a SYN, completes the handshake,
//! exchanges data in strict sequence order and runs both close sequences.
//!
//! Every state that waits on the peer shares one retry counter. A timeout
//! retransmits the last control segment by stepping the sequence number back
//! over the SYN or FIN it consumed; once the counter passes [`TCP_TRIES`] the
//! socket sends RST and fails. Terminal states are cleared back to a fresh
//! `Listen` on the following step, with no 2MSL linger. The timer sweep runs
//! in the same poll as frame dispatch, so a reset or a final ACK has already
//! been swept back to `Listen` when `poll` returns; the state it ended in is
//! left in [`Socket::last_end`].

use tinyip_lib::{klog_debug, klog_info};

use crate::clock::ustimeout;
use crate::router::{RequestRouter, Responder};
use crate::socket::Socket;
use crate::tcp::{TCP_CHECK_USEC, TCP_RETRY_USEC, TCP_TRIES, TcpFlags, TcpOut, TcpSegment, TcpState};
use crate::tx::Tx;
use crate::types::{Ipv4Addr, MacAddr, SockAddr, SocketHandle};

/// Everything one engine step needs besides the socket.
pub struct TcpContext<'a, 'tx> {
    pub tx: &'a mut Tx<'tx>,
    pub routes: &'a RequestRouter,
    pub now: u32,
}

/// Change state and restart the socket's timer.
fn new_state(sock: &mut Socket, handle: SocketHandle, state: TcpState, now: u32) {
    if sock.tcp.state != state {
        klog_debug!("tcp: sock {} {} -> {}", handle, sock.tcp.state, state);
    }
    sock.tcp.state = state;
    sock.ticks = now;
}

/// Send a segment from the socket's current sequence state.
///
/// With `with_data` the queued transmit buffer rides along.
fn send(sock: &mut Socket, ctx: &mut TcpContext<'_, '_>, flags: TcpFlags, with_data: bool) {
    sock.ticks = ctx.now;
    let out = TcpOut {
        src_port: sock.loc_port,
        dst_port: sock.rem_port,
        seq: sock.tcp.seq,
        ack: sock.tcp.ack,
        flags,
    };
    let data = if with_data { sock.tx_data() } else { &[] };
    // Link failures are logged by the tx path; the retry timer covers them.
    let _ = ctx.tx.send_tcp(sock.rem_mac, sock.rem_ip, &out, data);
}

/// Resend a control segment whose SYN or FIN already advanced `seq`.
fn resend(sock: &mut Socket, ctx: &mut TcpContext<'_, '_>, flags: TcpFlags) {
    sock.tcp.seq = sock.tcp.seq.wrapping_sub(1);
    send(sock, ctx, flags, false);
    sock.tcp.seq = sock.tcp.seq.wrapping_add(1);
}

/// Count one retry; past the budget, reset the peer and fail.
fn fail(sock: &mut Socket, handle: SocketHandle, ctx: &mut TcpContext<'_, '_>) -> bool {
    sock.tcp.tries += 1;
    if sock.tcp.tries > TCP_TRIES {
        klog_info!(
            "tcp: sock {} giving up on {} after {} retries",
            handle,
            sock.remote(),
            TCP_TRIES
        );
        send(sock, ctx, TcpFlags::RST, false);
        new_state(sock, handle, TcpState::Failed, ctx.now);
        return true;
    }
    false
}

/// Send whatever is queued as one ACK segment and advance `seq` past it.
pub fn flush_tx(sock: &mut Socket, ctx: &mut TcpContext<'_, '_>) {
    let n = sock.tx_len();
    if n > 0 {
        send(sock, ctx, TcpFlags::ACK, true);
        sock.tcp.seq = sock.tcp.seq.wrapping_add(n as u32);
        sock.clear_tx();
    }
}

/// Hand in-order request data to a matching route, or park it for `recv`.
fn deliver(sock: &mut Socket, handle: SocketHandle, ctx: &mut TcpContext<'_, '_>, data: &[u8]) {
    match ctx.routes.find(data) {
        Some(handler) => {
            sock.tcp.route = Some(handler);
            handler(&mut Responder::new(sock, handle), data, 0);
        }
        None => {
            let from = sock.remote();
            if !sock.deliver(from, data) {
                klog_debug!("tcp: sock {} unread data overwritten", handle);
            }
        }
    }
}

/// Advance one stream socket. Returns true when a passive open just began,
/// so the caller can latch the socket for `accept`.
pub fn sock_step(
    sock: &mut Socket,
    handle: SocketHandle,
    seg: Option<&TcpSegment<'_>>,
    ctx: &mut TcpContext<'_, '_>,
) -> bool {
    let mut rflags = TcpFlags::empty();
    let mut payload: &[u8] = &[];
    if let Some(seg) = seg {
        rflags = seg.flags;
        payload = seg.payload;
        sock.tcp.rx_seq = seg.seq;
        sock.tcp.rx_ack = seg.ack;
        sock.tcp.rx_flags = seg.flags;
    }
    let now = ctx.now;
    let in_order = sock.tcp.rx_seq == sock.tcp.ack;

    match sock.tcp.state {
        TcpState::Closed | TcpState::SynSent => {}

        TcpState::Listen => {
            if let Some(seg) = seg.filter(|s| s.flags.contains(TcpFlags::SYN)) {
                sock.rem_mac = seg.src_mac;
                sock.rem_ip = seg.src_ip;
                sock.loc_port = seg.dst_port;
                sock.rem_port = seg.src_port;
                sock.tcp.seq = now;
                sock.tcp.start_seq = now.wrapping_add(1);
                sock.tcp.ack = seg.seq.wrapping_add(1);
                send(sock, ctx, TcpFlags::SYN | TcpFlags::ACK, false);
                new_state(sock, handle, TcpState::SynReceived, now);
                sock.tcp.seq = sock.tcp.seq.wrapping_add(1);
                sock.tcp.errors = 0;
                return true;
            }
        }

        TcpState::SynReceived => {
            if rflags.contains(TcpFlags::ACK) && in_order && sock.tcp.rx_ack == sock.tcp.seq {
                sock.tcp.last_rx_ack = sock.tcp.ack;
                new_state(sock, handle, TcpState::Established, now);
            } else if ustimeout(&mut sock.ticks, now, TCP_RETRY_USEC) && !fail(sock, handle, ctx) {
                resend(sock, ctx, TcpFlags::SYN | TcpFlags::ACK);
            }
        }

        TcpState::Established => established(sock, handle, ctx, rflags, payload),

        TcpState::CloseWait => {
            send(sock, ctx, TcpFlags::FIN | TcpFlags::ACK, false);
            sock.tcp.seq = sock.tcp.seq.wrapping_add(1);
            new_state(sock, handle, TcpState::LastAck, now);
        }

        TcpState::LastAck => {
            if rflags.contains(TcpFlags::ACK) && in_order {
                new_state(sock, handle, TcpState::Finished, now);
            } else if ustimeout(&mut sock.ticks, now, TCP_RETRY_USEC) && !fail(sock, handle, ctx) {
                resend(sock, ctx, TcpFlags::FIN | TcpFlags::ACK);
            }
        }

        TcpState::FinWait1 => {
            let fin = rflags.contains(TcpFlags::FIN) && in_order;
            if fin && rflags.contains(TcpFlags::ACK) {
                sock.tcp.ack = sock.tcp.ack.wrapping_add(1);
                send(sock, ctx, TcpFlags::ACK, false);
                new_state(sock, handle, TcpState::TimeWait, now);
            } else if fin {
                sock.tcp.ack = sock.tcp.ack.wrapping_add(1);
                send(sock, ctx, TcpFlags::ACK, false);
                new_state(sock, handle, TcpState::Closing, now);
            } else if rflags.contains(TcpFlags::ACK) && in_order {
                new_state(sock, handle, TcpState::FinWait2, now);
            } else if ustimeout(&mut sock.ticks, now, TCP_RETRY_USEC) && !fail(sock, handle, ctx) {
                resend(sock, ctx, TcpFlags::FIN | TcpFlags::ACK);
            }
        }

        TcpState::FinWait2 => {
            if rflags.contains(TcpFlags::FIN) && in_order {
                sock.tcp.ack = sock.tcp.ack.wrapping_add(1);
                send(sock, ctx, TcpFlags::ACK, false);
                new_state(sock, handle, TcpState::TimeWait, now);
            } else if ustimeout(&mut sock.ticks, now, TCP_RETRY_USEC) {
                fail(sock, handle, ctx);
            }
        }

        // Simultaneous close: both FINs crossed, waiting for the ACK of ours.
        TcpState::Closing => {
            if rflags.contains(TcpFlags::ACK) && sock.tcp.rx_ack == sock.tcp.seq {
                new_state(sock, handle, TcpState::TimeWait, now);
            } else if ustimeout(&mut sock.ticks, now, TCP_RETRY_USEC) && !fail(sock, handle, ctx) {
                resend(sock, ctx, TcpFlags::FIN | TcpFlags::ACK);
            }
        }

        TcpState::TimeWait | TcpState::Finished | TcpState::Failed => {
            let prev = sock.tcp.state;
            sock.clear_connection();
            sock.tcp.state = prev;
            sock.last_end = Some(prev);
            new_state(sock, handle, TcpState::Listen, now);
        }
    }
    false
}

fn established(
    sock: &mut Socket,
    handle: SocketHandle,
    ctx: &mut TcpContext<'_, '_>,
    rflags: TcpFlags,
    payload: &[u8],
) {
    let now = ctx.now;
    let in_order = sock.tcp.rx_seq == sock.tcp.ack;
    sock.clear_tx();

    if rflags.contains(TcpFlags::RST) && in_order {
        new_state(sock, handle, TcpState::Failed, now);
    } else if rflags.contains(TcpFlags::FIN) && in_order && payload.is_empty() {
        sock.tcp.ack = sock.tcp.ack.wrapping_add(1);
        send(sock, ctx, TcpFlags::ACK, false);
        new_state(sock, handle, TcpState::CloseWait, now);
    } else if !rflags.is_empty() && sock.tcp.rx_ack == sock.tcp.seq {
        // Peer keepalive probes carry one byte and are not progress.
        if payload.len() != 1 {
            sock.tcp.tries = 0;
        }
        let mut took_data = false;
        if !payload.is_empty() && in_order {
            deliver(sock, handle, ctx, payload);
            sock.tcp.ack = sock.tcp.ack.wrapping_add(payload.len() as u32);
            took_data = true;
        }
        if rflags.contains(TcpFlags::FIN) {
            sock.tcp.ack = sock.tcp.ack.wrapping_add(1);
            let n = sock.tx_len();
            send(sock, ctx, TcpFlags::ACK, true);
            sock.tcp.seq = sock.tcp.seq.wrapping_add(n as u32);
            sock.clear_tx();
            new_state(sock, handle, TcpState::CloseWait, now);
        } else if rflags.contains(TcpFlags::RST) {
            new_state(sock, handle, TcpState::Failed, now);
        } else if sock.tx_len() > 0 {
            flush_tx(sock, ctx);
        } else if sock.tcp.close {
            close_now(sock, handle, ctx);
        } else if took_data {
            send(sock, ctx, TcpFlags::ACK, false);
        }
    } else if rflags.contains(TcpFlags::ACK) {
        // Ack behind our sequence: the second identical one rewinds us.
        if sock.tcp.last_rx_ack != sock.tcp.rx_ack {
            sock.tcp.last_rx_ack = sock.tcp.rx_ack;
        } else {
            sock.tcp.seq = sock.tcp.rx_ack;
            sock.tcp.errors += 1;
        }
    } else if ustimeout(&mut sock.ticks, now, TCP_CHECK_USEC) {
        if !fail(sock, handle, ctx) {
            resend(sock, ctx, TcpFlags::ACK);
        }
    } else if sock.tcp.close {
        close_now(sock, handle, ctx);
    } else if let Some(handler) = sock.tcp.route {
        let offset = sock.tcp.seq.wrapping_sub(sock.tcp.start_seq);
        if handler(&mut Responder::new(sock, handle), &[], offset) > 0 {
            flush_tx(sock, ctx);
        }
    }
}

fn close_now(sock: &mut Socket, handle: SocketHandle, ctx: &mut TcpContext<'_, '_>) {
    send(sock, ctx, TcpFlags::FIN | TcpFlags::ACK, false);
    sock.tcp.seq = sock.tcp.seq.wrapping_add(1);
    new_state(sock, handle, TcpState::FinWait1, ctx.now);
}

/// Reset for a segment that matched no socket.
///
/// `seq` takes the peer's ack, `ack` the peer's sequence plus one for a SYN.
pub fn send_reset(tx: &mut Tx<'_>, mac: MacAddr, ip: Ipv4Addr, seg: &TcpSegment<'_>) {
    let syn = u32::from(seg.flags.contains(TcpFlags::SYN));
    let out = TcpOut {
        src_port: seg.dst_port,
        dst_port: seg.src_port,
        seq: seg.ack,
        ack: seg.seq.wrapping_add(syn),
        flags: TcpFlags::RST | TcpFlags::ACK,
    };
    klog_debug!(
        "tcp: reset {} -> port {}",
        SockAddr::new(ip, seg.src_port),
        seg.dst_port
    );
    let _ = tx.send_tcp(mac, ip, &out, &[]);
}
