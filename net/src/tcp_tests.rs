use tinyip_abi::net::{AF_INET, INADDR_ANY, SOCK_STREAM, SockAddrIn};
use tinyip_lib::testing::TestResult;
use tinyip_lib::{assert_eq_test, assert_ok, assert_some, assert_test, pass};

use crate::frame::IP_DATA_OFFSET;
use crate::link::Channel;
use crate::router::Responder;
use crate::tcp::{TCP_MSS, TCP_WINDOW, TcpFlags, TcpOut, TcpState};
use crate::testkit::{ManualClock, PEER_IP, TestStack, sent_tcp, static_stack, tcp_frame};
use crate::types::{NetError, SockAddr, SocketHandle};

const PEER_PORT: u16 = 40000;
const PEER_ISN: u32 = 1000;
const START: u32 = 5000;

fn listener(
    stack: &mut TestStack<'_>,
    port: u16,
    backlog: usize,
) -> Result<SocketHandle, NetError> {
    let sock = stack.socket(AF_INET, SOCK_STREAM)?;
    stack.bind(sock, &SockAddrIn::new(INADDR_ANY, port))?;
    stack.listen(sock, backlog)?;
    Ok(sock)
}

fn seg(seq: u32, ack: u32, flags: TcpFlags) -> TcpOut {
    TcpOut {
        src_port: PEER_PORT,
        dst_port: 80,
        seq,
        ack,
        flags,
    }
}

/// Listener on port 80 taken through SYN, SYN|ACK, ACK. Our ISN is `START`.
fn established(stack: &mut TestStack<'_>) -> Result<SocketHandle, NetError> {
    let sock = listener(stack, 80, 1)?;
    stack.dispatch(Channel::Data, &tcp_frame(&seg(PEER_ISN, 0, TcpFlags::SYN), &[]));
    let ack = seg(PEER_ISN + 1, START + 1, TcpFlags::ACK);
    stack.dispatch(Channel::Data, &tcp_frame(&ack, &[]));
    stack.link_mut().take_sent();
    Ok(sock)
}

pub fn test_tcp_passive_handshake() -> TestResult {
    let clock = ManualClock::new(START);
    let mut stack = static_stack(&clock);
    let sock = assert_ok!(listener(&mut stack, 80, 1));
    assert_eq_test!(stack.socket_state(sock), Ok(TcpState::Listen));
    assert_eq_test!(stack.accept(sock), Err(NetError::WouldBlock), "nothing yet");

    let syn = tcp_frame(&seg(PEER_ISN, 0, TcpFlags::SYN), &[]);
    assert_test!(stack.dispatch(Channel::Data, &syn));
    assert_eq_test!(stack.socket_state(sock), Ok(TcpState::SynReceived));

    let sent = stack.link_mut().take_sent();
    assert_eq_test!(sent.len(), 1);
    let synack = assert_some!(sent_tcp(&sent[0]));
    assert_eq_test!(synack.flags, TcpFlags::SYN | TcpFlags::ACK);
    assert_eq_test!(synack.seq, START, "ISN taken from the clock");
    assert_eq_test!(synack.ack, PEER_ISN + 1);
    assert_eq_test!(synack.src_port, 80);
    assert_eq_test!(synack.dst_port, PEER_PORT);
    assert_eq_test!(synack.window, TCP_WINDOW);
    let l4 = &sent[0][IP_DATA_OFFSET..];
    assert_eq_test!(l4[12] >> 4, 6, "header carries one option word");
    assert_test!(l4[20..24] == [2, 4, (TCP_MSS >> 8) as u8, TCP_MSS as u8], "MSS option");

    let (conn, peer) = assert_ok!(stack.accept(sock));
    assert_eq_test!(conn, sock);
    assert_eq_test!(peer, SockAddr::new(PEER_IP, PEER_PORT));
    assert_eq_test!(stack.accept(sock), Err(NetError::WouldBlock), "latch is taken once");

    let ack = tcp_frame(&seg(PEER_ISN + 1, START + 1, TcpFlags::ACK), &[]);
    assert_test!(stack.dispatch(Channel::Data, &ack));
    assert_eq_test!(stack.socket_state(sock), Ok(TcpState::Established));
    assert_test!(stack.link().sent.is_empty(), "final ACK needs no answer");
    pass!()
}

pub fn test_tcp_handshake_ack_with_wrong_number_ignored() -> TestResult {
    let clock = ManualClock::new(START);
    let mut stack = static_stack(&clock);
    let sock = assert_ok!(listener(&mut stack, 80, 1));
    stack.dispatch(Channel::Data, &tcp_frame(&seg(PEER_ISN, 0, TcpFlags::SYN), &[]));

    let bad = tcp_frame(&seg(PEER_ISN + 1, START + 7, TcpFlags::ACK), &[]);
    stack.dispatch(Channel::Data, &bad);
    assert_eq_test!(stack.socket_state(sock), Ok(TcpState::SynReceived));
    pass!()
}

pub fn test_tcp_synack_retries_then_resets() -> TestResult {
    let clock = ManualClock::new(0);
    let mut stack = static_stack(&clock);
    let sock = assert_ok!(listener(&mut stack, 80, 1));
    stack.dispatch(Channel::Data, &tcp_frame(&seg(PEER_ISN, 0, TcpFlags::SYN), &[]));
    stack.link_mut().take_sent();

    clock.set(1_000_000);
    stack.poll();
    assert_test!(stack.link().sent.is_empty(), "not due before the retry interval");

    for round in 1..=5u32 {
        clock.set(round * 2_000_000);
        stack.poll();
        let sent = stack.link_mut().take_sent();
        assert_eq_test!(sent.len(), 1, "one retransmission per interval");
        let synack = assert_some!(sent_tcp(&sent[0]));
        assert_eq_test!(synack.flags, TcpFlags::SYN | TcpFlags::ACK);
        assert_eq_test!(synack.seq, 0, "resent with the original sequence");
        assert_eq_test!(stack.socket_state(sock), Ok(TcpState::SynReceived));
    }

    clock.set(12_000_000);
    stack.poll();
    let sent = stack.link_mut().take_sent();
    assert_eq_test!(sent.len(), 1);
    let rst = assert_some!(sent_tcp(&sent[0]));
    assert_test!(rst.flags.contains(TcpFlags::RST), "gave up with a reset");
    assert_eq_test!(stack.socket_state(sock), Ok(TcpState::Failed));

    stack.poll();
    assert_eq_test!(stack.socket_state(sock), Ok(TcpState::Listen), "back to listening");
    let (_, slot) = assert_some!(stack.sockets().iter().nth(sock.0));
    assert_eq_test!(slot.loc_port, 80, "keeps its port");
    assert_eq_test!(slot.rem_port, 0, "forgets the peer");
    pass!()
}

pub fn test_tcp_data_parked_for_recv() -> TestResult {
    let clock = ManualClock::new(START);
    let mut stack = static_stack(&clock);
    let sock = assert_ok!(established(&mut stack));

    let data = tcp_frame(&seg(PEER_ISN + 1, START + 1, TcpFlags::ACK), b"ping");
    assert_test!(stack.dispatch(Channel::Data, &data));
    let sent = stack.link_mut().take_sent();
    assert_eq_test!(sent.len(), 1);
    let ack = assert_some!(sent_tcp(&sent[0]));
    assert_eq_test!(ack.flags, TcpFlags::ACK);
    assert_eq_test!(ack.ack, PEER_ISN + 5, "data acknowledged");
    assert_test!(ack.payload.is_empty());

    let mut buf = [0u8; 16];
    let (n, from) = assert_ok!(stack.recvfrom(sock, &mut buf));
    assert_test!(&buf[..n] == b"ping");
    assert_eq_test!(from, SockAddr::new(PEER_IP, PEER_PORT));

    assert_eq_test!(stack.send(sock, b"pong"), Ok(4));
    let sent = stack.link_mut().take_sent();
    let reply = assert_some!(sent_tcp(&sent[0]));
    assert_eq_test!(reply.seq, START + 1);
    assert_test!(reply.payload == b"pong");
    pass!()
}

pub fn test_tcp_out_of_order_data_dropped() -> TestResult {
    let clock = ManualClock::new(START);
    let mut stack = static_stack(&clock);
    let sock = assert_ok!(established(&mut stack));

    let ahead = tcp_frame(&seg(PEER_ISN + 50, START + 1, TcpFlags::ACK), b"late");
    stack.dispatch(Channel::Data, &ahead);
    let (_, slot) = assert_some!(stack.sockets().iter().nth(sock.0));
    assert_test!(!slot.has_pending(), "gap in sequence: nothing delivered");
    assert_eq_test!(slot.tcp.ack, PEER_ISN + 1);
    pass!()
}

fn hello(resp: &mut Responder<'_>, request: &[u8], offset: u32) -> usize {
    if offset == 0 && request.starts_with(b"GET ") {
        return resp.add_str("hello");
    }
    resp.close();
    0
}

pub fn test_tcp_route_answers_then_closes() -> TestResult {
    let clock = ManualClock::new(START);
    let mut stack = static_stack(&clock);
    assert_test!(stack.add_route("GET ", hello));
    let sock = assert_ok!(established(&mut stack));

    let req = b"GET / HTTP/1.0\r\n\r\n";
    let frame = tcp_frame(&seg(PEER_ISN + 1, START + 1, TcpFlags::ACK), req);
    assert_test!(stack.dispatch(Channel::Data, &frame));
    let sent = stack.link_mut().take_sent();
    assert_eq_test!(sent.len(), 1, "answer rides on the ACK");
    let answer = assert_some!(sent_tcp(&sent[0]));
    assert_test!(answer.payload == b"hello");
    assert_eq_test!(answer.ack, PEER_ISN + 1 + req.len() as u32);
    let (_, slot) = assert_some!(stack.sockets().iter().nth(sock.0));
    assert_test!(!slot.has_pending(), "routed data is not parked");

    // Follow-up call sees offset 5 and asks to close; the next idle poll
    // sends our FIN.
    stack.poll();
    assert_test!(stack.link().sent.is_empty());
    stack.poll();
    let sent = stack.link_mut().take_sent();
    let fin = assert_some!(sent_tcp(&sent[0]));
    assert_eq_test!(fin.flags, TcpFlags::FIN | TcpFlags::ACK);
    assert_eq_test!(fin.seq, START + 6);
    assert_eq_test!(stack.socket_state(sock), Ok(TcpState::FinWait1));

    let peer_seq = PEER_ISN + 1 + req.len() as u32;
    let both = tcp_frame(&seg(peer_seq, START + 7, TcpFlags::FIN | TcpFlags::ACK), &[]);
    assert_test!(stack.dispatch(Channel::Data, &both));
    let sent = stack.link_mut().take_sent();
    let last = assert_some!(sent_tcp(&sent[0]));
    assert_eq_test!(last.flags, TcpFlags::ACK);
    assert_eq_test!(last.ack, peer_seq + 1, "peer FIN acknowledged");
    assert_eq_test!(stack.socket_state(sock), Ok(TcpState::TimeWait));

    stack.poll();
    assert_eq_test!(stack.socket_state(sock), Ok(TcpState::Listen));
    pass!()
}

pub fn test_tcp_passive_close() -> TestResult {
    let clock = ManualClock::new(START);
    let mut stack = static_stack(&clock);
    let sock = assert_ok!(established(&mut stack));

    let fin = tcp_frame(&seg(PEER_ISN + 1, START + 1, TcpFlags::FIN | TcpFlags::ACK), &[]);
    assert_test!(stack.dispatch(Channel::Data, &fin));
    assert_eq_test!(stack.socket_state(sock), Ok(TcpState::CloseWait));
    let sent = stack.link_mut().take_sent();
    let ack = assert_some!(sent_tcp(&sent[0]));
    assert_eq_test!(ack.flags, TcpFlags::ACK);
    assert_eq_test!(ack.ack, PEER_ISN + 2);

    stack.poll();
    assert_eq_test!(stack.socket_state(sock), Ok(TcpState::LastAck));
    let sent = stack.link_mut().take_sent();
    let our_fin = assert_some!(sent_tcp(&sent[0]));
    assert_eq_test!(our_fin.flags, TcpFlags::FIN | TcpFlags::ACK);
    assert_eq_test!(our_fin.seq, START + 1);

    let last = tcp_frame(&seg(PEER_ISN + 2, START + 2, TcpFlags::ACK), &[]);
    assert_test!(stack.dispatch(Channel::Data, &last));
    assert_eq_test!(stack.socket_state(sock), Ok(TcpState::Finished));

    stack.poll();
    assert_eq_test!(stack.socket_state(sock), Ok(TcpState::Listen));

    let again = tcp_frame(&seg(7000, 0, TcpFlags::SYN), &[]);
    assert_test!(stack.dispatch(Channel::Data, &again), "slot takes a new connection");
    assert_eq_test!(stack.socket_state(sock), Ok(TcpState::SynReceived));
    pass!()
}

pub fn test_tcp_peer_reset_fails_connection() -> TestResult {
    let clock = ManualClock::new(START);
    let mut stack = static_stack(&clock);
    let sock = assert_ok!(established(&mut stack));

    let rst = tcp_frame(&seg(PEER_ISN + 1, 0, TcpFlags::RST), &[]);
    assert_test!(stack.dispatch(Channel::Data, &rst));
    assert_eq_test!(stack.socket_state(sock), Ok(TcpState::Failed));
    assert_test!(stack.link().sent.is_empty(), "never answer a reset");
    pass!()
}

pub fn test_tcp_reset_visible_after_poll() -> TestResult {
    let clock = ManualClock::new(START);
    let mut stack = static_stack(&clock);
    let sock = assert_ok!(established(&mut stack));
    assert_eq_test!(stack.take_connection_end(sock), Ok(None));

    let rst = tcp_frame(&seg(PEER_ISN + 1, 0, TcpFlags::RST), &[]);
    stack.link_mut().push_rx(rst);
    stack.poll();
    assert_eq_test!(stack.socket_state(sock), Ok(TcpState::Listen), "swept in the same poll");
    assert_eq_test!(stack.take_connection_end(sock), Ok(Some(TcpState::Failed)));
    assert_eq_test!(stack.take_connection_end(sock), Ok(None), "reported once");
    pass!()
}

pub fn test_tcp_corrupted_segment_ignored() -> TestResult {
    let clock = ManualClock::new(START);
    let mut stack = static_stack(&clock);
    let sock = assert_ok!(listener(&mut stack, 80, 1));

    let mut syn = tcp_frame(&seg(PEER_ISN, 0, TcpFlags::SYN), &[]);
    syn[IP_DATA_OFFSET + 4] ^= 0x01;
    assert_test!(!stack.dispatch(Channel::Data, &syn));
    assert_eq_test!(stack.socket_state(sock), Ok(TcpState::Listen));
    assert_test!(stack.link().sent.is_empty(), "no SYN|ACK and no reset");

    let syn = tcp_frame(&seg(PEER_ISN, 0, TcpFlags::SYN), &[]);
    assert_test!(stack.dispatch(Channel::Data, &syn));
    assert_eq_test!(stack.socket_state(sock), Ok(TcpState::SynReceived));
    pass!()
}

pub fn test_tcp_keepalive_probe() -> TestResult {
    let clock = ManualClock::new(START);
    let mut stack = static_stack(&clock);
    let sock = assert_ok!(established(&mut stack));

    clock.advance(9_000_000);
    stack.poll();
    assert_test!(stack.link().sent.is_empty(), "quiet before the check interval");

    clock.advance(1_000_000);
    stack.poll();
    let sent = stack.link_mut().take_sent();
    assert_eq_test!(sent.len(), 1);
    let probe = assert_some!(sent_tcp(&sent[0]));
    assert_eq_test!(probe.flags, TcpFlags::ACK);
    assert_eq_test!(probe.seq, START, "one below the next sequence");
    assert_test!(probe.payload.is_empty());
    assert_eq_test!(stack.socket_state(sock), Ok(TcpState::Established));
    pass!()
}

pub fn test_tcp_unmatched_syn_gets_reset() -> TestResult {
    let clock = ManualClock::new(START);
    let mut stack = static_stack(&clock);
    let syn = tcp_frame(
        &TcpOut {
            src_port: PEER_PORT,
            dst_port: 81,
            seq: PEER_ISN,
            ack: 0,
            flags: TcpFlags::SYN,
        },
        &[],
    );
    assert_test!(!stack.dispatch(Channel::Data, &syn));
    assert_eq_test!(stack.counters().rx_unhandled, 1);

    let sent = stack.link_mut().take_sent();
    assert_eq_test!(sent.len(), 1);
    let rst = assert_some!(sent_tcp(&sent[0]));
    assert_eq_test!(rst.flags, TcpFlags::RST | TcpFlags::ACK);
    assert_eq_test!(rst.src_port, 81);
    assert_eq_test!(rst.dst_port, PEER_PORT);
    assert_eq_test!(rst.ack, PEER_ISN + 1, "SYN counts as one");

    let stray = tcp_frame(
        &TcpOut {
            src_port: PEER_PORT,
            dst_port: 81,
            seq: PEER_ISN,
            ack: 0,
            flags: TcpFlags::RST,
        },
        &[],
    );
    stack.dispatch(Channel::Data, &stray);
    assert_test!(stack.link().sent.is_empty(), "resets are never reset");
    pass!()
}

pub fn test_tcp_backlog_spreads_connections() -> TestResult {
    let clock = ManualClock::new(START);
    let mut stack = static_stack(&clock);
    let sock = assert_ok!(listener(&mut stack, 80, 3));
    let listening = stack
        .sockets()
        .iter()
        .filter(|(_, s)| s.is_stream() && s.tcp.state == TcpState::Listen)
        .count();
    assert_eq_test!(listening, 3, "backlog slots cloned");

    let first = TcpOut {
        src_port: 40001,
        ..seg(PEER_ISN, 0, TcpFlags::SYN)
    };
    let second = TcpOut {
        src_port: 40002,
        ..seg(PEER_ISN, 0, TcpFlags::SYN)
    };
    assert_test!(stack.dispatch(Channel::Data, &tcp_frame(&first, &[])));
    assert_test!(stack.dispatch(Channel::Data, &tcp_frame(&second, &[])));

    let (conn, peer) = assert_ok!(stack.accept(sock));
    assert_test!(conn != sock, "second SYN landed on a clone");
    assert_eq_test!(peer.port, 40002, "accept reports the latest open");
    assert_eq_test!(stack.socket_state(sock), Ok(TcpState::SynReceived));
    assert_eq_test!(stack.socket_state(conn), Ok(TcpState::SynReceived));
    pass!()
}

pub fn test_tcp_close_established_is_cooperative() -> TestResult {
    let clock = ManualClock::new(START);
    let mut stack = static_stack(&clock);
    let sock = assert_ok!(established(&mut stack));

    assert_eq_test!(stack.close(sock), Ok(()));
    assert_eq_test!(stack.socket_state(sock), Ok(TcpState::Established), "not torn down");
    stack.poll();
    let sent = stack.link_mut().take_sent();
    let fin = assert_some!(sent_tcp(&sent[0]));
    assert_eq_test!(fin.flags, TcpFlags::FIN | TcpFlags::ACK);
    assert_eq_test!(stack.socket_state(sock), Ok(TcpState::FinWait1));

    let ack = tcp_frame(&seg(PEER_ISN + 1, START + 2, TcpFlags::ACK), &[]);
    stack.dispatch(Channel::Data, &ack);
    assert_eq_test!(stack.socket_state(sock), Ok(TcpState::FinWait2));
    let fin = tcp_frame(&seg(PEER_ISN + 1, START + 2, TcpFlags::FIN | TcpFlags::ACK), &[]);
    stack.dispatch(Channel::Data, &fin);
    assert_eq_test!(stack.socket_state(sock), Ok(TcpState::TimeWait));
    pass!()
}

tinyip_lib::define_test_suite!(
    tcp,
    [
        test_tcp_passive_handshake,
        test_tcp_handshake_ack_with_wrong_number_ignored,
        test_tcp_synack_retries_then_resets,
        test_tcp_data_parked_for_recv,
        test_tcp_out_of_order_data_dropped,
        test_tcp_route_answers_then_closes,
        test_tcp_passive_close,
        test_tcp_peer_reset_fails_connection,
        test_tcp_reset_visible_after_poll,
        test_tcp_corrupted_segment_ignored,
        test_tcp_keepalive_probe,
        test_tcp_unmatched_syn_gets_reset,
        test_tcp_backlog_spreads_connections,
        test_tcp_close_established_is_cooperative,
    ]
);
