use tinyip_abi::net::{
    AF_INET, INADDR_ANY, NUM_NET_SOCKETS, SO_RCVTIMEO, SOCK_DGRAM, SOCK_STREAM, SOL_SOCKET,
    SockAddrIn, TimeVal,
};
use tinyip_lib::testing::TestResult;
use tinyip_lib::{assert_eq_test, assert_ok, assert_some, assert_test, pass};

use crate::event::Handler;
use crate::link::{Channel, LinkStatus};
use crate::socket::{SOCK_RX_MAX, SockKind, SocketTable};
use crate::tcp::{TcpFlags, TcpState};
use crate::testkit::{MY_IP, MY_MAC, ManualClock, NETMASK, PEER_IP, ROUTER_IP, static_stack};
use crate::types::{Ipv4Addr, NetError, SockAddr, SocketHandle};

pub fn test_socket_table_exhaustion() -> TestResult {
    let clock = ManualClock::new(0);
    let mut stack = static_stack(&clock);
    for i in 0..NUM_NET_SOCKETS {
        let kind = if i % 2 == 0 { SOCK_DGRAM } else { SOCK_STREAM };
        assert_eq_test!(stack.socket(AF_INET, kind), Ok(SocketHandle(i)));
    }
    assert_eq_test!(stack.socket(AF_INET, SOCK_DGRAM), Err(NetError::NoFreeSocket));

    assert_ok!(stack.close(SocketHandle(2)));
    assert_eq_test!(
        stack.socket(AF_INET, SOCK_STREAM),
        Ok(SocketHandle(2)),
        "released slot is reused"
    );
    pass!()
}

pub fn test_socket_rejects_bad_arguments() -> TestResult {
    let clock = ManualClock::new(0);
    let mut stack = static_stack(&clock);
    assert_eq_test!(stack.socket(10, SOCK_DGRAM), Err(NetError::AddressFamilyNotSupported));
    assert_eq_test!(stack.socket(AF_INET, 3), Err(NetError::InvalidArgument));

    let sock = assert_ok!(stack.socket(AF_INET, SOCK_DGRAM));
    assert_eq_test!(
        stack.bind(sock, &SockAddrIn::new(INADDR_ANY, 0)),
        Err(NetError::InvalidArgument),
        "port zero"
    );
    let mut foreign = SockAddrIn::new(INADDR_ANY, 53);
    foreign.family = 10;
    assert_eq_test!(stack.bind(sock, &foreign), Err(NetError::AddressFamilyNotSupported));
    assert_eq_test!(
        stack.bind(SocketHandle(4), &SockAddrIn::new(INADDR_ANY, 53)),
        Err(NetError::BadSocket),
        "never allocated"
    );
    assert_eq_test!(
        stack.bind(SocketHandle(99), &SockAddrIn::new(INADDR_ANY, 53)),
        Err(NetError::BadSocket)
    );
    assert_eq_test!(NetError::BadSocket.to_errno(), -9);
    assert_eq_test!(
        SockAddr::new(PEER_IP, 80).to_user(),
        SockAddrIn::new(PEER_IP.0, 80),
        "port goes back to network order"
    );
    pass!()
}

pub fn test_socket_kind_checks() -> TestResult {
    let clock = ManualClock::new(0);
    let mut stack = static_stack(&clock);
    let dgram = assert_ok!(stack.socket(AF_INET, SOCK_DGRAM));
    let stream = assert_ok!(stack.socket(AF_INET, SOCK_STREAM));
    let to = SockAddr::new(PEER_IP, 9);

    assert_eq_test!(stack.listen(dgram, 1), Err(NetError::OperationNotSupported));
    assert_eq_test!(stack.accept(dgram), Err(NetError::OperationNotSupported));
    assert_eq_test!(stack.listen(stream, 1), Err(NetError::NotBound));
    assert_eq_test!(stack.sendto(stream, b"x", &to), Err(NetError::OperationNotSupported));
    assert_eq_test!(stack.sendto(dgram, b"x", &to), Err(NetError::NotBound));
    assert_eq_test!(stack.send(stream, b"x"), Err(NetError::NotConnected));

    assert_ok!(stack.bind(dgram, &SockAddrIn::new(INADDR_ANY, 7)));
    let big = [0u8; SOCK_RX_MAX + 1];
    assert_eq_test!(stack.sendto(dgram, &big, &to), Err(NetError::NoBufferSpace));
    pass!()
}

pub fn test_socket_receive_timeout_option() -> TestResult {
    let clock = ManualClock::new(0);
    let mut stack = static_stack(&clock);
    let sock = assert_ok!(stack.socket(AF_INET, SOCK_DGRAM));
    let tv = TimeVal {
        tv_sec: 1,
        tv_usec: 500_000,
    };
    assert_ok!(stack.setsockopt(sock, SOL_SOCKET, SO_RCVTIMEO, &tv));
    let (_, slot) = assert_some!(stack.sockets().iter().nth(sock.0));
    assert_eq_test!(slot.timeout_usec, 1_500_000);

    assert_eq_test!(
        stack.setsockopt(sock, 6, SO_RCVTIMEO, &tv),
        Err(NetError::InvalidArgument),
        "unknown level"
    );
    assert_eq_test!(
        stack.setsockopt(sock, SOL_SOCKET, 21, &tv),
        Err(NetError::InvalidArgument),
        "unknown option"
    );
    pass!()
}

pub fn test_socket_close_releases_idle_sockets() -> TestResult {
    let clock = ManualClock::new(0);
    let mut stack = static_stack(&clock);
    let dgram = assert_ok!(stack.socket(AF_INET, SOCK_DGRAM));
    assert_ok!(stack.bind(dgram, &SockAddrIn::new(INADDR_ANY, 7)));
    assert_ok!(stack.close(dgram));
    assert_eq_test!(stack.socket_state(dgram), Err(NetError::BadSocket));
    assert_eq_test!(stack.close(dgram), Err(NetError::BadSocket), "already gone");

    let stream = assert_ok!(stack.socket(AF_INET, SOCK_STREAM));
    assert_ok!(stack.bind(stream, &SockAddrIn::new(INADDR_ANY, 80)));
    assert_ok!(stack.listen(stream, 1));
    assert_ok!(stack.close(stream));
    assert_test!(stack.sockets().iter().all(|(_, s)| s.is_free()), "table empty again");
    pass!()
}

pub fn test_socket_listeners_share_port() -> TestResult {
    let clock = ManualClock::new(0);
    let mut stack = static_stack(&clock);
    let a = assert_ok!(stack.socket(AF_INET, SOCK_STREAM));
    let b = assert_ok!(stack.socket(AF_INET, SOCK_STREAM));
    assert_ok!(stack.bind(a, &SockAddrIn::new(INADDR_ANY, 80)));
    assert_ok!(stack.bind(b, &SockAddrIn::new(INADDR_ANY, 80)));
    assert_ok!(stack.listen(a, 1));
    assert_ok!(stack.listen(b, 1));
    assert_eq_test!(stack.socket_state(b), Ok(TcpState::Listen));
    assert_eq_test!(
        stack.bind(a, &SockAddrIn::new(INADDR_ANY, 81)),
        Err(NetError::InvalidArgument),
        "cannot rebind while listening"
    );
    assert_test!(stack.add_handler(Handler::TcpServer(8080)));
    pass!()
}

pub fn test_socket_table_matching() -> TestResult {
    let mut table = SocketTable::new();
    let any = assert_ok!(table.alloc(SockKind::Datagram));
    let pinned = assert_ok!(table.alloc(SockKind::Datagram));
    {
        let s = assert_ok!(table.get_mut(any));
        s.loc_port = 1000;
    }
    {
        let s = assert_ok!(table.get_mut(pinned));
        s.loc_port = 2000;
        s.rem_ip = PEER_IP;
        s.rem_port = 53;
    }
    assert_eq_test!(table.udp_match(ROUTER_IP, 9, 1000), Some(any.0));
    assert_eq_test!(table.udp_match(PEER_IP, 53, 2000), Some(pinned.0));
    assert_eq_test!(table.udp_match(PEER_IP, 54, 2000), None, "wrong peer port");
    assert_test!(table.udp_port_in_use(1000, pinned));
    assert_test!(!table.udp_port_in_use(1000, any), "a socket does not clash with itself");

    let listener = assert_ok!(table.alloc(SockKind::Stream));
    {
        let s = assert_ok!(table.get_mut(listener));
        s.loc_port = 80;
        s.tcp.state = TcpState::Listen;
    }
    assert_eq_test!(table.tcp_match(PEER_IP, 4000, 80, TcpFlags::SYN), Some(listener.0));
    assert_eq_test!(table.tcp_match(PEER_IP, 4000, 80, TcpFlags::ACK), None, "no peer yet");
    assert_eq_test!(table.tcp_match(PEER_IP, 4000, 81, TcpFlags::SYN), None);
    pass!()
}

pub fn test_socket_net_info() -> TestResult {
    let clock = ManualClock::new(0);
    let mut stack = static_stack(&clock);
    let info = stack.net_info();
    assert_eq_test!(info.ipv4, MY_IP.0);
    assert_eq_test!(info.subnet_mask, NETMASK.0);
    assert_eq_test!(info.gateway, ROUTER_IP.0);
    assert_eq_test!(info.mac, MY_MAC.0);
    assert_eq_test!(info.link_up, 1);
    assert_eq_test!(info.configured, 1);

    stack.link_mut().status = LinkStatus::Down;
    assert_eq_test!(stack.net_info().link_up, 0);
    pass!()
}

pub fn test_socket_non_data_channels_counted() -> TestResult {
    let clock = ManualClock::new(0);
    let mut stack = static_stack(&clock);
    assert_test!(!stack.dispatch(Channel::Control, &[1, 2, 3]));
    assert_test!(!stack.dispatch(Channel::Event, &[4]));
    assert_test!(!stack.dispatch(Channel::Event, &[]));
    let counters = stack.counters();
    assert_eq_test!(counters.rx_control, 1);
    assert_eq_test!(counters.rx_event, 2);
    assert_eq_test!(counters.rx_frames, 0);
    assert_eq_test!(counters.rx_unhandled, 0);
    pass!()
}

pub fn test_socket_link_refusal_reported() -> TestResult {
    let clock = ManualClock::new(0);
    let mut stack = static_stack(&clock);
    let sock = assert_ok!(stack.socket(AF_INET, SOCK_DGRAM));
    assert_ok!(stack.bind(sock, &SockAddrIn::new(INADDR_ANY, 7)));
    stack.link_mut().fail_tx = true;

    let to = SockAddr::new(Ipv4Addr::BROADCAST, 7);
    assert_eq_test!(stack.sendto(sock, b"x", &to), Err(NetError::LinkDown));
    assert_eq_test!(stack.counters().tx_errors, 1);
    assert_eq_test!(stack.counters().tx_frames, 0);

    stack.link_mut().fail_tx = false;
    assert_eq_test!(stack.sendto(sock, b"x", &to), Ok(1));
    assert_eq_test!(stack.counters().tx_frames, 1);
    pass!()
}

tinyip_lib::define_test_suite!(
    socket,
    [
        test_socket_table_exhaustion,
        test_socket_rejects_bad_arguments,
        test_socket_kind_checks,
        test_socket_receive_timeout_option,
        test_socket_close_releases_idle_sockets,
        test_socket_listeners_share_port,
        test_socket_table_matching,
        test_socket_net_info,
        test_socket_non_data_channels_counted,
        test_socket_link_refusal_reported,
    ]
);
