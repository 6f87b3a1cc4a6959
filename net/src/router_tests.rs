use core::fmt::Write;

use tinyip_lib::testing::TestResult;
use tinyip_lib::{assert_eq_test, assert_test, pass};

use crate::router::{MAX_ROUTES, RequestRouter, Responder};
use crate::socket::Socket;
use crate::tcp::TCP_MAX_DATA;
use crate::types::{Ipv4Addr, SockAddr, SocketHandle};

fn index(resp: &mut Responder<'_>, _req: &[u8], _offset: u32) -> usize {
    resp.add_str("index")
}

fn status(resp: &mut Responder<'_>, _req: &[u8], _offset: u32) -> usize {
    resp.add_str("status")
}

/// Run whatever `router` picks for `request` and return what it queued.
fn answer(router: &RequestRouter, request: &[u8]) -> Option<usize> {
    let handler = router.find(request)?;
    let mut sock = Socket::new();
    let queued = handler(&mut Responder::new(&mut sock, SocketHandle(0)), request, 0);
    Some(queued)
}

pub fn test_router_first_prefix_wins() -> TestResult {
    let mut router = RequestRouter::new();
    assert_test!(router.add("GET /status", status));
    assert_test!(router.add("GET ", index));

    assert_eq_test!(answer(&router, b"GET /status HTTP/1.0"), Some(6));
    assert_eq_test!(answer(&router, b"GET / HTTP/1.0"), Some(5));
    assert_eq_test!(answer(&router, b"POST / HTTP/1.0"), None);
    assert_eq_test!(answer(&router, b"GE"), None, "shorter than every prefix");
    pass!()
}

pub fn test_router_capacity() -> TestResult {
    let mut router = RequestRouter::new();
    assert_test!(router.is_empty());
    for _ in 0..MAX_ROUTES {
        assert_test!(router.add("GET ", index));
    }
    assert_test!(!router.add("PUT ", index), "table full");
    assert_eq_test!(router.len(), MAX_ROUTES);
    assert_eq_test!(answer(&router, b"PUT /"), None);
    pass!()
}

pub fn test_responder_queues_whole_writes() -> TestResult {
    let mut sock = Socket::new();
    sock.rem_ip = Ipv4Addr::new(10, 0, 0, 9);
    sock.rem_port = 5555;
    let mut resp = Responder::new(&mut sock, SocketHandle(3));
    assert_eq_test!(resp.socket(), SocketHandle(3));
    assert_eq_test!(resp.peer(), SockAddr::new(Ipv4Addr::new(10, 0, 0, 9), 5555));

    assert_eq_test!(resp.add_data(&[]), 0, "nothing to queue");
    let big = [b'x'; TCP_MAX_DATA];
    assert_eq_test!(resp.add_data(&big[..TCP_MAX_DATA - 2]), TCP_MAX_DATA - 2);
    assert_eq_test!(resp.add_data(b"abc"), 0, "would overflow: nothing queued");
    assert_eq_test!(resp.add_data(b"ab"), 2, "exactly fills the segment");
    assert_eq_test!(resp.queued(), TCP_MAX_DATA);
    pass!()
}

pub fn test_responder_formats_and_closes() -> TestResult {
    let mut sock = Socket::new();
    {
        let mut resp = Responder::new(&mut sock, SocketHandle(0));
        assert_test!(write!(resp, "HTTP/1.0 {} OK\r\n", 200).is_ok());
        assert_test!(write!(resp, "{}", "").is_ok(), "empty write is fine");
        resp.close();
    }
    assert_test!(sock.tx_data() == b"HTTP/1.0 200 OK\r\n");
    assert_test!(sock.tcp.close, "close requested");

    let mut full = Socket::new();
    let mut resp = Responder::new(&mut full, SocketHandle(0));
    let fill = [b'.'; TCP_MAX_DATA];
    assert_eq_test!(resp.add_data(&fill), TCP_MAX_DATA);
    assert_test!(write!(resp, "more").is_err(), "full buffer reports an error");
    assert_eq_test!(resp.queued(), TCP_MAX_DATA);
    pass!()
}

tinyip_lib::define_test_suite!(
    router,
    [
        test_router_first_prefix_wins,
        test_router_capacity,
        test_responder_queues_whole_writes,
        test_responder_formats_and_closes,
    ]
);
