//! Runs every protocol suite in one pass and logs a summary, the way an
//! on-target test image would.

use tinyip_lib::klog_info;
use tinyip_lib::testing::{TestRunSummary, TestSuiteResult};

const SUITES: &[fn() -> TestSuiteResult] = &[
    crate::checksum_tests::run_checksum_suite,
    crate::arp_tests::run_arp_suite,
    crate::icmp_tests::run_icmp_suite,
    crate::udp_tests::run_udp_suite,
    crate::tcp_tests::run_tcp_suite,
    crate::dhcp_tests::run_dhcp_suite,
    crate::dns_tests::run_dns_suite,
    crate::router_tests::run_router_suite,
    crate::socket_tests::run_socket_suite,
];

pub fn run_all() -> TestRunSummary {
    let mut summary = TestRunSummary::default();
    for (idx, run) in SUITES.iter().enumerate() {
        let res = run();
        klog_info!(
            "SUITE{} {} total={} pass={} fail={}",
            idx,
            res.name,
            res.total,
            res.passed,
            res.failed
        );
        if !res.all_passed() {
            klog_info!("TESTS: suite {} has failures", res.name);
        }
        summary.add_suite_result(&res);
    }
    klog_info!(
        "TESTS SUMMARY: total={} passed={} failed={}",
        summary.total_tests,
        summary.passed,
        summary.failed
    );
    summary
}

#[test]
fn all_suites_pass() {
    let summary = run_all();
    assert_eq!(summary.suite_count, SUITES.len());
    assert!(
        summary.all_passed(),
        "{} of {} tests failed",
        summary.failed,
        summary.total_tests
    );
}
