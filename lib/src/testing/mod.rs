pub mod harness;

mod assertions;
pub use harness::{TestRunSummary, TestSuiteResult, run_single_test};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TestResult {
    Pass,
    Fail,
    Panic,
    Skipped,
}

impl TestResult {
    #[inline]
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    #[inline]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Fail | Self::Panic)
    }
}

#[macro_export]
macro_rules! pass {
    () => {
        $crate::testing::TestResult::Pass
    };
}

#[macro_export]
macro_rules! fail {
    () => {
        $crate::testing::TestResult::Fail
    };
    ($msg:expr) => {{
        $crate::klog_info!("TEST FAIL: {}", $msg);
        $crate::testing::TestResult::Fail
    }};
    ($fmt:expr, $($arg:tt)*) => {{
        $crate::klog_info!(concat!("TEST FAIL: ", $fmt), $($arg)*);
        $crate::testing::TestResult::Fail
    }};
}

/// Declare a suite of `fn() -> TestResult` tests.
///
/// Expands to `run_<suite>_suite()`, which runs every test and returns a
/// [`TestSuiteResult`], plus a `#[cfg(test)]` module holding one `#[test]`
/// per function so `cargo test` picks them up individually.
#[macro_export]
macro_rules! define_test_suite {
    ($suite_name:ident, [$($test_fn:ident),* $(,)?]) => {
        $crate::paste::paste! {
            #[allow(dead_code)]
            pub fn [<run_ $suite_name _suite>]() -> $crate::testing::TestSuiteResult {
                let mut result = $crate::testing::TestSuiteResult::new(stringify!($suite_name));
                $(
                    result.record($crate::testing::run_single_test(stringify!($test_fn), $test_fn));
                )*
                result
            }

            #[cfg(test)]
            mod [<$suite_name _suite>] {
                fn log_to_stderr(args: ::core::fmt::Arguments<'_>) {
                    ::std::eprintln!("{}", args);
                }

                $(
                    #[test]
                    fn $test_fn() {
                        $crate::klog::klog_register_backend(log_to_stderr);
                        let result = super::$test_fn();
                        assert!(
                            result.is_pass(),
                            "{} returned {:?}",
                            stringify!($test_fn),
                            result
                        );
                    }
                )*
            }
        }
    };
}
