// Test harness types: TestSuiteResult, TestRunSummary, run_single_test.
// Suites are generated by define_test_suite!, which also emits #[test] wrappers.

use super::TestResult;

/// Result of executing a single test suite.
#[derive(Clone, Copy, Debug, Default)]
pub struct TestSuiteResult {
    pub name: &'static str,
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
}

impl TestSuiteResult {
    /// Create a new result with just the suite name set.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            total: 0,
            passed: 0,
            failed: 0,
            skipped: 0,
        }
    }

    /// Count one test outcome.
    pub fn record(&mut self, result: TestResult) {
        self.total += 1;
        match result {
            TestResult::Pass => self.passed += 1,
            TestResult::Skipped => self.skipped += 1,
            TestResult::Fail | TestResult::Panic => self.failed += 1,
        }
    }

    /// Check if all tests in this suite passed.
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// Aggregated results from running several suites.
#[derive(Clone, Copy, Debug, Default)]
pub struct TestRunSummary {
    pub suite_count: usize,
    pub total_tests: u32,
    pub passed: u32,
    pub failed: u32,
}

impl TestRunSummary {
    /// Add results from a single suite to the summary.
    pub fn add_suite_result(&mut self, result: &TestSuiteResult) {
        self.suite_count += 1;
        self.total_tests = self.total_tests.saturating_add(result.total);
        self.passed = self.passed.saturating_add(result.passed);
        self.failed = self.failed.saturating_add(result.failed);
    }

    /// Check if all tests across all suites passed.
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// Run one test function and log its outcome.
pub fn run_single_test(name: &str, test: fn() -> TestResult) -> TestResult {
    let result = test();
    if result.is_failure() {
        crate::klog_info!("TEST FAIL: {}", name);
    } else {
        crate::klog_debug!("TEST {:?}: {}", result, name);
    }
    result
}
