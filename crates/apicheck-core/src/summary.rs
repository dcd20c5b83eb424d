//! Batch summary and exit-code policy

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::model::ExecutionResult;

/// Aggregate outcome of a batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BatchSummary {
    /// Tests in the batch, including cancelled ones
    pub total: usize,
    pub passed: usize,
    /// Tests that ran and did not pass (assertion or transport failure)
    pub failed: usize,
    /// Transport failures, a subset of `failed`
    pub errored: usize,
    /// Tests never dispatched because the batch was cancelled
    pub cancelled: usize,
    /// `passed / total * 100`, `0` for an empty batch
    pub success_rate: f64,
    pub elapsed_ms: f64,
}

impl BatchSummary {
    #[must_use]
    pub fn from_results(results: &[ExecutionResult], cancelled: usize, elapsed_ms: f64) -> Self {
        let passed = results.iter().filter(|r| r.passed).count();
        let errored = results.iter().filter(|r| r.is_transport_failure()).count();
        let total = results.len() + cancelled;
        Self {
            total,
            passed,
            failed: results.len() - passed,
            errored,
            cancelled,
            success_rate: success_rate(passed, total),
            elapsed_ms,
        }
    }

    /// Process exit code: 0 all passed, 1 assertion failures, 2 transport errors.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.errored > 0 {
            2
        } else if self.failed > 0 || self.cancelled > 0 {
            1
        } else {
            0
        }
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.total == self.passed
    }
}

/// Percentage of passing tests. Zero for an empty batch.
#[must_use]
pub fn success_rate(passed: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        passed as f64 / total as f64 * 100.0
    }
}

/// Format a percentage for display: "75%", "66.7%".
#[must_use]
pub fn format_pct(pct: f64) -> String {
    let rounded = (pct * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{rounded:.0}%")
    } else {
        format!("{rounded:.1}%")
    }
}

/// Summary plus the per-test results it was computed from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BatchReport {
    pub summary: BatchSummary,
    pub results: Vec<ExecutionResult>,
}

impl BatchReport {
    #[must_use]
    pub fn new(results: Vec<ExecutionResult>, cancelled: usize, elapsed_ms: f64) -> Self {
        Self {
            summary: BatchSummary::from_results(&results, cancelled, elapsed_ms),
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Method, ResponseCapture, TestCase};
    use proptest::prelude::*;

    fn ok(test: &TestCase) -> ExecutionResult {
        ExecutionResult::completed(test, &test.url, ResponseCapture::new(200), vec![])
    }

    fn down(test: &TestCase) -> ExecutionResult {
        ExecutionResult::transport_failure(test, &test.url, "timed out", 30_000.0)
    }

    #[test]
    fn empty_batch_is_zero_percent() {
        let summary = BatchSummary::from_results(&[], 0, 0.0);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.success_rate, 0.0);
        assert_eq!(summary.exit_code(), 0);
    }

    #[test]
    fn three_of_four_is_seventy_five() {
        let test = TestCase::new(Method::Get, "/health").unwrap();
        let results = vec![ok(&test), ok(&test), ok(&test), down(&test)];
        let summary = BatchSummary::from_results(&results, 0, 10.0);
        assert_eq!(summary.success_rate, 75.0);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.errored, 1);
        assert_eq!(summary.exit_code(), 2);
        insta::assert_snapshot!(format_pct(summary.success_rate), @"75%");
    }

    #[test]
    fn cancelled_counts_toward_total() {
        let test = TestCase::new(Method::Get, "/health").unwrap();
        let summary = BatchSummary::from_results(&[ok(&test)], 2, 1.0);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.cancelled, 2);
        assert!(!summary.all_passed());
        assert_eq!(summary.exit_code(), 1);
    }

    #[test]
    fn pct_formatting() {
        assert_eq!(format_pct(200.0 / 3.0), "66.7%");
        assert_eq!(format_pct(100.0), "100%");
    }

    proptest! {
        #[test]
        fn failed_covers_transport_failures(pass in 0usize..10, fail in 0usize..10) {
            let test = TestCase::new(Method::Get, "/x").unwrap();
            let results: Vec<_> = (0..pass).map(|_| ok(&test)).chain((0..fail).map(|_| down(&test))).collect();
            let summary = BatchSummary::from_results(&results, 0, 0.0);
            prop_assert_eq!(summary.total, pass + fail);
            prop_assert!(summary.failed >= fail);
            prop_assert!((0.0..=100.0).contains(&summary.success_rate));
        }
    }
}
