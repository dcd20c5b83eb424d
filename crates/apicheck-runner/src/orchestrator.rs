//! Execution orchestrator
//!
//! Runs single tests and batches: resolve placeholders, send through the
//! transport, evaluate every assertion, record the result, and feed passing
//! runs into the pattern store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use apicheck_core::config::DEFAULT_MAX_CONCURRENT;
use apicheck_core::template::{render, Variables};
use apicheck_core::{
    evaluate_all, suggest_assertions, suggest_endpoint_tests, suggest_from_response,
    suggest_next_calls, suggest_test_improvements, BatchReport, Config, ExecutionResult,
    InMemoryPatternStore, PatternStore, Suggestion, TestCase,
};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::transport::{PreparedRequest, Transport};

/// How a batch is dispatched
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Run up to `max_concurrent` tests at once instead of in list order
    pub concurrent: bool,
    pub cancel: CancelToken,
}

impl BatchOptions {
    #[must_use]
    pub fn sequential() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn concurrent() -> Self {
        Self {
            concurrent: true,
            cancel: CancelToken::new(),
        }
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Drives tests through a transport and the evaluation engine
pub struct Orchestrator<T: Transport> {
    transport: T,
    patterns: Arc<dyn PatternStore>,
    variables: Variables,
    default_headers: BTreeMap<String, String>,
    max_concurrent: usize,
}

impl<T: Transport> Orchestrator<T> {
    /// Orchestrator with an empty in-memory pattern store.
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            patterns: Arc::new(InMemoryPatternStore::new()),
            variables: Variables::new(),
            default_headers: BTreeMap::new(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }

    /// Take variables, default headers and worker count from config.
    #[must_use]
    pub fn from_config(transport: T, config: &Config) -> Self {
        Self::new(transport)
            .with_variables(config.variables.clone())
            .with_default_headers(config.headers.clone())
            .with_max_concurrent(config.max_concurrent)
    }

    #[must_use]
    pub fn with_patterns(mut self, patterns: Arc<dyn PatternStore>) -> Self {
        self.patterns = patterns;
        self
    }

    /// Add placeholder values. Later calls override earlier ones.
    #[must_use]
    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables.extend(variables);
        self
    }

    #[must_use]
    pub fn with_default_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.default_headers.extend(headers);
        self
    }

    #[must_use]
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    #[must_use]
    pub fn patterns(&self) -> &Arc<dyn PatternStore> {
        &self.patterns
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Resolve placeholders and merge default headers under the test's own.
    #[must_use]
    pub fn prepare(&self, test: &TestCase) -> (TestCase, PreparedRequest) {
        let resolved = test.resolved(&self.variables);
        let mut headers: BTreeMap<String, String> = self
            .default_headers
            .iter()
            .filter(|(k, _)| !resolved.headers.keys().any(|own| own.eq_ignore_ascii_case(k)))
            .map(|(k, v)| (k.clone(), render(v, &self.variables)))
            .collect();
        headers.extend(resolved.headers.clone());
        let request = PreparedRequest {
            method: resolved.method,
            url: resolved.url.clone(),
            headers,
            body: resolved.body.clone(),
        };
        (resolved, request)
    }

    /// Run one test to completion.
    ///
    /// Transport failures produce a failed result with no assertion results;
    /// they are never returned as errors.
    pub fn run_single(&self, test: &TestCase) -> ExecutionResult {
        let (resolved, request) = self.prepare(test);
        let unresolved = resolved.unresolved_placeholders();
        if !unresolved.is_empty() {
            warn!(test = %test.id, placeholders = ?unresolved, "unresolved placeholders");
        }
        debug!(test = %test.id, method = %request.method, url = %request.url, "dispatch");

        let start = Instant::now();
        match self.transport.send(&request) {
            Ok(response) => {
                let assertion_results = evaluate_all(&response, &resolved.assertions);
                let result =
                    ExecutionResult::completed(test, &request.url, response, assertion_results);
                debug!(
                    test = %test.id,
                    status = result.response.as_ref().map_or(0, |r| r.status_code),
                    passed = result.passed,
                    failed_assertions = result.failed_assertions(),
                    "completed"
                );
                if result.passed {
                    self.patterns.absorb(&resolved, &result);
                }
                result
            }
            Err(err) => {
                let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
                warn!(test = %test.id, url = %request.url, error = %err, "transport error");
                ExecutionResult::transport_failure(test, &request.url, err, elapsed_ms)
            }
        }
    }

    /// Run one test and store the result as its `last_result`.
    pub fn run_and_record(&self, test: &mut TestCase) -> ExecutionResult {
        let result = self.run_single(test);
        test.last_result = Some(result.clone());
        result
    }

    /// Run a batch. Always returns a full report; failures never abort it.
    ///
    /// Sequential mode runs in list order, each test finishing before the
    /// next starts. Concurrent mode runs up to `max_concurrent` at a time.
    /// Either way results come back in input order, and tests skipped due to
    /// cancellation are counted in `summary.cancelled`.
    pub fn run_batch(&self, tests: &[TestCase], options: &BatchOptions) -> BatchReport {
        info!(
            tests = tests.len(),
            concurrent = options.concurrent,
            "batch started"
        );
        let start = Instant::now();
        let results = if options.concurrent {
            self.run_concurrent(tests, &options.cancel)
        } else {
            self.run_sequential(tests, &options.cancel)
        };
        let cancelled = tests.len() - results.len();
        let report = BatchReport::new(
            results,
            cancelled,
            start.elapsed().as_secs_f64() * 1000.0,
        );
        info!(
            total = report.summary.total,
            passed = report.summary.passed,
            failed = report.summary.failed,
            errored = report.summary.errored,
            cancelled = report.summary.cancelled,
            "batch finished"
        );
        report
    }

    fn run_sequential(&self, tests: &[TestCase], cancel: &CancelToken) -> Vec<ExecutionResult> {
        let mut results = Vec::with_capacity(tests.len());
        for test in tests {
            if cancel.is_cancelled() {
                info!(remaining = tests.len() - results.len(), "batch cancelled");
                break;
            }
            results.push(self.run_single(test));
        }
        results
    }

    fn run_concurrent(&self, tests: &[TestCase], cancel: &CancelToken) -> Vec<ExecutionResult> {
        let workers = self.max_concurrent.min(tests.len()).max(1);
        let next = AtomicUsize::new(0);
        let slots: Vec<Mutex<Option<ExecutionResult>>> =
            tests.iter().map(|_| Mutex::new(None)).collect();

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    while !cancel.is_cancelled() {
                        let index = next.fetch_add(1, Ordering::SeqCst);
                        let Some(test) = tests.get(index) else {
                            break;
                        };
                        let result = self.run_single(test);
                        *slots[index].lock().unwrap_or_else(PoisonError::into_inner) =
                            Some(result);
                    }
                });
            }
        });

        slots
            .into_iter()
            .filter_map(|slot| slot.into_inner().unwrap_or_else(PoisonError::into_inner))
            .collect()
    }

    /// Everything the engine can suggest for a test: pattern and heuristic
    /// assertions, response-derived assertions and next calls when a result
    /// is given, then improvement hints and drafted endpoint scenarios.
    #[must_use]
    pub fn suggestions(&self, test: &TestCase, result: Option<&ExecutionResult>) -> Vec<Suggestion> {
        let (resolved, _) = self.prepare(test);
        let mut suggestions = suggest_assertions(&resolved, self.patterns.as_ref());
        if let Some(result) = result {
            suggestions.extend(suggest_from_response(result));
            suggestions.extend(suggest_next_calls(&resolved, result));
        }
        suggestions.extend(suggest_test_improvements(&resolved));
        suggestions.extend(suggest_endpoint_tests(&resolved));
        suggestions
    }
}
