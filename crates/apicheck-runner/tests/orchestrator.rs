//! End-to-end orchestration against the simulated transport

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use apicheck_core::{
    Assertion, BodyOperator, Improvement, InMemoryPatternStore, Method, PatternStore, Proposal,
    ResponseCapture, StatusOperator, Suggestion, TestCase,
};
use apicheck_runner::{
    BatchOptions, CancelToken, Orchestrator, PreparedRequest, SimulatedRoute, SimulatedTransport,
    Transport, TransportError,
};
use serde_json::json;

const BASE: &str = "http://api.test";

fn api() -> SimulatedTransport {
    SimulatedTransport::default()
        .with_route(
            SimulatedRoute::new(Method::Post, format!("{BASE}/users"), 201)
                .with_body(json!({"id": 42, "user": {"email": "a@b.com"}}))
                .with_elapsed_ms(20.0),
        )
        .with_route(
            SimulatedRoute::new(Method::Get, format!("{BASE}/users/:id"), 200)
                .with_body(json!({"id": 1, "user": {"email": "a@b.com"}})),
        )
        .with_route(
            SimulatedRoute::new(Method::Get, format!("{BASE}/broken"), 200)
                .with_body(json!({"user": {}})),
        )
}

fn get_user(id: u32) -> TestCase {
    TestCase::new(Method::Get, format!("{{{{base}}}}/users/{id}"))
        .unwrap()
        .with_assertion(Assertion::status(StatusOperator::Equals, "200"))
        .with_assertion(Assertion::body("id", BodyOperator::Exists, None))
}

fn orchestrator(transport: SimulatedTransport) -> Orchestrator<SimulatedTransport> {
    Orchestrator::new(transport)
        .with_variables([("base".to_string(), BASE.to_string())].into())
}

#[test]
fn sequential_runs_in_list_order() {
    let orchestrator = orchestrator(api());
    let tests: Vec<TestCase> = (1..=4).map(get_user).collect();

    let report = orchestrator.run_batch(&tests, &BatchOptions::sequential());

    let urls: Vec<String> = orchestrator
        .transport()
        .received()
        .into_iter()
        .map(|r| r.url)
        .collect();
    assert_eq!(
        urls,
        (1..=4).map(|i| format!("{BASE}/users/{i}")).collect::<Vec<_>>()
    );
    assert_eq!(report.summary.passed, 4);
    assert_eq!(report.summary.success_rate, 100.0);
}

#[test]
fn transport_failure_does_not_abort_batch() {
    let orchestrator = orchestrator(api());
    let tests = vec![
        get_user(1),
        TestCase::new(Method::Get, "{{base}}/nowhere")
            .unwrap()
            .with_assertion(Assertion::status(StatusOperator::Equals, "200")),
        get_user(3),
    ];

    let report = orchestrator.run_batch(&tests, &BatchOptions::sequential());

    assert_eq!(report.summary.total, 3);
    assert_eq!(report.summary.errored, 1);
    assert!(report.summary.failed >= 1);
    assert_eq!(report.summary.exit_code(), 2);

    let failed = &report.results[1];
    assert!(!failed.passed);
    assert!(failed.response.is_none());
    assert!(failed.assertion_results.is_empty());
    assert!(failed.error.as_deref().unwrap().contains("no simulated route"));
    assert!(report.results[2].passed, "later tests still run");
}

#[test]
fn concurrent_results_keep_input_order() {
    let transport = SimulatedTransport::default()
        .with_route(
            SimulatedRoute::new(Method::Get, "/slow", 200).with_delay(Duration::from_millis(80)),
        )
        .with_route(SimulatedRoute::new(Method::Get, "/fast", 200));
    let orchestrator = Orchestrator::new(transport).with_max_concurrent(4);
    let tests = vec![
        TestCase::new(Method::Get, "/slow").unwrap().with_id("slow"),
        TestCase::new(Method::Get, "/fast").unwrap().with_id("fast-1"),
        TestCase::new(Method::Get, "/fast").unwrap().with_id("fast-2"),
    ];

    let report = orchestrator.run_batch(&tests, &BatchOptions::concurrent());

    let ids: Vec<&str> = report.results.iter().map(|r| r.test_id.as_str()).collect();
    assert_eq!(ids, vec!["slow", "fast-1", "fast-2"]);
    assert_eq!(report.summary.passed, 3);
}

#[test]
fn concurrent_absorption_loses_no_updates() {
    let store = Arc::new(InMemoryPatternStore::new());
    let orchestrator = orchestrator(api())
        .with_patterns(store.clone())
        .with_max_concurrent(8);
    let tests: Vec<TestCase> = (1..=20).map(get_user).collect();

    let report = orchestrator.run_batch(&tests, &BatchOptions::concurrent());

    assert_eq!(report.summary.passed, 20);
    let entry = store.lookup(Method::Get, &format!("{BASE}/users/7")).unwrap();
    assert_eq!(entry.confidence, 20);
    assert_eq!(entry.url_pattern, format!("{BASE}/users/:id"));
}

#[test]
fn failing_runs_leave_patterns_alone() {
    let store = Arc::new(InMemoryPatternStore::new());
    let orchestrator = orchestrator(api()).with_patterns(store.clone());
    let failing = get_user(1).with_assertion(Assertion::body("missing", BodyOperator::Exists, None));

    orchestrator.run_single(&get_user(1));
    orchestrator.run_single(&failing);
    orchestrator.run_single(&get_user(2));

    let entry = store.lookup(Method::Get, &format!("{BASE}/users/1")).unwrap();
    assert_eq!(entry.confidence, 2);
}

#[test]
fn cancelled_before_start_dispatches_nothing() {
    let orchestrator = orchestrator(api());
    let cancel = CancelToken::new();
    cancel.cancel();
    let tests: Vec<TestCase> = (1..=3).map(get_user).collect();

    let report = orchestrator.run_batch(&tests, &BatchOptions::concurrent().with_cancel(cancel));

    assert!(report.results.is_empty());
    assert_eq!(report.summary.cancelled, 3);
    assert_eq!(report.summary.total, 3);
    assert!(orchestrator.transport().received().is_empty());
}

/// Cancels the batch while the n-th request is in flight.
struct CancelOnRequest {
    inner: SimulatedTransport,
    cancel: CancelToken,
    at: usize,
    seen: AtomicUsize,
}

impl Transport for CancelOnRequest {
    fn send(&self, request: &PreparedRequest) -> Result<ResponseCapture, TransportError> {
        if self.seen.fetch_add(1, Ordering::SeqCst) + 1 == self.at {
            self.cancel.cancel();
        }
        self.inner.send(request)
    }
}

#[test]
fn sequential_cancel_keeps_in_flight_result() {
    let cancel = CancelToken::new();
    let transport = CancelOnRequest {
        inner: api(),
        cancel: cancel.clone(),
        at: 2,
        seen: AtomicUsize::new(0),
    };
    let orchestrator = Orchestrator::new(transport)
        .with_variables([("base".to_string(), BASE.to_string())].into());
    let tests: Vec<TestCase> = (1..=5).map(get_user).collect();

    let report = orchestrator.run_batch(&tests, &BatchOptions::sequential().with_cancel(cancel));

    assert_eq!(report.results.len(), 2, "the in-flight test is recorded");
    assert!(report.results.iter().all(|r| r.passed));
    assert_eq!(report.summary.cancelled, 3);
    assert_eq!(report.summary.exit_code(), 1);
}

#[test]
fn concurrent_cancel_records_every_dispatched_test() {
    let cancel = CancelToken::new();
    let transport = CancelOnRequest {
        inner: api(),
        cancel: cancel.clone(),
        at: 2,
        seen: AtomicUsize::new(0),
    };
    let orchestrator = Orchestrator::new(transport)
        .with_variables([("base".to_string(), BASE.to_string())].into())
        .with_max_concurrent(2);
    let tests: Vec<TestCase> = (1..=10).map(get_user).collect();

    let report = orchestrator.run_batch(&tests, &BatchOptions::concurrent().with_cancel(cancel));

    let dispatched = orchestrator.transport().inner.received();
    // Each worker can be past its cancel check when the flag flips.
    assert!((2..=3).contains(&report.results.len()), "{} results", report.results.len());
    assert_eq!(report.results.len(), dispatched.len());
    let recorded: Vec<&str> = report.results.iter().map(|r| r.url.as_str()).collect();
    let expected: Vec<String> = (1..=report.results.len())
        .map(|i| format!("{BASE}/users/{i}"))
        .collect();
    assert_eq!(recorded, expected);
    assert!(report.results.iter().all(|r| r.response.is_some() && r.passed));
    assert_eq!(report.summary.cancelled, tests.len() - report.results.len());
    assert_eq!(report.summary.total, tests.len());
    assert_eq!(report.summary.exit_code(), 1);
}

#[test]
fn suggestions_include_scenarios_and_improvements() {
    let orchestrator = orchestrator(api());
    let lookup = get_user(7);

    let suggestions = orchestrator.suggestions(&lookup, None);

    let improvements: Vec<Improvement> =
        suggestions.iter().filter_map(Suggestion::improvement).collect();
    assert_eq!(improvements, vec![Improvement::AddAssertions, Improvement::AddErrorCases]);
    let not_found = suggestions
        .iter()
        .filter_map(Suggestion::test_case)
        .find(|t| t.url == format!("{BASE}/users/999999"))
        .unwrap();
    assert_eq!(not_found.assertions, vec![Assertion::status(StatusOperator::Equals, "404")]);
}

#[test]
fn post_with_id_suggests_follow_up_get() {
    let orchestrator = orchestrator(api());
    let create = TestCase::new(Method::Post, "{{base}}/users").unwrap();

    let result = orchestrator.run_single(&create);
    let calls: Vec<(Method, String)> = orchestrator
        .suggestions(&create, Some(&result))
        .into_iter()
        .filter_map(Suggestion::into_test_case)
        .map(|t| (t.method, t.url))
        .collect();

    assert!(calls.contains(&(Method::Get, format!("{BASE}/users/42"))));
}

#[test]
fn accepted_suggestions_pass_on_rerun() {
    let orchestrator = orchestrator(api());
    let mut create = TestCase::new(Method::Post, "{{base}}/users").unwrap();

    let first = orchestrator.run_single(&create);
    for suggestion in orchestrator.suggestions(&create, Some(&first)) {
        if matches!(suggestion.proposal, Proposal::Assertion(_)) {
            create.accept(&suggestion);
        }
    }
    assert!(create.assertions.len() >= 4);

    let rerun = orchestrator.run_single(&create);
    let failures: Vec<String> = rerun
        .assertion_results
        .iter()
        .filter(|r| !r.passed)
        .map(|r| format!("{} (actual {})", r.assertion, r.actual_value))
        .collect();
    assert!(failures.is_empty(), "failed: {failures:?}");
}

#[test]
fn email_regex_through_pipeline() {
    let orchestrator = orchestrator(api());
    let email = Assertion::body(
        "user.email",
        BodyOperator::MatchesRegex,
        Some(r"^[^@]+@[^@]+\.[^@]+$".into()),
    );
    let good = get_user(5).with_assertion(email.clone());
    let bad = TestCase::new(Method::Get, "{{base}}/broken")
        .unwrap()
        .with_assertion(email);

    assert!(orchestrator.run_single(&good).passed);
    let result = orchestrator.run_single(&bad);
    assert!(!result.passed);
    assert_eq!(result.assertion_results[0].actual_value.as_text(), "");
}

