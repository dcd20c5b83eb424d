//! Suggestion generation
//!
//! Four sources feed suggestions:
//! - the pattern store (assertions that passed on structurally similar runs)
//! - static heuristics on method and URL
//! - the content of a captured response
//! - the shape of the test itself (draft scenarios and improvement hints)
//!
//! Nothing here mutates a test. A caller turns a suggestion into real state
//! with [`TestCase::accept`] or [`Suggestion::into_test_case`].

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::assertion::{
    Assertion, AssertionType, BodyOperator, HeaderOperator, JsonSchemaOperator, ResponseTimeOperator,
    StatusOperator,
};
use crate::model::{new_id, ExecutionResult, Method, RequestBody, ResponseCapture, TestCase};
use crate::pattern::PatternStore;
use crate::resolve::{format_millis, ActualValue};

/// Email shape suggested for user endpoints.
pub const EMAIL_PATTERN: &str = r"^[^@]+@[^@]+\.[^@]+$";

/// Body fields worth pinning when present in a response.
const IMPORTANT_FIELDS: [&str; 6] = ["id", "uuid", "status", "success", "error", "message"];

const SECURITY_HEADERS: [&str; 3] = [
    "x-frame-options",
    "x-content-type-options",
    "x-xss-protection",
];

/// Lower bound for suggested response time budgets, in milliseconds.
const MIN_TIME_BUDGET_MS: f64 = 1000.0;

/// Response time budget for drafted happy-path scenarios, in milliseconds.
const SCENARIO_TIME_BUDGET_MS: &str = "5000";

/// Id substituted into drafted not-found scenarios.
const MISSING_ID: &str = "999999";

/// Below this many assertions a test is flagged as thin.
const MIN_ASSERTIONS: usize = 3;

/// How much a suggestion should be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum Confidence {
    /// Backed by this many passing runs
    Observed { runs: u32 },
    High,
    Medium,
    Low,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Observed { runs } => write!(f, "observed x{runs}"),
            Self::High => f.write_str("high"),
            Self::Medium => f.write_str("medium"),
            Self::Low => f.write_str("low"),
        }
    }
}

/// What a suggestion proposes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Proposal {
    Assertion(Assertion),
    NextCall(TestCase),
    Improvement(Improvement),
}

/// Something missing from an existing test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Improvement {
    /// Fewer than three assertions
    AddAssertions,
    /// Body-carrying method without a `Content-Type` header
    AddContentType,
    /// Nothing checks an error outcome
    AddErrorCases,
}

impl fmt::Display for Improvement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AddAssertions => "add response time, content type and schema assertions",
            Self::AddContentType => "add a Content-Type header for the request body",
            Self::AddErrorCases => "add negative tests for 400, 401, 404 and 500 responses",
        })
    }
}

/// A computed, not yet applied recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub proposal: Proposal,
    pub confidence: Confidence,
    pub reason: String,
}

impl Suggestion {
    fn assertion_with(assertion: Assertion, confidence: Confidence, reason: impl Into<String>) -> Self {
        Self {
            proposal: Proposal::Assertion(assertion),
            confidence,
            reason: reason.into(),
        }
    }

    fn next_call(test: TestCase, confidence: Confidence, reason: impl Into<String>) -> Self {
        Self {
            proposal: Proposal::NextCall(test),
            confidence,
            reason: reason.into(),
        }
    }

    fn hint(improvement: Improvement, confidence: Confidence, reason: impl Into<String>) -> Self {
        Self {
            proposal: Proposal::Improvement(improvement),
            confidence,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn assertion(&self) -> Option<&Assertion> {
        match &self.proposal {
            Proposal::Assertion(a) => Some(a),
            Proposal::NextCall(_) | Proposal::Improvement(_) => None,
        }
    }

    #[must_use]
    pub fn test_case(&self) -> Option<&TestCase> {
        match &self.proposal {
            Proposal::NextCall(t) => Some(t),
            Proposal::Assertion(_) | Proposal::Improvement(_) => None,
        }
    }

    #[must_use]
    pub fn improvement(&self) -> Option<Improvement> {
        match self.proposal {
            Proposal::Improvement(i) => Some(i),
            Proposal::Assertion(_) | Proposal::NextCall(_) => None,
        }
    }

    /// Materialize a next-call suggestion as a runnable test case.
    #[must_use]
    pub fn into_test_case(self) -> Option<TestCase> {
        match self.proposal {
            Proposal::NextCall(t) => Some(t),
            Proposal::Assertion(_) | Proposal::Improvement(_) => None,
        }
    }
}

impl fmt::Display for Suggestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.proposal {
            Proposal::Assertion(a) => write!(f, "[{}] {a} ({})", self.confidence, self.reason),
            Proposal::NextCall(t) => write!(
                f,
                "[{}] {} {} ({})",
                self.confidence, t.method, t.url, self.reason
            ),
            Proposal::Improvement(i) => write!(f, "[{}] {i} ({})", self.confidence, self.reason),
        }
    }
}

impl TestCase {
    /// Apply an assertion suggestion. Returns `false` for next-call
    /// suggestions and for assertions the test already has.
    pub fn accept(&mut self, suggestion: &Suggestion) -> bool {
        match suggestion.assertion() {
            Some(assertion) if !self.assertions.contains(assertion) => {
                self.assertions.push(assertion.clone());
                true
            }
            _ => false,
        }
    }
}

/// Suggest assertions for a test: pattern-derived first, then heuristics.
///
/// `test.url` should already have its placeholders resolved, otherwise the
/// pattern lookup will not find runs recorded under the concrete URL.
#[must_use]
pub fn suggest_assertions(test: &TestCase, patterns: &dyn PatternStore) -> Vec<Suggestion> {
    let mut suggestions = Vec::new();

    if let Some(entry) = patterns.lookup(test.method, &test.url) {
        let reason = format!("based on {} similar successful tests", entry.confidence);
        suggestions.extend(entry.assertions.into_iter().map(|assertion| {
            Suggestion::assertion_with(
                assertion,
                Confidence::Observed {
                    runs: entry.confidence,
                },
                reason.clone(),
            )
        }));
    }

    let url = test.url.to_ascii_lowercase();
    if test.method == Method::Post {
        suggestions.push(Suggestion::assertion_with(
            Assertion::status(StatusOperator::Equals, "201"),
            Confidence::Medium,
            "POST requests usually return 201 Created",
        ));
    }
    if url.contains("auth") || url.contains("login") {
        suggestions.push(Suggestion::assertion_with(
            Assertion::body("token", BodyOperator::Exists, None),
            Confidence::Medium,
            "authentication endpoints usually return a token",
        ));
    }
    if url.contains("users") {
        suggestions.push(Suggestion::assertion_with(
            Assertion::body("user.email", BodyOperator::MatchesRegex, Some(EMAIL_PATTERN.into())),
            Confidence::Low,
            "user payloads usually carry an email address",
        ));
    }

    suggestions
}

/// Suggest assertions that pin down what a response actually returned.
///
/// Every suggestion passes against the response it was derived from.
#[must_use]
pub fn suggest_from_response(result: &ExecutionResult) -> Vec<Suggestion> {
    let Some(response) = &result.response else {
        return Vec::new();
    };
    let mut suggestions = vec![
        Suggestion::assertion_with(
            Assertion::status(StatusOperator::Equals, response.status_code.to_string()),
            Confidence::High,
            format!("response returned status {}", response.status_code),
        ),
        Suggestion::assertion_with(
            Assertion::response_time(ResponseTimeOperator::LessThan, time_budget(response.elapsed_ms)),
            Confidence::Medium,
            format!("response took {} ms", format_millis(response.elapsed_ms)),
        ),
    ];

    if let Some(mime) = response
        .header("content-type")
        .and_then(|ct| ct.split(';').next())
        .map(str::trim)
        .filter(|mime| !mime.is_empty())
    {
        suggestions.push(Suggestion::assertion_with(
            Assertion::header("content-type", HeaderOperator::Contains, Some(mime.to_string())),
            Confidence::High,
            format!("response is {mime}"),
        ));
    }

    match &response.body {
        Value::Object(body) => suggestions.extend(object_suggestions(body)),
        Value::Array(items) => {
            suggestions.push(Suggestion::assertion_with(
                Assertion::body("", BodyOperator::HasLength, Some(items.len().to_string())),
                Confidence::Low,
                format!("response array has {} items", items.len()),
            ));
            if items.first().is_some_and(Value::is_object) {
                suggestions.push(Suggestion::assertion_with(
                    Assertion::body("0", BodyOperator::IsObject, None),
                    Confidence::Medium,
                    "first array item is an object",
                ));
            }
        }
        _ => {}
    }

    for name in SECURITY_HEADERS {
        if let Some(value) = response.header(name) {
            suggestions.push(Suggestion::assertion_with(
                Assertion::header(name, HeaderOperator::Equals, Some(value.to_string())),
                Confidence::Low,
                format!("security header {name} is set"),
            ));
        }
    }

    suggestions
}

fn time_budget(elapsed_ms: f64) -> String {
    let budget = (elapsed_ms * 3.0).ceil().max(MIN_TIME_BUDGET_MS);
    format_millis(budget)
}

fn object_suggestions(body: &Map<String, Value>) -> Vec<Suggestion> {
    let mut suggestions: Vec<Suggestion> = IMPORTANT_FIELDS
        .into_iter()
        .filter_map(|field| {
            let value = body.get(field).filter(|v| is_scalar(v))?;
            let expected = ActualValue::raw_value(value.clone()).as_text();
            Some(Suggestion::assertion_with(
                Assertion::body(field, BodyOperator::Equals, Some(expected)),
                Confidence::Medium,
                format!("response carries `{field}`"),
            ))
        })
        .collect();

    if body.len() > 3 {
        suggestions.push(Suggestion::assertion_with(
            Assertion::json_schema(
                "",
                JsonSchemaOperator::ValidatesAgainst,
                Some(simple_schema(body).to_string()),
            ),
            Confidence::Low,
            format!("response object has {} fields", body.len()),
        ));
    }
    suggestions
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

/// Structural schema: one typed property per field, non-null fields required.
#[must_use]
pub fn simple_schema(body: &Map<String, Value>) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for (key, value) in body {
        let kind = match value {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        };
        properties.insert(key.clone(), json!({ "type": kind }));
        if !value.is_null() {
            required.push(Value::String(key.clone()));
        }
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Propose executable follow-up calls after a successful run.
#[must_use]
pub fn suggest_next_calls(test: &TestCase, result: &ExecutionResult) -> Vec<Suggestion> {
    let Some(response) = result.response.as_ref().filter(|r| r.is_success()) else {
        return Vec::new();
    };
    let url = if result.url.is_empty() {
        &test.url
    } else {
        &result.url
    };
    let base = strip_query(url);
    let lower = base.to_ascii_lowercase();
    let mut drafts: Vec<Suggestion> = Vec::new();

    if lower.contains("auth") || lower.contains("login") {
        if let Some(token) = body_text(response, &["token", "access_token"]) {
            drafts.extend(auth_follow_ups(test, origin(base), &token));
        }
    }

    if test.method == Method::Post {
        if let Some(id) = body_text(response, &["id", "uuid"]) {
            let item = format!("{base}/{id}");
            drafts.push(Suggestion::next_call(
                with_success_range(draft(test, Method::Get, &item, "Fetch created resource")),
                Confidence::High,
                format!("response returned id {id}"),
            ));
            let mut update = draft(test, Method::Put, &item, "Update created resource");
            update.body = test.body.clone();
            drafts.push(Suggestion::next_call(
                update,
                Confidence::Medium,
                format!("resource {id} can be updated"),
            ));
            drafts.push(Suggestion::next_call(
                with_success_range(draft(test, Method::Get, base, "List collection")),
                Confidence::Low,
                "list the collection to see the new resource",
            ));
        }
    }

    drafts.extend(crud_completions(test, base));

    let mut seen = BTreeSet::from([(test.method, base.to_string())]);
    drafts.retain(|s| {
        s.test_case()
            .is_none_or(|t| seen.insert((t.method, t.url.clone())))
    });
    drafts
}

/// Draft scenarios for a test's endpoint: happy path, method-specific,
/// missing or invalid auth, invalid input and unknown id.
#[must_use]
pub fn suggest_endpoint_tests(test: &TestCase) -> Vec<Suggestion> {
    let url = test.url.as_str();
    let carries_body = matches!(test.method, Method::Post | Method::Put | Method::Patch);
    let mut scenarios = Vec::new();

    let mut happy = scenario(test, test.method, url, "happy path")
        .with_assertion(Assertion::status(StatusOperator::Equals, "200"))
        .with_assertion(Assertion::response_time(
            ResponseTimeOperator::LessThan,
            SCENARIO_TIME_BUDGET_MS,
        ));
    happy.body = test.body.clone();
    scenarios.push(Suggestion::next_call(happy, Confidence::High, "successful request"));

    match test.method {
        Method::Post => scenarios.push(Suggestion::next_call(
            scenario(test, Method::Post, url, "valid creation")
                .with_body(RequestBody::Json(
                    json!({"name": "Test Resource", "description": "Test description"}),
                ))
                .with_assertion(Assertion::status(StatusOperator::Equals, "201"))
                .with_assertion(Assertion::body("id", BodyOperator::Exists, None)),
            Confidence::High,
            "creation returns the new id",
        )),
        Method::Put => scenarios.push(Suggestion::next_call(
            scenario(test, Method::Put, url, "full update")
                .with_body(RequestBody::Json(
                    json!({"name": "Updated Resource", "description": "Updated description"}),
                ))
                .with_assertion(Assertion::status(StatusOperator::Equals, "200"))
                .with_assertion(Assertion::body(
                    "name",
                    BodyOperator::Equals,
                    Some("Updated Resource".into()),
                )),
            Confidence::Medium,
            "update echoes the new state",
        )),
        Method::Delete => scenarios.push(Suggestion::next_call(
            scenario(test, Method::Delete, url, "successful deletion")
                .with_assertion(Assertion::status(StatusOperator::Equals, "204")),
            Confidence::Medium,
            "deletion returns no content",
        )),
        _ => {}
    }

    let mut unauthenticated =
        draft(test, test.method, url, &scenario_name(test, "no authentication"))
            .with_assertion(Assertion::status(StatusOperator::Equals, "401"));
    unauthenticated.body = test.body.clone();
    let mut invalid_token = draft(test, test.method, url, &scenario_name(test, "invalid token"))
        .with_header("Authorization", "Bearer invalid_token")
        .with_assertion(Assertion::status(StatusOperator::Equals, "401"));
    invalid_token.body = test.body.clone();
    scenarios.push(Suggestion::next_call(
        unauthenticated,
        Confidence::Medium,
        "requests without credentials are rejected",
    ));
    scenarios.push(Suggestion::next_call(
        invalid_token,
        Confidence::Medium,
        "requests with a bad token are rejected",
    ));

    if carries_body {
        scenarios.push(Suggestion::next_call(
            scenario(test, test.method, url, "invalid input")
                .with_body(RequestBody::Json(json!({"invalid_field": "invalid_value"})))
                .with_assertion(Assertion::status(StatusOperator::Equals, "400")),
            Confidence::Medium,
            "malformed input is rejected",
        ));
    }

    if let Some(missing) = missing_resource_url(url) {
        scenarios.push(Suggestion::next_call(
            scenario(test, test.method, &missing, "resource not found")
                .with_assertion(Assertion::status(StatusOperator::Equals, "404")),
            Confidence::High,
            "unknown ids return 404",
        ));
    }

    scenarios
}

/// Flag gaps in an existing test.
#[must_use]
pub fn suggest_test_improvements(test: &TestCase) -> Vec<Suggestion> {
    let mut hints = Vec::new();
    if test.assertions.len() < MIN_ASSERTIONS {
        hints.push(Suggestion::hint(
            Improvement::AddAssertions,
            Confidence::Medium,
            format!("test has {} assertions", test.assertions.len()),
        ));
    }
    if matches!(test.method, Method::Post | Method::Put | Method::Patch)
        && !test.headers.keys().any(|k| k.eq_ignore_ascii_case("content-type"))
    {
        hints.push(Suggestion::hint(
            Improvement::AddContentType,
            Confidence::High,
            format!("{} without Content-Type", test.method),
        ));
    }
    if !test.assertions.iter().any(checks_error) {
        hints.push(Suggestion::hint(
            Improvement::AddErrorCases,
            Confidence::Medium,
            "no assertion covers an error response",
        ));
    }
    hints
}

fn checks_error(assertion: &Assertion) -> bool {
    if assertion.to_string().to_ascii_lowercase().contains("error") {
        return true;
    }
    assertion.kind() == AssertionType::Status
        && assertion
            .expected()
            .and_then(|e| e.trim().parse::<u16>().ok())
            .is_some_and(|code| code >= 400)
}

fn scenario_name(test: &TestCase, scenario: &str) -> String {
    format!("{} {} - {scenario}", test.method, strip_query(&test.url))
}

/// Draft a scenario that keeps all of the source test's headers.
fn scenario(test: &TestCase, method: Method, url: &str, name: &str) -> TestCase {
    let mut next = draft(test, method, url, &scenario_name(test, name));
    next.headers = test.headers.clone();
    next
}

/// Swap the id segment (`{id}`, `:id` or a numeric tail) for an id that
/// should not exist.
fn missing_resource_url(url: &str) -> Option<String> {
    let base = strip_query(url);
    let (parent, last) = base.rsplit_once('/')?;
    let is_id = last == "{id}"
        || last == ":id"
        || (!last.is_empty() && last.bytes().all(|b| b.is_ascii_digit()));
    is_id.then(|| format!("{parent}/{MISSING_ID}"))
}

fn auth_follow_ups(test: &TestCase, origin: &str, token: &str) -> [Suggestion; 2] {
    let bearer = format!("Bearer {token}");
    let profile = with_success_range(draft(
        test,
        Method::Get,
        &format!("{origin}/profile"),
        "Fetch profile with token",
    ))
    .with_header("Authorization", bearer.clone());
    let refresh = draft(
        test,
        Method::Post,
        &format!("{origin}/auth/refresh"),
        "Refresh token",
    )
    .with_header("Authorization", bearer);
    [
        Suggestion::next_call(
            profile,
            Confidence::High,
            "login returned a token for protected endpoints",
        ),
        Suggestion::next_call(refresh, Confidence::Medium, "tokens usually expire"),
    ]
}

/// Up to two of GET/POST/PUT/DELETE against a URL ending in a numeric id.
fn crud_completions(test: &TestCase, base: &str) -> Vec<Suggestion> {
    let Some((collection, id)) = base.rsplit_once('/') else {
        return Vec::new();
    };
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return Vec::new();
    }
    [
        (Method::Get, base, "Read resource"),
        (Method::Post, collection, "Create resource"),
        (Method::Put, base, "Update resource"),
        (Method::Delete, base, "Delete resource"),
    ]
    .into_iter()
    .filter(|(method, _, _)| *method != test.method)
    .take(2)
    .map(|(method, url, name)| {
        let mut next = draft(test, method, url, name);
        if method == Method::Get {
            next = with_success_range(next);
        }
        if matches!(method, Method::Post | Method::Put) {
            next.body = test.body.clone();
        }
        Suggestion::next_call(next, Confidence::Low, "complete the CRUD cycle")
    })
    .collect()
}

/// Draft a follow-up call carrying the source test's headers, minus auth.
fn draft(source: &TestCase, method: Method, url: &str, name: &str) -> TestCase {
    TestCase {
        id: new_id("test"),
        name: name.to_string(),
        method,
        url: url.to_string(),
        headers: source
            .headers
            .iter()
            .filter(|(k, _)| !k.eq_ignore_ascii_case("authorization"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        body: None,
        assertions: Vec::new(),
        last_result: None,
    }
}

fn with_success_range(test: TestCase) -> TestCase {
    test.with_assertion(Assertion::status(StatusOperator::InRange, "200,299"))
}

/// First non-empty scalar among `fields` in an object body.
fn body_text(response: &ResponseCapture, fields: &[&str]) -> Option<String> {
    let body = response.body.as_object()?;
    fields
        .iter()
        .filter_map(|f| body.get(*f).filter(|v| is_scalar(v)))
        .map(|v| ActualValue::raw_value(v.clone()).as_text())
        .find(|text| !text.is_empty())
}

fn strip_query(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    let trimmed = url[..end].trim_end_matches('/');
    if trimmed.is_empty() { &url[..end] } else { trimmed }
}

/// `https://api.test/v1/login` → `https://api.test`; relative URLs → `""`.
fn origin(url: &str) -> &str {
    let Some(scheme_end) = url.find("://") else {
        return "";
    };
    let host_start = scheme_end + 3;
    match url[host_start..].find('/') {
        Some(slash) => &url[..host_start + slash],
        None => url,
    }
}
