//! Test cases, captured responses and execution results

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::assertion::Assertion;
use crate::resolve::ActualValue;

/// HTTP method of a test case
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[serde(alias = "get")]
    Get,
    #[serde(alias = "post")]
    Post,
    #[serde(alias = "put")]
    Put,
    #[serde(alias = "patch")]
    Patch,
    #[serde(alias = "delete")]
    Delete,
    #[serde(alias = "head")]
    Head,
    #[serde(alias = "options")]
    Options,
}

impl Method {
    pub const ALL: [Method; 7] = [
        Method::Get,
        Method::Post,
        Method::Put,
        Method::Patch,
        Method::Delete,
        Method::Head,
        Method::Options,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ModelError::UnknownMethod(s.to_string()))
    }
}

/// Request body: raw text or a structured JSON document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum RequestBody {
    Text(String),
    Json(serde_json::Value),
}

/// A single HTTP test: request definition plus the assertions to check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TestCase {
    #[serde(default = "generate_test_id")]
    pub id: String,
    /// Display label
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub method: Method,
    /// Target URL, may contain `{{name}}` placeholders
    pub url: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<RequestBody>,
    #[serde(default)]
    pub assertions: Vec<Assertion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_result: Option<ExecutionResult>,
}

fn generate_test_id() -> String {
    new_id("test")
}

impl TestCase {
    /// Create a test case with no headers, body or assertions.
    ///
    /// # Errors
    ///
    /// Returns error if the URL is empty.
    pub fn new(method: Method, url: impl Into<String>) -> Result<Self, ModelError> {
        let test = Self {
            id: generate_test_id(),
            name: String::new(),
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
            assertions: Vec::new(),
            last_result: None,
        };
        test.validate()?;
        Ok(test)
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn with_assertion(mut self, assertion: Assertion) -> Self {
        self.assertions.push(assertion);
        self
    }

    /// Label used in terminal output: the name, or "METHOD url".
    #[must_use]
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            format!("{} {}", self.method, self.url)
        } else {
            self.name.clone()
        }
    }

    /// Check the structural invariants of a test case.
    ///
    /// # Errors
    ///
    /// Returns error if the URL is blank.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.url.trim().is_empty() {
            return Err(ModelError::EmptyUrl(self.id.clone()));
        }
        Ok(())
    }
}

/// Response as captured by the transport. Never mutated after capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResponseCapture {
    pub status_code: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Parsed JSON body, a string for non-JSON payloads, `null` when empty
    #[serde(default)]
    pub body: serde_json::Value,
    #[serde(default)]
    pub elapsed_ms: f64,
}

impl ResponseCapture {
    #[must_use]
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            headers: BTreeMap::new(),
            body: serde_json::Value::Null,
            elapsed_ms: 0.0,
        }
    }

    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = body;
        self
    }

    #[must_use]
    pub fn with_elapsed_ms(mut self, elapsed_ms: f64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }

    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Outcome of one assertion against one response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AssertionResult {
    pub assertion: Assertion,
    pub passed: bool,
    pub actual_value: ActualValue,
}

/// Outcome of one test run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExecutionResult {
    pub id: String,
    pub test_id: String,
    pub method: Method,
    /// URL after placeholder substitution
    pub url: String,
    /// `None` when the transport failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseCapture>,
    #[serde(default)]
    pub assertion_results: Vec<AssertionResult>,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: f64,
    /// Unix epoch milliseconds
    pub timestamp_ms: u64,
}

impl ExecutionResult {
    /// Result for a captured response. Passes iff every assertion passed.
    #[must_use]
    pub fn completed(
        test: &TestCase,
        url: impl Into<String>,
        response: ResponseCapture,
        assertion_results: Vec<AssertionResult>,
    ) -> Self {
        let passed = assertion_results.iter().all(|r| r.passed);
        Self {
            id: new_id("run"),
            test_id: test.id.clone(),
            method: test.method,
            url: url.into(),
            elapsed_ms: response.elapsed_ms,
            response: Some(response),
            assertion_results,
            passed,
            error: None,
            timestamp_ms: now_ms(),
        }
    }

    /// Result for a request that never produced a response.
    #[must_use]
    pub fn transport_failure(
        test: &TestCase,
        url: impl Into<String>,
        error: impl fmt::Display,
        elapsed_ms: f64,
    ) -> Self {
        Self {
            id: new_id("run"),
            test_id: test.id.clone(),
            method: test.method,
            url: url.into(),
            response: None,
            assertion_results: Vec::new(),
            passed: false,
            error: Some(error.to_string()),
            elapsed_ms,
            timestamp_ms: now_ms(),
        }
    }

    #[must_use]
    pub fn is_transport_failure(&self) -> bool {
        self.error.is_some()
    }

    /// Number of assertions that failed.
    #[must_use]
    pub fn failed_assertions(&self) -> usize {
        self.assertion_results.iter().filter(|r| !r.passed).count()
    }
}

/// Random identifier, e.g. `run-1f0c3a9be27d4410`.
#[must_use]
pub fn new_id(prefix: &str) -> String {
    format!("{prefix}-{:016x}", rand::random::<u64>())
}

/// Current time as Unix epoch milliseconds.
#[must_use]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("test `{0}` has an empty URL")]
    EmptyUrl(String),
    #[error("unknown HTTP method `{0}`")]
    UnknownMethod(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parse_case_insensitive() {
        assert_eq!("get".parse::<Method>().unwrap(), Method::Get);
        assert_eq!(" Patch ".parse::<Method>().unwrap(), Method::Patch);
        assert!(matches!(
            "TRACE".parse::<Method>(),
            Err(ModelError::UnknownMethod(_))
        ));
    }

    #[test]
    fn method_serde_accepts_lowercase() {
        let m: Method = serde_json::from_str("\"post\"").unwrap();
        assert_eq!(m, Method::Post);
        assert_eq!(serde_json::to_string(&Method::Delete).unwrap(), "\"DELETE\"");
    }

    #[test]
    fn empty_url_rejected() {
        assert!(matches!(
            TestCase::new(Method::Get, "  "),
            Err(ModelError::EmptyUrl(_))
        ));
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let response = ResponseCapture::new(200).with_header("Content-Type", "application/json");
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.header("CONTENT-TYPE"), Some("application/json"));
        assert_eq!(response.header("x-missing"), None);
    }

    #[test]
    fn completed_without_assertions_passes() {
        let test = TestCase::new(Method::Get, "http://localhost/health").unwrap();
        let result = ExecutionResult::completed(&test, &test.url, ResponseCapture::new(500), vec![]);
        assert!(result.passed);
        assert_eq!(result.test_id, test.id);
    }

    #[test]
    fn transport_failure_never_passes() {
        let test = TestCase::new(Method::Get, "http://localhost/health").unwrap();
        let result = ExecutionResult::transport_failure(&test, &test.url, "connection refused", 3.0);
        assert!(!result.passed);
        assert!(result.response.is_none());
        assert!(result.assertion_results.is_empty());
        assert_eq!(result.error.as_deref(), Some("connection refused"));
    }

    #[test]
    fn test_case_deserializes_with_generated_id() {
        let json = r#"{"method": "GET", "url": "/users", "body": {"name": "a"}}"#;
        let test: TestCase = serde_json::from_str(json).unwrap();
        assert!(test.id.starts_with("test-"));
        assert_eq!(
            test.body,
            Some(RequestBody::Json(serde_json::json!({"name": "a"})))
        );
    }

    #[test]
    fn text_body_stays_text() {
        let json = r#"{"method": "POST", "url": "/raw", "body": "plain"}"#;
        let test: TestCase = serde_json::from_str(json).unwrap();
        assert_eq!(test.body, Some(RequestBody::Text("plain".into())));
    }
}
