//! Pattern store: assertions that kept passing, keyed by endpoint shape
//!
//! Entries are created on the first passing run for a `(method, url shape)`
//! key and only ever grow. Failing runs leave the store untouched.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::assertion::Assertion;
use crate::model::{now_ms, ExecutionResult, Method, TestCase};

/// Placeholder for purely numeric path segments.
pub const ID_TOKEN: &str = ":id";

/// Normalize a URL into its shape: drop query and fragment, drop a trailing
/// slash, replace every all-digit path segment with `:id`.
///
/// `https://api.test/users/42?x=1` → `https://api.test/users/:id`
#[must_use]
pub fn normalize_url(url: &str) -> String {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    let url = url[..end].trim();
    let url = if url.len() > 1 {
        url.trim_end_matches('/')
    } else {
        url
    };
    url.split('/')
        .map(|segment| {
            if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
                ID_TOKEN
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Store key: method plus normalized URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatternKey {
    pub method: Method,
    pub url_pattern: String,
}

impl PatternKey {
    #[must_use]
    pub fn new(method: Method, url: &str) -> Self {
        Self {
            method,
            url_pattern: normalize_url(url),
        }
    }
}

/// Accumulated knowledge for one endpoint shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PatternEntry {
    pub method: Method,
    pub url_pattern: String,
    /// Assertions that were part of a passing run, in first-seen order
    pub assertions: Vec<Assertion>,
    /// Top-level body field names seen in passing responses
    #[serde(default)]
    pub fields: BTreeSet<String>,
    /// Number of passing runs absorbed
    pub confidence: u32,
    pub updated_at_ms: u64,
}

impl PatternEntry {
    #[must_use]
    pub fn key(&self) -> PatternKey {
        PatternKey {
            method: self.method,
            url_pattern: self.url_pattern.clone(),
        }
    }

    fn merge(&mut self, assertions: &[Assertion], fields: impl IntoIterator<Item = String>) {
        for assertion in assertions {
            if !self.assertions.contains(assertion) {
                self.assertions.push(assertion.clone());
            }
        }
        self.fields.extend(fields);
        self.confidence = self.confidence.saturating_add(1);
        self.updated_at_ms = now_ms();
    }
}

/// Storage seam for learned patterns.
///
/// Implementations must serialize absorptions that share a key; the in-memory
/// store does this with a single mutex.
pub trait PatternStore: Send + Sync {
    /// Learn from a run. Returns the updated entry, or `None` if the run did
    /// not pass and was ignored.
    fn absorb(&self, test: &TestCase, result: &ExecutionResult) -> Option<PatternEntry>;

    /// Entry for the normalized `(method, url)` key.
    fn lookup(&self, method: Method, url: &str) -> Option<PatternEntry>;

    /// All entries, sorted by key.
    fn entries(&self) -> Vec<PatternEntry>;
}

/// Unbounded in-memory pattern store
#[derive(Debug, Default)]
pub struct InMemoryPatternStore {
    entries: Mutex<HashMap<PatternKey, PatternEntry>>,
}

impl InMemoryPatternStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from persisted entries. Later duplicates win.
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = PatternEntry>) -> Self {
        let map = entries.into_iter().map(|e| (e.key(), e)).collect();
        Self {
            entries: Mutex::new(map),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PatternKey, PatternEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl PatternStore for InMemoryPatternStore {
    fn absorb(&self, test: &TestCase, result: &ExecutionResult) -> Option<PatternEntry> {
        if !result.passed {
            return None;
        }
        let url = if result.url.is_empty() {
            &test.url
        } else {
            &result.url
        };
        let key = PatternKey::new(test.method, url);
        let passing: Vec<Assertion> = result
            .assertion_results
            .iter()
            .filter(|r| r.passed)
            .map(|r| r.assertion.clone())
            .collect();
        let fields: Vec<String> = result
            .response
            .as_ref()
            .and_then(|r| r.body.as_object())
            .map(|body| body.keys().cloned().collect())
            .unwrap_or_default();

        let mut entries = self.lock();
        let entry = entries.entry(key.clone()).or_insert_with(|| PatternEntry {
            method: key.method,
            url_pattern: key.url_pattern.clone(),
            assertions: Vec::new(),
            fields: BTreeSet::new(),
            confidence: 0,
            updated_at_ms: 0,
        });
        entry.merge(&passing, fields);
        debug!(
            method = %entry.method,
            pattern = %entry.url_pattern,
            confidence = entry.confidence,
            assertions = entry.assertions.len(),
            "pattern absorbed"
        );
        Some(entry.clone())
    }

    fn lookup(&self, method: Method, url: &str) -> Option<PatternEntry> {
        self.lock().get(&PatternKey::new(method, url)).cloned()
    }

    fn entries(&self) -> Vec<PatternEntry> {
        let mut entries: Vec<PatternEntry> = self.lock().values().cloned().collect();
        entries.sort_by_key(PatternEntry::key);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertion::{BodyOperator, StatusOperator};
    use crate::evaluate::evaluate_all;
    use crate::model::ResponseCapture;
    use proptest::prelude::*;
    use serde_json::json;

    fn run(test: &TestCase, status: u16, body: serde_json::Value) -> ExecutionResult {
        let response = ResponseCapture::new(status).with_body(body);
        let results = evaluate_all(&response, &test.assertions);
        ExecutionResult::completed(test, &test.url, response, results)
    }

    fn user_test(url: &str) -> TestCase {
        TestCase::new(Method::Get, url)
            .unwrap()
            .with_assertion(Assertion::status(StatusOperator::Equals, "200"))
            .with_assertion(Assertion::body("id", BodyOperator::Exists, None))
    }

    #[test]
    fn normalize_numeric_segments() {
        assert_eq!(normalize_url("/users/42"), "/users/:id");
        assert_eq!(
            normalize_url("https://api.test/users/42/posts/7/"),
            "https://api.test/users/:id/posts/:id"
        );
        assert_eq!(normalize_url("/users/42?expand=1#top"), "/users/:id");
        assert_eq!(normalize_url("/v2/users/abc42"), "/v2/users/abc42");
        assert_eq!(normalize_url("/"), "/");
    }

    #[test]
    fn port_is_not_a_segment() {
        assert_eq!(normalize_url("http://localhost:8080/items/3"), "http://localhost:8080/items/:id");
    }

    #[test]
    fn first_success_creates_entry() {
        let store = InMemoryPatternStore::new();
        let test = user_test("/users/1");
        let entry = store.absorb(&test, &run(&test, 200, json!({"id": 1, "name": "a"}))).unwrap();
        assert_eq!(entry.confidence, 1);
        assert_eq!(entry.url_pattern, "/users/:id");
        assert_eq!(entry.assertions.len(), 2);
        assert_eq!(
            entry.fields.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["id", "name"]
        );
    }

    #[test]
    fn failing_run_is_ignored() {
        let store = InMemoryPatternStore::new();
        let test = user_test("/users/1");
        assert!(store.absorb(&test, &run(&test, 404, json!({}))).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn same_shape_merges_and_counts() {
        let store = InMemoryPatternStore::new();
        let first = user_test("/users/1");
        store.absorb(&first, &run(&first, 200, json!({"id": 1})));

        let second = user_test("/users/2")
            .with_assertion(Assertion::body("id", BodyOperator::Equals, Some("2".into())));
        let entry = store.absorb(&second, &run(&second, 200, json!({"id": 2}))).unwrap();

        assert_eq!(entry.confidence, 2);
        assert_eq!(entry.assertions.len(), 3, "duplicates dropped, new variant kept");
        assert_eq!(store.len(), 1);
        assert_eq!(store.lookup(Method::Get, "/users/99"), Some(entry));
    }

    #[test]
    fn method_is_part_of_key() {
        let store = InMemoryPatternStore::new();
        let test = user_test("/users/1");
        store.absorb(&test, &run(&test, 200, json!({"id": 1})));
        assert!(store.lookup(Method::Delete, "/users/1").is_none());
    }

    #[test]
    fn entries_sorted_and_restorable() {
        let store = InMemoryPatternStore::new();
        for url in ["/b/1", "/a/1"] {
            let test = user_test(url);
            store.absorb(&test, &run(&test, 200, json!({"id": 1})));
        }
        let entries = store.entries();
        assert_eq!(entries[0].url_pattern, "/a/:id");
        let restored = InMemoryPatternStore::from_entries(entries.clone());
        assert_eq!(restored.entries(), entries);
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(segments in proptest::collection::vec("[a-z0-9]{0,6}", 0..6)) {
            let url = format!("/{}", segments.join("/"));
            let once = normalize_url(&url);
            prop_assert_eq!(normalize_url(&once), once);
        }

        #[test]
        fn confidence_tracks_passing_runs(outcomes in proptest::collection::vec(any::<bool>(), 1..20)) {
            let store = InMemoryPatternStore::new();
            let test = user_test("/users/5");
            let mut expected = 0;
            for pass in outcomes {
                let status = if pass { 200 } else { 500 };
                store.absorb(&test, &run(&test, status, json!({"id": 5})));
                if pass {
                    expected += 1;
                }
                let confidence = store.lookup(Method::Get, "/users/5").map_or(0, |e| e.confidence);
                prop_assert_eq!(confidence, expected);
            }
        }
    }
}
