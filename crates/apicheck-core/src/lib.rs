//! apicheck-core: Assertion evaluation and adaptive suggestions for HTTP API tests
//!
//! This crate holds the transport-free part of apicheck: the test data model,
//! value resolution and assertion evaluation against a captured response, the
//! pattern store that learns from passing runs, and the suggestion generator
//! built on top of it.

pub mod assertion;
pub mod config;
pub mod evaluate;
pub mod model;
pub mod pattern;
pub mod resolve;
pub mod schema;
pub mod suggest;
pub mod suite;
pub mod summary;
pub mod template;

pub use assertion::{
    Assertion, AssertionError, AssertionRecord, AssertionType, BodyOperator, HeaderOperator,
    JsonSchemaOperator, Operator, RegexOperator, ResponseTimeOperator, StatusOperator,
};
pub use config::{Config, ConfigError};
pub use evaluate::{evaluate, evaluate_all, evaluate_assertion};
pub use model::{
    AssertionResult, ExecutionResult, Method, ModelError, RequestBody, ResponseCapture, TestCase,
};
pub use pattern::{normalize_url, InMemoryPatternStore, PatternEntry, PatternKey, PatternStore};
pub use resolve::{resolve, walk_path, ActualValue};
pub use suggest::{
    suggest_assertions, suggest_endpoint_tests, suggest_from_response, suggest_next_calls,
    suggest_test_improvements, Confidence, Improvement, Proposal, Suggestion,
};
pub use suite::{SuiteError, TestSuite};
pub use summary::{success_rate, BatchReport, BatchSummary};
pub use template::{render, Variables};
