//! Assertion evaluation
//!
//! `evaluate` is total: malformed expected values (bad regex, unparsable
//! numbers, a range without a comma, an invalid schema) make the check fail,
//! they never raise.

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::assertion::{Assertion, Operator};
use crate::model::{AssertionResult, ResponseCapture};
use crate::resolve::{resolve, ActualValue};

/// Apply one operator to a resolved value.
#[must_use]
pub fn evaluate(actual: &ActualValue, operator: Operator, expected: Option<&str>) -> bool {
    let expected_text = expected.unwrap_or_default();
    match operator {
        Operator::Equals => actual.as_text() == expected_text,
        Operator::NotEquals => actual.as_text() != expected_text,
        Operator::Contains => contains(actual, expected_text),
        Operator::NotContains => !contains(actual, expected_text),
        Operator::Exists => actual.is_present(),
        Operator::NotExists => !actual.is_present(),
        Operator::GreaterThan => compare(actual, expected_text, |a, e| a > e),
        Operator::LessThan => compare(actual, expected_text, |a, e| a < e),
        Operator::MatchesRegex | Operator::Matches => regex_match(actual, expected_text) == Some(true),
        Operator::NotMatches => regex_match(actual, expected_text) == Some(false),
        Operator::HasLength => has_length(actual, expected_text),
        Operator::IsArray => matches!(actual.raw(), Some(Value::Array(_))),
        Operator::IsObject => matches!(actual.raw(), Some(Value::Object(_))),
        Operator::InRange | Operator::Between => in_range(actual, expected_text),
        Operator::HasProperty => match actual.raw() {
            Some(Value::Object(map)) => map.contains_key(expected_text),
            _ => false,
        },
        Operator::PropertyType => type_name(actual.raw()) == expected_text.trim(),
        Operator::ValidatesAgainst => validates_against(actual, expected_text),
    }
}

/// Resolve and evaluate a single assertion against a response.
#[must_use]
pub fn evaluate_assertion(response: &ResponseCapture, assertion: &Assertion) -> AssertionResult {
    let actual_value = resolve(response, assertion);
    let passed = evaluate(&actual_value, assertion.operator(), assertion.expected());
    debug!(%assertion, actual = %actual_value, passed, "assertion evaluated");
    AssertionResult {
        assertion: assertion.clone(),
        passed,
        actual_value,
    }
}

/// Evaluate every assertion independently, in order. No short-circuiting.
#[must_use]
pub fn evaluate_all(response: &ResponseCapture, assertions: &[Assertion]) -> Vec<AssertionResult> {
    assertions
        .iter()
        .map(|assertion| evaluate_assertion(response, assertion))
        .collect()
}

/// Parse a number the strict way: trimmed, finite, whole string.
#[must_use]
pub fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Parse `"min,max"` into inclusive bounds.
#[must_use]
pub fn parse_range(text: &str) -> Option<(f64, f64)> {
    let (min, max) = text.split_once(',')?;
    Some((parse_number(min)?, parse_number(max)?))
}

/// JavaScript `typeof` naming for a resolved value.
#[must_use]
pub fn type_name(value: Option<&Value>) -> &'static str {
    match value {
        None => "undefined",
        Some(Value::String(_)) => "string",
        Some(Value::Number(_)) => "number",
        Some(Value::Bool(_)) => "boolean",
        Some(Value::Null | Value::Array(_) | Value::Object(_)) => "object",
    }
}

fn contains(actual: &ActualValue, needle: &str) -> bool {
    actual.is_present() && actual.as_text().contains(needle)
}

fn compare(actual: &ActualValue, expected: &str, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (parse_number(&actual.as_text()), parse_number(expected)) {
        (Some(a), Some(e)) => cmp(a, e),
        _ => false,
    }
}

/// `None` when the pattern does not compile.
fn regex_match(actual: &ActualValue, pattern: &str) -> Option<bool> {
    match Regex::new(pattern) {
        Ok(re) => Some(re.is_match(&actual.as_text())),
        Err(err) => {
            debug!(pattern, error = %err, "invalid regex treated as non-match");
            None
        }
    }
}

/// Leading decimal digits of `text`, ignoring surrounding whitespace:
/// `"3"`, `"3.0"` and `"3 items"` all give 3.
#[must_use]
pub fn parse_leading_int(text: &str) -> Option<usize> {
    let text = text.trim_start();
    let end = text.find(|c: char| !c.is_ascii_digit()).unwrap_or(text.len());
    text[..end].parse().ok()
}

fn has_length(actual: &ActualValue, expected: &str) -> bool {
    let Some(expected) = parse_leading_int(expected) else {
        return false;
    };
    match actual.raw() {
        Some(Value::String(s)) => s.chars().count() == expected,
        Some(Value::Array(items)) => items.len() == expected,
        _ => false,
    }
}

fn in_range(actual: &ActualValue, expected: &str) -> bool {
    let Some((min, max)) = parse_range(expected) else {
        return false;
    };
    parse_number(&actual.as_text()).is_some_and(|n| (min..=max).contains(&n))
}

fn validates_against(actual: &ActualValue, schema: &str) -> bool {
    let Some(instance) = actual.raw() else {
        return false;
    };
    let Ok(schema) = serde_json::from_str::<Value>(schema) else {
        return false;
    };
    match jsonschema::validator_for(&schema) {
        Ok(validator) => validator.is_valid(instance),
        Err(err) => {
            debug!(error = %err, "invalid schema treated as non-match");
            false
        }
    }
}
