//! `{{name}}` placeholder substitution
//!
//! Unknown placeholders are left as written so an unresolved URL is still
//! visible in results.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::model::{RequestBody, TestCase};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("valid placeholder regex")
});

pub type Variables = BTreeMap<String, String>;

/// Substitute placeholders in a string.
#[must_use]
pub fn render(text: &str, vars: &Variables) -> String {
    if !text.contains("{{") {
        return text.to_string();
    }
    PLACEHOLDER
        .replace_all(text, |caps: &Captures<'_>| match vars.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Substitute placeholders in every string leaf of a JSON value.
#[must_use]
pub fn render_value(value: &Value, vars: &Variables) -> Value {
    match value {
        Value::String(s) => Value::String(render(s, vars)),
        Value::Array(items) => Value::Array(items.iter().map(|v| render_value(v, vars)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(v, vars)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Placeholder names used in a string, in order of appearance.
#[must_use]
pub fn placeholders(text: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

impl TestCase {
    /// Copy of this test with placeholders in URL, header values and body
    /// substituted.
    #[must_use]
    pub fn resolved(&self, vars: &Variables) -> Self {
        let mut test = self.clone();
        test.url = render(&self.url, vars);
        for value in test.headers.values_mut() {
            *value = render(value, vars);
        }
        test.body = self.body.as_ref().map(|body| match body {
            RequestBody::Text(text) => RequestBody::Text(render(text, vars)),
            RequestBody::Json(value) => RequestBody::Json(render_value(value, vars)),
        });
        test
    }

    /// Placeholder names still present in the URL or header values.
    #[must_use]
    pub fn unresolved_placeholders(&self) -> Vec<String> {
        let mut names = placeholders(&self.url);
        for value in self.headers.values() {
            names.extend(placeholders(value));
        }
        names.dedup();
        names
    }
}
