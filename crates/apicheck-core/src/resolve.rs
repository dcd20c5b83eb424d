//! Value resolution: pick the value an assertion looks at
//!
//! Total functions only. A missing header, path segment or index resolves to
//! an absent value; nothing here can fail.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::assertion::Assertion;
use crate::model::ResponseCapture;

/// Resolved actual value. `None` means the addressed data does not exist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ActualValue(Option<Value>);

impl ActualValue {
    #[must_use]
    pub const fn absent() -> Self {
        Self(None)
    }

    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self(Some(Value::String(text.into())))
    }

    #[must_use]
    pub const fn raw_value(value: Value) -> Self {
        Self(Some(value))
    }

    /// The raw (non-stringified) value.
    #[must_use]
    pub const fn raw(&self) -> Option<&Value> {
        self.0.as_ref()
    }

    /// Present means: not missing, not `null`, not the empty string.
    #[must_use]
    pub fn is_present(&self) -> bool {
        match &self.0 {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }

    /// Canonical text form used by string and numeric operators.
    ///
    /// Missing and `null` become `""`, strings are verbatim, everything else
    /// is compact JSON.
    #[must_use]
    pub fn as_text(&self) -> String {
        match &self.0 {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

impl From<Option<&Value>> for ActualValue {
    fn from(value: Option<&Value>) -> Self {
        Self(value.cloned())
    }
}

impl fmt::Display for ActualValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

/// Walk a dotted path (`user.profile.email`, `items.0.id`) into a JSON value.
///
/// An empty path (or `$`) addresses the root. A leading `$.` is accepted.
#[must_use]
pub fn walk_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.trim();
    let path = path
        .strip_prefix("$.")
        .or_else(|| path.strip_prefix('$'))
        .unwrap_or(path);
    if path.is_empty() {
        return Some(root);
    }
    path.split('.').try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Resolve the actual value an assertion checks against a captured response.
#[must_use]
pub fn resolve(response: &ResponseCapture, assertion: &Assertion) -> ActualValue {
    match assertion {
        Assertion::Status { .. } => ActualValue::text(response.status_code.to_string()),
        Assertion::Header { key, .. } => ActualValue::text(response.header(key).unwrap_or_default()),
        Assertion::ResponseTime { .. } => ActualValue::text(format_millis(response.elapsed_ms)),
        Assertion::Body { path, .. }
        | Assertion::JsonSchema { path, .. }
        | Assertion::Regex { path, .. } => walk_path(&response.body, path).into(),
    }
}

/// `120.0` → `"120"`, `12.5` → `"12.5"`.
#[must_use]
pub fn format_millis(ms: f64) -> String {
    if ms.fract() == 0.0 {
        format!("{ms:.0}")
    } else {
        ms.to_string()
    }
}
