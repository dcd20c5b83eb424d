//! Test suite files (JSON, YAML or TOML)

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::model::TestCase;

/// A named collection of test cases
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TestSuite {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Values for `{{name}}` placeholders
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,
    #[serde(default)]
    pub tests: Vec<TestCase>,
}

impl TestSuite {
    /// Load a suite, picking the format from the file extension
    /// (`.json`, `.yaml`/`.yml`, `.toml`; anything else is read as JSON).
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed, or if a test case
    /// is invalid.
    pub fn load(path: &Path) -> Result<Self, SuiteError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SuiteError::Io(path.to_path_buf(), e.to_string()))?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let mut suite: Self = match ext.as_str() {
            "yaml" | "yml" => serde_yml::from_str(&content).map_err(|e| SuiteError::Parse(e.to_string()))?,
            "toml" => toml::from_str(&content).map_err(|e| SuiteError::Parse(e.to_string()))?,
            _ => serde_json::from_str(&content).map_err(|e| SuiteError::Parse(e.to_string()))?,
        };
        if suite.name.is_empty() {
            suite.name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
        }
        suite.validate()?;
        Ok(suite)
    }

    /// Save as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), SuiteError> {
        let json = serde_json::to_string_pretty(self).map_err(|e| SuiteError::Parse(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| SuiteError::Io(path.to_path_buf(), e.to_string()))
    }

    /// Every test must be valid and ids must be unique.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), SuiteError> {
        let mut ids = HashSet::new();
        for test in &self.tests {
            test.validate()
                .map_err(|e| SuiteError::Invalid(e.to_string()))?;
            if !ids.insert(test.id.as_str()) {
                return Err(SuiteError::Invalid(format!("duplicate test id `{}`", test.id)));
            }
        }
        Ok(())
    }

    /// Find a test by id or by name.
    #[must_use]
    pub fn find(&self, key: &str) -> Option<&TestCase> {
        self.tests
            .iter()
            .find(|t| t.id == key)
            .or_else(|| self.tests.iter().find(|t| t.name == key))
    }

    /// Index of a test by id or by name.
    #[must_use]
    pub fn position(&self, key: &str) -> Option<usize> {
        self.tests
            .iter()
            .position(|t| t.id == key)
            .or_else(|| self.tests.iter().position(|t| t.name == key))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SuiteError {
    #[error("Cannot read {0}: {1}")]
    Io(PathBuf, String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Invalid suite: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertion::{AssertionType, Operator};
    use crate::model::{Method, RequestBody};

    const YAML: &str = r#"
name: users
variables:
  base_url: http://localhost:3000
tests:
  - id: create-user
    name: Create user
    method: POST
    url: "{{base_url}}/users"
    headers:
      Content-Type: application/json
    body:
      name: alice
    assertions:
      - type: status
        operator: equals
        expected_value: 201
      - type: body
        path: id
        operator: exists
"#;

    #[test]
    fn load_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.yaml");
        std::fs::write(&path, YAML).unwrap();

        let suite = TestSuite::load(&path).unwrap();
        assert_eq!(suite.name, "users");
        assert_eq!(suite.variables["base_url"], "http://localhost:3000");
        let test = suite.find("Create user").unwrap();
        assert_eq!(test.id, "create-user");
        assert_eq!(suite.position("create-user"), Some(0));
        assert_eq!(suite.position("nope"), None);
        assert_eq!(test.method, Method::Post);
        assert_eq!(test.body, Some(RequestBody::Json(serde_json::json!({"name": "alice"}))));
        assert_eq!(test.assertions[0].expected(), Some("201"));
        assert_eq!(test.assertions[1].kind(), AssertionType::Body);
    }

    #[test]
    fn load_toml_names_suite_after_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("health.toml");
        std::fs::write(
            &path,
            r#"
[[tests]]
id = "ping"
method = "get"
url = "http://localhost/health"

[[tests.assertions]]
type = "response_time"
operator = "less_than"
expected_value = "500"
"#,
        )
        .unwrap();

        let suite = TestSuite::load(&path).unwrap();
        assert_eq!(suite.name, "health");
        assert_eq!(suite.tests[0].assertions[0].operator(), Operator::LessThan);
    }

    #[test]
    fn json_round_trip_through_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("suite.json");
        let suite = TestSuite {
            name: "s".into(),
            variables: BTreeMap::new(),
            tests: vec![TestCase::new(Method::Get, "/a").unwrap().with_id("a")],
        };
        suite.save(&path).unwrap();
        assert_eq!(TestSuite::load(&path).unwrap(), suite);
    }

    #[test]
    fn invalid_operator_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(
            &path,
            r#"{"tests": [{"method": "GET", "url": "/x", "assertions": [{"type": "header", "key": "a", "operator": "between", "expected_value": "1,2"}]}]}"#,
        )
        .unwrap();
        let err = TestSuite::load(&path).unwrap_err();
        assert!(matches!(err, SuiteError::Parse(msg) if msg.contains("between")));
    }

    #[test]
    fn duplicate_ids_rejected() {
        let suite = TestSuite {
            tests: vec![
                TestCase::new(Method::Get, "/a").unwrap().with_id("x"),
                TestCase::new(Method::Get, "/b").unwrap().with_id("x"),
            ],
            ..TestSuite::default()
        };
        assert!(matches!(suite.validate(), Err(SuiteError::Invalid(_))));
    }

    #[test]
    fn missing_file() {
        let err = TestSuite::load(Path::new("/nonexistent/suite.json")).unwrap_err();
        assert!(matches!(err, SuiteError::Io(..)));
    }
}
