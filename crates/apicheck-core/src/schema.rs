//! JSON Schema export for suite files and run reports

use crate::suite::TestSuite;
use crate::summary::BatchReport;

/// JSON Schema for test suite files, for editor completion.
#[must_use]
pub fn generate_schema() -> String {
    let schema = schemars::schema_for!(TestSuite);
    serde_json::to_string_pretty(&schema).expect("schema serialization should not fail")
}

/// JSON Schema for saved run reports.
#[must_use]
pub fn generate_report_schema() -> String {
    let schema = schemars::schema_for!(BatchReport);
    serde_json::to_string_pretty(&schema).expect("schema serialization should not fail")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suite_schema_produces_valid_json() {
        let schema = generate_schema();
        let parsed: serde_json::Value = serde_json::from_str(&schema).unwrap();
        assert_eq!(
            parsed.get("title").and_then(|v| v.as_str()),
            Some("TestSuite")
        );
        assert!(schema.contains("expected_value"));
    }

    #[test]
    fn suite_schema_validates_a_suite() {
        let schema: serde_json::Value = serde_json::from_str(&generate_schema()).unwrap();
        let suite = serde_json::json!({
            "name": "demo",
            "tests": [{
                "method": "GET",
                "url": "/health",
                "assertions": [{"type": "status", "operator": "equals", "expected_value": "200"}]
            }]
        });
        let validator = jsonschema::validator_for(&schema).unwrap();
        assert!(validator.is_valid(&suite));
    }

    #[test]
    fn report_schema_title() {
        let parsed: serde_json::Value = serde_json::from_str(&generate_report_schema()).unwrap();
        assert_eq!(
            parsed.get("title").and_then(|v| v.as_str()),
            Some("BatchReport")
        );
    }
}
