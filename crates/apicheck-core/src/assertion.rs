//! Declarative assertions and their per-type operator sets
//!
//! Every assertion type carries only the operators that are legal for it.
//! The pairing is checked once, when the assertion is built (deserialization
//! included), so evaluation never sees an invalid type/operator combination.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

/// Every operator the evaluator understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    Exists,
    NotExists,
    GreaterThan,
    LessThan,
    MatchesRegex,
    Matches,
    NotMatches,
    HasLength,
    IsArray,
    IsObject,
    InRange,
    Between,
    HasProperty,
    PropertyType,
    ValidatesAgainst,
}

impl Operator {
    pub const ALL: [Operator; 19] = [
        Operator::Equals,
        Operator::NotEquals,
        Operator::Contains,
        Operator::NotContains,
        Operator::Exists,
        Operator::NotExists,
        Operator::GreaterThan,
        Operator::LessThan,
        Operator::MatchesRegex,
        Operator::Matches,
        Operator::NotMatches,
        Operator::HasLength,
        Operator::IsArray,
        Operator::IsObject,
        Operator::InRange,
        Operator::Between,
        Operator::HasProperty,
        Operator::PropertyType,
        Operator::ValidatesAgainst,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::Exists => "exists",
            Self::NotExists => "not_exists",
            Self::GreaterThan => "greater_than",
            Self::LessThan => "less_than",
            Self::MatchesRegex => "matches_regex",
            Self::Matches => "matches",
            Self::NotMatches => "not_matches",
            Self::HasLength => "has_length",
            Self::IsArray => "is_array",
            Self::IsObject => "is_object",
            Self::InRange => "in_range",
            Self::Between => "between",
            Self::HasProperty => "has_property",
            Self::PropertyType => "property_type",
            Self::ValidatesAgainst => "validates_against",
        }
    }

    /// Existence and structural checks ignore the expected value.
    #[must_use]
    pub const fn uses_expected(self) -> bool {
        !matches!(
            self,
            Self::Exists | Self::NotExists | Self::IsArray | Self::IsObject
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = AssertionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s.trim())
            .ok_or_else(|| AssertionError::UnknownOperator(s.to_string()))
    }
}

/// Assertion type tag, as written in test files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AssertionType {
    Status,
    Header,
    Body,
    ResponseTime,
    JsonSchema,
    Regex,
}

impl AssertionType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Header => "header",
            Self::Body => "body",
            Self::ResponseTime => "response_time",
            Self::JsonSchema => "json_schema",
            Self::Regex => "regex",
        }
    }

    /// Operators legal for this type.
    #[must_use]
    pub const fn operators(self) -> &'static [Operator] {
        match self {
            Self::Status => StatusOperator::OPERATORS,
            Self::Header => HeaderOperator::OPERATORS,
            Self::Body => BodyOperator::OPERATORS,
            Self::ResponseTime => ResponseTimeOperator::OPERATORS,
            Self::JsonSchema => JsonSchemaOperator::OPERATORS,
            Self::Regex => RegexOperator::OPERATORS,
        }
    }

    #[must_use]
    pub fn allows(self, operator: Operator) -> bool {
        self.operators().contains(&operator)
    }
}

impl fmt::Display for AssertionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssertionType {
    type Err = AssertionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "status" => Ok(Self::Status),
            "header" => Ok(Self::Header),
            "body" => Ok(Self::Body),
            "response_time" => Ok(Self::ResponseTime),
            "json_schema" => Ok(Self::JsonSchema),
            "regex" => Ok(Self::Regex),
            other => Err(AssertionError::UnknownType(other.to_string())),
        }
    }
}

/// Declares an operator subset for one assertion type.
macro_rules! scoped_operator {
    ($(#[$meta:meta])* $name:ident, $kind:expr, [$($variant:ident),+ $(,)?]) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const OPERATORS: &'static [Operator] = &[$(Operator::$variant),+];

            #[must_use]
            pub const fn operator(self) -> Operator {
                match self {
                    $(Self::$variant => Operator::$variant),+
                }
            }
        }

        impl TryFrom<Operator> for $name {
            type Error = AssertionError;

            fn try_from(operator: Operator) -> Result<Self, Self::Error> {
                match operator {
                    $(Operator::$variant => Ok(Self::$variant),)+
                    other => Err(AssertionError::OperatorNotAllowed {
                        kind: $kind,
                        operator: other,
                    }),
                }
            }
        }
    };
}

scoped_operator!(
    /// Operators for `status` assertions
    StatusOperator,
    AssertionType::Status,
    [Equals, NotEquals, GreaterThan, LessThan, InRange]
);

scoped_operator!(
    /// Operators for `header` assertions
    HeaderOperator,
    AssertionType::Header,
    [Equals, NotEquals, Contains, NotContains, Exists, NotExists, MatchesRegex]
);

scoped_operator!(
    /// Operators for `body` assertions
    BodyOperator,
    AssertionType::Body,
    [
        Equals,
        NotEquals,
        Contains,
        NotContains,
        Exists,
        NotExists,
        GreaterThan,
        LessThan,
        MatchesRegex,
        HasLength,
        IsArray,
        IsObject,
        HasProperty,
        PropertyType,
        InRange,
    ]
);

scoped_operator!(
    /// Operators for `response_time` assertions
    ResponseTimeOperator,
    AssertionType::ResponseTime,
    [LessThan, GreaterThan, Between]
);

scoped_operator!(
    /// Operators for `json_schema` assertions
    JsonSchemaOperator,
    AssertionType::JsonSchema,
    [ValidatesAgainst, HasProperty, PropertyType, IsObject, IsArray]
);

scoped_operator!(
    /// Operators for `regex` assertions
    RegexOperator,
    AssertionType::Regex,
    [Matches, NotMatches, Exists, NotExists]
);

/// A declarative check against one aspect of an HTTP response.
///
/// Serialized as a flat record:
/// `{"type": "body", "path": "user.email", "operator": "exists"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AssertionRecord", into = "AssertionRecord")]
pub enum Assertion {
    Status {
        operator: StatusOperator,
        expected: Option<String>,
    },
    Header {
        key: String,
        operator: HeaderOperator,
        expected: Option<String>,
    },
    Body {
        path: String,
        operator: BodyOperator,
        expected: Option<String>,
    },
    ResponseTime {
        operator: ResponseTimeOperator,
        expected: Option<String>,
    },
    JsonSchema {
        path: String,
        operator: JsonSchemaOperator,
        expected: Option<String>,
    },
    Regex {
        path: String,
        operator: RegexOperator,
        expected: Option<String>,
    },
}

impl Assertion {
    /// Build an assertion from loosely-typed parts.
    ///
    /// `target` is the header name for `header` assertions and the body path
    /// for `body`, `json_schema` and `regex` (empty path = whole body).
    ///
    /// # Errors
    ///
    /// Returns error if the operator is not legal for the type, or if a
    /// header assertion has no key.
    pub fn new(
        kind: AssertionType,
        operator: Operator,
        target: Option<String>,
        expected: Option<String>,
    ) -> Result<Self, AssertionError> {
        Ok(match kind {
            AssertionType::Status => Self::Status {
                operator: operator.try_into()?,
                expected,
            },
            AssertionType::Header => {
                let operator = operator.try_into()?;
                let key = target
                    .filter(|k| !k.trim().is_empty())
                    .ok_or(AssertionError::MissingTarget { kind, field: "key" })?;
                Self::Header {
                    key,
                    operator,
                    expected,
                }
            }
            AssertionType::Body => Self::Body {
                operator: operator.try_into()?,
                path: target.unwrap_or_default(),
                expected,
            },
            AssertionType::ResponseTime => Self::ResponseTime {
                operator: operator.try_into()?,
                expected,
            },
            AssertionType::JsonSchema => Self::JsonSchema {
                operator: operator.try_into()?,
                path: target.unwrap_or_default(),
                expected,
            },
            AssertionType::Regex => Self::Regex {
                operator: operator.try_into()?,
                path: target.unwrap_or_default(),
                expected,
            },
        })
    }

    #[must_use]
    pub fn status(operator: StatusOperator, expected: impl Into<String>) -> Self {
        Self::Status {
            operator,
            expected: Some(expected.into()),
        }
    }

    #[must_use]
    pub fn header(
        key: impl Into<String>,
        operator: HeaderOperator,
        expected: Option<String>,
    ) -> Self {
        Self::Header {
            key: key.into(),
            operator,
            expected,
        }
    }

    #[must_use]
    pub fn body(path: impl Into<String>, operator: BodyOperator, expected: Option<String>) -> Self {
        Self::Body {
            path: path.into(),
            operator,
            expected,
        }
    }

    #[must_use]
    pub fn response_time(operator: ResponseTimeOperator, expected: impl Into<String>) -> Self {
        Self::ResponseTime {
            operator,
            expected: Some(expected.into()),
        }
    }

    #[must_use]
    pub fn json_schema(
        path: impl Into<String>,
        operator: JsonSchemaOperator,
        expected: Option<String>,
    ) -> Self {
        Self::JsonSchema {
            path: path.into(),
            operator,
            expected,
        }
    }

    #[must_use]
    pub fn regex(path: impl Into<String>, operator: RegexOperator, pattern: impl Into<String>) -> Self {
        Self::Regex {
            path: path.into(),
            operator,
            expected: Some(pattern.into()),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> AssertionType {
        match self {
            Self::Status { .. } => AssertionType::Status,
            Self::Header { .. } => AssertionType::Header,
            Self::Body { .. } => AssertionType::Body,
            Self::ResponseTime { .. } => AssertionType::ResponseTime,
            Self::JsonSchema { .. } => AssertionType::JsonSchema,
            Self::Regex { .. } => AssertionType::Regex,
        }
    }

    #[must_use]
    pub const fn operator(&self) -> Operator {
        match self {
            Self::Status { operator, .. } => operator.operator(),
            Self::Header { operator, .. } => operator.operator(),
            Self::Body { operator, .. } => operator.operator(),
            Self::ResponseTime { operator, .. } => operator.operator(),
            Self::JsonSchema { operator, .. } => operator.operator(),
            Self::Regex { operator, .. } => operator.operator(),
        }
    }

    /// Expected value, `None` for existence-only operators.
    #[must_use]
    pub fn expected(&self) -> Option<&str> {
        let expected = match self {
            Self::Status { expected, .. }
            | Self::Header { expected, .. }
            | Self::Body { expected, .. }
            | Self::ResponseTime { expected, .. }
            | Self::JsonSchema { expected, .. }
            | Self::Regex { expected, .. } => expected.as_deref(),
        };
        expected.filter(|_| self.operator().uses_expected())
    }

    /// Header key or body path.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Header { key, .. } => Some(key.as_str()),
            Self::Body { path, .. } | Self::JsonSchema { path, .. } | Self::Regex { path, .. } => {
                Some(path.as_str())
            }
            Self::Status { .. } | Self::ResponseTime { .. } => None,
        }
    }
}

impl fmt::Display for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind())?;
        if let Some(target) = self.target().filter(|t| !t.is_empty()) {
            write!(f, " {target}")?;
        }
        write!(f, " {}", self.operator())?;
        if let Some(expected) = self.expected() {
            write!(f, " {expected:?}")?;
        }
        Ok(())
    }
}

/// Wire form of an [`Assertion`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AssertionRecord {
    #[serde(rename = "type")]
    pub kind: AssertionType,
    pub operator: Operator,
    /// Header name (`header` assertions)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Dotted body path (`body`, `json_schema`, `regex` assertions)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Expected value. Numbers, booleans and objects are kept as their JSON text.
    #[serde(
        default,
        alias = "expectedValue",
        alias = "value",
        deserialize_with = "scalar_as_string",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<serde_json::Value>")]
    pub expected_value: Option<String>,
}

fn scalar_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

impl TryFrom<AssertionRecord> for Assertion {
    type Error = AssertionError;

    fn try_from(record: AssertionRecord) -> Result<Self, Self::Error> {
        let target = match record.kind {
            AssertionType::Header => record.key,
            _ => record.path,
        };
        Self::new(record.kind, record.operator, target, record.expected_value)
    }
}

impl From<Assertion> for AssertionRecord {
    fn from(assertion: Assertion) -> Self {
        let kind = assertion.kind();
        let operator = assertion.operator();
        let (key, path, expected_value) = match assertion {
            Assertion::Header { key, expected, .. } => (Some(key), None, expected),
            Assertion::Body { path, expected, .. }
            | Assertion::JsonSchema { path, expected, .. }
            | Assertion::Regex { path, expected, .. } => (None, Some(path), expected),
            Assertion::Status { expected, .. } | Assertion::ResponseTime { expected, .. } => {
                (None, None, expected)
            }
        };
        Self {
            kind,
            operator,
            key,
            path,
            expected_value,
        }
    }
}

impl JsonSchema for Assertion {
    fn schema_name() -> Cow<'static, str> {
        "Assertion".into()
    }

    fn json_schema(generator: &mut schemars::SchemaGenerator) -> schemars::Schema {
        AssertionRecord::json_schema(generator)
    }
}

/// Configuration errors: reported when an assertion is created, never at evaluation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssertionError {
    #[error("operator `{operator}` is not valid for `{kind}` assertions")]
    OperatorNotAllowed {
        kind: AssertionType,
        operator: Operator,
    },
    #[error("`{kind}` assertion requires a `{field}` field")]
    MissingTarget {
        kind: AssertionType,
        field: &'static str,
    },
    #[error("unknown operator `{0}`")]
    UnknownOperator(String),
    #[error("unknown assertion type `{0}`")]
    UnknownType(String),
}
