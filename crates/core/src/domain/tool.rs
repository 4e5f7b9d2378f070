use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchType {
    Equals,
    Contains,
    AnyOf,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolFilter {
    pub field: String,
    pub value: Value,
    pub match_type: MatchType,
}

impl ToolFilter {
    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: Value::String(value.into()),
            match_type: MatchType::Equals,
        }
    }

    pub fn contains(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: Value::String(value.into()),
            match_type: MatchType::Contains,
        }
    }

    pub fn any_of<I, S>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            field: field.into(),
            value: Value::Array(
                values.into_iter().map(|value| Value::String(value.into())).collect(),
            ),
            match_type: MatchType::AnyOf,
        }
    }
}

/// One request to the external tool service. Filters keep their order on the
/// wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub service: String,
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default)]
    pub filters: Vec<ToolFilter>,
}

impl ToolCall {
    pub fn new(service: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            operation: operation.into(),
            region: None,
            filters: Vec::new(),
        }
    }

    pub fn in_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn filter(mut self, filter: ToolFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Rejects calls that can never succeed, so they are not sent or retried.
    pub fn validate(&self) -> Result<(), String> {
        if self.operation.trim().is_empty() {
            return Err("tool call operation must not be empty".to_string());
        }
        for filter in &self.filters {
            if filter.field.trim().is_empty() {
                return Err("tool call filter field must not be empty".to_string());
            }
            let shape_ok = match filter.match_type {
                MatchType::AnyOf => filter.value.as_array().is_some_and(|items| !items.is_empty()),
                MatchType::Equals | MatchType::Contains => {
                    !filter.value.is_null() && !filter.value.is_array()
                }
            };
            if !shape_ok {
                return Err(format!(
                    "filter `{}` has a value that does not fit match type {:?}",
                    filter.field, filter.match_type
                ));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ToolErrorKind {
    Unavailable,
    Timeout,
    MalformedResponse,
    InvalidParameters,
}

impl ToolErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable | Self::Timeout)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unavailable => "unavailable",
            Self::Timeout => "timeout",
            Self::MalformedResponse => "malformedResponse",
            Self::InvalidParameters => "invalidParameters",
        }
    }
}

impl fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ToolResult {
    Success { payload: Value },
    Failure { kind: ToolErrorKind, detail: String },
}

impl ToolResult {
    pub fn success(payload: Value) -> Self {
        Self::Success { payload }
    }

    pub fn failure(kind: ToolErrorKind, detail: impl Into<String>) -> Self {
        Self::Failure { kind, detail: detail.into() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn error_kind(&self) -> Option<ToolErrorKind> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { kind, .. } => Some(*kind),
        }
    }
}
