//! Wire envelope shared by the tool proxy and its clients.
//!
//! Every response from `POST /tools/{operation}` is one of:
//!
//! ```json
//! {"success": true,  "data": {...}, "timestamp": "2026-01-01T00:00:00Z"}
//! {"success": false, "error": {"kind": "invalidParameters", "message": "..."}, "timestamp": "..."}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use waypoint_core::domain::tool::{ToolErrorKind, ToolResult};

use crate::ProxyError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeError {
    pub kind: ToolErrorKind,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolEnvelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<EnvelopeError>,
    pub timestamp: DateTime<Utc>,
}

impl ToolEnvelope {
    pub fn ok(data: Value) -> Self {
        Self { success: true, data: Some(data), error: None, timestamp: Utc::now() }
    }

    pub fn failed(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(EnvelopeError { kind, message: message.into() }),
            timestamp: Utc::now(),
        }
    }

    pub fn from_error(error: &ProxyError) -> Self {
        Self::failed(error.error_kind(), error.to_string())
    }

    /// Converts a decoded envelope into the agent-side result. A success flag
    /// without data, or a failure without an error body, is malformed.
    pub fn into_result(self) -> ToolResult {
        match (self.success, self.data, self.error) {
            (true, Some(data), _) => ToolResult::success(data),
            (false, _, Some(error)) => ToolResult::failure(error.kind, error.message),
            (true, None, _) => ToolResult::failure(
                ToolErrorKind::MalformedResponse,
                "success envelope had no data",
            ),
            (false, _, None) => ToolResult::failure(
                ToolErrorKind::MalformedResponse,
                "failure envelope had no error body",
            ),
        }
    }
}
