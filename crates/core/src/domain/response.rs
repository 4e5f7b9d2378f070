use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::cost::{CostBreakdown, ExtractedCosts};
use crate::domain::intent::{ConfidenceBand, HandlerId, IntentDecision};
use crate::domain::query::{QueryFingerprint, RequestId};
use crate::errors::ErrorKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataSource {
    Live,
    Cached,
    FallbackKnowledge,
    None,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ResponseMetadata {
    CostBreakdown(CostBreakdown),
    ExtractedCosts(ExtractedCosts),
}

/// What a handler hands back to the router.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HandlerResponse {
    pub status: ResponseStatus,
    pub content: String,
    pub metadata: Option<ResponseMetadata>,
    pub data_source: DataSource,
    pub confidence: ConfidenceBand,
    pub handler: HandlerId,
    pub error_kind: Option<ErrorKind>,
    pub tool_calls: u32,
}

impl HandlerResponse {
    pub fn success(
        handler: HandlerId,
        content: impl Into<String>,
        data_source: DataSource,
        confidence: ConfidenceBand,
    ) -> Self {
        Self {
            status: ResponseStatus::Success,
            content: content.into(),
            metadata: None,
            data_source,
            confidence,
            handler,
            error_kind: None,
            tool_calls: 0,
        }
    }

    pub fn failure(handler: HandlerId, kind: ErrorKind, content: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            content: content.into(),
            metadata: None,
            data_source: DataSource::None,
            confidence: ConfidenceBand::Low,
            handler,
            error_kind: Some(kind),
            tool_calls: 0,
        }
    }

    pub fn with_metadata(mut self, metadata: ResponseMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: u32) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    /// Copy handed out on a cache hit.
    pub fn as_cached(&self) -> Self {
        Self { data_source: DataSource::Cached, ..self.clone() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: QueryFingerprint,
    pub response: HandlerResponse,
    pub intent: IntentDecision,
    pub created_at: DateTime<Utc>,
}

/// Router output: the handler response plus the routing context around it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutedResponse {
    pub request_id: RequestId,
    pub response: HandlerResponse,
    pub intent: IntentDecision,
    pub fingerprint: QueryFingerprint,
    pub served_from_cache: bool,
    pub elapsed_ms: u64,
    pub completed_at: DateTime<Utc>,
}
