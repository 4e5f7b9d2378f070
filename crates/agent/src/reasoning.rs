use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use waypoint_core::domain::query::ConversationTurn;
use waypoint_core::domain::tool::{ToolCall, ToolResult};
use waypoint_core::errors::ErrorKind;

use crate::tools::ToolSchema;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolExchange {
    pub call: ToolCall,
    pub result: ToolResult,
}

/// Everything the engine sees for one turn of a handler's tool loop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReasoningRequest {
    pub system_prompt: String,
    pub query_text: String,
    pub context: Vec<ConversationTurn>,
    pub tools: Vec<ToolSchema>,
    /// Completed rounds, oldest first. Each inner vec keeps request order.
    pub rounds: Vec<Vec<ToolExchange>>,
    /// False on the closing call after the round budget is spent.
    pub allow_tools: bool,
}

impl ReasoningRequest {
    pub fn new(system_prompt: impl Into<String>, query_text: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            query_text: query_text.into(),
            context: Vec::new(),
            tools: Vec::new(),
            rounds: Vec::new(),
            allow_tools: true,
        }
    }

    pub fn with_context(mut self, context: Vec<ConversationTurn>) -> Self {
        self.context = context;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolSchema>) -> Self {
        self.tools = tools;
        self
    }

    pub fn exchanges(&self) -> impl Iterator<Item = &ToolExchange> {
        self.rounds.iter().flatten()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ReasoningOutcome {
    FinalAnswer(String),
    InvokeTools(Vec<ToolCall>),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ReasoningError {
    #[error("reasoning engine unreachable: {0}")]
    Unreachable(String),
    #[error("reasoning engine returned malformed output: {0}")]
    MalformedOutput(String),
}

impl ReasoningError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unreachable(_) => ErrorKind::ReasoningEngineUnreachable,
            Self::MalformedOutput(_) => ErrorKind::ReasoningEngineMalformedOutput,
        }
    }
}

/// Pluggable model backend. Implementations never call tools themselves; they
/// only say which calls they want.
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    async fn reason(
        &self,
        request: &ReasoningRequest,
    ) -> Result<ReasoningOutcome, ReasoningError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use waypoint_core::domain::tool::{ToolCall, ToolResult};
    use waypoint_core::errors::ErrorKind;

    use super::{ReasoningError, ReasoningOutcome, ReasoningRequest, ToolExchange};

    #[test]
    fn exchanges_flatten_rounds_in_order() {
        let mut request = ReasoningRequest::new("system", "what does it cost");
        request.rounds.push(vec![
            ToolExchange {
                call: ToolCall::new("AmazonEC2", "get_pricing"),
                result: ToolResult::success(json!({})),
            },
            ToolExchange {
                call: ToolCall::new("AmazonS3", "get_pricing"),
                result: ToolResult::success(json!({})),
            },
        ]);
        request.rounds.push(vec![ToolExchange {
            call: ToolCall::new("AmazonRDS", "get_pricing"),
            result: ToolResult::success(json!({})),
        }]);

        let services =
            request.exchanges().map(|exchange| exchange.call.service.as_str()).collect::<Vec<_>>();
        assert_eq!(services, vec!["AmazonEC2", "AmazonS3", "AmazonRDS"]);
        assert!(request.allow_tools);
    }

    #[test]
    fn errors_map_to_taxonomy() {
        assert_eq!(
            ReasoningError::Unreachable("refused".into()).kind(),
            ErrorKind::ReasoningEngineUnreachable
        );
        assert_eq!(
            ReasoningError::MalformedOutput("empty".into()).kind(),
            ErrorKind::ReasoningEngineMalformedOutput
        );
    }

    #[test]
    fn outcome_serializes_with_type_tag() {
        let encoded =
            serde_json::to_value(ReasoningOutcome::FinalAnswer("ok".into())).expect("serialize");
        assert_eq!(encoded, json!({"type": "final_answer", "value": "ok"}));
    }
}
