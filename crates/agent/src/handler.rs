use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use waypoint_core::config::AppConfig;
use waypoint_core::domain::intent::{CapabilityDescriptor, HandlerId, HandlerMetadata};
use waypoint_core::domain::query::Query;
use waypoint_core::domain::response::HandlerResponse;
use waypoint_core::domain::tool::{ToolCall, ToolErrorKind, ToolResult};
use waypoint_core::errors::ErrorKind;

use crate::reasoning::{
    ReasoningEngine, ReasoningError, ReasoningOutcome, ReasoningRequest, ToolExchange,
};
use crate::tools::{ToolCatalog, ToolClient};

/// A specialized responder for one class of intent.
#[async_trait]
pub trait Handler: Send + Sync {
    fn id(&self) -> HandlerId;
    fn metadata(&self) -> HandlerMetadata;
    fn capabilities(&self) -> Vec<CapabilityDescriptor>;
    /// Never panics on tool trouble; `status = Error` is reserved for
    /// reasoning-engine failures.
    async fn process(&self, query: &Query) -> HandlerResponse;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandlerState {
    Start,
    ReasoningRequested,
    ToolInvoked,
    ReasoningResumed,
    Finalized,
    Failed,
}

impl HandlerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized | Self::Failed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandlerEvent {
    ReasoningStarted,
    ToolsRequested,
    ToolResultsReady,
    AnswerReady,
    ReasoningFailed,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum HandlerTransitionError {
    #[error("invalid handler transition from {state:?} using event {event:?}")]
    InvalidTransition { state: HandlerState, event: HandlerEvent },
}

pub fn transition(
    current: HandlerState,
    event: HandlerEvent,
) -> Result<HandlerState, HandlerTransitionError> {
    use HandlerEvent::{
        AnswerReady, ReasoningFailed, ReasoningStarted, ToolResultsReady, ToolsRequested,
    };
    use HandlerState::{
        Failed, Finalized, ReasoningRequested, ReasoningResumed, Start, ToolInvoked,
    };

    let next = match (current, event) {
        (Start, ReasoningStarted) => ReasoningRequested,
        (ReasoningRequested, ToolsRequested) | (ReasoningResumed, ToolsRequested) => ToolInvoked,
        (ToolInvoked, ToolResultsReady) => ReasoningResumed,
        (ReasoningRequested, AnswerReady) | (ReasoningResumed, AnswerReady) => Finalized,
        (ReasoningRequested, ReasoningFailed) | (ReasoningResumed, ReasoningFailed) => Failed,
        _ => return Err(HandlerTransitionError::InvalidTransition { state: current, event }),
    };
    Ok(next)
}

/// Current state plus every state visited, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandlerLifecycle {
    state: HandlerState,
    trail: Vec<HandlerState>,
}

impl Default for HandlerLifecycle {
    fn default() -> Self {
        Self { state: HandlerState::Start, trail: vec![HandlerState::Start] }
    }
}

impl HandlerLifecycle {
    pub fn apply(&mut self, event: HandlerEvent) -> Result<HandlerState, HandlerTransitionError> {
        let next = transition(self.state, event)?;
        self.state = next;
        self.trail.push(next);
        Ok(next)
    }

    pub fn state(&self) -> HandlerState {
        self.state
    }

    pub fn trail(&self) -> &[HandlerState] {
        &self.trail
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ToolLoopError {
    #[error(transparent)]
    Reasoning(#[from] ReasoningError),
    #[error(transparent)]
    Transition(#[from] HandlerTransitionError),
}

impl ToolLoopError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Reasoning(error) => error.kind(),
            Self::Transition(_) => ErrorKind::Internal,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ToolLoopSettings {
    pub max_rounds: u32,
    pub call_timeout: Duration,
}

impl Default for ToolLoopSettings {
    fn default() -> Self {
        Self { max_rounds: 3, call_timeout: Duration::from_millis(2_000) }
    }
}

impl ToolLoopSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_rounds: config.router.max_tool_rounds,
            call_timeout: config.tools.call_timeout(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolLoopOutcome {
    pub answer: String,
    pub exchanges: Vec<ToolExchange>,
    pub rounds: u32,
    pub trail: Vec<HandlerState>,
}

impl ToolLoopOutcome {
    pub fn tool_calls(&self) -> u32 {
        u32::try_from(self.exchanges.len()).unwrap_or(u32::MAX)
    }

    pub fn successful_calls(&self) -> usize {
        self.exchanges.iter().filter(|exchange| exchange.result.is_success()).count()
    }

    pub fn failed_calls(&self) -> usize {
        self.exchanges.len() - self.successful_calls()
    }
}

/// Bounded reason → call tools → reason cycle shared by tool-using handlers.
#[derive(Clone)]
pub struct ToolLoop {
    engine: Arc<dyn ReasoningEngine>,
    tools: Arc<dyn ToolClient>,
    catalog: ToolCatalog,
    settings: ToolLoopSettings,
}

impl ToolLoop {
    pub fn new(
        engine: Arc<dyn ReasoningEngine>,
        tools: Arc<dyn ToolClient>,
        catalog: ToolCatalog,
        settings: ToolLoopSettings,
    ) -> Self {
        Self { engine, tools, catalog, settings }
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub fn settings(&self) -> ToolLoopSettings {
        self.settings
    }

    pub async fn run(
        &self,
        handler: &HandlerId,
        mut request: ReasoningRequest,
    ) -> Result<ToolLoopOutcome, ToolLoopError> {
        let mut lifecycle = HandlerLifecycle::default();
        let mut rounds = 0_u32;
        request.tools = self.catalog.schemas();
        request.allow_tools = self.settings.max_rounds > 0 && !self.catalog.is_empty();
        lifecycle.apply(HandlerEvent::ReasoningStarted)?;

        loop {
            let outcome = match self.engine.reason(&request).await {
                Ok(outcome) => outcome,
                Err(error) => {
                    lifecycle.apply(HandlerEvent::ReasoningFailed)?;
                    warn!(
                        event_name = "handler.reasoning.failed",
                        handler = %handler,
                        rounds,
                        error = %error,
                        "reasoning engine call failed"
                    );
                    return Err(error.into());
                }
            };

            let calls = match outcome {
                ReasoningOutcome::FinalAnswer(answer) => {
                    lifecycle.apply(HandlerEvent::AnswerReady)?;
                    let exchanges = request.rounds.into_iter().flatten().collect();
                    return Ok(ToolLoopOutcome {
                        answer,
                        exchanges,
                        rounds,
                        trail: lifecycle.trail().to_vec(),
                    });
                }
                ReasoningOutcome::InvokeTools(calls) => calls,
            };

            if !request.allow_tools || calls.is_empty() {
                lifecycle.apply(HandlerEvent::ReasoningFailed)?;
                let detail = if calls.is_empty() {
                    "tool directive named no calls".to_string()
                } else {
                    format!("requested {} tool call(s) after the tool budget closed", calls.len())
                };
                warn!(
                    event_name = "handler.reasoning.malformed",
                    handler = %handler,
                    rounds,
                    error = %detail,
                    "reasoning engine broke the tool protocol"
                );
                return Err(ReasoningError::MalformedOutput(detail).into());
            }

            lifecycle.apply(HandlerEvent::ToolsRequested)?;
            let exchanges = self.run_round(calls).await;
            rounds += 1;
            let failures =
                exchanges.iter().filter(|exchange| !exchange.result.is_success()).count();
            info!(
                event_name = "handler.tool_round.completed",
                handler = %handler,
                round = rounds,
                calls = exchanges.len(),
                failures,
                "tool round completed"
            );
            request.rounds.push(exchanges);
            lifecycle.apply(HandlerEvent::ToolResultsReady)?;

            if rounds >= self.settings.max_rounds {
                debug!(
                    event_name = "handler.tool_budget.exhausted",
                    handler = %handler,
                    rounds,
                    "asking for a final answer without tools"
                );
                request.allow_tools = false;
            }
        }
    }

    /// Runs one round concurrently. Results keep the order of `calls`.
    async fn run_round(&self, calls: Vec<ToolCall>) -> Vec<ToolExchange> {
        let mut slots: Vec<Option<ToolExchange>> = vec![None; calls.len()];
        let mut pending = JoinSet::new();

        for (index, call) in calls.iter().enumerate() {
            if !self.catalog.contains(&call.operation) {
                slots[index] = Some(ToolExchange {
                    call: call.clone(),
                    result: ToolResult::failure(
                        ToolErrorKind::InvalidParameters,
                        format!("operation `{}` is not declared for this handler", call.operation),
                    ),
                });
                continue;
            }
            let client = Arc::clone(&self.tools);
            let timeout = self.settings.call_timeout;
            let call = call.clone();
            pending.spawn(async move {
                let result = client.invoke(&call, timeout).await;
                (index, ToolExchange { call, result })
            });
        }

        while let Some(joined) = pending.join_next().await {
            match joined {
                Ok((index, exchange)) => slots[index] = Some(exchange),
                Err(error) => warn!(
                    event_name = "handler.tool_task.lost",
                    error = %error,
                    "tool call task ended without a result"
                ),
            }
        }

        slots
            .into_iter()
            .zip(calls)
            .map(|(slot, call)| {
                slot.unwrap_or_else(|| ToolExchange {
                    call,
                    result: ToolResult::failure(
                        ToolErrorKind::Unavailable,
                        "tool call task ended without a result",
                    ),
                })
            })
            .collect()
    }
}
