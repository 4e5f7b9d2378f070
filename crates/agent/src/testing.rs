//! Deterministic stand-ins for the reasoning engine and the tool service,
//! for tests and local dry runs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use waypoint_core::domain::tool::{ToolCall, ToolErrorKind, ToolResult};

use crate::reasoning::{ReasoningEngine, ReasoningError, ReasoningOutcome, ReasoningRequest};
use crate::tools::ToolClient;

/// Replays outcomes in order and records every request it receives. Once the
/// script runs out it answers with the fallback text, or fails as malformed
/// output when none is set.
#[derive(Debug, Default)]
pub struct ScriptedReasoningEngine {
    script: Mutex<VecDeque<Result<ReasoningOutcome, ReasoningError>>>,
    requests: Mutex<Vec<ReasoningRequest>>,
    fallback_answer: Option<String>,
    latency: Option<Duration>,
}

impl ScriptedReasoningEngine {
    pub fn new<I>(script: I) -> Self
    where
        I: IntoIterator<Item = Result<ReasoningOutcome, ReasoningError>>,
    {
        Self { script: Mutex::new(script.into_iter().collect()), ..Self::default() }
    }

    /// Answers every request with `text`.
    pub fn answering(text: impl Into<String>) -> Self {
        Self { fallback_answer: Some(text.into()), ..Self::default() }
    }

    pub fn unreachable() -> Self {
        Self::new([Err(ReasoningError::Unreachable("connection refused".to_string()))])
    }

    pub fn with_fallback_answer(mut self, text: impl Into<String>) -> Self {
        self.fallback_answer = Some(text.into());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn requests(&self) -> Vec<ReasoningRequest> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl ReasoningEngine for ScriptedReasoningEngine {
    async fn reason(
        &self,
        request: &ReasoningRequest,
    ) -> Result<ReasoningOutcome, ReasoningError> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).push(request.clone());
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let next = self.script.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
        match next {
            Some(step) => step,
            None => match &self.fallback_answer {
                Some(text) => Ok(ReasoningOutcome::FinalAnswer(text.clone())),
                None => Err(ReasoningError::MalformedOutput("script exhausted".to_string())),
            },
        }
    }
}

/// Returns the same payload for every call.
#[derive(Debug)]
pub struct StaticToolClient {
    payload: Value,
    calls: AtomicU32,
}

impl StaticToolClient {
    pub fn new(payload: Value) -> Self {
        Self { payload, calls: AtomicU32::new(0) }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolClient for StaticToolClient {
    async fn invoke(&self, _call: &ToolCall, _timeout: Duration) -> ToolResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ToolResult::success(self.payload.clone())
    }
}

/// Fails every call with one error kind.
#[derive(Debug)]
pub struct FailingToolClient {
    kind: ToolErrorKind,
    calls: AtomicU32,
}

impl FailingToolClient {
    pub fn new(kind: ToolErrorKind) -> Self {
        Self { kind, calls: AtomicU32::new(0) }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolClient for FailingToolClient {
    async fn invoke(&self, call: &ToolCall, _timeout: Duration) -> ToolResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ToolResult::failure(self.kind, format!("{} failed with {}", call.operation, self.kind))
    }
}

#[cfg(test)]
mod tests {
    use super::ScriptedReasoningEngine;
    use crate::reasoning::{ReasoningEngine, ReasoningError, ReasoningOutcome, ReasoningRequest};

    #[tokio::test]
    async fn script_then_fallback() {
        let engine = ScriptedReasoningEngine::new([Ok(ReasoningOutcome::FinalAnswer(
            "first".into(),
        ))])
        .with_fallback_answer("later");
        let request = ReasoningRequest::new("system", "q");

        assert_eq!(
            engine.reason(&request).await,
            Ok(ReasoningOutcome::FinalAnswer("first".into()))
        );
        assert_eq!(
            engine.reason(&request).await,
            Ok(ReasoningOutcome::FinalAnswer("later".into()))
        );
        assert_eq!(engine.call_count(), 2);
    }

    #[tokio::test]
    async fn exhausted_script_without_fallback_is_malformed() {
        let engine = ScriptedReasoningEngine::new([]);
        let outcome = engine.reason(&ReasoningRequest::new("system", "q")).await;
        assert!(matches!(outcome, Err(ReasoningError::MalformedOutput(_))));
    }
}
