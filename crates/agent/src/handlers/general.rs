use std::sync::Arc;

use async_trait::async_trait;
use waypoint_core::domain::intent::{
    CapabilityDescriptor, ConfidenceBand, HandlerId, HandlerMetadata,
};
use waypoint_core::domain::query::Query;
use waypoint_core::domain::response::{DataSource, HandlerResponse};

use crate::handler::{Handler, ToolLoop, ToolLoopSettings};
use crate::reasoning::{ReasoningEngine, ReasoningRequest};
use crate::tools::{DisabledToolClient, ToolCatalog};

const SYSTEM_PROMPT: &str = "You are a cloud architecture assistant. Answer the question \
directly and concisely from general knowledge. If the question turns out to be about \
prices, give ranges rather than exact figures and suggest asking for a cost analysis.";

/// Catch-all target for queries no specialist claims. Declares no tools and
/// no capabilities, so it is reached only through classifier fallback.
pub struct GeneralHandler {
    id: HandlerId,
    tool_loop: ToolLoop,
}

impl GeneralHandler {
    pub fn new(engine: Arc<dyn ReasoningEngine>) -> Self {
        Self::with_id(HandlerId::General, engine)
    }

    pub fn with_id(id: HandlerId, engine: Arc<dyn ReasoningEngine>) -> Self {
        let tool_loop = ToolLoop::new(
            engine,
            Arc::new(DisabledToolClient),
            ToolCatalog::default(),
            ToolLoopSettings { max_rounds: 0, ..ToolLoopSettings::default() },
        );
        Self { id, tool_loop }
    }
}

#[async_trait]
impl Handler for GeneralHandler {
    fn id(&self) -> HandlerId {
        self.id.clone()
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            id: self.id.clone(),
            name: "General".to_string(),
            description: "Answers anything no specialist handler claims".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    fn capabilities(&self) -> Vec<CapabilityDescriptor> {
        Vec::new()
    }

    async fn process(&self, query: &Query) -> HandlerResponse {
        let request = ReasoningRequest::new(SYSTEM_PROMPT, query.text())
            .with_context(query.context().to_vec());
        match self.tool_loop.run(&self.id, request).await {
            Ok(outcome) => HandlerResponse::success(
                self.id.clone(),
                outcome.answer,
                DataSource::FallbackKnowledge,
                ConfidenceBand::Medium,
            ),
            Err(error) => {
                HandlerResponse::failure(self.id.clone(), error.kind(), error.to_string())
            }
        }
    }
}
