use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use waypoint_agent::conversation::{ConversationLog, ConversationSummary};
use waypoint_core::domain::intent::{ConfidenceBand, IntentDecision};
use waypoint_core::domain::query::{Query, RequestId};
use waypoint_core::domain::response::{DataSource, ResponseMetadata, ResponseStatus};
use waypoint_core::errors::{ErrorKind, InterfaceError};

use crate::app::AppState;

const ANONYMOUS_USER: &str = "anonymous";

#[derive(Clone, Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default, alias = "userId")]
    pub user_id: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub id: String,
    pub content: String,
    pub role: &'static str,
    pub agent_type: String,
    pub status: ResponseStatus,
    pub data_source: DataSource,
    pub confidence: ConfidenceBand,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub intent_analysis: IntentDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResponseMetadata>,
    pub served_from_cache: bool,
    pub elapsed_ms: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatError {
    pub error: &'static str,
    pub message: String,
    pub correlation_id: String,
}

pub async fn router_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<(StatusCode, Json<ChatResponse>), (StatusCode, Json<ChatError>)> {
    let request_id = RequestId::generate();
    let message = request.message.trim().to_string();
    if message.is_empty() {
        let error = InterfaceError::bad_request("message must not be empty", request_id.0.clone());
        return Err((StatusCode::BAD_REQUEST, Json(chat_error(&error))));
    }
    let user_id = request
        .user_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| ANONYMOUS_USER.to_string());

    let context = state
        .conversations
        .lock()
        .map(|logs| {
            logs.get(&user_id)
                .map(|log| log.recent(state.max_context_turns))
                .unwrap_or_default()
        })
        .unwrap_or_default();

    info!(
        event_name = "http.chat.received",
        correlation_id = %request_id,
        user_id = %user_id,
        context_turns = context.len(),
        "chat request received"
    );
    let routed = state
        .runtime
        .handle(Query::with_context(message.clone(), context).with_request_id(request_id))
        .await;
    let response = &routed.response;

    let status_code = match response.error_kind {
        None => {
            if let Ok(mut logs) = state.conversations.lock() {
                logs.entry(user_id).or_insert_with(ConversationLog::default).record_exchange(
                    message,
                    response.content.clone(),
                    response.handler.clone(),
                );
            }
            StatusCode::OK
        }
        Some(kind) => {
            let correlation_id = routed.request_id.0.clone();
            let error = InterfaceError::from_kind(kind, response.content.clone(), correlation_id);
            warn!(
                event_name = "http.chat.failed",
                correlation_id = %routed.request_id,
                error_kind = kind.as_str(),
                "chat request ended in an error envelope"
            );
            interface_status(&error)
        }
    };

    let body = ChatResponse {
        id: routed.request_id.0.clone(),
        content: response.content.clone(),
        role: "assistant",
        agent_type: response.handler.as_str().to_string(),
        status: response.status,
        data_source: response.data_source,
        confidence: response.confidence,
        error_kind: response.error_kind,
        intent_analysis: routed.intent.clone(),
        metadata: response.metadata.clone(),
        served_from_cache: routed.served_from_cache,
        elapsed_ms: routed.elapsed_ms,
        timestamp: routed.completed_at,
    };
    Ok((status_code, Json(body)))
}

pub async fn conversation_summary(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<ConversationSummary> {
    let summary = state
        .conversations
        .lock()
        .ok()
        .and_then(|logs| logs.get(&user_id).map(ConversationLog::summary))
        .unwrap_or_else(|| ConversationLog::default().summary());
    Json(summary)
}

/// Forgets a user's history. Idempotent: unknown users also get 204.
pub async fn reset_conversation(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> StatusCode {
    let cleared = match state.conversations.lock() {
        Ok(mut logs) => logs.get_mut(&user_id).map(|log| {
            let turns = log.len();
            log.clear();
            turns
        }),
        Err(_) => {
            warn!(
                event_name = "http.conversation.lock_poisoned",
                user_id = %user_id,
                "conversation log unavailable; nothing cleared"
            );
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };
    info!(
        event_name = "http.conversation.reset",
        user_id = %user_id,
        turns = cleared.unwrap_or(0),
        "conversation history cleared"
    );
    StatusCode::NO_CONTENT
}

fn interface_status(error: &InterfaceError) -> StatusCode {
    match error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn chat_error(error: &InterfaceError) -> ChatError {
    let class = match error {
        InterfaceError::BadRequest { .. } => "bad_request",
        InterfaceError::ServiceUnavailable { .. } => "service_unavailable",
        InterfaceError::Internal { .. } => "internal",
    };
    ChatError {
        error: class,
        message: error.user_message().to_string(),
        correlation_id: error.correlation_id().to_string(),
    }
}
