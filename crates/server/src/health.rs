use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;
use waypoint_agent::RuntimeStatus;

use crate::app::AppState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub tools: HealthCheck,
    pub checked_at: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct StatusResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub model: String,
    pub uptime_secs: u64,
    pub conversations: usize,
    pub router: RuntimeStatus,
}

pub async fn index() -> Json<Value> {
    Json(json!({
        "service": "waypoint",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {"chat": "/router-chat", "health": "/health", "status": "/status"}
    }))
}

/// A down tool service degrades the answer, not the router, so the status
/// code stays 200 while the body reports `degraded`.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let tools = tool_check(&state).await;
    let ready = tools.status != "failed";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: format!("{} handlers registered", state.runtime.registry().len()),
        },
        tools,
        checked_at: Utc::now().to_rfc3339(),
    };
    (StatusCode::OK, Json(payload))
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let conversations = state.conversations.lock().map(|logs| logs.len()).unwrap_or_default();
    Json(StatusResponse {
        service: "waypoint",
        version: env!("CARGO_PKG_VERSION"),
        model: state.model.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        conversations,
        router: state.runtime.status(),
    })
}

async fn tool_check(state: &AppState) -> HealthCheck {
    let Some(transport) = &state.tool_transport else {
        return HealthCheck { status: "skipped", detail: "tools disabled".to_string() };
    };
    match transport.ping().await {
        Ok(report) => HealthCheck {
            status: "ready",
            detail: format!("{} operations available", report.operations),
        },
        Err(error) => {
            warn!(
                event_name = "system.health.tools_unreachable",
                correlation_id = "health",
                error = %error,
                "tool service ping failed"
            );
            HealthCheck { status: "failed", detail: error.to_string() }
        }
    }
}
