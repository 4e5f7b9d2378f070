//! Tool proxy HTTP service.
//!
//! Exposes any [`ToolBackend`] over three routes:
//! - `GET /health`
//! - `GET /tools` lists the operation catalog
//! - `POST /tools/{operation}` takes a `ToolCall` body and answers with a
//!   [`ToolEnvelope`]

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tracing::{info, warn};
use waypoint_agent::tools::ToolSchema;
use waypoint_core::domain::tool::ToolCall;

use crate::protocol::ToolEnvelope;
use crate::{ProxyError, ProxyResult};

/// A source of tool operations.
#[async_trait]
pub trait ToolBackend: Send + Sync {
    fn operations(&self) -> Vec<ToolSchema>;

    async fn execute(&self, call: &ToolCall) -> ProxyResult<Value>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProxyHealth {
    pub status: &'static str,
    pub operations: usize,
    pub checked_at: String,
}

#[derive(Clone)]
pub struct ToolServer {
    backend: Arc<dyn ToolBackend>,
}

impl ToolServer {
    pub fn new(backend: Arc<dyn ToolBackend>) -> Self {
        Self { backend }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/tools", get(list_tools))
            .route("/tools/{operation}", post(invoke_tool))
            .with_state(self.clone())
    }

    /// Serves until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> ProxyResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let address = listener
            .local_addr()
            .map(|address| address.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        info!(
            event_name = "tool_proxy.start",
            correlation_id = "bootstrap",
            bind_address = %address,
            operations = self.backend.operations().len(),
            "tool proxy listening"
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|error| ProxyError::Transport(error.to_string()))?;

        info!(event_name = "tool_proxy.stop", correlation_id = "bootstrap", "tool proxy stopped");
        Ok(())
    }
}

async fn health(State(server): State<ToolServer>) -> Json<ProxyHealth> {
    Json(ProxyHealth {
        status: "ready",
        operations: server.backend.operations().len(),
        checked_at: Utc::now().to_rfc3339(),
    })
}

async fn list_tools(State(server): State<ToolServer>) -> Json<Vec<ToolSchema>> {
    Json(server.backend.operations())
}

async fn invoke_tool(
    State(server): State<ToolServer>,
    Path(operation): Path<String>,
    body: Result<Json<ToolCall>, JsonRejection>,
) -> (StatusCode, Json<ToolEnvelope>) {
    let started = Instant::now();
    let result = match body {
        Ok(Json(call)) if call.operation != operation => Err(ProxyError::InvalidParameters(
            format!("body operation `{}` does not match path `{operation}`", call.operation),
        )),
        Ok(Json(call)) => server.backend.execute(&call).await,
        Err(rejection) => Err(ProxyError::InvalidParameters(rejection.body_text())),
    };

    match result {
        Ok(data) => {
            info!(
                event_name = "tool_proxy.call.ok",
                operation = %operation,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "tool call served"
            );
            (StatusCode::OK, Json(ToolEnvelope::ok(data)))
        }
        Err(error) => {
            warn!(
                event_name = "tool_proxy.call.failed",
                operation = %operation,
                error = %error,
                "tool call rejected"
            );
            let status = StatusCode::from_u16(error.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(ToolEnvelope::from_error(&error)))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::ToolServer;
    use crate::catalog::PriceList;

    fn server() -> ToolServer {
        ToolServer::new(Arc::new(PriceList::builtin()))
    }

    async fn post_json(uri: &str, body: Value) -> (StatusCode, Value) {
        let response = server()
            .router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, serde_json::from_slice(&bytes).expect("json"))
    }

    #[tokio::test]
    async fn pricing_call_returns_success_envelope() {
        let (status, body) = post_json(
            "/tools/get_pricing",
            json!({
                "service": "AmazonEC2",
                "operation": "get_pricing",
                "region": "us-east-1",
                "filters": [{"field": "instanceType", "value": "t3.small", "matchType": "EQUALS"},
                            {"field": "operatingSystem", "value": "Linux", "matchType": "EQUALS"}]
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["data"]["products"][0]["unitPrice"], json!("0.0208"));
    }

    #[tokio::test]
    async fn unknown_operation_is_not_found() {
        let (status, body) = post_json(
            "/tools/drop_tables",
            json!({"service": "AmazonEC2", "operation": "drop_tables"}),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["kind"], json!("invalidParameters"));
    }

    #[tokio::test]
    async fn mismatched_operation_and_bad_body_are_bad_requests() {
        let (status, _) = post_json(
            "/tools/get_pricing",
            json!({"service": "AmazonEC2", "operation": "get_pricing_service_codes"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = post_json("/tools/get_pricing", json!({"filters": 3})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], json!(false));
    }

    #[tokio::test]
    async fn lists_operations() {
        let response = server()
            .router()
            .oneshot(Request::builder().uri("/tools").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let tools: Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(tools.as_array().map(Vec::len), Some(5));
    }
}
