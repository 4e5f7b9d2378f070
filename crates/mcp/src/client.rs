use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;
use waypoint_agent::tools::ToolTransport;
use waypoint_core::config::ToolsConfig;
use waypoint_core::domain::tool::{ToolCall, ToolErrorKind, ToolResult};

use crate::protocol::ToolEnvelope;
use crate::{ProxyError, ProxyResult};

/// Sends tool calls to a tool proxy as `POST {base_url}/tools/{operation}`.
///
/// Every failure comes back as a `ToolResult::Failure`; retry and the
/// per-attempt deadline belong to the `ResilientToolClient` wrapping this.
#[derive(Clone, Debug)]
pub struct HttpToolTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpToolTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ProxyResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| ProxyError::Transport(error.to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { http, base_url })
    }

    pub fn from_config(config: &ToolsConfig) -> ProxyResult<Self> {
        Self::new(config.base_url.clone(), config.call_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Reads the proxy's health endpoint.
    pub async fn ping(&self) -> ProxyResult<ProxyHealthReport> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(|error| ProxyError::Transport(error.to_string()))?;
        if !response.status().is_success() {
            return Err(ProxyError::Transport(format!(
                "tool service health returned {}",
                response.status()
            )));
        }
        response.json::<ProxyHealthReport>().await.map_err(|error| {
            ProxyError::Transport(format!("tool service health was unreadable: {error}"))
        })
    }
}

/// Client-side view of the proxy's `GET /health` body.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ProxyHealthReport {
    pub status: String,
    pub operations: usize,
}

#[async_trait]
impl ToolTransport for HttpToolTransport {
    async fn send(&self, call: &ToolCall) -> ToolResult {
        let url = format!("{}/tools/{}", self.base_url, call.operation);
        let response = match self.http.post(&url).json(call).send().await {
            Ok(response) => response,
            Err(error) if error.is_timeout() => {
                return ToolResult::failure(ToolErrorKind::Timeout, error.to_string());
            }
            Err(error) => {
                return ToolResult::failure(ToolErrorKind::Unavailable, error.to_string());
            }
        };

        let status = response.status();
        debug!(
            event_name = "tool.http.response",
            operation = %call.operation,
            status = status.as_u16(),
            "tool service answered"
        );

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(error) if error.is_timeout() => {
                return ToolResult::failure(ToolErrorKind::Timeout, error.to_string());
            }
            Err(error) => {
                return ToolResult::failure(ToolErrorKind::Unavailable, error.to_string());
            }
        };

        match serde_json::from_slice::<ToolEnvelope>(&body) {
            Ok(envelope) => envelope.into_result(),
            Err(_) => {
                ToolResult::failure(status_kind(status), format!("tool service returned {status}"))
            }
        }
    }
}

/// Kind for a response whose body was not an envelope.
fn status_kind(status: StatusCode) -> ToolErrorKind {
    if status.is_server_error() {
        ToolErrorKind::Unavailable
    } else if status.is_client_error() {
        ToolErrorKind::InvalidParameters
    } else {
        ToolErrorKind::MalformedResponse
    }
}
