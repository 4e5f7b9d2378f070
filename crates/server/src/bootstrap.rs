use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use waypoint_agent::tools::{DisabledToolClient, ResilientToolClient, RetryPolicy, ToolClient};
use waypoint_agent::AgentRuntime;
use waypoint_core::config::{AppConfig, ConfigError, LoadOptions};
use waypoint_core::errors::ApplicationError;
use waypoint_mcp::{HttpToolTransport, ProxyError};

use crate::llm::OpenAiCompatibleEngine;

pub struct Application {
    pub config: AppConfig,
    pub runtime: Arc<AgentRuntime>,
    pub engine: Arc<OpenAiCompatibleEngine>,
    /// Absent when tools are disabled in config.
    pub tool_transport: Option<HttpToolTransport>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("reasoning engine client could not be built: {0}")]
    ReasoningClient(#[source] reqwest::Error),
    #[error("tool transport could not be built: {0}")]
    ToolTransport(#[source] ProxyError),
    #[error("router assembly failed: {0}")]
    Runtime(#[source] ApplicationError),
}

pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        provider = ?config.llm.provider,
        model = %config.llm.model,
        "starting application bootstrap"
    );

    let engine = Arc::new(
        OpenAiCompatibleEngine::from_config(&config.llm).map_err(BootstrapError::ReasoningClient)?,
    );

    let (tools, tool_transport): (Arc<dyn ToolClient>, _) = if config.tools.enabled {
        let transport =
            HttpToolTransport::from_config(&config.tools).map_err(BootstrapError::ToolTransport)?;
        info!(
            event_name = "system.bootstrap.tools_configured",
            correlation_id = "bootstrap",
            base_url = %transport.base_url(),
            max_attempts = config.tools.max_attempts,
            "tool service transport configured"
        );
        let client = ResilientToolClient::new(
            Arc::new(transport.clone()),
            RetryPolicy::from_config(&config.tools),
        );
        (Arc::new(client), Some(transport))
    } else {
        info!(
            event_name = "system.bootstrap.tools_disabled",
            correlation_id = "bootstrap",
            "tools disabled; handlers answer from fallback knowledge"
        );
        (Arc::new(DisabledToolClient), None)
    };

    let runtime = AgentRuntime::from_config(&config, engine.clone(), tools)
        .map_err(BootstrapError::Runtime)?;
    info!(
        event_name = "system.bootstrap.runtime_ready",
        correlation_id = "bootstrap",
        handlers = runtime.registry().len(),
        cache_enabled = runtime.cache().is_some(),
        "router assembled"
    );

    Ok(Application { config, runtime: Arc::new(runtime), engine, tool_transport })
}
