//! Waypoint HTTP server
//!
//! Wires the router runtime to its real dependencies and serves it:
//! - `bootstrap`: config → reasoning engine, tool client, `AgentRuntime`
//! - `llm`: OpenAI-compatible reasoning engine
//! - `chat`: `POST /router-chat` with per-user conversation windows
//! - `health`: `/`, `/health`, `/status`
//! - `app`: route table and graceful shutdown

pub mod app;
pub mod bootstrap;
pub mod chat;
pub mod health;
pub mod llm;

pub use app::{router, serve, AppState};
pub use bootstrap::{bootstrap, bootstrap_with_config, Application, BootstrapError};
pub use llm::OpenAiCompatibleEngine;
