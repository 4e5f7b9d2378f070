//! Waypoint tool service plumbing
//!
//! Both ends of the request/response channel that handlers use for live
//! pricing data:
//!
//! - `protocol`: the JSON envelope every tool response is wrapped in
//! - `client`: [`HttpToolTransport`], the agent-side transport over HTTP
//! - `server`: an axum tool proxy in front of any [`ToolBackend`]
//! - `catalog`: [`PriceList`], an in-memory price list backend
//!
//! ## Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use waypoint_mcp::{PriceList, ToolServer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8001").await?;
//!     let server = ToolServer::new(Arc::new(PriceList::builtin()));
//!     server.serve(listener, std::future::pending()).await?;
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod client;
pub mod protocol;
pub mod server;

pub use catalog::{PriceEntry, PriceList};
pub use client::{HttpToolTransport, ProxyHealthReport};
pub use protocol::{EnvelopeError, ToolEnvelope};
pub use server::{ToolBackend, ToolServer};

use thiserror::Error;
use waypoint_core::domain::tool::ToolErrorKind;

/// Errors raised while serving or reaching a tool operation.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("price list error: {0}")]
    PriceList(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// HTTP status code the proxy answers with.
    pub fn status_code(&self) -> u16 {
        match self {
            ProxyError::InvalidParameters(_) => 400,
            ProxyError::UnknownOperation(_) => 404,
            ProxyError::PriceList(_) | ProxyError::Transport(_) | ProxyError::Internal(_) => 500,
        }
    }

    /// Tool error kind reported inside the response envelope.
    pub fn error_kind(&self) -> ToolErrorKind {
        match self {
            ProxyError::InvalidParameters(_) | ProxyError::UnknownOperation(_) => {
                ToolErrorKind::InvalidParameters
            }
            ProxyError::PriceList(_) | ProxyError::Internal(_) => ToolErrorKind::MalformedResponse,
            ProxyError::Transport(_) => ToolErrorKind::Unavailable,
        }
    }
}

/// Result type for tool proxy operations
pub type ProxyResult<T> = Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use waypoint_core::domain::tool::ToolErrorKind;

    use super::ProxyError;

    #[test]
    fn status_codes_follow_error_class() {
        assert_eq!(ProxyError::InvalidParameters("x".into()).status_code(), 400);
        assert_eq!(ProxyError::UnknownOperation("x".into()).status_code(), 404);
        assert_eq!(ProxyError::Internal("x".into()).status_code(), 500);
        assert_eq!(
            ProxyError::UnknownOperation("x".into()).error_kind(),
            ToolErrorKind::InvalidParameters
        );
    }
}
