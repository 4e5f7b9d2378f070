use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::intent::HandlerId;
use crate::domain::tool::ToolErrorKind;

/// Machine-readable failure taxonomy shared by handlers, the router and the
/// HTTP surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ClassificationAmbiguous,
    ToolUnavailable,
    ToolTimeout,
    ToolMalformedResponse,
    ToolInvalidParameters,
    ReasoningEngineUnreachable,
    ReasoningEngineMalformedOutput,
    RequestTimeout,
    HandlerUnavailable,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClassificationAmbiguous => "classification_ambiguous",
            Self::ToolUnavailable => "tool_unavailable",
            Self::ToolTimeout => "tool_timeout",
            Self::ToolMalformedResponse => "tool_malformed_response",
            Self::ToolInvalidParameters => "tool_invalid_parameters",
            Self::ReasoningEngineUnreachable => "reasoning_engine_unreachable",
            Self::ReasoningEngineMalformedOutput => "reasoning_engine_malformed_output",
            Self::RequestTimeout => "request_timeout",
            Self::HandlerUnavailable => "handler_unavailable",
            Self::Internal => "internal",
        }
    }
}

impl From<ToolErrorKind> for ErrorKind {
    fn from(value: ToolErrorKind) -> Self {
        match value {
            ToolErrorKind::Unavailable => Self::ToolUnavailable,
            ToolErrorKind::Timeout => Self::ToolTimeout,
            ToolErrorKind::MalformedResponse => Self::ToolMalformedResponse,
            ToolErrorKind::InvalidParameters => Self::ToolInvalidParameters,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("handler `{0}` is already registered")]
    DuplicateHandler(HandlerId),
    #[error("handler `{0}` is not registered")]
    UnknownHandler(HandlerId),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("reasoning engine unreachable: {0}")]
    ReasoningUnreachable(String),
    #[error("reasoning engine returned malformed output: {0}")]
    ReasoningMalformed(String),
    #[error("request exceeded its {timeout_ms} ms budget")]
    RequestTimeout { timeout_ms: u64 },
    #[error("no runnable handler for `{0}`")]
    HandlerUnavailable(HandlerId),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
    #[error("internal failure: {0}")]
    Internal(String),
}

impl ApplicationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Domain(_) | Self::Configuration(_) | Self::Internal(_) => ErrorKind::Internal,
            Self::ReasoningUnreachable(_) => ErrorKind::ReasoningEngineUnreachable,
            Self::ReasoningMalformed(_) => ErrorKind::ReasoningEngineMalformedOutput,
            Self::RequestTimeout { .. } => ErrorKind::RequestTimeout,
            Self::HandlerUnavailable(_) => ErrorKind::HandlerUnavailable,
            Self::Integration(_) => ErrorKind::ToolUnavailable,
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn bad_request(message: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self::BadRequest { message: message.into(), correlation_id: correlation_id.into() }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }

    /// HTTP-level class for a router envelope that ended in `kind`.
    pub fn from_kind(
        kind: ErrorKind,
        message: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        let message = message.into();
        let correlation_id = correlation_id.into();
        match kind {
            ErrorKind::ReasoningEngineUnreachable
            | ErrorKind::RequestTimeout
            | ErrorKind::HandlerUnavailable
            | ErrorKind::ToolUnavailable
            | ErrorKind::ToolTimeout => Self::ServiceUnavailable { message, correlation_id },
            ErrorKind::ToolInvalidParameters | ErrorKind::ClassificationAmbiguous => {
                Self::BadRequest { message, correlation_id }
            }
            ErrorKind::ReasoningEngineMalformedOutput
            | ErrorKind::ToolMalformedResponse
            | ErrorKind::Internal => Self::Internal { message, correlation_id },
        }
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let kind = value.kind();
        match value {
            ApplicationError::Domain(DomainError::UnknownHandler(_))
            | ApplicationError::Domain(DomainError::DuplicateHandler(_))
            | ApplicationError::Domain(DomainError::InvariantViolation(_)) => Self::BadRequest {
                message: "domain validation failed".to_owned(),
                correlation_id: "unassigned".to_owned(),
            },
            other => Self::from_kind(kind, other.to_string(), "unassigned"),
        }
    }
}
