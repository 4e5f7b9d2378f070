//! Shared vocabulary for the waypoint workspace: configuration, the error
//! taxonomy, and the domain types exchanged between the router, handlers and
//! the tool service.

pub mod config;
pub mod domain;
pub mod errors;

pub use domain::cost::{
    CostBreakdown, CostLineItem, CostReport, ExtractedCosts, PricedProduct, PricingPayload,
    HOURS_PER_MONTH,
};
pub use domain::intent::{
    CapabilityDescriptor, ConfidenceBand, HandlerId, HandlerMetadata, IntentCandidate,
    IntentDecision,
};
pub use domain::query::{ConversationTurn, Query, QueryFingerprint, RequestId, TurnRole};
pub use domain::response::{
    CacheEntry, DataSource, HandlerResponse, ResponseMetadata, ResponseStatus, RoutedResponse,
};
pub use domain::tool::{MatchType, ToolCall, ToolErrorKind, ToolFilter, ToolResult};
pub use errors::{ApplicationError, DomainError, ErrorKind, InterfaceError};
