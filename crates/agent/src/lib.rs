//! Agent Runtime - intent routing and tool-augmented handlers
//!
//! This crate is the routing "brain" of waypoint:
//! - Scores each query against registered handler capabilities
//! - Dispatches to a specialized handler under one end-to-end timeout
//! - Lets handlers consult a reasoning engine and call pricing tools
//! - Memoizes successful answers in a bounded LRU cache
//!
//! # Architecture
//!
//! A query flows through a fixed pipeline:
//! 1. **Fingerprint + cache** (`cache`) - identical normalized text is answered from memory
//! 2. **Classification** (`classifier`, `registry`) - lexical scoring, general handler
//!    as fallback
//! 3. **Dispatch** (`runtime`) - the selected handler runs on its own task under the
//!    request timeout
//! 4. **Tool loop** (`handler`, `tools`, `reasoning`) - bounded reason → tool → reason rounds
//! 5. **Annotation** (`annotation`) - best-effort cost figures for display
//!
//! # Key Types
//!
//! - `AgentRuntime` - the router (see `runtime` module)
//! - `ReasoningEngine` - pluggable model seam returning an answer or tool directives
//! - `ToolClient` - timeout-enforcing, retrying access to the tool service
//! - `CapabilityRegistry` - explicit handler registry, passed into the runtime
//!
//! # Trust Principle
//!
//! Tool failures never fail a query. They downgrade the answer to
//! `fallbackKnowledge`. An answer is `live` only when priced tool data
//! backs it. Every response carries its data source and
//! confidence so degraded answers are never shown as live ones.

pub mod annotation;
pub mod cache;
pub mod classifier;
pub mod conversation;
pub mod handler;
pub mod handlers;
pub mod reasoning;
pub mod registry;
pub mod runtime;
pub mod testing;
pub mod tools;

pub use cache::{CacheStats, ResponseCache};
pub use classifier::{ClassifierConfig, IntentClassifier};
pub use conversation::ConversationLog;
pub use handler::{Handler, ToolLoop, ToolLoopSettings};
pub use reasoning::{ReasoningEngine, ReasoningError, ReasoningOutcome, ReasoningRequest};
pub use registry::{CapabilityRegistry, RegistrationMode};
pub use runtime::{AgentRuntime, RuntimeStatus};
pub use tools::{DisabledToolClient, ResilientToolClient, RetryPolicy, ToolClient, ToolTransport};
