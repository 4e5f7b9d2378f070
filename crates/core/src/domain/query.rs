use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::intent::HandlerId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn generate() -> Self {
        Self(format!("req-{}", Uuid::new_v4()))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cache key derived from the normalized query text only. Conversation
/// context never contributes to the fingerprint.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryFingerprint(pub String);

impl QueryFingerprint {
    pub fn of(text: &str) -> Self {
        let normalized = normalize_query_text(text);
        Self(blake3::hash(normalized.as_bytes()).to_hex().to_string())
    }

    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for QueryFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
    pub handler: Option<HandlerId>,
    pub at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: TurnRole::User, content: content.into(), handler: None, at: Utc::now() }
    }

    pub fn assistant(content: impl Into<String>, handler: HandlerId) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            handler: Some(handler),
            at: Utc::now(),
        }
    }
}

/// An inbound request. Immutable once built; the router and handlers only
/// ever borrow it or clone it whole.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Query {
    text: String,
    context: Vec<ConversationTurn>,
    request_id: RequestId,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), context: Vec::new(), request_id: RequestId::generate() }
    }

    pub fn with_context(text: impl Into<String>, context: Vec<ConversationTurn>) -> Self {
        Self { text: text.into(), context, request_id: RequestId::generate() }
    }

    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn context(&self) -> &[ConversationTurn] {
        &self.context
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn normalized_text(&self) -> String {
        normalize_query_text(&self.text)
    }

    pub fn fingerprint(&self) -> QueryFingerprint {
        QueryFingerprint::of(&self.text)
    }
}

/// Lowercases, trims, and collapses interior whitespace.
pub fn normalize_query_text(text: &str) -> String {
    text.split_whitespace().map(str::to_lowercase).collect::<Vec<_>>().join(" ")
}
