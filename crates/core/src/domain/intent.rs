use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Handler identifier. Built-in handlers get their own variants; anything
/// registered at runtime under another name lands in `Custom`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HandlerId {
    General,
    CostAnalysis,
    Custom(String),
}

impl HandlerId {
    pub const ORCHESTRATOR_FALLBACK: &'static str = "orchestrator_fallback";

    pub fn as_str(&self) -> &str {
        match self {
            Self::General => "general",
            Self::CostAnalysis => "cost_analysis",
            Self::Custom(value) => value,
        }
    }

    pub fn orchestrator_fallback() -> Self {
        Self::Custom(Self::ORCHESTRATOR_FALLBACK.to_string())
    }
}

impl From<String> for HandlerId {
    fn from(value: String) -> Self {
        match value.as_str() {
            "general" => Self::General,
            "cost_analysis" => Self::CostAnalysis,
            _ => Self::Custom(value),
        }
    }
}

impl From<&str> for HandlerId {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<HandlerId> for String {
    fn from(value: HandlerId) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialOrd for HandlerId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HandlerId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_str().cmp(other.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    Low,
    Medium,
    High,
}

impl ConfidenceBand {
    pub fn from_score(score: f64, high_threshold: f64, low_threshold: f64) -> Self {
        if score >= high_threshold {
            Self::High
        } else if score >= low_threshold {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub handler_id: HandlerId,
    pub name: String,
    pub description: String,
    pub keywords: BTreeSet<String>,
    pub phrases: BTreeSet<String>,
    pub priority: u8,
    pub confidence_threshold: f64,
}

impl CapabilityDescriptor {
    pub fn new(handler_id: HandlerId, name: impl Into<String>) -> Self {
        Self {
            handler_id,
            name: name.into(),
            description: String::new(),
            keywords: BTreeSet::new(),
            phrases: BTreeSet::new(),
            priority: 5,
            confidence_threshold: 0.3,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.keywords.extend(keywords.into_iter().map(|keyword| keyword.as_ref().to_lowercase()));
        self
    }

    pub fn phrases<I, S>(mut self, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.phrases.extend(phrases.into_iter().map(|phrase| phrase.as_ref().to_lowercase()));
        self
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority.min(10);
        self
    }

    pub fn threshold(mut self, confidence_threshold: f64) -> Self {
        self.confidence_threshold = confidence_threshold.clamp(0.0, 1.0);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerMetadata {
    pub id: HandlerId,
    pub name: String,
    pub description: String,
    pub version: String,
}

/// Outcome of classifying one query. Built once per router invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentDecision {
    pub selected_handler: HandlerId,
    pub confidence: ConfidenceBand,
    pub score: f64,
    pub reasoning: String,
    pub fallback_applied: bool,
    pub matched_capability: Option<String>,
    pub candidates: Vec<IntentCandidate>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentCandidate {
    pub handler_id: HandlerId,
    pub capability: String,
    pub raw_score: f64,
    pub score: f64,
    pub priority: u8,
    pub cleared_threshold: bool,
}
