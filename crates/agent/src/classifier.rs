use std::cmp::Ordering;
use std::collections::BTreeSet;

use waypoint_core::config::RouterConfig;
use waypoint_core::domain::intent::{
    CapabilityDescriptor, ConfidenceBand, HandlerId, IntentCandidate, IntentDecision,
};
use waypoint_core::domain::query::Query;

use crate::registry::RegistrySnapshot;

const MAX_REPORTED_CANDIDATES: usize = 5;

#[derive(Clone, Debug, PartialEq)]
pub struct ClassifierConfig {
    pub keyword_weight: f64,
    pub phrase_weight: f64,
    /// Priority-scaled raw score that maps to a normalized score of 1.0.
    pub saturation: f64,
    pub high_confidence: f64,
    pub low_confidence: f64,
    pub general_handler: HandlerId,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            keyword_weight: 1.0,
            phrase_weight: 2.5,
            saturation: 4.0,
            high_confidence: 0.7,
            low_confidence: 0.4,
            general_handler: HandlerId::General,
        }
    }
}

impl ClassifierConfig {
    pub fn from_router(router: &RouterConfig) -> Self {
        Self {
            high_confidence: router.high_confidence,
            low_confidence: router.low_confidence,
            general_handler: HandlerId::from(router.general_handler.clone()),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DescriptorScore {
    pub handler_id: HandlerId,
    pub capability: String,
    pub priority: u8,
    pub threshold: f64,
    pub matched_keywords: Vec<String>,
    pub matched_phrases: Vec<String>,
    /// Weighted hit count scaled by priority, before normalization.
    pub raw: f64,
    pub score: f64,
}

impl DescriptorScore {
    pub fn cleared(&self) -> bool {
        self.raw > 0.0 && self.score >= self.threshold
    }

    fn rank(&self, other: &Self) -> Ordering {
        other
            .raw
            .total_cmp(&self.raw)
            .then_with(|| other.priority.cmp(&self.priority))
            .then_with(|| self.handler_id.cmp(&other.handler_id))
            .then_with(|| self.capability.cmp(&other.capability))
    }

    fn as_candidate(&self) -> IntentCandidate {
        IntentCandidate {
            handler_id: self.handler_id.clone(),
            capability: self.capability.clone(),
            raw_score: self.raw,
            score: self.score,
            priority: self.priority,
            cleared_threshold: self.cleared(),
        }
    }
}

/// Lexical intent scoring over a registry snapshot. Pure: no I/O, no
/// reasoning engine, same input gives the same decision.
#[derive(Clone, Debug, Default)]
pub struct IntentClassifier {
    config: ClassifierConfig,
}

impl IntentClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn classify(&self, query: &Query, snapshot: &RegistrySnapshot) -> IntentDecision {
        let tokens = tokenize(query.text());
        if tokens.is_empty() {
            return self.fallback(Vec::new(), "query has no classifiable words".to_string());
        }
        let token_set = tokens.iter().map(String::as_str).collect::<BTreeSet<_>>();
        let joined = format!(" {} ", tokens.join(" "));

        let mut scores = snapshot
            .descriptors()
            .iter()
            .map(|descriptor| self.score(descriptor, &token_set, &joined))
            .filter(|score| score.raw > 0.0)
            .collect::<Vec<_>>();
        scores.sort_by(DescriptorScore::rank);

        let Some(winner) = scores.iter().find(|score| score.cleared()).cloned() else {
            let reasoning = match scores.first() {
                Some(best) => format!(
                    "no capability cleared its threshold; best was {}/{} at {:.2} (needs {:.2})",
                    best.handler_id, best.capability, best.score, best.threshold
                ),
                None => "no capability keywords or phrases matched".to_string(),
            };
            return self.fallback(scores, reasoning);
        };

        let reasoning = format!(
            "{}/{} matched keywords [{}] and phrases [{}] (score {:.2}, priority {})",
            winner.handler_id,
            winner.capability,
            winner.matched_keywords.join(", "),
            winner.matched_phrases.join(", "),
            winner.score,
            winner.priority
        );

        IntentDecision {
            selected_handler: winner.handler_id.clone(),
            confidence: self.band(winner.score),
            score: winner.score,
            reasoning,
            fallback_applied: false,
            matched_capability: Some(winner.capability.clone()),
            candidates: candidates(&scores),
        }
    }

    pub fn score(
        &self,
        descriptor: &CapabilityDescriptor,
        tokens: &BTreeSet<&str>,
        joined_tokens: &str,
    ) -> DescriptorScore {
        let matched_keywords = descriptor
            .keywords
            .iter()
            .filter(|keyword| {
                if keyword.contains(' ') {
                    joined_tokens.contains(&format!(" {keyword} "))
                } else {
                    tokens.contains(keyword.as_str())
                }
            })
            .cloned()
            .collect::<Vec<_>>();
        let matched_phrases = descriptor
            .phrases
            .iter()
            .filter(|phrase| {
                let phrase_tokens = tokenize(phrase);
                !phrase_tokens.is_empty()
                    && joined_tokens.contains(&format!(" {} ", phrase_tokens.join(" ")))
            })
            .cloned()
            .collect::<Vec<_>>();

        let weighted = self.config.keyword_weight * matched_keywords.len() as f64
            + self.config.phrase_weight * matched_phrases.len() as f64;
        let raw = weighted * f64::from(descriptor.priority) / 10.0;
        let score = if self.config.saturation > 0.0 {
            (raw / self.config.saturation).min(1.0)
        } else {
            0.0
        };

        DescriptorScore {
            handler_id: descriptor.handler_id.clone(),
            capability: descriptor.name.clone(),
            priority: descriptor.priority,
            threshold: descriptor.confidence_threshold,
            matched_keywords,
            matched_phrases,
            raw,
            score,
        }
    }

    fn band(&self, score: f64) -> ConfidenceBand {
        ConfidenceBand::from_score(score, self.config.high_confidence, self.config.low_confidence)
    }

    fn fallback(&self, scores: Vec<DescriptorScore>, reasoning: String) -> IntentDecision {
        let best = scores.first().map(|score| score.score).unwrap_or(0.0);
        IntentDecision {
            selected_handler: self.config.general_handler.clone(),
            confidence: self.band(best),
            score: best,
            reasoning,
            fallback_applied: true,
            matched_capability: None,
            candidates: candidates(&scores),
        }
    }
}

fn candidates(scores: &[DescriptorScore]) -> Vec<IntentCandidate> {
    scores.iter().take(MAX_REPORTED_CANDIDATES).map(DescriptorScore::as_candidate).collect()
}

pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|character: char| !character.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}
