use std::collections::VecDeque;

use serde::Serialize;
use waypoint_core::domain::intent::HandlerId;
use waypoint_core::domain::query::{ConversationTurn, TurnRole};

pub const DEFAULT_MAX_TURNS: usize = 20;

const TOPIC_PREVIEW_CHARS: usize = 80;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConversationSummary {
    pub turns: usize,
    pub last_handler: Option<HandlerId>,
    pub recent_topic: Option<String>,
}

/// Bounded per-user history. Oldest turns fall off once `max_turns` is
/// reached.
#[derive(Clone, Debug)]
pub struct ConversationLog {
    turns: VecDeque<ConversationTurn>,
    max_turns: usize,
}

impl Default for ConversationLog {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TURNS)
    }
}

impl ConversationLog {
    pub fn new(max_turns: usize) -> Self {
        let max_turns = max_turns.max(1);
        Self { turns: VecDeque::with_capacity(max_turns), max_turns }
    }

    pub fn push(&mut self, turn: ConversationTurn) {
        if self.turns.len() == self.max_turns {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    pub fn record_exchange(
        &mut self,
        question: impl Into<String>,
        answer: impl Into<String>,
        handler: HandlerId,
    ) {
        self.push(ConversationTurn::user(question));
        self.push(ConversationTurn::assistant(answer, handler));
    }

    /// The last `count` turns, oldest first.
    pub fn recent(&self, count: usize) -> Vec<ConversationTurn> {
        let skip = self.turns.len().saturating_sub(count);
        self.turns.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn summary(&self) -> ConversationSummary {
        let last_handler = self.turns.iter().rev().find_map(|turn| turn.handler.clone());
        let recent_topic = self
            .turns
            .iter()
            .rev()
            .find(|turn| turn.role == TurnRole::User)
            .map(|turn| preview(&turn.content));
        ConversationSummary { turns: self.turns.len(), last_handler, recent_topic }
    }
}

fn preview(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= TOPIC_PREVIEW_CHARS {
        return trimmed.to_string();
    }
    let mut cut = trimmed.chars().take(TOPIC_PREVIEW_CHARS).collect::<String>();
    cut.push_str("...");
    cut
}
