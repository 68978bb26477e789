//! Holistic importance scoring.
//!
//! Combines role, length, content category, recency and conversational flow
//! into one number used by score-driven strategies. This is deliberately
//! separate from the marker `priority_score`, which only reflects content
//! categories.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use contextwise_core::message::{Message, Role};

use crate::flow::FlowAnalyzer;
use crate::markers::{Marker, MarkerEngine};

/// Upper bound of an importance score.
pub const MAX_IMPORTANCE: f64 = 2.0;

const QUESTION_BONUS: f64 = 0.2;
const KEYWORD_BONUS: f64 = 0.1;
const CODE_BONUS: f64 = 0.15;

fn role_weight(role: Role) -> f64 {
    match role {
        Role::System => 1.0,
        Role::User => 0.7,
        Role::Assistant => 0.5,
        Role::Tool => 0.3,
    }
}

fn length_bonus(len: usize) -> f64 {
    match len {
        l if l > 500 => 0.3,
        l if l > 200 => 0.2,
        l if l > 100 => 0.1,
        _ => 0.0,
    }
}

fn recency_bonus(age: Duration) -> f64 {
    if age < Duration::hours(1) {
        0.3
    } else if age < Duration::hours(24) {
        0.2
    } else if age < Duration::hours(168) {
        0.1
    } else {
        0.0
    }
}

/// Scores messages for greedy budget filling. Stateless.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportanceScorer {
    markers: MarkerEngine,
    flow: FlowAnalyzer,
}

impl ImportanceScorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score one message given its pre-computed flow score.
    pub fn score(&self, message: &Message, flow_score: f64, now: DateTime<Utc>) -> f64 {
        let content = self.markers.mark_content(message);

        let mut score = role_weight(message.role) + length_bonus(message.content.len());
        if content.contains(&Marker::Question) {
            score += QUESTION_BONUS;
        }
        if content.iter().any(Marker::is_keyword_category) {
            score += KEYWORD_BONUS;
        }
        if content.contains(&Marker::CodeContent) {
            score += CODE_BONUS;
        }
        score += recency_bonus(now.signed_duration_since(message.created_at));
        score += flow_score;

        score.min(MAX_IMPORTANCE)
    }

    /// Score every message, computing flow over the whole sequence first.
    pub fn score_all(&self, messages: &[Message], now: DateTime<Utc>) -> HashMap<String, f64> {
        let flow = self.flow.flow_scores(messages);
        messages
            .iter()
            .map(|m| {
                let flow_score = flow.get(&m.id).copied().unwrap_or(0.0);
                (m.id.clone(), self.score(m, flow_score, now))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn role_weights_without_bonuses() {
        let scorer = ImportanceScorer::new();
        let long_ago = now() - Duration::days(60);
        assert!(close(scorer.score(&Message::system("ok").at(long_ago), 0.0, now()), 1.0));
        assert!(close(scorer.score(&Message::user("ok").at(long_ago), 0.0, now()), 0.7));
        assert!(close(scorer.score(&Message::assistant("ok").at(long_ago), 0.0, now()), 0.5));
        let mut tool = Message::user("ok").at(long_ago);
        tool.role = Role::Tool;
        assert!(close(scorer.score(&tool, 0.0, now()), 0.3));
    }

    #[test]
    fn recency_tiers() {
        let scorer = ImportanceScorer::new();
        let at = |h: i64| Message::assistant("ok").at(now() - Duration::hours(h));
        assert!(close(scorer.score(&at(0), 0.0, now()), 0.8));
        assert!(close(scorer.score(&at(5), 0.0, now()), 0.7));
        assert!(close(scorer.score(&at(100), 0.0, now()), 0.6));
        assert!(close(scorer.score(&at(200), 0.0, now()), 0.5));
    }

    #[test]
    fn keyword_bonus_applies_once() {
        let scorer = ImportanceScorer::new();
        let long_ago = now() - Duration::days(60);
        // important_content + error_or_problem + solution, still one bonus
        let msg = Message::assistant("Important: the error has a fix").at(long_ago);
        assert!(close(scorer.score(&msg, 0.0, now()), 0.6));
    }

    #[test]
    fn content_bonuses_stack_and_cap() {
        let scorer = ImportanceScorer::new();
        let text = format!("Why does `fn main()` crash? {}", "x".repeat(600));
        let msg = Message::system(text).at(now());
        // 1.0 + 0.3 + 0.2 + 0.1 + 0.15 + 0.3 + 0.6 → capped
        assert!(close(scorer.score(&msg, 0.6, now()), MAX_IMPORTANCE));
    }

    #[test]
    fn scoring_is_deterministic_with_fixed_time() {
        let scorer = ImportanceScorer::new();
        let messages = vec![
            Message::user("Hello, what is borrowing?").with_sequence(1).at(now()),
            Message::assistant("Borrowing means taking a reference.")
                .with_sequence(2)
                .at(now()),
        ];
        let first = scorer.score_all(&messages, now());
        let second = scorer.score_all(&messages, now());
        assert_eq!(first, second);
    }

    #[test]
    fn flow_contributes_to_score_all() {
        let scorer = ImportanceScorer::new();
        let long_ago = now() - Duration::days(60);
        let messages = vec![
            Message::user("ok").with_sequence(1).at(long_ago),
            Message::assistant("ok").with_sequence(2).at(long_ago),
        ];
        let scores = scorer.score_all(&messages, now());
        // user 0.7 + question_in_pair 0.6 + conversation_starter 0.2
        assert!(close(scores[&messages[0].id], 1.5));
        // assistant 0.5 + answer_in_pair 0.6
        assert!(close(scores[&messages[1].id], 1.1));
    }
}
