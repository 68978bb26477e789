//! Conversational-flow analysis.
//!
//! Tags each message with its structural position by comparing it to its
//! immediate neighbors in canonical (`sequence_number`) order. Every check is
//! local, so a pass over `n` messages is O(n) after the sort.

use std::collections::{BTreeSet, HashMap};

use chrono::Duration;
use contextwise_core::message::{Message, Role};

use crate::markers::{Marker, priority_score};

/// Opening words that continue a line of questioning.
pub const CONTINUATION_TOKENS: &[&str] = &[
    "also",
    "additionally",
    "furthermore",
    "and",
    "but",
    "however",
    "what about",
];

/// Opening words that (re)start a conversation.
pub const GREETING_TOKENS: &[&str] = &[
    "hi",
    "hello",
    "hey",
    "good morning",
    "good afternoon",
    "good evening",
    "greetings",
];

/// Phrases that explicitly pivot to a new subject.
pub const PIVOT_PHRASES: &[&str] = &[
    "by the way",
    "speaking of",
    "changing topics",
    "change of topic",
    "on another note",
    "different question",
    "unrelated",
    "switching gears",
    "new topic",
];

/// A silence longer than this restarts the conversation.
pub const RESTART_GAP_HOURS: i64 = 24;

/// Whether `text` begins with `token` as a whole word.
fn starts_with_word(text: &str, token: &str) -> bool {
    text.strip_prefix(token)
        .is_some_and(|rest| !rest.starts_with(|c: char| c.is_alphanumeric()))
}

/// Produces flow markers over an ordered message sequence. Stateless.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowAnalyzer;

impl FlowAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Flow markers for every message, keyed by message ID.
    ///
    /// Input order does not matter; messages are analyzed in ascending
    /// `sequence_number` order. Messages without flow signals are omitted.
    pub fn analyze(&self, messages: &[Message]) -> HashMap<String, BTreeSet<Marker>> {
        let mut ordered: Vec<&Message> = messages.iter().collect();
        ordered.sort_by_key(|m| m.sequence_number);

        let mut out: HashMap<String, BTreeSet<Marker>> = HashMap::new();
        let mut user_has_spoken = false;

        for (i, message) in ordered.iter().enumerate() {
            let mut markers = BTreeSet::new();
            let lower = message.content.trim_start().to_lowercase();
            let prev = i.checked_sub(1).map(|p| ordered[p]);
            let next = ordered.get(i + 1);

            if message.role == Role::User
                && next.is_some_and(|n| n.role == Role::Assistant)
            {
                markers.insert(Marker::QuestionInPair);
            }
            if message.role == Role::Assistant && prev.is_some_and(|p| p.role == Role::User) {
                markers.insert(Marker::AnswerInPair);
            }

            if message.role == Role::User
                && user_has_spoken
                && CONTINUATION_TOKENS.iter().any(|t| starts_with_word(&lower, t))
            {
                markers.insert(Marker::FollowUpQuestion);
            }

            let long_gap = prev.is_some_and(|p| {
                message.created_at.signed_duration_since(p.created_at)
                    > Duration::hours(RESTART_GAP_HOURS)
            });
            if prev.is_none()
                || long_gap
                || GREETING_TOKENS.iter().any(|t| starts_with_word(&lower, t))
            {
                markers.insert(Marker::ConversationStarter);
            }

            if PIVOT_PHRASES.iter().any(|p| lower.contains(p)) {
                markers.insert(Marker::TopicChange);
            }

            if message.role == Role::User {
                user_has_spoken = true;
            }
            if !markers.is_empty() {
                out.insert(message.id.clone(), markers);
            }
        }

        out
    }

    /// Per-message flow score (sum of flow marker weights), keyed by ID.
    pub fn flow_scores(&self, messages: &[Message]) -> HashMap<String, f64> {
        self.analyze(messages)
            .into_iter()
            .map(|(id, markers)| (id, priority_score(&markers)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn seq(messages: Vec<Message>) -> Vec<Message> {
        let base = Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap();
        messages
            .into_iter()
            .enumerate()
            .map(|(i, m)| {
                m.with_sequence(i as i64 + 1)
                    .at(base + Duration::minutes(i as i64))
            })
            .collect()
    }

    fn markers_of<'a>(
        analysis: &'a HashMap<String, BTreeSet<Marker>>,
        message: &Message,
    ) -> Option<&'a BTreeSet<Marker>> {
        analysis.get(&message.id)
    }

    #[test]
    fn pairs_are_detected() {
        let msgs = seq(vec![
            Message::user("How do I build?"),
            Message::assistant("Run cargo build."),
            Message::assistant("Anything else?"),
        ]);
        let a = FlowAnalyzer::new().analyze(&msgs);
        assert!(markers_of(&a, &msgs[0]).unwrap().contains(&Marker::QuestionInPair));
        assert!(markers_of(&a, &msgs[1]).unwrap().contains(&Marker::AnswerInPair));
        assert!(markers_of(&a, &msgs[2]).is_none());
    }

    #[test]
    fn first_message_starts_conversation() {
        let msgs = seq(vec![Message::user("Deploy it"), Message::user("Now")]);
        let a = FlowAnalyzer::new().analyze(&msgs);
        assert!(markers_of(&a, &msgs[0]).unwrap().contains(&Marker::ConversationStarter));
        assert!(markers_of(&a, &msgs[1]).is_none());
    }

    #[test]
    fn greeting_and_long_gap_restart() {
        let mut msgs = seq(vec![
            Message::user("Deploy it"),
            Message::assistant("Done."),
            Message::user("Hello again"),
            Message::user("Status?"),
        ]);
        msgs[3].created_at = msgs[2].created_at + Duration::hours(30);
        let a = FlowAnalyzer::new().analyze(&msgs);
        assert!(markers_of(&a, &msgs[2]).unwrap().contains(&Marker::ConversationStarter));
        assert!(markers_of(&a, &msgs[3]).unwrap().contains(&Marker::ConversationStarter));
    }

    #[test]
    fn greeting_requires_whole_word() {
        let msgs = seq(vec![Message::user("x"), Message::user("history of rust")]);
        let a = FlowAnalyzer::new().analyze(&msgs);
        assert!(markers_of(&a, &msgs[1]).is_none());
    }

    #[test]
    fn follow_up_needs_prior_user_turn() {
        let msgs = seq(vec![
            Message::assistant("Welcome"),
            Message::user("And what is this?"),
            Message::assistant("A demo."),
            Message::user("Also, how do I stop it?"),
        ]);
        let a = FlowAnalyzer::new().analyze(&msgs);
        assert!(!markers_of(&a, &msgs[1]).unwrap().contains(&Marker::FollowUpQuestion));
        assert!(markers_of(&a, &msgs[3]).unwrap().contains(&Marker::FollowUpQuestion));
    }

    #[test]
    fn topic_change_phrase() {
        let msgs = seq(vec![
            Message::user("Thanks"),
            Message::user("By the way, is the API stable?"),
        ]);
        let a = FlowAnalyzer::new().analyze(&msgs);
        assert!(markers_of(&a, &msgs[1]).unwrap().contains(&Marker::TopicChange));
    }

    #[test]
    fn analysis_uses_sequence_order_not_slice_order() {
        let msgs = seq(vec![
            Message::user("What is a trait?"),
            Message::assistant("An interface."),
        ]);
        let reversed: Vec<Message> = msgs.iter().rev().cloned().collect();
        let a = FlowAnalyzer::new().analyze(&reversed);
        assert!(markers_of(&a, &msgs[0]).unwrap().contains(&Marker::QuestionInPair));
        assert!(markers_of(&a, &msgs[1]).unwrap().contains(&Marker::AnswerInPair));
    }

    #[test]
    fn flow_scores_sum_weights() {
        let msgs = seq(vec![
            Message::user("Hi, what is a trait?"),
            Message::assistant("An interface."),
        ]);
        let scores = FlowAnalyzer::new().flow_scores(&msgs);
        // question_in_pair 0.6 + conversation_starter 0.2
        assert!((scores[&msgs[0].id] - 0.8).abs() < 1e-9);
        assert!((scores[&msgs[1].id] - 0.6).abs() < 1e-9);
    }
}
