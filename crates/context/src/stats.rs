//! Descriptive statistics over a message history.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use contextwise_core::message::Message;
use serde::{Deserialize, Serialize};

use crate::flow::FlowAnalyzer;
use crate::markers::MarkerEngine;
use crate::token;

/// Summary of a conversation's shape and token footprint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextStats {
    pub total_messages: usize,
    /// Message count per role name.
    pub by_role: BTreeMap<String, usize>,
    pub total_tokens: usize,
    pub average_tokens: f64,
    /// How many messages carry each marker.
    pub marker_distribution: BTreeMap<String, usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oldest: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub newest: Option<DateTime<Utc>>,
}

/// Compute [`ContextStats`] for `messages` as of `now`.
pub fn context_stats(messages: &[Message], now: DateTime<Utc>) -> ContextStats {
    if messages.is_empty() {
        return ContextStats::default();
    }

    let mut by_role = BTreeMap::new();
    for message in messages {
        *by_role.entry(message.role.to_string()).or_insert(0) += 1;
    }

    let mut marker_distribution = BTreeMap::new();
    let scores = MarkerEngine::new().score_messages(messages, &FlowAnalyzer::new(), now);
    for score in scores.values() {
        for marker in &score.markers {
            *marker_distribution.entry(marker.to_string()).or_insert(0) += 1;
        }
    }

    let total_tokens = token::estimate_sum(messages);
    ContextStats {
        total_messages: messages.len(),
        by_role,
        total_tokens,
        average_tokens: total_tokens as f64 / messages.len() as f64,
        marker_distribution,
        oldest: messages.iter().map(|m| m.created_at).min(),
        newest: messages.iter().map(|m| m.created_at).max(),
    }
}
