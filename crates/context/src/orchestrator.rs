//! Context orchestration: strategy selection and greedy budget filling.
//!
//! Given a conversation history and the message about to be sent, the
//! orchestrator picks a subset of history that fits the token budget
//! (`floor(context_window * context_ratio)`).
//!
//! Every strategy upholds three guarantees:
//!
//! - the returned messages are sorted by ascending `sequence_number`;
//! - with `include_system`, every system message that fits is admitted
//!   before any other message is considered;
//! - the returned token total never exceeds the budget. A message that is
//!   larger than the whole budget on its own is dropped outright and counted
//!   in [`TruncationMetadata::oversized_dropped`].
//!
//! When the whole history fits, `full_context` is used regardless of the
//! requested strategy.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use contextwise_core::clock::Clock;
use contextwise_core::error::Result;
use contextwise_core::message::{Conversation, ConversationId, Message, Role};
use contextwise_core::options::{ContextOptions, OptimizationLevel, PreservationStrategy};
use contextwise_core::store::SearchBackend;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::flow::FlowAnalyzer;
use crate::markers::{MarkerEngine, MessageScore};
use crate::optimizer::{ContentOptimizer, OptimizationStats, OptimizedContext};
use crate::relevance::{RelevanceResult, RelevanceRetriever};
use crate::scorer::ImportanceScorer;
use crate::token;

/// Share of the budget held back for the synthetic summary, in percent.
pub const SUMMARY_RESERVE_PERCENT: usize = 30;

/// ID given to the synthetic summary message.
pub const SUMMARY_MESSAGE_ID: &str = "context-summary";

const SUMMARY_PREFIX: &str = "Summary of earlier conversation: ";
const SUMMARY_EXCERPTS: usize = 3;
const EXCERPT_CHARS: usize = 100;

// ── Types ─────────────────────────────────────────────────────────────────

/// Strategy-specific details about a truncation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TruncationMetadata {
    /// Complete user/assistant pairs kept (`intelligent_truncation`).
    #[serde(default)]
    pub conversation_pairs_preserved: usize,
    /// Relevant messages the search produced (`search_enhanced_truncation`).
    #[serde(default)]
    pub relevant_messages_found: usize,
    #[serde(default)]
    pub search_performed: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search_terms: Vec<Vec<String>>,
    /// Whether a synthetic summary was prepended (`summarized_context`).
    #[serde(default)]
    pub summary_included: bool,
    /// Messages larger than the whole budget, dropped outright.
    #[serde(default)]
    pub oversized_dropped: usize,
    /// The strategy that was asked for, when a different one ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_strategy: Option<PreservationStrategy>,
    /// Savings from the post-selection optimizer, if it ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimization: Option<OptimizationStats>,
}

/// The budget-respecting subset of history chosen for the next model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TruncationResult {
    /// Selected messages, ascending by `sequence_number`.
    pub messages: Vec<Message>,
    pub total_tokens: usize,
    pub truncated: bool,
    /// The strategy that actually ran.
    pub strategy: PreservationStrategy,
    /// Number of history messages considered.
    pub original_count: usize,
    /// Number of history messages kept; excludes the synthetic summary.
    pub preserved_count: usize,
    pub budget: usize,
    #[serde(default)]
    pub metadata: TruncationMetadata,
}

// ── Budget filling ────────────────────────────────────────────────────────

enum Admission {
    Admitted,
    AlreadyIn,
    NoRoom,
}

/// Greedy accumulator over a fixed token capacity.
struct BudgetFill<'a> {
    capacity: usize,
    used: usize,
    admitted: Vec<&'a Message>,
    ids: HashSet<&'a str>,
}

impl<'a> BudgetFill<'a> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            used: 0,
            admitted: Vec::new(),
            ids: HashSet::new(),
        }
    }

    fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.used)
    }

    fn contains(&self, message: &Message) -> bool {
        self.ids.contains(message.id.as_str())
    }

    fn admit(&mut self, message: &'a Message) -> Admission {
        if self.contains(message) {
            return Admission::AlreadyIn;
        }
        let cost = token::message_tokens(message);
        if cost > self.remaining() {
            return Admission::NoRoom;
        }
        self.used += cost;
        self.admitted.push(message);
        self.ids.insert(message.id.as_str());
        Admission::Admitted
    }

    /// Admit every message of `group` or none of them.
    fn admit_all(&mut self, group: &[&'a Message]) -> bool {
        if group.iter().any(|m| self.contains(m)) {
            return false;
        }
        let cost: usize = group.iter().map(|m| token::message_tokens(m)).sum();
        if cost > self.remaining() {
            return false;
        }
        for &message in group {
            self.admit(message);
        }
        true
    }

    fn admit_system(&mut self, ordered: &[&'a Message]) {
        for message in ordered.iter().copied().filter(|m| m.is_system()) {
            self.admit(message);
        }
    }

    /// Walk non-system messages newest to oldest, stopping at the first
    /// one that does not fit.
    fn fill_recent(&mut self, ordered: &[&'a Message]) {
        for message in ordered.iter().rev().copied().filter(|m| !m.is_system()) {
            if let Admission::NoRoom = self.admit(message) {
                break;
            }
        }
    }

    fn into_messages(self) -> Vec<Message> {
        let mut messages: Vec<Message> = self.admitted.into_iter().cloned().collect();
        messages.sort_by_key(|m| m.sequence_number);
        messages
    }
}

fn role_priority(role: Role) -> u8 {
    match role {
        Role::System => 0,
        Role::User => 1,
        Role::Assistant => 2,
        Role::Tool => 3,
    }
}

fn excerpt(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= EXCERPT_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(EXCERPT_CHARS).collect();
    format!("{}...", cut.trim_end())
}

/// Condense dropped history into one line: the first few user excerpts and
/// a count of everything else.
fn summary_text(excluded: &[&Message]) -> Option<String> {
    if excluded.is_empty() {
        return None;
    }
    let excerpts: Vec<String> = excluded
        .iter()
        .filter(|m| m.role == Role::User)
        .take(SUMMARY_EXCERPTS)
        .map(|m| excerpt(&m.content))
        .collect();
    let omitted = excluded.len() - excerpts.len();

    let mut text = String::from(SUMMARY_PREFIX);
    if excerpts.is_empty() {
        text.push_str(&format!("{omitted} earlier messages omitted"));
    } else {
        text.push_str(&excerpts.join("; "));
        if omitted > 0 {
            text.push_str(&format!(" (+{omitted} more messages omitted)"));
        }
    }
    Some(text)
}

// ── Orchestrator ──────────────────────────────────────────────────────────

/// Selects and compresses conversation history for the next model call.
///
/// Holds no per-call state; one instance can serve many conversations
/// concurrently.
pub struct ContextOrchestrator {
    clock: Arc<dyn Clock>,
    retriever: Option<RelevanceRetriever>,
    markers: MarkerEngine,
    flow: FlowAnalyzer,
    scorer: ImportanceScorer,
    optimizer: ContentOptimizer,
}

impl ContextOrchestrator {
    /// An orchestrator without a search backend. `search_enhanced_truncation`
    /// then behaves like `recent_messages`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            retriever: None,
            markers: MarkerEngine::new(),
            flow: FlowAnalyzer::new(),
            scorer: ImportanceScorer::new(),
            optimizer: ContentOptimizer::new(),
        }
    }

    pub fn with_search(mut self, search: Arc<dyn SearchBackend>) -> Self {
        self.retriever = Some(RelevanceRetriever::new(search));
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Compute the context for `current` over a conversation's history.
    pub async fn compute_context(
        &self,
        conversation: &Conversation,
        current: &Message,
        options: &ContextOptions,
    ) -> Result<TruncationResult> {
        self.compute_for(&conversation.id, &conversation.messages, current, options)
            .await
    }

    /// Compute the context for `current` over an explicit history.
    ///
    /// The current message is excluded from history, the most recent
    /// `message_limit` messages are considered, and system messages are
    /// dropped unless `include_system` is set.
    pub async fn compute_for(
        &self,
        conversation_id: &ConversationId,
        history: &[Message],
        current: &Message,
        options: &ContextOptions,
    ) -> Result<TruncationResult> {
        options.validate()?;
        let now = self.clock.now();
        let budget = options.token_budget();

        let mut candidates: Vec<Message> = history
            .iter()
            .filter(|m| m.id != current.id)
            .filter(|m| options.include_system || !m.is_system())
            .cloned()
            .collect();
        candidates.sort_by_key(|m| m.sequence_number);
        if candidates.len() > options.message_limit {
            let excess = candidates.len() - options.message_limit;
            candidates.drain(..excess);
        }

        let strategy = options.preservation_strategy;
        let needs_search = strategy == PreservationStrategy::SearchEnhancedTruncation
            && token::estimate_sum(&candidates) > budget;
        let relevance = match (&self.retriever, needs_search) {
            (Some(retriever), true) => {
                retriever
                    .find_relevant_context(conversation_id, current, options, now)
                    .await
            }
            (None, true) => {
                debug!(
                    conversation = %conversation_id,
                    "No search backend configured; skipping relevance lookup"
                );
                RelevanceResult::default()
            }
            (_, false) => RelevanceResult::default(),
        };

        // Relevant messages may come from beyond the history window.
        for relevant in &relevance.messages {
            let m = &relevant.message;
            if m.id != current.id
                && !m.is_system()
                && !candidates.iter().any(|c| c.id == m.id)
            {
                candidates.push(m.clone());
            }
        }

        let mut result = self.truncate(&candidates, strategy, budget, &relevance, now);

        if let Some(level) = options.optimization_level {
            result = self.optimizer.optimize_context(&result, level).result;
        }

        info!(
            conversation = %conversation_id,
            strategy = %result.strategy,
            budget,
            total_tokens = result.total_tokens,
            original = result.original_count,
            preserved = result.preserved_count,
            truncated = result.truncated,
            "Context computed"
        );

        Ok(result)
    }

    /// Select from `candidates` under `budget` using `strategy`.
    ///
    /// `relevance` is only consulted by `search_enhanced_truncation`.
    pub fn truncate(
        &self,
        candidates: &[Message],
        strategy: PreservationStrategy,
        budget: usize,
        relevance: &RelevanceResult,
        now: DateTime<Utc>,
    ) -> TruncationResult {
        let mut ordered: Vec<&Message> = candidates.iter().collect();
        ordered.sort_by_key(|m| m.sequence_number);
        let original_count = ordered.len();

        if token::estimate_sum(candidates) <= budget {
            let mut metadata = TruncationMetadata::default();
            if strategy != PreservationStrategy::FullContext {
                metadata.requested_strategy = Some(strategy);
            }
            let messages = ordered.into_iter().cloned().collect();
            return Self::finish(
                messages,
                PreservationStrategy::FullContext,
                original_count,
                budget,
                metadata,
            );
        }

        let (fitting, oversized): (Vec<&Message>, Vec<&Message>) = ordered
            .into_iter()
            .partition(|m| token::message_tokens(m) <= budget);
        if !oversized.is_empty() {
            warn!(
                count = oversized.len(),
                budget, "Dropping messages larger than the whole budget"
            );
        }

        let mut metadata = TruncationMetadata {
            oversized_dropped: oversized.len(),
            ..Default::default()
        };

        let (messages, ran) = match strategy {
            PreservationStrategy::FullContext => {
                warn!(
                    budget,
                    "History exceeds the budget; falling back to recent_messages"
                );
                metadata.requested_strategy = Some(strategy);
                (
                    self.recent_messages(&fitting, budget),
                    PreservationStrategy::RecentMessages,
                )
            }
            PreservationStrategy::RecentMessages => {
                (self.recent_messages(&fitting, budget), strategy)
            }
            PreservationStrategy::ImportantMessages => {
                (self.important_messages(&fitting, budget), strategy)
            }
            PreservationStrategy::SummarizedContext => (
                self.summarized_context(&fitting, budget, &mut metadata, now),
                strategy,
            ),
            PreservationStrategy::IntelligentTruncation => (
                self.intelligent_truncation(&fitting, budget, &mut metadata),
                strategy,
            ),
            PreservationStrategy::SearchEnhancedTruncation => (
                self.search_enhanced(&fitting, budget, relevance, &mut metadata),
                strategy,
            ),
            PreservationStrategy::AdvancedScored => {
                (self.advanced_scored(&fitting, budget, now), strategy)
            }
        };

        Self::finish(messages, ran, original_count, budget, metadata)
    }

    fn finish(
        messages: Vec<Message>,
        strategy: PreservationStrategy,
        original_count: usize,
        budget: usize,
        metadata: TruncationMetadata,
    ) -> TruncationResult {
        let preserved_count = messages.len() - usize::from(metadata.summary_included);
        TruncationResult {
            total_tokens: token::estimate_sum(&messages),
            truncated: preserved_count < original_count || metadata.oversized_dropped > 0,
            strategy,
            original_count,
            preserved_count,
            budget,
            messages,
            metadata,
        }
    }

    // ── Strategies ────────────────────────────────────────────────────────

    fn recent_messages(&self, ordered: &[&Message], budget: usize) -> Vec<Message> {
        let mut fill = BudgetFill::new(budget);
        fill.admit_system(ordered);
        fill.fill_recent(ordered);
        fill.into_messages()
    }

    fn important_messages(&self, ordered: &[&Message], budget: usize) -> Vec<Message> {
        let mut by_priority = ordered.to_vec();
        by_priority.sort_by_key(|m| role_priority(m.role));

        let mut fill = BudgetFill::new(budget);
        for message in by_priority {
            fill.admit(message);
        }
        fill.into_messages()
    }

    fn summarized_context(
        &self,
        ordered: &[&Message],
        budget: usize,
        metadata: &mut TruncationMetadata,
        now: DateTime<Utc>,
    ) -> Vec<Message> {
        // System messages get the whole budget; the reserve comes out of
        // what they leave.
        let mut fill = BudgetFill::new(budget);
        fill.admit_system(ordered);
        let reserve = (budget * SUMMARY_RESERVE_PERCENT / 100).min(fill.remaining());
        fill.capacity = budget - reserve;
        fill.fill_recent(ordered);

        let excluded: Vec<&Message> = ordered
            .iter()
            .filter(|m| !m.is_system() && !fill.contains(m))
            .copied()
            .collect();
        let first_kept = fill.admitted.iter().map(|m| m.sequence_number).min();
        let mut messages = fill.into_messages();

        if let Some(text) = summary_text(&excluded) {
            let sequence_number = match first_kept {
                Some(seq) => seq - 1,
                None => excluded.iter().map(|m| m.sequence_number).max().unwrap_or(0),
            };
            let mut summary = Message::system(text).with_sequence(sequence_number).at(now);
            summary.id = SUMMARY_MESSAGE_ID.to_string();

            if token::message_tokens(&summary) <= reserve {
                debug!(summarized = excluded.len(), "Prepending history summary");
                messages.insert(0, summary);
                metadata.summary_included = true;
            } else {
                debug!(
                    summary_tokens = token::message_tokens(&summary),
                    reserve, "Summary does not fit its reserve; omitting"
                );
            }
        }
        messages
    }

    fn intelligent_truncation(
        &self,
        ordered: &[&Message],
        budget: usize,
        metadata: &mut TruncationMetadata,
    ) -> Vec<Message> {
        let mut fill = BudgetFill::new(budget);
        fill.admit_system(ordered);

        let turns: Vec<&Message> = ordered.iter().filter(|m| !m.is_system()).copied().collect();
        let mut pairs: Vec<[&Message; 2]> = Vec::new();
        let mut i = 0;
        while i + 1 < turns.len() {
            if turns[i].role == Role::User && turns[i + 1].role == Role::Assistant {
                pairs.push([turns[i], turns[i + 1]]);
                i += 2;
            } else {
                i += 1;
            }
        }

        for pair in pairs.iter().rev() {
            if fill.admit_all(pair) {
                metadata.conversation_pairs_preserved += 1;
            }
        }
        fill.into_messages()
    }

    fn search_enhanced(
        &self,
        ordered: &[&Message],
        budget: usize,
        relevance: &RelevanceResult,
        metadata: &mut TruncationMetadata,
    ) -> Vec<Message> {
        metadata.search_performed = relevance.search_performed;
        metadata.search_terms = relevance.search_terms.clone();
        metadata.relevant_messages_found = relevance.messages.len();

        let mut fill = BudgetFill::new(budget);
        fill.admit_system(ordered);
        for relevant in &relevance.messages {
            if let Some(message) = ordered
                .iter()
                .copied()
                .find(|m| !m.is_system() && m.id == relevant.message.id)
            {
                fill.admit(message);
            }
        }
        fill.fill_recent(ordered);
        fill.into_messages()
    }

    fn advanced_scored(
        &self,
        ordered: &[&Message],
        budget: usize,
        now: DateTime<Utc>,
    ) -> Vec<Message> {
        let owned: Vec<Message> = ordered.iter().map(|m| (*m).clone()).collect();
        let scores = self.scorer.score_all(&owned, now);

        let mut ranked: Vec<&Message> = ordered.iter().filter(|m| !m.is_system()).copied().collect();
        ranked.sort_by(|a, b| {
            let (sa, sb) = (scores[&a.id], scores[&b.id]);
            sb.total_cmp(&sa)
                .then(b.sequence_number.cmp(&a.sequence_number))
        });

        let mut fill = BudgetFill::new(budget);
        fill.admit_system(ordered);
        for message in ranked {
            fill.admit(message);
        }
        fill.into_messages()
    }

    // ── Analysis and compression ──────────────────────────────────────────

    /// Marker analysis for every message, keyed by ID.
    pub fn score_messages(
        &self,
        messages: &[Message],
        options: &ContextOptions,
    ) -> BTreeMap<String, MessageScore> {
        let considered: Vec<Message> = messages
            .iter()
            .filter(|m| options.include_system || !m.is_system())
            .cloned()
            .collect();
        self.markers
            .score_messages(&considered, &self.flow, self.clock.now())
    }

    pub fn optimize_context(
        &self,
        result: &TruncationResult,
        level: OptimizationLevel,
    ) -> OptimizedContext {
        self.optimizer.optimize_context(result, level)
    }

    /// Compress, then drop low-importance messages, until `result` fits
    /// `target_tokens`.
    pub fn optimize_for_token_budget(
        &self,
        result: &TruncationResult,
        target_tokens: usize,
    ) -> TruncationResult {
        self.optimizer
            .optimize_for_token_budget(result, target_tokens, &self.scorer, self.clock.now())
    }
}
