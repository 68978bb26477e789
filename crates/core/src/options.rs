//! Per-invocation options for context computation.
//!
//! Options are validated once at the boundary ([`ContextOptions::validate`])
//! so the algorithms downstream can treat them as well-formed.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The truncation algorithm used to fit history into the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreservationStrategy {
    /// Everything fits; nothing is dropped.
    FullContext,
    /// Newest messages first.
    RecentMessages,
    /// Ordered by role priority.
    ImportantMessages,
    /// Recent tail plus a synthetic summary of what was dropped.
    SummarizedContext,
    /// Complete user/assistant pairs, newest first.
    #[default]
    IntelligentTruncation,
    /// Search-relevant messages, then newest first.
    SearchEnhancedTruncation,
    /// Holistic importance score, highest first.
    AdvancedScored,
}

impl PreservationStrategy {
    pub const ALL: [PreservationStrategy; 7] = [
        PreservationStrategy::FullContext,
        PreservationStrategy::RecentMessages,
        PreservationStrategy::ImportantMessages,
        PreservationStrategy::SummarizedContext,
        PreservationStrategy::IntelligentTruncation,
        PreservationStrategy::SearchEnhancedTruncation,
        PreservationStrategy::AdvancedScored,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PreservationStrategy::FullContext => "full_context",
            PreservationStrategy::RecentMessages => "recent_messages",
            PreservationStrategy::ImportantMessages => "important_messages",
            PreservationStrategy::SummarizedContext => "summarized_context",
            PreservationStrategy::IntelligentTruncation => "intelligent_truncation",
            PreservationStrategy::SearchEnhancedTruncation => "search_enhanced_truncation",
            PreservationStrategy::AdvancedScored => "advanced_scored",
        }
    }
}

impl std::fmt::Display for PreservationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PreservationStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s.trim())
            .ok_or_else(|| Error::config(format!("unknown preservation strategy '{s}'")))
    }
}

/// How hard the content optimizer compresses message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationLevel {
    Light,
    Balanced,
    Aggressive,
}

impl OptimizationLevel {
    pub const ESCALATION: [OptimizationLevel; 3] = [
        OptimizationLevel::Light,
        OptimizationLevel::Balanced,
        OptimizationLevel::Aggressive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationLevel::Light => "light",
            OptimizationLevel::Balanced => "balanced",
            OptimizationLevel::Aggressive => "aggressive",
        }
    }
}

impl std::fmt::Display for OptimizationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptimizationLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ESCALATION
            .into_iter()
            .find(|level| level.as_str() == s.trim())
            .ok_or_else(|| Error::config(format!("unknown optimization level '{s}'")))
    }
}

/// Options for a single context computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextOptions {
    /// Maximum number of history messages fetched from the store
    #[serde(default = "default_message_limit")]
    pub message_limit: usize,

    /// Whether system messages are fetched and preserved first
    #[serde(default = "default_true")]
    pub include_system: bool,

    /// Truncation algorithm
    #[serde(default)]
    pub preservation_strategy: PreservationStrategy,

    /// Fraction of the model context window usable for history
    #[serde(default = "default_context_ratio")]
    pub context_ratio: f64,

    /// Model context window in tokens
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    /// Optional post-selection compression
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimization_level: Option<OptimizationLevel>,

    /// Minimum relevance for search-retrieved messages
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f64,

    /// Maximum candidates requested per search query
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    /// Upper bound on a single search call
    #[serde(default = "default_search_timeout_ms")]
    pub search_timeout_ms: u64,
}

fn default_message_limit() -> usize {
    50
}
fn default_true() -> bool {
    true
}
fn default_context_ratio() -> f64 {
    0.8
}
fn default_context_window() -> usize {
    8192
}
fn default_relevance_threshold() -> f64 {
    0.7
}
fn default_search_limit() -> usize {
    10
}
fn default_search_timeout_ms() -> u64 {
    2000
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            message_limit: default_message_limit(),
            include_system: true,
            preservation_strategy: PreservationStrategy::default(),
            context_ratio: default_context_ratio(),
            context_window: default_context_window(),
            optimization_level: None,
            relevance_threshold: default_relevance_threshold(),
            search_limit: default_search_limit(),
            search_timeout_ms: default_search_timeout_ms(),
        }
    }
}

impl ContextOptions {
    /// Token budget available for history: `floor(window * ratio)`.
    pub fn token_budget(&self) -> usize {
        (self.context_window as f64 * self.context_ratio).floor() as usize
    }

    /// Reject malformed options before any computation begins.
    pub fn validate(&self) -> Result<()> {
        if !(self.context_ratio > 0.0 && self.context_ratio <= 1.0) {
            return Err(Error::config(format!(
                "context_ratio must be in (0.0, 1.0], got {}",
                self.context_ratio
            )));
        }
        if self.context_window == 0 {
            return Err(Error::config("context_window must be > 0"));
        }
        if self.message_limit == 0 {
            return Err(Error::config("message_limit must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.relevance_threshold) {
            return Err(Error::config(format!(
                "relevance_threshold must be in [0.0, 1.0], got {}",
                self.relevance_threshold
            )));
        }
        if self.search_limit == 0 {
            return Err(Error::config("search_limit must be > 0"));
        }
        Ok(())
    }
}
