//! Content compression at three escalating levels.
//!
//! | Level | Transforms |
//! |-------|------------|
//! | light | whitespace runs collapsed, repeated punctuation normalized |
//! | balanced | light + filler words and hedges stripped, verbose connectives simplified |
//! | aggressive | balanced + articles dropped, contractions, intensifiers stripped, abbreviations |
//!
//! Every level is a pure text transform applied until the text stops
//! changing, so applying a level twice yields the same text as applying it
//! once. Roles and order are never touched, and system messages are never
//! compressed beyond `light`.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use contextwise_core::message::Message;
use contextwise_core::options::OptimizationLevel;
use regex::{NoExpand, Regex};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::orchestrator::{SUMMARY_MESSAGE_ID, TruncationResult};
use crate::scorer::ImportanceScorer;
use crate::token;

/// A literal rewrite: every match of `pattern` becomes `replacement`.
struct Rewrite {
    pattern: Regex,
    replacement: &'static str,
}

fn word_rules(table: &[(&str, &'static str)]) -> Vec<Rewrite> {
    table
        .iter()
        .map(|(phrase, replacement)| Rewrite {
            pattern: Regex::new(&format!(r"(?i)\b{}\b", phrase.replace(' ', r"\s+")))
                .expect("phrase rule compiles"),
            replacement,
        })
        .collect()
}

fn removal_rules(words: &[&str]) -> Vec<Rewrite> {
    words
        .iter()
        .map(|word| Rewrite {
            pattern: Regex::new(&format!(r"(?i)\b{}\b,?[ \t]*", word.replace(' ', r"\s+")))
                .expect("removal rule compiles"),
            replacement: "",
        })
        .collect()
}

// ── Rule tables ───────────────────────────────────────────────────────────

const FILLERS: &[&str] = &[
    "um",
    "uh",
    "actually",
    "basically",
    "i think",
    "i believe",
    "sort of",
    "kind of",
    "you know",
    "i mean",
    "just",
    "literally",
];

const CONNECTIVES: &[(&str, &str)] = &[
    ("in order to", "to"),
    ("due to the fact that", "because"),
    ("at this point in time", "now"),
    ("in the event that", "if"),
    ("for the purpose of", "for"),
    ("with regard to", "about"),
    ("a large number of", "many"),
    ("is able to", "can"),
    ("has the ability to", "can"),
    ("prior to", "before"),
];

const ARTICLES: &[&str] = &["a", "an", "the"];

const CONTRACTIONS: &[(&str, &str)] = &[
    ("do not", "don't"),
    ("does not", "doesn't"),
    ("did not", "didn't"),
    ("cannot", "can't"),
    ("can not", "can't"),
    ("will not", "won't"),
    ("would not", "wouldn't"),
    ("should not", "shouldn't"),
    ("is not", "isn't"),
    ("are not", "aren't"),
    ("it is", "it's"),
    ("i am", "I'm"),
    ("we are", "we're"),
    ("they are", "they're"),
    ("you are", "you're"),
];

const INTENSIFIERS: &[&str] = &[
    "very",
    "really",
    "extremely",
    "quite",
    "totally",
    "absolutely",
    "completely",
    "highly",
    "incredibly",
];

const ABBREVIATIONS: &[(&str, &str)] = &[
    ("for example", "e.g."),
    ("for instance", "e.g."),
    ("that is to say", "i.e."),
    ("and so on", "etc."),
    ("as soon as possible", "ASAP"),
    ("with respect to", "w.r.t."),
];

static LIGHT_RULES: LazyLock<Vec<Rewrite>> = LazyLock::new(|| {
    [
        (r"[ \t]+", " "),
        (r" *\n *", "\n"),
        (r"\n{3,}", "\n\n"),
        (r"\.{4,}", "..."),
        (r"!{2,}", "!"),
        (r"\?{2,}", "?"),
    ]
    .into_iter()
    .map(|(p, replacement)| Rewrite {
        pattern: Regex::new(p).expect("light rule compiles"),
        replacement,
    })
    .collect()
});

static BALANCED_RULES: LazyLock<Vec<Rewrite>> = LazyLock::new(|| {
    let mut rules = removal_rules(FILLERS);
    rules.extend(word_rules(CONNECTIVES));
    rules
});

static AGGRESSIVE_RULES: LazyLock<Vec<Rewrite>> = LazyLock::new(|| {
    let mut rules = removal_rules(ARTICLES);
    rules.extend(word_rules(CONTRACTIONS));
    rules.extend(removal_rules(INTENSIFIERS));
    rules.extend(word_rules(ABBREVIATIONS));
    rules
});

/// Tidies the gaps removals leave behind.
static CLEANUP_RULES: LazyLock<Vec<Rewrite>> = LazyLock::new(|| {
    [(r"[ \t]+([,.;:!?])", "$1"), (r",(?:[ \t]*,)+", ",")]
        .into_iter()
        .map(|(p, replacement)| Rewrite {
            pattern: Regex::new(p).expect("cleanup rule compiles"),
            replacement,
        })
        .collect()
});

fn apply(rules: &[Rewrite], text: &str) -> String {
    rules.iter().fold(text.to_string(), |acc, rule| {
        rule.pattern
            .replace_all(&acc, NoExpand(rule.replacement))
            .into_owned()
    })
}

fn apply_cleanup(text: &str) -> String {
    CLEANUP_RULES.iter().fold(text.to_string(), |acc, rule| {
        rule.pattern.replace_all(&acc, rule.replacement).into_owned()
    })
}

fn single_pass(text: &str, level: OptimizationLevel) -> String {
    let mut out = text.to_string();
    if level >= OptimizationLevel::Balanced {
        out = apply(&BALANCED_RULES, &out);
    }
    if level >= OptimizationLevel::Aggressive {
        out = apply(&AGGRESSIVE_RULES, &out);
    }
    if level >= OptimizationLevel::Balanced {
        out = apply_cleanup(&out);
    }
    out = apply(&LIGHT_RULES, &out);
    out.trim().to_string()
}

// ── Public API ────────────────────────────────────────────────────────────

/// Savings achieved by an optimization pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationStats {
    pub level: OptimizationLevel,
    pub original_tokens: usize,
    pub optimized_tokens: usize,
    pub tokens_saved: usize,
    /// `tokens_saved / original_tokens`, 0 when there was nothing to save.
    pub optimization_ratio: f64,
}

impl OptimizationStats {
    fn new(level: OptimizationLevel, original_tokens: usize, optimized_tokens: usize) -> Self {
        let tokens_saved = original_tokens.saturating_sub(optimized_tokens);
        let optimization_ratio = if original_tokens == 0 {
            0.0
        } else {
            tokens_saved as f64 / original_tokens as f64
        };
        Self {
            level,
            original_tokens,
            optimized_tokens,
            tokens_saved,
            optimization_ratio,
        }
    }
}

/// An optimized truncation result and what the optimization saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedContext {
    pub result: TruncationResult,
    pub tokens_saved: usize,
    pub optimization_ratio: f64,
}

/// Compresses message text. Stateless.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentOptimizer;

impl ContentOptimizer {
    pub fn new() -> Self {
        Self
    }

    /// Compress `text` at `level`, running rules until the text is stable.
    ///
    /// No rule lengthens its match, and equal-length rewrites only
    /// normalize whitespace, so the loop terminates.
    pub fn optimize_text(&self, text: &str, level: OptimizationLevel) -> String {
        let mut current = single_pass(text, level);
        loop {
            let next = single_pass(&current, level);
            if next == current {
                return current;
            }
            current = next;
        }
    }

    pub fn light(&self, text: &str) -> String {
        self.optimize_text(text, OptimizationLevel::Light)
    }

    pub fn balanced(&self, text: &str) -> String {
        self.optimize_text(text, OptimizationLevel::Balanced)
    }

    pub fn aggressive(&self, text: &str) -> String {
        self.optimize_text(text, OptimizationLevel::Aggressive)
    }

    /// Compress one message. System messages are capped at `light`.
    pub fn optimize_message(&self, message: &Message, level: OptimizationLevel) -> Message {
        let effective = if message.is_system() {
            level.min(OptimizationLevel::Light)
        } else {
            level
        };
        let content = self.optimize_text(&message.content, effective);
        if content == message.content {
            return message.clone();
        }
        // A rewrite never raises the cost the store reported.
        let token_count = message
            .token_count
            .map(|known| known.min(token::estimate_tokens(&content)));
        Message {
            content,
            token_count,
            ..message.clone()
        }
    }

    /// Compress every message of a result and report the savings.
    pub fn optimize_context(
        &self,
        result: &TruncationResult,
        level: OptimizationLevel,
    ) -> OptimizedContext {
        let original_tokens = token::estimate_sum(&result.messages);
        let messages: Vec<Message> = result
            .messages
            .iter()
            .map(|m| self.optimize_message(m, level))
            .collect();
        let optimized_tokens = token::estimate_sum(&messages);
        let stats = OptimizationStats::new(level, original_tokens, optimized_tokens);

        debug!(
            level = %level,
            original_tokens,
            optimized_tokens,
            "Optimized context"
        );

        let mut optimized = result.clone();
        optimized.messages = messages;
        optimized.total_tokens = optimized_tokens;
        let (tokens_saved, optimization_ratio) = (stats.tokens_saved, stats.optimization_ratio);
        optimized.metadata.optimization = Some(stats);

        OptimizedContext {
            result: optimized,
            tokens_saved,
            optimization_ratio,
        }
    }

    /// Bring a result under `target_tokens`.
    ///
    /// Escalates light → balanced → aggressive, recomputing totals after
    /// each level. If still over budget, removes messages by ascending
    /// importance score (non-system first, older first on ties) until the
    /// target is met.
    pub fn optimize_for_token_budget(
        &self,
        result: &TruncationResult,
        target_tokens: usize,
        scorer: &ImportanceScorer,
        now: DateTime<Utc>,
    ) -> TruncationResult {
        if result.total_tokens <= target_tokens {
            return result.clone();
        }

        let original_tokens = token::estimate_sum(&result.messages);
        let mut optimized = None;
        for level in OptimizationLevel::ESCALATION {
            let candidate = self.optimize_context(result, level);
            let fits = candidate.result.total_tokens <= target_tokens;
            optimized = Some(candidate);
            if fits {
                break;
            }
        }
        let Some(OptimizedContext { result: mut out, .. }) = optimized else {
            return result.clone();
        };

        if out.total_tokens > target_tokens {
            let scores = scorer.score_all(&out.messages, now);
            let mut removal_order: Vec<usize> = (0..out.messages.len()).collect();
            removal_order.sort_by(|&a, &b| {
                let (ma, mb) = (&out.messages[a], &out.messages[b]);
                ma.is_system()
                    .cmp(&mb.is_system())
                    .then(scores[&ma.id].total_cmp(&scores[&mb.id]))
                    .then(ma.sequence_number.cmp(&mb.sequence_number))
            });

            let mut total = out.total_tokens;
            let mut removed = std::collections::HashSet::new();
            for idx in removal_order {
                if total <= target_tokens {
                    break;
                }
                total -= token::message_tokens(&out.messages[idx]);
                removed.insert(out.messages[idx].id.clone());
            }
            debug!(removed = removed.len(), target_tokens, "Dropped lowest-scored messages");

            out.messages.retain(|m| !removed.contains(&m.id));
            // The summary never counted as preserved.
            let dropped = removed.iter().filter(|id| *id != SUMMARY_MESSAGE_ID).count();
            out.preserved_count = out.preserved_count.saturating_sub(dropped);
            if removed.contains(SUMMARY_MESSAGE_ID) {
                out.metadata.summary_included = false;
            }
            out.total_tokens = total;
            out.truncated = true;
        }

        if let Some(stats) = out.metadata.optimization.as_mut() {
            *stats = OptimizationStats::new(stats.level, original_tokens, out.total_tokens);
        }
        out
    }
}
