//! Preservation markers — categorical signals attached to a message.
//!
//! Content markers come from a declarative rule table ([`KEYWORD_RULES`])
//! evaluated over the lower-cased message text, plus a few structural
//! predicates (role, length, age, question and code shape). Flow markers are
//! produced by [`crate::flow::FlowAnalyzer`] and share the same weight table.
//!
//! | Marker | Weight |
//! |--------|--------|
//! | system_message | 1.0 |
//! | important_content | 0.9 |
//! | error_or_problem, solution | 0.8 |
//! | user_preference, definition | 0.7 |
//! | question_in_pair, answer_in_pair, code_content | 0.6 |
//! | context_reference | 0.5 |
//! | detailed_content, question | 0.4 |
//! | follow_up_question, recent | 0.3 |
//! | conversation_starter, topic_change | 0.2 |

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use contextwise_core::message::{Message, Role};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::flow::FlowAnalyzer;

/// Upper bound of a marker-derived priority score.
pub const MAX_PRIORITY_SCORE: f64 = 2.0;

/// Messages longer than this (in bytes) are `detailed_content`.
pub const DETAILED_CONTENT_CHARS: usize = 500;

/// A categorical preservation signal.
///
/// Declaration order is the order clauses appear in [`reason`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Marker {
    SystemMessage,
    ImportantContent,
    ErrorOrProblem,
    Solution,
    UserPreference,
    Definition,
    QuestionInPair,
    AnswerInPair,
    CodeContent,
    ContextReference,
    DetailedContent,
    Question,
    FollowUpQuestion,
    Recent,
    ConversationStarter,
    TopicChange,
}

impl Marker {
    /// Contribution of this marker to a priority score.
    pub fn weight(&self) -> f64 {
        match self {
            Marker::SystemMessage => 1.0,
            Marker::ImportantContent => 0.9,
            Marker::ErrorOrProblem | Marker::Solution => 0.8,
            Marker::UserPreference | Marker::Definition => 0.7,
            Marker::QuestionInPair | Marker::AnswerInPair | Marker::CodeContent => 0.6,
            Marker::ContextReference => 0.5,
            Marker::DetailedContent | Marker::Question => 0.4,
            Marker::FollowUpQuestion | Marker::Recent => 0.3,
            Marker::ConversationStarter | Marker::TopicChange => 0.2,
        }
    }

    /// Human-readable clause used in preservation reasons.
    pub fn clause(&self) -> &'static str {
        match self {
            Marker::SystemMessage => "System instruction",
            Marker::ImportantContent => "Contains important information",
            Marker::ErrorOrProblem => "Describes an error or problem",
            Marker::Solution => "Provides a solution",
            Marker::UserPreference => "States a user preference",
            Marker::Definition => "Contains a definition",
            Marker::QuestionInPair => "Question with an answer",
            Marker::AnswerInPair => "Answer to a question",
            Marker::CodeContent => "Contains code",
            Marker::ContextReference => "References earlier context",
            Marker::DetailedContent => "Detailed content",
            Marker::Question => "Asks a question",
            Marker::FollowUpQuestion => "Follow-up question",
            Marker::Recent => "Recent message",
            Marker::ConversationStarter => "Starts a conversation",
            Marker::TopicChange => "Changes topic",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Marker::SystemMessage => "system_message",
            Marker::ImportantContent => "important_content",
            Marker::ErrorOrProblem => "error_or_problem",
            Marker::Solution => "solution",
            Marker::UserPreference => "user_preference",
            Marker::Definition => "definition",
            Marker::QuestionInPair => "question_in_pair",
            Marker::AnswerInPair => "answer_in_pair",
            Marker::CodeContent => "code_content",
            Marker::ContextReference => "context_reference",
            Marker::DetailedContent => "detailed_content",
            Marker::Question => "question",
            Marker::FollowUpQuestion => "follow_up_question",
            Marker::Recent => "recent",
            Marker::ConversationStarter => "conversation_starter",
            Marker::TopicChange => "topic_change",
        }
    }

    /// Whether the marker describes conversational position rather than content.
    pub fn is_flow(&self) -> bool {
        matches!(
            self,
            Marker::QuestionInPair
                | Marker::AnswerInPair
                | Marker::FollowUpQuestion
                | Marker::ConversationStarter
                | Marker::TopicChange
        )
    }

    /// Content categories that earn the single keyword bonus in importance scoring.
    pub fn is_keyword_category(&self) -> bool {
        matches!(
            self,
            Marker::ImportantContent
                | Marker::ErrorOrProblem
                | Marker::Solution
                | Marker::UserPreference
                | Marker::Definition
                | Marker::ContextReference
        )
    }
}

impl std::fmt::Display for Marker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Rule tables ───────────────────────────────────────────────────────────

/// A keyword rule: the marker fires when any keyword starts at a word boundary.
pub struct KeywordRule {
    pub marker: Marker,
    pub keywords: &'static [&'static str],
}

pub static KEYWORD_RULES: &[KeywordRule] = &[
    KeywordRule {
        marker: Marker::ImportantContent,
        keywords: &[
            "remember",
            "important",
            "note that",
            "crucial",
            "critical",
            "warning",
            "must",
            "required",
            "essential",
            "key point",
            "don't forget",
        ],
    },
    KeywordRule {
        marker: Marker::ContextReference,
        keywords: &[
            "earlier",
            "previously",
            "you said",
            "you mentioned",
            "as discussed",
            "we discussed",
            "we talked about",
            "mentioned earlier",
            "last time",
            "as i said",
            "going back to",
        ],
    },
    KeywordRule {
        marker: Marker::ErrorOrProblem,
        keywords: &[
            "error",
            "bug",
            "issue",
            "problem",
            "broken",
            "fail",
            "exception",
            "crash",
            "not working",
            "doesn't work",
            "wrong",
        ],
    },
    KeywordRule {
        marker: Marker::Solution,
        keywords: &[
            "fix",
            "solve",
            "solution",
            "resolve",
            "workaround",
            "here's how",
            "try this",
            "the answer is",
            "you can",
        ],
    },
    KeywordRule {
        marker: Marker::Definition,
        keywords: &[
            "is defined as",
            "means",
            "refers to",
            "definition",
            "is a type of",
            "is called",
            "stands for",
        ],
    },
    KeywordRule {
        marker: Marker::UserPreference,
        keywords: &[
            "i prefer",
            "i like",
            "i want",
            "i need",
            "my favorite",
            "my favourite",
            "i usually",
            "i always",
            "i never",
            "please always",
            "please don't",
        ],
    },
];

fn keyword_regex(keywords: &[&str]) -> Regex {
    let alternation = keywords
        .iter()
        .map(|k| regex::escape(k))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"\b(?:{alternation})")).expect("keyword table compiles")
}

static COMPILED_KEYWORD_RULES: LazyLock<Vec<(Marker, Regex)>> = LazyLock::new(|| {
    KEYWORD_RULES
        .iter()
        .map(|rule| (rule.marker, keyword_regex(rule.keywords)))
        .collect()
});

static QUESTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:^|[.!\n]\s*)(?:what|why|how|when|where|who|which|whose|is|are|can|could|would|should|will|do|does|did)\b|\b(?:can|could|would|will) you\b",
    )
    .expect("question pattern compiles")
});

static CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)```|`[^`\n]+`|=>|\b(?:function|def|fn)\s+\w+\s*\(|\b(?:class|struct|impl|interface|enum)\s+[A-Z]\w*|\b(?:const|let|var)\s+\w+\s*[=:]|\breturn\s+[^\n]*;|[{;]\s*$",
    )
    .expect("code pattern compiles")
});

/// Whether text reads as a question.
pub fn is_question(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains('?') || QUESTION_RE.is_match(lower.trim_start())
}

/// Whether text contains code.
pub fn has_code(text: &str) -> bool {
    CODE_RE.is_match(text)
}

/// Sum of marker weights, capped at [`MAX_PRIORITY_SCORE`].
pub fn priority_score(markers: &BTreeSet<Marker>) -> f64 {
    markers
        .iter()
        .map(Marker::weight)
        .sum::<f64>()
        .min(MAX_PRIORITY_SCORE)
}

/// Join the clauses of the markers present, in fixed priority order.
pub fn reason(markers: &BTreeSet<Marker>) -> String {
    if markers.is_empty() {
        return "General preservation".to_string();
    }
    markers
        .iter()
        .map(Marker::clause)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Preservation analysis for a single message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageScore {
    pub markers: BTreeSet<Marker>,
    pub priority_score: f64,
    pub reason: String,
}

impl MessageScore {
    pub fn from_markers(markers: BTreeSet<Marker>) -> Self {
        Self {
            priority_score: priority_score(&markers),
            reason: reason(&markers),
            markers,
        }
    }
}

// ── Engine ────────────────────────────────────────────────────────────────

/// Tags messages with content markers. Stateless.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkerEngine;

impl MarkerEngine {
    pub fn new() -> Self {
        Self
    }

    /// Content markers for one message, evaluated at `now`.
    pub fn mark(&self, message: &Message, now: DateTime<Utc>) -> BTreeSet<Marker> {
        let mut markers = self.mark_content(message);
        if now.signed_duration_since(message.created_at) < Duration::hours(24) {
            markers.insert(Marker::Recent);
        }
        markers
    }

    /// Markers that depend only on role and text.
    pub fn mark_content(&self, message: &Message) -> BTreeSet<Marker> {
        let mut markers = BTreeSet::new();
        let lower = message.content.to_lowercase();

        if message.role == Role::System {
            markers.insert(Marker::SystemMessage);
        }
        for (marker, pattern) in COMPILED_KEYWORD_RULES.iter() {
            if pattern.is_match(&lower) {
                markers.insert(*marker);
            }
        }
        if is_question(&message.content) {
            markers.insert(Marker::Question);
        }
        if has_code(&message.content) {
            markers.insert(Marker::CodeContent);
        }
        if message.content.len() > DETAILED_CONTENT_CHARS {
            markers.insert(Marker::DetailedContent);
        }
        markers
    }

    /// Content and flow markers for every message, keyed by message ID.
    pub fn score_messages(
        &self,
        messages: &[Message],
        flow: &FlowAnalyzer,
        now: DateTime<Utc>,
    ) -> BTreeMap<String, MessageScore> {
        let mut flow_markers = flow.analyze(messages);
        messages
            .iter()
            .map(|message| {
                let mut markers = self.mark(message, now);
                if let Some(extra) = flow_markers.remove(&message.id) {
                    markers.extend(extra);
                }
                (message.id.clone(), MessageScore::from_markers(markers))
            })
            .collect()
    }
}
