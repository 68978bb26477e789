//! Search-based relevance retrieval.
//!
//! Extracts term groups from the current message, asks the search backend
//! for candidates per group, and re-scores every candidate locally:
//!
//! ```text
//! relevance = 0.5 * matched/total
//!           + 0.3 * exact phrase match
//!           + role bonus (user 0.2, assistant 0.1)
//!           + 0.1 if the candidate is longer than 200 chars
//!           + recency (< 1 day 0.1, < 7 days 0.05)
//!           + 0.1 if both the query and the candidate are questions
//! ```
//!
//! capped at 1.0. Search failures never abort context computation; they
//! degrade to "nothing relevant found".

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use contextwise_core::error::SearchError;
use contextwise_core::message::{ConversationId, Message, Role};
use contextwise_core::options::ContextOptions;
use contextwise_core::store::SearchBackend;
use futures::future::join_all;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::markers::is_question;

/// Maximum words in the salient-word fallback group.
pub const MAX_FALLBACK_TERMS: usize = 5;

/// Words never treated as search terms.
pub const STOP_WORDS: &[&str] = &[
    "a", "about", "after", "again", "all", "also", "an", "and", "any", "are", "back", "been",
    "before", "being", "both", "but", "can", "could", "did", "does", "doing", "each", "earlier",
    "even", "from", "have", "having", "here", "how", "into", "just", "know", "like", "made",
    "make", "many", "more", "most", "much", "need", "only", "other", "over", "please", "said",
    "same", "should", "some", "such", "tell", "than", "that", "their", "them", "then", "there",
    "these", "they", "thing", "things", "think", "this", "those", "through", "very", "want",
    "was", "were", "what", "when", "where", "which", "while", "who", "whom", "why", "will",
    "with", "would", "your", "yours", "you", "the", "our", "ours", "mine", "is", "it", "my",
    "me", "we", "of", "to", "in", "on", "or", "so", "be", "do", "if", "at", "by", "as",
];

fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// Backward-reference and topical patterns, in priority order. Each capture
/// group contributes one word to the term group.
static EXTRACTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"what (?:was|is|were|are) my (\w+)(?:\s+(\w+))?",
        r"remember (?:when|about) (\w+)(?:\s+(\w+))?(?:\s+(\w+))?",
        r"we (?:discussed|mentioned|talked about) (\w+)(?:\s+(\w+))?",
        r"you said (?:about|that) (\w+)(?:\s+(\w+))?",
        r"earlier you mentioned (\w+)(?:\s+(\w+))?",
        r"tell me more about (\w+)(?:\s+(\w+))?",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("extraction pattern compiles"))
    .collect()
});

static QUOTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)""#).expect("quoted pattern compiles"));

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z0-9][a-z0-9_'-]*").expect("word pattern compiles"));

/// Extract search term groups from a query text.
///
/// Patterns are tried in priority order; every match yields one group.
/// Salient words are used only when no pattern matched.
pub fn extract_search_terms(text: &str) -> Vec<Vec<String>> {
    let lower = text.to_lowercase();
    let mut groups: Vec<Vec<String>> = Vec::new();

    for pattern in EXTRACTION_PATTERNS.iter() {
        for caps in pattern.captures_iter(&lower) {
            let group: Vec<String> = caps
                .iter()
                .skip(1)
                .flatten()
                .map(|m| m.as_str().to_string())
                .filter(|w| !is_stop_word(w))
                .collect();
            push_unique(&mut groups, group);
        }
    }

    for caps in QUOTED_RE.captures_iter(&lower) {
        if let Some(literal) = caps.get(1) {
            let literal = literal.as_str().trim();
            if !literal.is_empty() {
                push_unique(&mut groups, vec![literal.to_string()]);
            }
        }
    }

    if groups.is_empty() {
        let mut seen = HashSet::new();
        let salient: Vec<String> = WORD_RE
            .find_iter(&lower)
            .map(|m| m.as_str().trim_matches(|c| c == '\'' || c == '-'))
            .filter(|w| w.len() > 3 && !is_stop_word(w))
            .filter(|w| seen.insert(w.to_string()))
            .take(MAX_FALLBACK_TERMS)
            .map(str::to_string)
            .collect();
        push_unique(&mut groups, salient);
    }

    groups
}

fn push_unique(groups: &mut Vec<Vec<String>>, group: Vec<String>) {
    if !group.is_empty() && !groups.contains(&group) {
        groups.push(group);
    }
}

/// Relevance of one candidate to one term group.
pub fn relevance_score(
    terms: &[String],
    candidate: &Message,
    query_is_question: bool,
    now: DateTime<Utc>,
) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let content = candidate.content.to_lowercase();

    let matched = terms.iter().filter(|t| content.contains(t.as_str())).count();
    let mut score = 0.5 * (matched as f64 / terms.len() as f64);

    if content.contains(&terms.join(" ")) {
        score += 0.3;
    }
    score += match candidate.role {
        Role::User => 0.2,
        Role::Assistant => 0.1,
        _ => 0.0,
    };
    if candidate.content.len() > 200 {
        score += 0.1;
    }
    let age = now.signed_duration_since(candidate.created_at);
    if age < Duration::days(1) {
        score += 0.1;
    } else if age < Duration::days(7) {
        score += 0.05;
    }
    if query_is_question && is_question(&candidate.content) {
        score += 0.1;
    }

    score.min(1.0)
}

/// A historical message judged relevant to the current query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevantMessage {
    pub message: Message,
    pub relevance_score: f64,
}

/// Outcome of a relevance lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelevanceResult {
    /// Candidates at or above the threshold, most relevant first.
    pub messages: Vec<RelevantMessage>,
    /// Term groups extracted from the query.
    pub search_terms: Vec<Vec<String>>,
    /// Whether the search backend was consulted successfully.
    pub search_performed: bool,
}

impl RelevanceResult {
    fn not_performed(search_terms: Vec<Vec<String>>) -> Self {
        Self {
            messages: Vec::new(),
            search_terms,
            search_performed: false,
        }
    }
}

/// Finds topically relevant history through a [`SearchBackend`].
pub struct RelevanceRetriever {
    search: Arc<dyn SearchBackend>,
}

impl RelevanceRetriever {
    pub fn new(search: Arc<dyn SearchBackend>) -> Self {
        Self { search }
    }

    /// Search for messages relevant to `query`.
    ///
    /// Every term group is searched concurrently, each call bounded by
    /// `options.search_timeout_ms`. If any call fails or times out the whole
    /// lookup degrades to an empty, not-performed result.
    pub async fn find_relevant_context(
        &self,
        conversation_id: &ConversationId,
        query: &Message,
        options: &ContextOptions,
        now: DateTime<Utc>,
    ) -> RelevanceResult {
        let groups = extract_search_terms(&query.content);
        if groups.is_empty() {
            debug!(conversation = %conversation_id, "No search terms extracted");
            return RelevanceResult::not_performed(groups);
        }

        let timeout = StdDuration::from_millis(options.search_timeout_ms);
        let calls = groups.iter().map(|group| {
            let query_string = group.join(" ");
            async move {
                match tokio::time::timeout(
                    timeout,
                    self.search
                        .search(conversation_id, &query_string, options.search_limit),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(SearchError::Timeout {
                        timeout_ms: options.search_timeout_ms,
                    }),
                }
            }
        });
        let responses = join_all(calls).await;

        let query_is_question = is_question(&query.content);
        let mut best: HashMap<String, RelevantMessage> = HashMap::new();

        for (group, response) in groups.iter().zip(responses) {
            let candidates = match response {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!(
                        backend = self.search.name(),
                        conversation = %conversation_id,
                        error = %e,
                        "Search failed; continuing without relevant messages"
                    );
                    return RelevanceResult::not_performed(groups);
                }
            };

            for candidate in candidates {
                if candidate.id == query.id {
                    continue;
                }
                let score = relevance_score(group, &candidate, query_is_question, now);
                if score < options.relevance_threshold {
                    continue;
                }
                match best.get_mut(&candidate.id) {
                    Some(existing) if existing.relevance_score >= score => {}
                    Some(existing) => existing.relevance_score = score,
                    None => {
                        best.insert(
                            candidate.id.clone(),
                            RelevantMessage {
                                message: candidate,
                                relevance_score: score,
                            },
                        );
                    }
                }
            }
        }

        let mut messages: Vec<RelevantMessage> = best.into_values().collect();
        messages.sort_by(|a, b| {
            b.relevance_score
                .total_cmp(&a.relevance_score)
                .then(a.message.sequence_number.cmp(&b.message.sequence_number))
        });

        debug!(
            conversation = %conversation_id,
            groups = groups.len(),
            found = messages.len(),
            "Relevance search complete"
        );

        RelevanceResult {
            messages,
            search_terms: groups,
            search_performed: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()
    }

    /// Keyword search over a fixed history: any query word matches.
    struct StaticSearch {
        messages: Vec<Message>,
    }

    #[async_trait]
    impl SearchBackend for StaticSearch {
        fn name(&self) -> &str {
            "static"
        }

        async fn search(
            &self,
            _conversation_id: &ConversationId,
            query: &str,
            limit: usize,
        ) -> Result<Vec<Message>, SearchError> {
            let words: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
            Ok(self
                .messages
                .iter()
                .filter(|m| {
                    let content = m.content.to_lowercase();
                    words.iter().any(|w| content.contains(w.as_str()))
                })
                .take(limit)
                .cloned()
                .collect())
        }
    }

    struct BrokenSearch;

    #[async_trait]
    impl SearchBackend for BrokenSearch {
        fn name(&self) -> &str {
            "broken"
        }

        async fn search(
            &self,
            _conversation_id: &ConversationId,
            _query: &str,
            _limit: usize,
        ) -> Result<Vec<Message>, SearchError> {
            Err(SearchError::Unavailable("index offline".into()))
        }
    }

    struct SlowSearch;

    #[async_trait]
    impl SearchBackend for SlowSearch {
        fn name(&self) -> &str {
            "slow"
        }

        async fn search(
            &self,
            _conversation_id: &ConversationId,
            _query: &str,
            _limit: usize,
        ) -> Result<Vec<Message>, SearchError> {
            tokio::time::sleep(StdDuration::from_secs(60)).await;
            Ok(Vec::new())
        }
    }

    fn favorite_color_history() -> Vec<Message> {
        let base = now() - Duration::hours(3);
        let mut history = vec![
            Message::user("My favorite color is blue"),
            Message::assistant("Got it, blue is nice"),
        ];
        for i in 0..10 {
            history.push(Message::user(format!("Filler question number {i} about deployment")));
            history.push(Message::assistant(format!("Filler answer number {i}")));
        }
        history
            .into_iter()
            .enumerate()
            .map(|(i, m)| m.with_sequence(i as i64 + 1).at(base + Duration::minutes(i as i64)))
            .collect()
    }

    #[test]
    fn backward_reference_extraction() {
        let groups = extract_search_terms("What was my favorite color?");
        assert_eq!(groups, vec![vec!["favorite".to_string(), "color".to_string()]]);
    }

    #[test]
    fn multiple_patterns_yield_multiple_groups() {
        let groups =
            extract_search_terms("Tell me more about async runtimes, we discussed \"tokio\"");
        assert!(groups.contains(&vec!["async".to_string(), "runtimes".to_string()]));
        assert!(groups.contains(&vec!["tokio".to_string()]));
    }

    #[test]
    fn quoted_literal_is_one_term() {
        let groups = extract_search_terms("Find \"connection pool\" please");
        assert_eq!(groups, vec![vec!["connection pool".to_string()]]);
    }

    #[test]
    fn fallback_to_salient_words() {
        let groups = extract_search_terms("Explain the database migration strategy");
        assert_eq!(
            groups,
            vec![vec![
                "explain".to_string(),
                "database".to_string(),
                "migration".to_string(),
                "strategy".to_string(),
            ]]
        );
    }

    #[test]
    fn nothing_salient_yields_no_groups() {
        assert!(extract_search_terms("ok, so?").is_empty());
    }

    #[test]
    fn score_formula_components() {
        let candidate = Message::user("My favorite color is blue").at(now() - Duration::days(3));
        let terms = vec!["favorite".to_string(), "color".to_string()];
        // 0.5 + 0.3 exact + 0.2 user + 0.05 recency, capped
        assert_eq!(relevance_score(&terms, &candidate, true, now()), 1.0);

        let candidate = Message::assistant("colors vary").at(now() - Duration::days(30));
        // 0.25 partial + 0.1 assistant
        let score = relevance_score(&terms, &candidate, false, now());
        assert!((score - 0.35).abs() < 1e-9);
    }

    #[tokio::test]
    async fn favorite_color_scenario() {
        let history = favorite_color_history();
        let query = Message::user("What was my favorite color?")
            .with_sequence(100)
            .at(now());
        let retriever = RelevanceRetriever::new(Arc::new(StaticSearch {
            messages: history.clone(),
        }));

        let result = retriever
            .find_relevant_context(
                &ConversationId::from("c1"),
                &query,
                &ContextOptions::default(),
                now(),
            )
            .await;

        assert!(result.search_performed);
        let top = &result.messages[0];
        assert_eq!(top.message.content, "My favorite color is blue");
        assert!(top.relevance_score >= 0.7);
        assert!(
            result
                .messages
                .iter()
                .all(|m| !m.message.content.starts_with("Filler"))
        );
    }

    #[tokio::test]
    async fn query_message_is_never_a_candidate() {
        let query = Message::user("What was my favorite color?")
            .with_sequence(3)
            .at(now());
        let retriever = RelevanceRetriever::new(Arc::new(StaticSearch {
            messages: vec![query.clone()],
        }));
        let result = retriever
            .find_relevant_context(
                &ConversationId::from("c1"),
                &query,
                &ContextOptions::default(),
                now(),
            )
            .await;
        assert!(result.search_performed);
        assert!(result.messages.is_empty());
    }

    #[tokio::test]
    async fn no_terms_means_no_search() {
        let retriever = RelevanceRetriever::new(Arc::new(BrokenSearch));
        let query = Message::user("ok?").at(now());
        let result = retriever
            .find_relevant_context(
                &ConversationId::from("c1"),
                &query,
                &ContextOptions::default(),
                now(),
            )
            .await;
        assert!(!result.search_performed);
        assert!(result.search_terms.is_empty());
    }

    #[tokio::test]
    async fn backend_failure_degrades_gracefully() {
        let retriever = RelevanceRetriever::new(Arc::new(BrokenSearch));
        let query = Message::user("What was my favorite color?").at(now());
        let result = retriever
            .find_relevant_context(
                &ConversationId::from("c1"),
                &query,
                &ContextOptions::default(),
                now(),
            )
            .await;
        assert!(!result.search_performed);
        assert!(result.messages.is_empty());
        assert_eq!(result.search_terms.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_backend_times_out() {
        let retriever = RelevanceRetriever::new(Arc::new(SlowSearch));
        let query = Message::user("What was my favorite color?").at(now());
        let options = ContextOptions {
            search_timeout_ms: 50,
            ..Default::default()
        };
        let result = retriever
            .find_relevant_context(&ConversationId::from("c1"), &query, &options, now())
            .await;
        assert!(!result.search_performed);
        assert!(result.messages.is_empty());
    }
}
