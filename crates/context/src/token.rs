//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 bytes per token, rounded up.
//! This is an approximation, not tokenizer-exact; it is accurate within
//! ~10% for BPE tokenizers on English text, which is enough to keep a
//! context comfortably inside a model window.

use contextwise_core::message::Message;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Token cost of a single message, preferring a count the store already knows.
pub fn message_tokens(message: &Message) -> usize {
    message
        .token_count
        .unwrap_or_else(|| estimate_tokens(&message.content))
}

/// Estimate tokens for a slice of messages.
pub fn estimate_sum(messages: &[Message]) -> usize {
    messages.iter().map(message_tokens).sum()
}
