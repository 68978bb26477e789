//! Collaborator traits — message storage, full-text search, result caching.
//!
//! The context core never owns persistent state. It reads history from a
//! [`MessageStore`], asks a [`SearchBackend`] for candidate messages, and may
//! memoize results in a [`ContextCache`]. Implementations: in-memory (for
//! testing and ephemeral sessions), no-op.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::{CacheError, SearchError, StoreError};
use crate::message::{ConversationId, Message};

/// Read access to conversation history.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// The store name (e.g., "in_memory").
    fn name(&self) -> &str;

    /// Fetch the most recent `limit` messages of a conversation, returned in
    /// ascending sequence order. System messages are omitted unless
    /// `include_system` is set.
    async fn get_messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
        include_system: bool,
    ) -> std::result::Result<Vec<Message>, StoreError>;
}

/// Full-text (or similar) search over a conversation.
///
/// Ranking is recomputed locally; the backend only needs to return plausible
/// candidates.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// The backend name (e.g., "in_memory", "none").
    fn name(&self) -> &str;

    async fn search(
        &self,
        conversation_id: &ConversationId,
        query: &str,
        limit: usize,
    ) -> std::result::Result<Vec<Message>, SearchError>;
}

/// A TTL cache for computed results, keyed by opaque strings.
///
/// Values are stored as JSON so the trait stays object-safe.
#[async_trait]
pub trait ContextCache: Send + Sync {
    async fn get(&self, key: &str) -> std::result::Result<Option<serde_json::Value>, CacheError>;

    async fn put(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Duration,
    ) -> std::result::Result<(), CacheError>;

    /// Remove a key. Returns whether anything was removed.
    async fn forget(&self, key: &str) -> std::result::Result<bool, CacheError>;
}
