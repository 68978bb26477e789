//! Store-backed context service with optional result caching.
//!
//! Wires a [`MessageStore`], an optional [`SearchBackend`] and an optional
//! [`ContextCache`] around a [`ContextOrchestrator`]. Computation stays
//! correct with or without the cache; cache errors are logged and ignored.

use std::sync::Arc;
use std::time::Duration;

use contextwise_core::clock::Clock;
use contextwise_core::error::Result;
use contextwise_core::message::{ConversationId, Message};
use contextwise_core::options::ContextOptions;
use contextwise_core::store::{ContextCache, MessageStore, SearchBackend};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::orchestrator::{ContextOrchestrator, TruncationResult};
use crate::stats::{ContextStats, context_stats};

/// Default lifetime of a cached context.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Cache key for one computation: conversation, current content and options.
pub fn cache_key(
    conversation_id: &ConversationId,
    current: &Message,
    options: &ContextOptions,
) -> Result<String> {
    let options_json = serde_json::to_vec(options)?;
    Ok(format!(
        "ctx:{}:{}:{}",
        conversation_id,
        sha256_hex(current.content.as_bytes()),
        sha256_hex(&options_json)
    ))
}

pub struct ContextService {
    store: Arc<dyn MessageStore>,
    cache: Option<Arc<dyn ContextCache>>,
    cache_ttl: Duration,
    orchestrator: ContextOrchestrator,
}

impl ContextService {
    pub fn new(store: Arc<dyn MessageStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            cache: None,
            cache_ttl: DEFAULT_CACHE_TTL,
            orchestrator: ContextOrchestrator::new(clock),
        }
    }

    pub fn with_search(mut self, search: Arc<dyn SearchBackend>) -> Self {
        self.orchestrator = self.orchestrator.with_search(search);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn ContextCache>, ttl: Duration) -> Self {
        self.cache = Some(cache);
        self.cache_ttl = ttl;
        self
    }

    pub fn orchestrator(&self) -> &ContextOrchestrator {
        &self.orchestrator
    }

    /// Fetch history and compute the context for `current`.
    pub async fn compute_context(
        &self,
        conversation_id: &ConversationId,
        current: &Message,
        options: &ContextOptions,
    ) -> Result<TruncationResult> {
        options.validate()?;
        let key = cache_key(conversation_id, current, options)?;

        if let Some(cache) = &self.cache {
            match cache.get(&key).await {
                Ok(Some(value)) => match serde_json::from_value::<TruncationResult>(value) {
                    Ok(result) => {
                        debug!(conversation = %conversation_id, "Context cache hit");
                        return Ok(result);
                    }
                    Err(e) => warn!(key = %key, error = %e, "Discarding undecodable cached context"),
                },
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Context cache lookup failed"),
            }
        }

        // One extra message in case the store already holds `current`.
        let history = self
            .store
            .get_messages(
                conversation_id,
                options.message_limit + 1,
                options.include_system,
            )
            .await?;
        debug!(
            store = self.store.name(),
            conversation = %conversation_id,
            fetched = history.len(),
            "Loaded history"
        );

        let result = self
            .orchestrator
            .compute_for(conversation_id, &history, current, options)
            .await?;

        if let Some(cache) = &self.cache {
            let value = serde_json::to_value(&result)?;
            if let Err(e) = cache.put(&key, value, self.cache_ttl).await {
                warn!(error = %e, "Failed to cache computed context");
            }
        }

        Ok(result)
    }

    /// Drop the cached context for this conversation, message and options.
    pub async fn invalidate(
        &self,
        conversation_id: &ConversationId,
        current: &Message,
        options: &ContextOptions,
    ) -> Result<bool> {
        let Some(cache) = &self.cache else {
            return Ok(false);
        };
        let key = cache_key(conversation_id, current, options)?;
        Ok(cache.forget(&key).await?)
    }

    /// Statistics over the most recent `limit` messages of a conversation.
    pub async fn context_stats(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<ContextStats> {
        let messages = self.store.get_messages(conversation_id, limit, true).await?;
        Ok(context_stats(&messages, self.orchestrator.now()))
    }
}
