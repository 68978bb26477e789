//! No-op search backend — disables relevance retrieval entirely.

use async_trait::async_trait;
use contextwise_core::error::SearchError;
use contextwise_core::message::{ConversationId, Message};
use contextwise_core::store::SearchBackend;

/// A search backend that never finds anything.
pub struct NoopSearch;

#[async_trait]
impl SearchBackend for NoopSearch {
    fn name(&self) -> &str {
        "none"
    }

    async fn search(
        &self,
        _conversation_id: &ConversationId,
        _query: &str,
        _limit: usize,
    ) -> Result<Vec<Message>, SearchError> {
        Ok(Vec::new())
    }
}
