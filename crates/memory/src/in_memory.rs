//! In-memory message store — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use contextwise_core::error::{SearchError, StoreError};
use contextwise_core::message::{Conversation, ConversationId, Message};
use contextwise_core::store::{MessageStore, SearchBackend};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Per-conversation message vectors, kept in ascending sequence order.
///
/// Also serves as a [`SearchBackend`]: a message matches when it contains any
/// query word, and results are ranked by how many distinct words matched.
pub struct InMemoryStore {
    conversations: Arc<RwLock<HashMap<ConversationId, Vec<Message>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            conversations: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Replace the stored history of a conversation.
    pub async fn insert_conversation(&self, conversation: Conversation) {
        let mut messages = conversation.messages;
        messages.sort_by_key(|m| m.sequence_number);
        self.conversations
            .write()
            .await
            .insert(conversation.id, messages);
    }

    /// Append a message, assigning the next sequence number, which is returned.
    pub async fn append(&self, conversation_id: &ConversationId, mut message: Message) -> i64 {
        let mut conversations = self.conversations.write().await;
        let messages = conversations.entry(conversation_id.clone()).or_default();
        message.sequence_number = messages
            .last()
            .map_or(1, |last| last.sequence_number + 1);
        let seq = message.sequence_number;
        messages.push(message);
        seq
    }

    pub async fn count(&self, conversation_id: &ConversationId) -> usize {
        self.conversations
            .read()
            .await
            .get(conversation_id)
            .map_or(0, Vec::len)
    }

    pub async fn clear(&self) {
        self.conversations.write().await.clear();
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get_messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
        include_system: bool,
    ) -> Result<Vec<Message>, StoreError> {
        let conversations = self.conversations.read().await;
        let messages = conversations
            .get(conversation_id)
            .ok_or_else(|| StoreError::ConversationNotFound(conversation_id.to_string()))?;

        let filtered: Vec<&Message> = messages
            .iter()
            .filter(|m| include_system || !m.is_system())
            .collect();
        let skip = filtered.len().saturating_sub(limit);
        Ok(filtered.into_iter().skip(skip).cloned().collect())
    }
}

#[async_trait]
impl SearchBackend for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn search(
        &self,
        conversation_id: &ConversationId,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Message>, SearchError> {
        let conversations = self.conversations.read().await;
        let Some(messages) = conversations.get(conversation_id) else {
            return Ok(Vec::new());
        };

        let mut words: Vec<String> = query
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .collect();
        words.sort();
        words.dedup();
        if words.is_empty() {
            return Ok(Vec::new());
        }

        let mut results: Vec<(usize, &Message)> = messages
            .iter()
            .filter_map(|m| {
                let content = m.content.to_lowercase();
                let matched = words.iter().filter(|w| content.contains(w.as_str())).count();
                (matched > 0).then_some((matched, m))
            })
            .collect();

        // Most matched words first, newer first on ties
        results.sort_by(|(a_hits, a), (b_hits, b)| {
            b_hits
                .cmp(a_hits)
                .then(b.sequence_number.cmp(&a.sequence_number))
        });
        results.truncate(limit);

        Ok(results.into_iter().map(|(_, m)| m.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> (InMemoryStore, ConversationId) {
        let store = InMemoryStore::new();
        let id = ConversationId::from("c1");
        store.append(&id, Message::system("Be concise.")).await;
        store.append(&id, Message::user("My favorite color is blue")).await;
        store.append(&id, Message::assistant("Blue is a calm color")).await;
        store.append(&id, Message::user("What about red?")).await;
        (store, id)
    }

    #[tokio::test]
    async fn append_assigns_sequence_numbers() {
        let (store, id) = seeded().await;
        assert_eq!(store.count(&id).await, 4);
        let all = store.get_messages(&id, 10, true).await.unwrap();
        let seqs: Vec<i64> = all.iter().map(|m| m.sequence_number).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn get_messages_returns_most_recent_ascending() {
        let (store, id) = seeded().await;
        let recent = store.get_messages(&id, 2, true).await.unwrap();
        let seqs: Vec<i64> = recent.iter().map(|m| m.sequence_number).collect();
        assert_eq!(seqs, vec![3, 4]);

        let no_system = store.get_messages(&id, 10, false).await.unwrap();
        assert_eq!(no_system.len(), 3);
        assert!(no_system.iter().all(|m| !m.is_system()));
    }

    #[tokio::test]
    async fn unknown_conversation_is_an_error() {
        let store = InMemoryStore::new();
        let err = store
            .get_messages(&ConversationId::from("missing"), 10, true)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ConversationNotFound(_)));
    }

    #[tokio::test]
    async fn search_ranks_by_matched_words() {
        let (store, id) = seeded().await;
        let results = store.search(&id, "favorite color", 10).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].content, "My favorite color is blue");
        assert_eq!(results[1].content, "Blue is a calm color");

        let limited = store.search(&id, "color", 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].content, "Blue is a calm color");
    }

    #[tokio::test]
    async fn search_handles_empty_inputs() {
        let (store, id) = seeded().await;
        assert!(store.search(&id, "   ", 10).await.unwrap().is_empty());
        assert!(
            store
                .search(&ConversationId::from("other"), "blue", 10)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn insert_conversation_sorts_history() {
        let store = InMemoryStore::new();
        let mut conversation = Conversation::with_id(ConversationId::from("c2"));
        conversation.messages = vec![
            Message::assistant("second").with_sequence(2),
            Message::user("first").with_sequence(1),
        ];
        store.insert_conversation(conversation).await;
        let messages = store
            .get_messages(&ConversationId::from("c2"), 10, true)
            .await
            .unwrap();
        assert_eq!(messages[0].content, "first");

        store.clear().await;
        assert_eq!(store.count(&ConversationId::from("c2")).await, 0);
    }
}
