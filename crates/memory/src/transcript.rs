//! JSON transcript loading.
//!
//! A transcript is either a bare array of messages or an object with an
//! optional `id` and a `messages` array. Only `role` and `content` are
//! required per message; missing fields are filled in:
//!
//! - `id` → `msg-<position>`
//! - `sequence_number` → 1-based position in the file
//! - `created_at` → the `now` passed by the caller

use chrono::{DateTime, Utc};
use contextwise_core::error::StoreError;
use contextwise_core::message::{Conversation, ConversationId, Message, Role};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct TranscriptMessage {
    #[serde(default)]
    id: Option<String>,
    role: Role,
    content: String,
    #[serde(default)]
    sequence_number: Option<i64>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    token_count: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Transcript {
    Conversation {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        title: Option<String>,
        messages: Vec<TranscriptMessage>,
    },
    Messages(Vec<TranscriptMessage>),
}

/// Conversation ID used when the transcript does not name one.
pub const DEFAULT_TRANSCRIPT_ID: &str = "transcript";

/// Parse a transcript from JSON text.
pub fn parse_transcript(json: &str, now: DateTime<Utc>) -> Result<Conversation, StoreError> {
    let transcript: Transcript = serde_json::from_str(json)
        .map_err(|e| StoreError::Storage(format!("invalid transcript: {e}")))?;

    let (id, title, entries) = match transcript {
        Transcript::Conversation {
            id,
            title,
            messages,
        } => (id, title, messages),
        Transcript::Messages(messages) => (None, None, messages),
    };

    let mut conversation = Conversation::with_id(ConversationId(
        id.unwrap_or_else(|| DEFAULT_TRANSCRIPT_ID.to_string()),
    ));
    conversation.title = title;
    conversation.created_at = now;
    conversation.updated_at = now;

    for (index, entry) in entries.into_iter().enumerate() {
        let position = index as i64 + 1;
        conversation.messages.push(Message {
            id: entry.id.unwrap_or_else(|| format!("msg-{position}")),
            role: entry.role,
            content: entry.content,
            sequence_number: entry.sequence_number.unwrap_or(position),
            created_at: entry.created_at.unwrap_or(now),
            token_count: entry.token_count,
        });
    }
    conversation.messages.sort_by_key(|m| m.sequence_number);

    Ok(conversation)
}

/// Read and parse a transcript file.
pub fn load_transcript(path: &Path, now: DateTime<Utc>) -> Result<Conversation, StoreError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        StoreError::Storage(format!("failed to read {}: {e}", path.display()))
    })?;
    let conversation = parse_transcript(&content, now)?;
    debug!(
        path = %path.display(),
        conversation = %conversation.id,
        count = conversation.messages.len(),
        "Transcript loaded"
    );
    Ok(conversation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn bare_array_gets_defaults() {
        let json = r#"[
            {"role": "system", "content": "Be brief."},
            {"role": "user", "content": "Hi"},
            {"role": "assistant", "content": "Hello!", "token_count": 3}
        ]"#;
        let conversation = parse_transcript(json, now()).unwrap();
        assert_eq!(conversation.id.0, DEFAULT_TRANSCRIPT_ID);
        assert_eq!(conversation.messages.len(), 3);
        assert_eq!(conversation.messages[1].id, "msg-2");
        assert_eq!(conversation.messages[1].sequence_number, 2);
        assert_eq!(conversation.messages[1].created_at, now());
        assert_eq!(conversation.messages[2].token_count, Some(3));
    }

    #[test]
    fn object_form_keeps_ids_and_orders_by_sequence() {
        let json = r#"{
            "id": "support-42",
            "title": "Billing",
            "messages": [
                {"id": "b", "role": "assistant", "content": "Done.", "sequence_number": 8},
                {"id": "a", "role": "user", "content": "Refund me", "sequence_number": 7,
                 "created_at": "2026-04-30T10:00:00Z"}
            ]
        }"#;
        let conversation = parse_transcript(json, now()).unwrap();
        assert_eq!(conversation.id.0, "support-42");
        assert_eq!(conversation.title.as_deref(), Some("Billing"));
        let ids: Vec<&str> = conversation.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(
            conversation.messages[0].created_at,
            Utc.with_ymd_and_hms(2026, 4, 30, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn unknown_role_is_rejected() {
        let err = parse_transcript(r#"[{"role": "narrator", "content": "x"}]"#, now()).unwrap_err();
        assert!(err.to_string().contains("invalid transcript"));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"role": "user", "content": "From disk"}}]"#).unwrap();
        let conversation = load_transcript(file.path(), now()).unwrap();
        assert_eq!(conversation.messages[0].content, "From disk");
    }

    #[test]
    fn missing_file_is_a_storage_error() {
        let err = load_transcript(Path::new("/nonexistent/chat.json"), now()).unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));
    }
}
