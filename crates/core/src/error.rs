//! Error types for the Contextwise domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each external collaborator has its own error variant.

use thiserror::Error;

/// The top-level error type for all Contextwise operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Message store errors ---
    #[error("Message store error: {0}")]
    Store(#[from] StoreError),

    // --- Search collaborator errors ---
    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    // --- Cache errors ---
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Collaborator errors ---

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Error)]
pub enum SearchError {
    #[error("Search query failed: {0}")]
    QueryFailed(String),

    #[error("Search timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Search backend unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Cached value could not be decoded: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_timeout_displays_duration() {
        let err = Error::Search(SearchError::Timeout { timeout_ms: 250 });
        assert!(err.to_string().contains("250ms"));
    }

    #[test]
    fn config_error_names_value() {
        let err = Error::config("unknown preservation strategy 'newest_first'");
        assert!(err.to_string().contains("newest_first"));
        assert!(matches!(err, Error::Config { .. }));
    }
}
