//! Collaborator implementations for Contextwise: message store, search and cache.

pub mod cache;
pub mod in_memory;
pub mod noop;
pub mod transcript;

pub use cache::InMemoryCache;
pub use in_memory::InMemoryStore;
pub use noop::NoopSearch;
pub use transcript::{load_transcript, parse_transcript};
