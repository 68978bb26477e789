//! # Contextwise Core
//!
//! Domain types, collaborator traits, and error definitions for the
//! Contextwise context-window manager. This crate has **zero framework
//! dependencies** — it defines the domain model that all other crates
//! implement against.
//!
//! ## Design Philosophy
//!
//! Everything the context core consumes from the outside world (message
//! storage, full-text search, result caching, the current time) is defined
//! as a trait here. Implementations live in their respective crates, so the
//! algorithms can be tested against in-memory stubs and a fixed clock.

pub mod clock;
pub mod error;
pub mod message;
pub mod options;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{Error, Result};
pub use message::{Conversation, ConversationId, Message, Role};
pub use options::{ContextOptions, OptimizationLevel, PreservationStrategy};
pub use store::{ContextCache, MessageStore, SearchBackend};
