//! Context window management.
//!
//! Decides which prior messages go into the next model call:
//!
//! 1. **Estimate** token cost ([`token`])
//! 2. **Mark** messages with content signals ([`markers`]) and conversational
//!    position ([`flow`])
//! 3. **Score** holistic importance ([`scorer`])
//! 4. **Retrieve** topically relevant history through a search backend
//!    ([`relevance`])
//! 5. **Select** a budget-respecting subset with one of seven strategies
//!    ([`orchestrator`])
//! 6. **Compress** the selection when asked ([`optimizer`])
//!
//! [`ContextService`] adds store access and result caching on top.
//!
//! # Determinism
//!
//! Every computation is a pure function of its inputs and the injected
//! clock. The only suspension point is the search call, which is bounded by
//! a timeout and degrades to "no relevant messages" on failure.

pub mod flow;
pub mod markers;
pub mod optimizer;
pub mod orchestrator;
pub mod relevance;
pub mod render;
pub mod scorer;
pub mod service;
pub mod stats;
pub mod token;

pub use flow::FlowAnalyzer;
pub use markers::{Marker, MarkerEngine, MessageScore};
pub use optimizer::{ContentOptimizer, OptimizationStats, OptimizedContext};
pub use orchestrator::{ContextOrchestrator, TruncationMetadata, TruncationResult};
pub use relevance::{RelevanceResult, RelevanceRetriever, RelevantMessage, extract_search_terms};
pub use render::format_for_injection;
pub use scorer::ImportanceScorer;
pub use service::{ContextService, cache_key};
pub use stats::{ContextStats, context_stats};
