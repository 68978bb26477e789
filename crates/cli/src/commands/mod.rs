//! CLI command implementations.

pub mod compute;
pub mod config_cmd;
pub mod optimize;
pub mod score;
pub mod stats;

use anyhow::{Context, Result};
use contextwise_config::AppConfig;
use contextwise_core::clock::{Clock, SystemClock};
use contextwise_core::message::Conversation;
use std::path::Path;
use std::sync::Arc;

/// Load config (file plus environment overrides).
pub(crate) fn load_config() -> Result<AppConfig> {
    AppConfig::load().context("Failed to load config")
}

/// Read a transcript, stamping missing timestamps with the current time.
pub(crate) fn load_conversation(file: &Path, clock: &Arc<dyn Clock>) -> Result<Conversation> {
    contextwise_memory::load_transcript(file, clock.now())
        .with_context(|| format!("Failed to load transcript {}", file.display()))
}

pub(crate) fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}
