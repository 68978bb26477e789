//! `contextwise stats` — Summarize a transcript.

use super::{load_conversation, system_clock};
use anyhow::Result;
use contextwise_context::context_stats;
use std::path::Path;

pub async fn run(file: &Path) -> Result<()> {
    let clock = system_clock();
    let conversation = load_conversation(file, &clock)?;
    let stats = context_stats(&conversation.messages, clock.now());

    println!("Conversation: {}", conversation.id);
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
