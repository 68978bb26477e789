//! `contextwise score` — Show markers and importance per message.

use super::{load_config, load_conversation, system_clock};
use anyhow::Result;
use contextwise_context::token::message_tokens;
use contextwise_context::{ContextOrchestrator, ImportanceScorer};
use std::path::Path;

pub async fn run(file: &Path) -> Result<()> {
    let config = load_config()?;
    let clock = system_clock();
    let conversation = load_conversation(file, &clock)?;

    let orchestrator = ContextOrchestrator::new(clock.clone());
    let scores = orchestrator.score_messages(&conversation.messages, &config.context);
    let importance = ImportanceScorer::new().score_all(&conversation.messages, clock.now());

    println!(
        "{:>5}  {:<10} {:>6} {:>8} {:>10}  Reason",
        "Seq", "Role", "Tokens", "Priority", "Importance"
    );
    for message in &conversation.messages {
        let Some(score) = scores.get(&message.id) else {
            continue;
        };
        println!(
            "{:>5}  {:<10} {:>6} {:>8.2} {:>10.2}  {}",
            message.sequence_number,
            message.role.as_str(),
            message_tokens(message),
            score.priority_score,
            importance.get(&message.id).copied().unwrap_or_default(),
            score.reason
        );
    }
    Ok(())
}
