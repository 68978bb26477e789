//! `contextwise optimize` — Compress a transcript.

use super::{load_conversation, system_clock};
use anyhow::Result;
use contextwise_context::token::estimate_sum;
use contextwise_context::{ContextOrchestrator, RelevanceResult};
use contextwise_core::options::{OptimizationLevel, PreservationStrategy};
use std::path::Path;

pub async fn run(file: &Path, level: OptimizationLevel, target: Option<usize>) -> Result<()> {
    let clock = system_clock();
    let conversation = load_conversation(file, &clock)?;
    let orchestrator = ContextOrchestrator::new(clock);

    // The whole transcript as an untruncated selection
    let full = orchestrator.truncate(
        &conversation.messages,
        PreservationStrategy::FullContext,
        estimate_sum(&conversation.messages),
        &RelevanceResult::default(),
        orchestrator.now(),
    );

    let optimized = match target {
        Some(target) => orchestrator.optimize_for_token_budget(&full, target),
        None => orchestrator.optimize_context(&full, level).result,
    };

    if let Some(stats) = &optimized.metadata.optimization {
        eprintln!(
            "{}: {} → {} tokens ({:.1}% saved), {} of {} messages kept",
            stats.level,
            stats.original_tokens,
            stats.optimized_tokens,
            stats.optimization_ratio * 100.0,
            optimized.preserved_count,
            optimized.original_count
        );
    }
    println!("{}", serde_json::to_string_pretty(&optimized.messages)?);
    Ok(())
}
