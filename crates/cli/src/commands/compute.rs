//! `contextwise compute` — Select the context for a new message.

use super::{load_config, load_conversation, system_clock};
use crate::OutputFormat;
use anyhow::{Context, Result};
use contextwise_context::{ContextService, format_for_injection};
use contextwise_core::message::Message;
use contextwise_core::options::{OptimizationLevel, PreservationStrategy};
use contextwise_memory::{InMemoryCache, InMemoryStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct ComputeArgs {
    pub file: PathBuf,
    pub message: String,
    pub strategy: Option<PreservationStrategy>,
    pub window: Option<usize>,
    pub level: Option<OptimizationLevel>,
    pub model: Option<String>,
    pub format: OutputFormat,
}

pub async fn run(args: ComputeArgs) -> Result<()> {
    let config = load_config()?;
    let mut options = config
        .context_options(args.model.as_deref())
        .context("Invalid context options")?;
    if let Some(strategy) = args.strategy {
        options.preservation_strategy = strategy;
    }
    if let Some(window) = args.window {
        options.context_window = window;
    }
    if args.level.is_some() {
        options.optimization_level = args.level;
    }

    let clock = system_clock();
    let conversation = load_conversation(&args.file, &clock)?;
    let conversation_id = conversation.id.clone();
    let current = Message::user(args.message)
        .with_sequence(conversation.next_sequence())
        .at(clock.now());

    let store = Arc::new(InMemoryStore::new());
    store.insert_conversation(conversation).await;

    let mut service = ContextService::new(store.clone(), clock).with_search(store);
    if config.cache.enabled {
        service = service.with_cache(
            Arc::new(InMemoryCache::new()),
            Duration::from_secs(config.cache.ttl_secs),
        );
    }

    debug!(
        strategy = %options.preservation_strategy,
        budget = options.token_budget(),
        "Computing context"
    );
    let result = service
        .compute_context(&conversation_id, &current, &options)
        .await
        .context("Context computation failed")?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Inject => print!("{}", format_for_injection(&result)),
    }
    Ok(())
}
