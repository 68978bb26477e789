//! Contextwise CLI — the main entry point.
//!
//! Commands:
//! - `compute`  — Select the context for a new message from a transcript
//! - `score`    — Show markers and importance for every message
//! - `optimize` — Compress a transcript at a level or toward a token target
//! - `stats`    — Summarize a transcript
//! - `config`   — Print the default or effective configuration

use clap::{Parser, Subcommand, ValueEnum};
use contextwise_core::options::{OptimizationLevel, PreservationStrategy};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "contextwise",
    about = "Contextwise — context window management for LLM conversations",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// How `compute` prints its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// The full truncation result as JSON
    Json,
    /// The prompt-injection text block
    Inject,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the context for a new message
    Compute {
        /// Transcript JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// The incoming user message
        #[arg(short, long)]
        message: String,

        /// Override the preservation strategy
        #[arg(short, long)]
        strategy: Option<PreservationStrategy>,

        /// Override the context window in tokens
        #[arg(short, long)]
        window: Option<usize>,

        /// Compress the selection at this level
        #[arg(short, long)]
        level: Option<OptimizationLevel>,

        /// Model whose context window applies
        #[arg(long)]
        model: Option<String>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },

    /// Show preservation markers and importance scores
    Score {
        /// Transcript JSON file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Compress a transcript
    Optimize {
        /// Transcript JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Compression level
        #[arg(short, long, default_value = "balanced")]
        level: OptimizationLevel,

        /// Escalate levels and drop messages until the transcript fits this
        /// many tokens (picks its own levels, so `--level` cannot be combined)
        #[arg(short, long, conflicts_with = "level")]
        target: Option<usize>,
    },

    /// Summarize a transcript
    Stats {
        /// Transcript JSON file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Print configuration
    Config {
        /// Show the loaded configuration instead of the defaults
        #[arg(long)]
        effective: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Compute {
            file,
            message,
            strategy,
            window,
            level,
            model,
            format,
        } => {
            let args = commands::compute::ComputeArgs {
                file,
                message,
                strategy,
                window,
                level,
                model,
                format,
            };
            commands::compute::run(args).await?
        }
        Commands::Score { file } => commands::score::run(&file).await?,
        Commands::Optimize {
            file,
            level,
            target,
        } => commands::optimize::run(&file, level, target).await?,
        Commands::Stats { file } => commands::stats::run(&file).await?,
        Commands::Config { effective } => commands::config_cmd::run(effective)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn optimize_rejects_level_together_with_target() {
        let parsed = Cli::try_parse_from([
            "contextwise", "optimize", "--file", "chat.json", "--level", "light", "--target", "100",
        ]);
        match parsed {
            Err(e) => assert_eq!(e.kind(), ErrorKind::ArgumentConflict),
            Ok(_) => panic!("--level and --target should conflict"),
        }
    }

    #[test]
    fn optimize_accepts_target_alone() {
        let cli = Cli::try_parse_from(["contextwise", "optimize", "-f", "chat.json", "-t", "100"])
            .unwrap();
        match cli.command {
            Commands::Optimize { target, level, .. } => {
                assert_eq!(target, Some(100));
                assert_eq!(level, OptimizationLevel::Balanced);
            }
            _ => panic!("expected optimize"),
        }
    }
}
