use anyhow::Result;
use clap::{ArgGroup, Parser, Subcommand};
use cryptorag::Config;
use std::path::PathBuf;
use tracing::info;

pub mod commands;
pub mod migrate;

#[derive(Parser)]
#[command(
    name = "cryptorag",
    about = "Multi-source crypto signal collector with retrieval-augmented analysis",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Collect data for all symbols once and print the signals
    Collect {
        /// Comma-separated symbols (defaults to DEFAULT_SYMBOLS)
        #[arg(short, long)]
        symbols: Option<String>,

        /// Where to write the JSON summary report
        #[arg(short, long, default_value = cryptorag::orchestrator::DEFAULT_REPORT_FILE)]
        output: PathBuf,

        /// Print only; skip reports, predictions, memory and storage
        #[arg(long)]
        no_save: bool,
    },

    /// Collect periodically until Ctrl-C
    Watch {
        /// Comma-separated symbols (defaults to DEFAULT_SYMBOLS)
        #[arg(short, long)]
        symbols: Option<String>,

        /// Seconds between cycles (defaults to DATA_UPDATE_INTERVAL)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Check every data source and print the health report
    Health,

    /// Show recorded predictions and accuracy
    History {
        /// Number of predictions to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Mark a recorded prediction as correct or incorrect
    #[command(group(ArgGroup::new("result").required(true).args(["correct", "incorrect"])))]
    Outcome {
        /// Prediction id
        #[arg(long)]
        id: String,

        #[arg(long)]
        correct: bool,

        #[arg(long)]
        incorrect: bool,
    },

    /// Collect one symbol and run LLM analysis over it
    Analyze {
        /// Symbol to analyze
        #[arg(short, long)]
        symbol: String,

        /// Use the advanced model
        #[arg(long)]
        think_harder: bool,

        /// Leave prediction memory out of the prompt
        #[arg(long)]
        no_memory: bool,
    },

    /// Ask a question answered from the knowledge base
    Ask {
        #[arg(short, long)]
        question: String,
    },

    /// Delete all recorded predictions
    MemoryClear,

    /// Run database migrations
    Migrate,
}

/// Execute CLI command
pub async fn run(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Collect {
            symbols,
            output,
            no_save,
        } => {
            info!("Running one-shot collection");
            commands::collect(config, symbols, output, no_save).await?;
        }
        Commands::Watch { symbols, interval } => {
            info!("Starting periodic collection");
            commands::watch(config, symbols, interval).await?;
        }
        Commands::Health => {
            commands::health(config).await?;
        }
        Commands::History { limit } => {
            commands::history(config, limit).await?;
        }
        Commands::Outcome { id, correct, .. } => {
            info!("Marking outcome for prediction {}", id);
            commands::outcome(config, id, correct)?;
        }
        Commands::Analyze {
            symbol,
            think_harder,
            no_memory,
        } => {
            info!("Running analysis for {}", symbol);
            commands::analyze(config, symbol, think_harder, no_memory).await?;
        }
        Commands::Ask { question } => {
            commands::ask(config, question).await?;
        }
        Commands::MemoryClear => {
            commands::memory_clear(config)?;
        }
        Commands::Migrate => {
            migrate::execute(config).await?;
        }
    }
    Ok(())
}
