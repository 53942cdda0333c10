use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use cryptorag::config::parse_symbols;
use cryptorag::db::Database;
use cryptorag::embeddings::Embedder;
use cryptorag::llm::LlmAnalyst;
use cryptorag::memory::PredictionMemory;
use cryptorag::orchestrator::{render_signal, write_prediction, CollectionReport, CryptoDataPipeline};
use cryptorag::trading::{CombinedSignal, TradeDecision, TradeGate};
use cryptorag::vector::KnowledgeBase;
use cryptorag::Config;

/// Documents retrieved per query
const RETRIEVAL_K: usize = 5;

/// Everything a collection cycle writes after it finishes
struct Persistence {
    data_dir: PathBuf,
    report_path: PathBuf,
    memory: PredictionMemory,
    db: Option<Database>,
    knowledge: Option<(KnowledgeBase, Embedder)>,
}

impl Persistence {
    async fn open(config: &Config, report_path: PathBuf) -> Result<Self> {
        let memory = PredictionMemory::load(config.memory_path())?;

        let db = match config.storage.database_url.as_deref() {
            Some(url) => match Database::new(url).await {
                Ok(db) => Some(db),
                Err(e) => {
                    warn!("Postgres unavailable, signals will not be stored: {:#}", e);
                    None
                }
            },
            None => None,
        };

        let knowledge = if config.has_ai() {
            Some((
                KnowledgeBase::load(config.knowledge_path())?,
                Embedder::from_config(config)?,
            ))
        } else {
            None
        };

        Ok(Self {
            data_dir: config.storage.data_dir.clone(),
            report_path,
            memory,
            db,
            knowledge,
        })
    }

    async fn persist(&mut self, signals: &[CombinedSignal]) -> Result<()> {
        CollectionReport::from_signals(signals).write(&self.report_path)?;

        for signal in signals {
            let path = write_prediction(&self.data_dir, signal)?;
            let record = self.memory.record(signal);
            info!(id = %record.id, path = %path.display(), "Prediction recorded");
        }
        self.memory.save()?;

        if let Some(db) = &self.db {
            let repo = db.signals();
            for signal in signals {
                if let Err(e) = repo.insert(signal).await {
                    warn!("{:#}", e);
                }
            }
        }

        if let Some((kb, embedder)) = &mut self.knowledge {
            for signal in signals {
                if let Err(e) = kb.add_signal_documents(signal, embedder).await {
                    warn!("Failed to index {}: {:#}", signal.symbol, e);
                }
            }
            kb.save()?;
        }

        Ok(())
    }
}

fn resolve_symbols(config: &Config, symbols: Option<String>) -> Vec<String> {
    match symbols {
        Some(raw) => parse_symbols(&raw),
        None => config.collection.default_symbols.clone(),
    }
}

fn print_signals(signals: &[CombinedSignal], gate: &TradeGate) {
    for signal in signals {
        println!("{}", render_signal(signal));
        match signal.evaluate(gate) {
            TradeDecision::Actionable => println!("Decision: actionable"),
            TradeDecision::Skip(reason) => println!("Decision: skip ({})", reason),
        }
    }
}

/// Collect once, print each signal and persist the batch
pub async fn collect(
    config: Config,
    symbols: Option<String>,
    output: PathBuf,
    no_save: bool,
) -> Result<()> {
    let symbols = resolve_symbols(&config, symbols);
    let gate = TradeGate::from_config(&config.trading);
    let pipeline = CryptoDataPipeline::new(config.clone())?;

    let signals = pipeline.collect_all_data(&symbols).await;
    print_signals(&signals, &gate);

    if no_save {
        return Ok(());
    }

    let mut persistence = Persistence::open(&config, output.clone()).await?;
    persistence.persist(&signals).await?;
    println!("\nSaved {} signals, report written to {}", signals.len(), output.display());
    Ok(())
}

/// Collect every interval until Ctrl-C
pub async fn watch(config: Config, symbols: Option<String>, interval: Option<u64>) -> Result<()> {
    let symbols = resolve_symbols(&config, symbols);
    let interval = Duration::from_secs(interval.unwrap_or(config.collection.update_interval_secs).max(1));
    let gate = TradeGate::from_config(&config.trading);
    let pipeline = CryptoDataPipeline::new(config.clone())?;

    let report_path = PathBuf::from(cryptorag::orchestrator::DEFAULT_REPORT_FILE);
    let persistence = Arc::new(Mutex::new(Persistence::open(&config, report_path).await?));

    println!(
        "Watching {} every {}s (Ctrl-C to stop)",
        symbols.join(", "),
        interval.as_secs()
    );

    let cycles = pipeline
        .run_periodic(&symbols, interval, |signals| {
            let persistence = Arc::clone(&persistence);
            let gate = gate.clone();
            async move {
                print_signals(&signals, &gate);
                persistence.lock().await.persist(&signals).await
            }
        })
        .await;

    println!("Stopped after {} cycles", cycles);
    Ok(())
}

pub async fn health(config: Config) -> Result<()> {
    let database_url = config.storage.database_url.clone();
    let pipeline = CryptoDataPipeline::new(config)?;
    let report = pipeline.health_check().await;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some(url) = database_url {
        let db_status = match Database::new(&url).await {
            Ok(db) => {
                let result = db.health_check().await;
                db.close().await;
                result
            }
            Err(e) => Err(e),
        };
        match db_status {
            Ok(()) => println!("postgres: healthy"),
            Err(e) => println!("postgres: unhealthy ({:#})", e),
        }
    }

    if !report.all_healthy() {
        warn!("One or more data sources are unhealthy");
    }
    Ok(())
}

pub async fn history(config: Config, limit: usize) -> Result<()> {
    let memory = PredictionMemory::load(config.memory_path())?;

    println!("Recorded predictions: {}", memory.predictions().len());
    for record in memory.recent(limit) {
        let outcome = record
            .outcome
            .map(|o| o.to_string())
            .unwrap_or_else(|| "pending".to_string());
        let price = record
            .price
            .map(|p| format!("${:.2}", p))
            .unwrap_or_else(|| "N/A".to_string());
        println!(
            "  {} {} {:<5} {} ({:.1}%) at {} [{}]",
            record.id,
            record.timestamp.format("%Y-%m-%d %H:%M"),
            record.symbol,
            record.direction,
            record.confidence * 100.0,
            price,
            outcome
        );
    }

    let tracker = memory.tracker();
    match memory.accuracy() {
        Some(accuracy) => println!(
            "Accuracy: {:.1}% ({}/{})",
            accuracy, tracker.correct, tracker.total
        ),
        None => println!("Accuracy: no outcomes recorded yet"),
    }

    if let Some(url) = config.storage.database_url.as_deref() {
        let db = Database::new(url).await?;
        let rows = db.signals().recent(None, limit as i64).await?;
        println!("\nStored signals: {}", rows.len());
        for row in rows {
            println!(
                "  {} {:<5} {} ({:.1}%, risk {})",
                row.created_at.format("%Y-%m-%d %H:%M"),
                row.symbol,
                row.overall_signal,
                row.confidence * 100.0,
                row.risk_level
            );
        }
        db.close().await;
    }

    Ok(())
}

pub fn outcome(config: Config, id: String, correct: bool) -> Result<()> {
    let mut memory = PredictionMemory::load(config.memory_path())?;
    memory.mark_outcome(&id, correct)?;
    memory.save()?;

    let accuracy = memory
        .accuracy()
        .map(|a| format!("{:.1}%", a))
        .unwrap_or_else(|| "N/A".to_string());
    println!(
        "Marked {} as {}. Accuracy: {}",
        id,
        if correct { "correct" } else { "incorrect" },
        accuracy
    );
    Ok(())
}

/// Collect a single symbol, index it and ask the model for an outlook
pub async fn analyze(
    config: Config,
    symbol: String,
    think_harder: bool,
    no_memory: bool,
) -> Result<()> {
    let analyst = LlmAnalyst::from_config(&config)?;
    let embedder = Embedder::from_config(&config)?;
    let pipeline = CryptoDataPipeline::new(config.clone())?;

    let signal = pipeline
        .collect_all_data(std::slice::from_ref(&symbol))
        .await
        .into_iter()
        .next()
        .with_context(|| format!("Invalid symbol: {}", symbol))?;

    println!("{}", render_signal(&signal));

    let mut kb = KnowledgeBase::load(config.knowledge_path())?;
    if let Err(e) = kb.add_signal_documents(&signal, &embedder).await {
        warn!("Failed to index {}: {:#}", signal.symbol, e);
    }
    kb.save()?;

    let query = format!("{} price news sentiment outlook", signal.symbol);
    let retrieved = kb.retrieve(&query, &embedder, RETRIEVAL_K).await?;

    let mut memory = PredictionMemory::load(config.memory_path())?;
    let context = (!no_memory).then(|| memory.build_context());

    let analysis = analyst
        .analyze(&signal, &retrieved, context.as_deref(), think_harder)
        .await?;

    println!("\nAI ANALYSIS ({})", if think_harder { "advanced" } else { "standard" });
    println!("  Direction: {}", analysis.direction);
    println!("  Confidence: {:.1}%", analysis.confidence * 100.0);
    println!("  Summary: {}", analysis.summary);
    for factor in &analysis.key_factors {
        println!("    - {}", factor);
    }

    let record = memory.record(&signal);
    println!("\nPrediction id: {}", record.id);
    memory.save()?;
    Ok(())
}

pub async fn ask(config: Config, question: String) -> Result<()> {
    let analyst = LlmAnalyst::from_config(&config)?;
    let embedder = Embedder::from_config(&config)?;
    let kb = KnowledgeBase::load(config.knowledge_path())?;

    if kb.is_empty() {
        warn!("Knowledge base is empty; run `collect` first for grounded answers");
    }

    let retrieved = kb.retrieve(&question, &embedder, RETRIEVAL_K).await?;
    let memory = PredictionMemory::load(config.memory_path())?;
    let context = memory.build_context();

    let answer = analyst.ask(&question, &retrieved, Some(&context)).await?;
    println!("{}", answer);

    if !retrieved.is_empty() {
        println!("\nSources:");
        for doc in &retrieved {
            println!("  [{:.3}] {}", doc.similarity, doc.text);
        }
    }
    Ok(())
}

pub fn memory_clear(config: Config) -> Result<()> {
    let mut memory = PredictionMemory::load(config.memory_path())?;
    let count = memory.predictions().len();
    memory.clear();
    memory.save()?;
    println!("Cleared {} predictions", count);
    Ok(())
}
