//! Prediction memory
//!
//! Keeps every recorded prediction, a short context line per prediction and an
//! accuracy tracker. The memory is persisted as a single JSON file so that the
//! LLM layer can be primed with past calls and how they turned out.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::trading::CombinedSignal;

const CONTEXT_PREDICTIONS: usize = 5;
const CONTEXT_LINES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Bullish,
    Bearish,
    Neutral,
}

impl Direction {
    pub fn from_signal(signal: &CombinedSignal) -> Self {
        if signal.overall_signal.is_bullish() {
            Direction::Bullish
        } else if signal.overall_signal.is_bearish() {
            Direction::Bearish
        } else {
            Direction::Neutral
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::Bullish => "BULLISH",
            Direction::Bearish => "BEARISH",
            Direction::Neutral => "NEUTRAL",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Correct,
    Incorrect,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Correct => f.write_str("correct"),
            Outcome::Incorrect => f.write_str("incorrect"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: String,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub signal: String,
    pub confidence: f64,
    pub price: Option<f64>,
    pub outcome: Option<Outcome>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AccuracyTracker {
    pub correct: u32,
    pub total: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MemoryState {
    predictions: Vec<PredictionRecord>,
    market_context: Vec<String>,
    accuracy: AccuracyTracker,
}

pub struct PredictionMemory {
    path: PathBuf,
    state: MemoryState,
}

impl PredictionMemory {
    /// Load from `path`; a missing file starts an empty memory
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read memory file {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Corrupt memory file {}", path.display()))?
        } else {
            MemoryState::default()
        };

        debug!(
            "Loaded {} predictions from {}",
            state.predictions.len(),
            path.display()
        );
        Ok(Self { path, state })
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&self.state)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write memory file {}", self.path.display()))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remember a signal as a pending prediction. Re-recording the same signal is a no-op.
    pub fn record(&mut self, signal: &CombinedSignal) -> &PredictionRecord {
        let id = signal.unique_id();
        if let Some(index) = self.state.predictions.iter().position(|p| p.id == id) {
            return &self.state.predictions[index];
        }

        let direction = Direction::from_signal(signal);
        let price = signal.current_price();
        let sentiment_label = signal
            .sentiment
            .as_ref()
            .map(|s| s.fear_greed_label.as_str())
            .unwrap_or("unknown");

        self.state.market_context.push(format!(
            "At ${:.0}, predicted {} for {} based on {} sentiment",
            price.unwrap_or(0.0),
            direction,
            signal.symbol,
            sentiment_label
        ));

        let index = self.state.predictions.len();
        self.state.predictions.push(PredictionRecord {
            id,
            symbol: signal.symbol.clone(),
            timestamp: signal.timestamp,
            direction,
            signal: signal.overall_signal.name().to_string(),
            confidence: signal.confidence,
            price,
            outcome: None,
        });

        &self.state.predictions[index]
    }

    /// Mark a pending prediction as correct or incorrect
    pub fn mark_outcome(&mut self, id: &str, correct: bool) -> Result<()> {
        let Some(prediction) = self.state.predictions.iter_mut().find(|p| p.id == id) else {
            bail!("No prediction with id {}", id);
        };

        if let Some(outcome) = prediction.outcome {
            bail!("Prediction {} already marked {}", id, outcome);
        }

        prediction.outcome = Some(if correct {
            Outcome::Correct
        } else {
            Outcome::Incorrect
        });
        self.state.accuracy.total += 1;
        if correct {
            self.state.accuracy.correct += 1;
        }

        info!(id, correct, "Prediction outcome recorded");
        Ok(())
    }

    /// Percentage of marked predictions that were correct
    pub fn accuracy(&self) -> Option<f64> {
        let tracker = self.state.accuracy;
        if tracker.total == 0 {
            return None;
        }
        Some(tracker.correct as f64 / tracker.total as f64 * 100.0)
    }

    pub fn tracker(&self) -> AccuracyTracker {
        self.state.accuracy
    }

    pub fn predictions(&self) -> &[PredictionRecord] {
        &self.state.predictions
    }

    pub fn recent(&self, limit: usize) -> &[PredictionRecord] {
        let start = self.state.predictions.len().saturating_sub(limit);
        &self.state.predictions[start..]
    }

    pub fn market_context(&self) -> &[String] {
        &self.state.market_context
    }

    /// Prompt-ready summary of recent predictions and accuracy
    pub fn build_context(&self) -> String {
        let mut lines = Vec::new();

        if !self.state.predictions.is_empty() {
            lines.push("Previous Predictions:".to_string());
            for p in self.recent(CONTEXT_PREDICTIONS) {
                let outcome = p
                    .outcome
                    .map(|o| o.to_string())
                    .unwrap_or_else(|| "pending".to_string());
                lines.push(format!(
                    "- {} {}: {} (Outcome: {})",
                    p.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    p.symbol,
                    p.direction,
                    outcome
                ));
            }
        }

        if !self.state.market_context.is_empty() {
            lines.push("\nMarket Context Memory:".to_string());
            let start = self.state.market_context.len().saturating_sub(CONTEXT_LINES);
            for ctx in &self.state.market_context[start..] {
                lines.push(format!("- {}", ctx));
            }
        }

        if let Some(accuracy) = self.accuracy() {
            lines.push(format!("\nPrediction Accuracy: {:.1}%", accuracy));
        }

        lines.join("\n")
    }

    pub fn clear(&mut self) {
        self.state = MemoryState::default();
        info!("Prediction memory cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixtures::{market, sentiment};
    use chrono::Duration;

    fn signal(symbol: &str, change: f64, offset_secs: i64) -> CombinedSignal {
        let mut signal = CombinedSignal::from_components(
            symbol,
            Some(market(symbol, 43_210.7, change)),
            Vec::new(),
            Some(sentiment(30)),
            None,
        );
        signal.timestamp += Duration::seconds(offset_secs);
        signal
    }

    #[test]
    fn test_record_adds_context_line() {
        let dir = tempfile::tempdir().unwrap();
        let mut memory = PredictionMemory::load(dir.path().join("memory.json")).unwrap();

        let btc = signal("BTC", 5.0, 0);
        let record = memory.record(&btc).clone();
        assert_eq!(record.outcome, None);
        assert_eq!(
            memory.market_context(),
            ["At $43211, predicted BULLISH for BTC based on Fear sentiment".to_string()]
        );

        memory.record(&btc);
        assert_eq!(memory.predictions().len(), 1);
        assert_eq!(memory.predictions()[0].id, record.id);
    }

    #[test]
    fn test_outcome_marked_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut memory = PredictionMemory::load(dir.path().join("memory.json")).unwrap();
        let first = memory.record(&signal("BTC", 5.0, 0)).id.clone();
        let second = memory.record(&signal("ETH", -5.0, 1)).id.clone();

        assert!(memory.accuracy().is_none());
        memory.mark_outcome(&first, true).unwrap();
        memory.mark_outcome(&second, false).unwrap();
        assert_eq!(memory.accuracy(), Some(50.0));

        let err = memory.mark_outcome(&first, false).unwrap_err();
        assert!(err.to_string().contains("already marked"));
        assert!(memory.mark_outcome("deadbeef", true).is_err());
        assert_eq!(memory.tracker().total, 2);
    }

    #[test]
    fn test_build_context_limits() {
        let dir = tempfile::tempdir().unwrap();
        let mut memory = PredictionMemory::load(dir.path().join("memory.json")).unwrap();
        assert_eq!(memory.build_context(), "");

        let mut ids = Vec::new();
        for i in 0..7 {
            ids.push(memory.record(&signal("SOL", 5.0, i)).id.clone());
        }
        memory.mark_outcome(&ids[6], true).unwrap();

        let context = memory.build_context();
        assert_eq!(context.matches("(Outcome:").count(), 5);
        assert!(context.contains("(Outcome: correct)"));
        assert_eq!(context.matches("At $").count(), 3);
        assert!(context.ends_with("Prediction Accuracy: 100.0%"));
    }

    #[test]
    fn test_save_load_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("memory.json");

        let mut memory = PredictionMemory::load(&path).unwrap();
        let id = memory.record(&signal("BTC", -12.0, 0)).id.clone();
        memory.mark_outcome(&id, false).unwrap();
        memory.save().unwrap();

        let mut reloaded = PredictionMemory::load(&path).unwrap();
        assert_eq!(reloaded.predictions().len(), 1);
        assert_eq!(reloaded.predictions()[0].direction, Direction::Bearish);
        assert_eq!(reloaded.accuracy(), Some(0.0));

        reloaded.clear();
        assert!(reloaded.predictions().is_empty());
        assert!(reloaded.market_context().is_empty());
        assert!(reloaded.accuracy().is_none());
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(PredictionMemory::load(&path).is_err());
    }
}
