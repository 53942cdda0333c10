//! Console and JSON output for collection results

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::data::format_thousands;
use crate::trading::{CombinedSignal, RiskLevel};

pub const DEFAULT_REPORT_FILE: &str = "phase1_test_results.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSummary {
    pub signal: String,
    pub confidence: f64,
    pub risk_level: RiskLevel,
    pub reasoning: Vec<String>,
}

/// Per-symbol summary of one collection run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionReport {
    pub timestamp: DateTime<Utc>,
    pub signals: BTreeMap<String, SignalSummary>,
}

impl CollectionReport {
    pub fn from_signals(signals: &[CombinedSignal]) -> Self {
        let signals = signals
            .iter()
            .map(|s| {
                (
                    s.symbol.clone(),
                    SignalSummary {
                        signal: s.overall_signal.name().to_string(),
                        confidence: s.confidence,
                        risk_level: s.risk_level,
                        reasoning: s.reasoning.clone(),
                    },
                )
            })
            .collect();

        Self {
            timestamp: Utc::now(),
            signals,
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        Ok(())
    }
}

/// Save one signal as `{dir}/predictions/prediction_YYYYmmdd_HHMMSS_{SYM}.json`
pub fn write_prediction(dir: &Path, signal: &CombinedSignal) -> Result<PathBuf> {
    let predictions_dir = dir.join("predictions");
    std::fs::create_dir_all(&predictions_dir).with_context(|| {
        format!("Failed to create {}", predictions_dir.display())
    })?;

    let filename = format!(
        "prediction_{}_{}.json",
        signal.timestamp.format("%Y%m%d_%H%M%S"),
        signal.symbol
    );
    let path = predictions_dir.join(filename);

    let mut prediction = signal.to_report();
    prediction["id"] = json!(signal.unique_id());
    prediction["price"] = json!(signal.current_price());
    prediction["data_sources"] = json!({
        "market_data": signal.market_data.is_some(),
        "technical": signal.technicals.is_some(),
        "news": signal.news_items.len(),
        "sentiment": signal.sentiment.as_ref().map(|s| s.fear_greed_label.clone()),
    });

    std::fs::write(&path, serde_json::to_string_pretty(&prediction)?)
        .with_context(|| format!("Failed to write prediction to {}", path.display()))?;
    Ok(path)
}

/// Price with thousands separators and cents, e.g. 43250.5 -> "43,250.50"
fn format_price(value: f64) -> String {
    let cents = (value * 100.0).round() as i64;
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    format!(
        "{}{}.{:02}",
        sign,
        format_thousands((cents / 100) as f64),
        cents % 100
    )
}

/// Human-readable block for one symbol
pub fn render_signal(signal: &CombinedSignal) -> String {
    let mut out = String::new();
    // writeln! into a String cannot fail
    let _ = writeln!(out, "\n[COIN] {}", signal.symbol);
    let _ = writeln!(out, "{}", "-".repeat(40));

    if let Some(market) = &signal.market_data {
        let _ = writeln!(out, "Price: ${}", format_price(market.price));
        let _ = writeln!(out, "24h Change: {:+.2}%", market.change_24h);
        let _ = writeln!(out, "Volume: ${}", format_thousands(market.volume_24h));
    }

    if !signal.news_items.is_empty() {
        let _ = writeln!(out, "\nLatest News ({} articles):", signal.news_items.len());
        for item in signal.news_items.iter().take(3) {
            let tag = if item.sentiment_score > 0.0 {
                "[+]"
            } else if item.sentiment_score < 0.0 {
                "[-]"
            } else {
                "[=]"
            };
            let headline: String = item.headline.chars().take(60).collect();
            let _ = writeln!(out, "  {} {}...", tag, headline);
        }
    }

    if let Some(sentiment) = &signal.sentiment {
        let _ = writeln!(
            out,
            "\nFear & Greed: {} ({})",
            sentiment.fear_greed_index, sentiment.fear_greed_label
        );
        let _ = writeln!(out, "   {}", sentiment.market_mood());
    }

    let _ = writeln!(out, "\n[SIGNAL] {}", signal.overall_signal);
    let _ = writeln!(out, "Confidence: {:.1}%", signal.confidence * 100.0);
    let _ = writeln!(out, "Risk Level: {}", signal.risk_level);

    let sections = [
        ("Reasoning:", &signal.reasoning),
        ("[WARNING] Warnings:", &signal.warnings),
        ("[OPPORTUNITY] Opportunities:", &signal.opportunities),
    ];
    for (title, lines) in sections {
        if lines.is_empty() {
            continue;
        }
        let _ = writeln!(out, "\n{}", title);
        for line in lines {
            let _ = writeln!(out, "  - {}", line);
        }
    }

    out
}
