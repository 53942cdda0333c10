//! Prompt templates for signal analysis and retrieval-grounded questions

use serde::{Deserialize, Serialize};

use crate::trading::CombinedSignal;
use crate::vector::SearchResult;

pub const SYSTEM_PROMPT: &str = "You are a cryptocurrency market analyst. You reason only from the \
data provided, state uncertainty plainly and never give financial advice.";

/// Structured analysis returned by the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketAnalysis {
    /// "BULLISH", "BEARISH" or "NEUTRAL"
    pub direction: String,
    /// 0.0 to 1.0
    pub confidence: f64,
    pub summary: String,
    #[serde(default)]
    pub key_factors: Vec<String>,
}

pub struct AnalysisPrompts;

impl AnalysisPrompts {
    fn retrieved_text(retrieved: &[SearchResult]) -> String {
        if retrieved.is_empty() {
            return "None".to_string();
        }
        retrieved
            .iter()
            .enumerate()
            .map(|(i, doc)| format!("{}. {} (similarity: {:.3})", i + 1, doc.text, doc.similarity))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn memory_text(memory_context: Option<&str>) -> &str {
        match memory_context {
            Some(ctx) if !ctx.trim().is_empty() => ctx,
            _ => "No previous predictions",
        }
    }

    pub fn signal_analysis(
        signal: &CombinedSignal,
        retrieved: &[SearchResult],
        memory_context: Option<&str>,
    ) -> String {
        let market = match &signal.market_data {
            Some(m) => format!(
                "Price: ${:.2}, 24h change: {:+.2}%, 24h volume: ${:.0}, source: {}",
                m.price, m.change_24h, m.volume_24h, m.source
            ),
            None => "Unavailable".to_string(),
        };

        let sentiment = match &signal.sentiment {
            Some(s) => format!("Fear & Greed {} ({})", s.fear_greed_index, s.fear_greed_label),
            None => "Unavailable".to_string(),
        };

        let headlines = signal
            .news_items
            .iter()
            .take(5)
            .map(|n| format!("- {} [{}, impact {}]", n.headline, n.sentiment_label(), n.impact_level))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"Analyze the current outlook for {symbol}.

MARKET DATA:
{market}

SENTIMENT:
{sentiment}

RECENT HEADLINES:
{headlines}

QUANTITATIVE SIGNAL:
Overall: {overall} (confidence {confidence:.1}%, risk {risk})
Components: price {price}, news {news}, sentiment {sent}, technical {tech}
Reasoning: {reasoning}
Warnings: {warnings}

RELATED KNOWLEDGE:
{retrieved}

MEMORY:
{memory}

Respond with JSON only:
{{"direction": "BULLISH|BEARISH|NEUTRAL", "confidence": 0.0-1.0, "summary": "two or three sentences", "key_factors": ["..."]}}"#,
            symbol = signal.symbol,
            market = market,
            sentiment = sentiment,
            headlines = if headlines.is_empty() { "None".to_string() } else { headlines },
            overall = signal.overall_signal,
            confidence = signal.confidence * 100.0,
            risk = signal.risk_level,
            price = signal.price_signal,
            news = signal.news_signal,
            sent = signal.sentiment_signal,
            tech = signal.technical_signal,
            reasoning = signal.reasoning.join("; "),
            warnings = if signal.warnings.is_empty() {
                "None".to_string()
            } else {
                signal.warnings.join("; ")
            },
            retrieved = Self::retrieved_text(retrieved),
            memory = Self::memory_text(memory_context),
        )
    }

    pub fn question(
        question: &str,
        retrieved: &[SearchResult],
        memory_context: Option<&str>,
    ) -> String {
        format!(
            r#"Answer the question using only the context below. If the context is not enough, say so.

CONTEXT:
{}

MEMORY:
{}

QUESTION: {}"#,
            Self::retrieved_text(retrieved),
            Self::memory_text(memory_context),
            question
        )
    }
}
