//! Signal combination
//!
//! Each data source is reduced to a five-step signal, then combined into a
//! weighted overall signal. Confidence measures how much the components agree:
//! it is `1 - variance / 4` of the component values, clamped to [0, 1].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use super::{RiskLevel, TradeDecision, TradeGate};
use crate::data::{
    ImpactLevel, MarketData, MarketSentiment, NewsItem, SignalStrength, TechnicalIndicators,
};

pub const PRICE_WEIGHT: f64 = 0.25;
pub const NEWS_WEIGHT: f64 = 0.30;
pub const SENTIMENT_WEIGHT: f64 = 0.20;
pub const TECHNICAL_WEIGHT: f64 = 0.25;

/// Only the most recent headlines feed the news component
const NEWS_SIGNAL_ITEMS: usize = 5;

/// Aggregated signal from all data sources for one symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedSignal {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub market_data: Option<MarketData>,
    pub news_items: Vec<NewsItem>,
    pub sentiment: Option<MarketSentiment>,
    pub technicals: Option<TechnicalIndicators>,

    pub overall_signal: SignalStrength,
    /// 0 to 1
    pub confidence: f64,
    pub risk_level: RiskLevel,

    pub price_signal: SignalStrength,
    pub news_signal: SignalStrength,
    pub sentiment_signal: SignalStrength,
    pub technical_signal: SignalStrength,

    pub reasoning: Vec<String>,
    pub warnings: Vec<String>,
    pub opportunities: Vec<String>,
}

impl CombinedSignal {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp: Utc::now(),
            market_data: None,
            news_items: Vec::new(),
            sentiment: None,
            technicals: None,
            overall_signal: SignalStrength::Neutral,
            confidence: 0.0,
            risk_level: RiskLevel::Medium,
            price_signal: SignalStrength::Neutral,
            news_signal: SignalStrength::Neutral,
            sentiment_signal: SignalStrength::Neutral,
            technical_signal: SignalStrength::Neutral,
            reasoning: Vec::new(),
            warnings: Vec::new(),
            opportunities: Vec::new(),
        }
    }

    /// Build from collected inputs and compute the combined signal
    pub fn from_components(
        symbol: impl Into<String>,
        market_data: Option<MarketData>,
        news_items: Vec<NewsItem>,
        sentiment: Option<MarketSentiment>,
        technicals: Option<TechnicalIndicators>,
    ) -> Self {
        let mut signal = Self::new(symbol);
        signal.market_data = market_data;
        signal.news_items = news_items;
        signal.sentiment = sentiment;
        signal.technicals = technicals;
        signal.calculate();
        signal
    }

    /// Recompute component, overall and derived fields from the inputs
    pub fn calculate(&mut self) {
        self.warnings.clear();
        self.opportunities.clear();

        // (component value, weight)
        let mut components: Vec<(f64, f64)> = Vec::with_capacity(4);

        if let Some(market) = &self.market_data {
            self.price_signal = market.signal_strength();
            components.push((self.price_signal.value() as f64, PRICE_WEIGHT));

            if market.change_24h.abs() > 10.0 {
                self.warnings.push(format!(
                    "High volatility: {:.1}% 24h change",
                    market.change_24h
                ));
            }
        }

        if !self.news_items.is_empty() {
            let scores: Vec<f64> = self
                .news_items
                .iter()
                .take(NEWS_SIGNAL_ITEMS)
                .map(|item| item.signal_strength().value() as f64)
                .collect();
            let avg = scores.iter().sum::<f64>() / scores.len() as f64;
            self.news_signal = SignalStrength::from_average(avg);
            components.push((avg, NEWS_WEIGHT));

            if let Some(critical) = self
                .news_items
                .iter()
                .find(|item| item.impact_level == ImpactLevel::Critical)
            {
                let headline: String = critical.headline.chars().take(50).collect();
                self.warnings.push(format!("Critical news: {}...", headline));
            }
        }

        if let Some(sentiment) = &self.sentiment {
            self.sentiment_signal = sentiment.contrarian_signal();
            components.push((self.sentiment_signal.value() as f64, SENTIMENT_WEIGHT));

            if sentiment.is_extreme() {
                self.opportunities
                    .push(format!("Extreme sentiment: {}", sentiment.fear_greed_label));
            }
        }

        if let Some(technicals) = &self.technicals {
            let mut tech_scores = Vec::with_capacity(2);
            if technicals.has_rsi() {
                tech_scores.push(technicals.rsi_signal().value() as f64);
            }
            if let Some(market) = &self.market_data {
                if technicals.has_sma_50() {
                    tech_scores.push(technicals.ma_signal(market.price).value() as f64);
                }
            }

            if !tech_scores.is_empty() {
                let avg = tech_scores.iter().sum::<f64>() / tech_scores.len() as f64;
                self.technical_signal = SignalStrength::from_average(avg);
                components.push((avg, TECHNICAL_WEIGHT));
            }
        }

        if components.is_empty() {
            self.overall_signal = SignalStrength::Neutral;
            self.confidence = 0.0;
            self.risk_level = RiskLevel::Medium;
        } else {
            let weighted_sum: f64 = components.iter().map(|(s, w)| s * w).sum();
            let total_weight: f64 = components.iter().map(|(_, w)| w).sum();
            let avg = weighted_sum / total_weight;

            self.overall_signal = SignalStrength::from_average(avg);

            let variance = components
                .iter()
                .map(|(s, _)| (s - avg).powi(2))
                .sum::<f64>()
                / components.len() as f64;
            self.confidence = (1.0 - variance / 4.0).clamp(0.0, 1.0);
            self.risk_level = RiskLevel::from_confidence(self.confidence);
        }

        self.reasoning = self.build_reasoning();
    }

    fn build_reasoning(&self) -> Vec<String> {
        let mut reasoning = Vec::new();

        if self.overall_signal.is_bullish() {
            reasoning.push(format!(
                "Bullish signal with {:.1}% confidence",
                self.confidence * 100.0
            ));
        } else if self.overall_signal.is_bearish() {
            reasoning.push(format!(
                "Bearish signal with {:.1}% confidence",
                self.confidence * 100.0
            ));
        } else {
            reasoning.push("Neutral market conditions".to_string());
        }

        if let Some(market) = &self.market_data {
            reasoning.push(format!("Price action: {:+.1}% in 24h", market.change_24h));
        }

        if let Some(sentiment) = &self.sentiment {
            reasoning.push(format!("Market sentiment: {}", sentiment.fear_greed_label));
        }

        if !self.news_items.is_empty() {
            reasoning.push(format!(
                "News sentiment: {} articles analyzed",
                self.news_items.len()
            ));
        }

        if let Some(rsi) = self.technicals.as_ref().and_then(|t| t.rsi_14).filter(|r| *r != 0.0) {
            reasoning.push(format!("RSI: {:.1}", rsi));
        }

        reasoning
    }

    /// Stable 16-hex-char id derived from symbol and timestamp
    pub fn unique_id(&self) -> String {
        let content = format!("{}{}", self.symbol, self.timestamp.to_rfc3339());
        let digest = Sha256::digest(content.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        hex[..16].to_string()
    }

    /// Summary without the raw inputs
    pub fn to_report(&self) -> Value {
        json!({
            "symbol": self.symbol,
            "timestamp": self.timestamp.to_rfc3339(),
            "overall_signal": self.overall_signal.name(),
            "confidence": self.confidence,
            "risk_level": self.risk_level.as_str(),
            "reasoning": self.reasoning,
            "warnings": self.warnings,
            "opportunities": self.opportunities,
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.to_report())
    }

    pub fn evaluate(&self, gate: &TradeGate) -> TradeDecision {
        gate.evaluate(self)
    }

    pub fn current_price(&self) -> Option<f64> {
        self.market_data.as_ref().map(|m| m.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixtures::{market, news, sentiment};

    #[test]
    fn test_no_components_is_neutral_with_zero_confidence() {
        let signal = CombinedSignal::from_components("BTC", None, Vec::new(), None, None);
        assert_eq!(signal.overall_signal, SignalStrength::Neutral);
        assert_eq!(signal.confidence, 0.0);
        assert_eq!(signal.risk_level, RiskLevel::Medium);
        assert_eq!(signal.reasoning, vec!["Neutral market conditions"]);
    }

    #[test]
    fn test_single_component_full_confidence() {
        let signal =
            CombinedSignal::from_components("BTC", Some(market("BTC", 50_000.0, 5.0)), Vec::new(), None, None);
        assert_eq!(signal.overall_signal, SignalStrength::Buy);
        assert_eq!(signal.confidence, 1.0);
        assert_eq!(signal.risk_level, RiskLevel::Low);
        assert_eq!(signal.reasoning[0], "Bullish signal with 100.0% confidence");
        assert_eq!(signal.reasoning[1], "Price action: +5.0% in 24h");
    }

    #[test]
    fn test_conflicting_components() {
        // price StrongBuy (5, .25) vs extreme greed StrongSell (1, .20)
        let signal = CombinedSignal::from_components(
            "BTC",
            Some(market("BTC", 50_000.0, 12.0)),
            Vec::new(),
            Some(sentiment(90)),
            None,
        );
        assert_eq!(signal.price_signal, SignalStrength::StrongBuy);
        assert_eq!(signal.sentiment_signal, SignalStrength::StrongSell);
        // (5*.25 + 1*.2) / .45 = 3.22
        assert_eq!(signal.overall_signal, SignalStrength::Neutral);
        assert_eq!(signal.confidence, 0.0);
        assert_eq!(signal.risk_level, RiskLevel::Extreme);
        assert_eq!(signal.warnings, vec!["High volatility: 12.0% 24h change"]);
        assert_eq!(signal.opportunities, vec!["Extreme sentiment: Extreme Greed"]);
        assert!(signal.reasoning.contains(&"Market sentiment: Extreme Greed".to_string()));
    }

    #[test]
    fn test_news_uses_first_five_items() {
        let mut items: Vec<_> = (0..5)
            .map(|i| news(&format!("Rally {}", i), 0.8, ImpactLevel::High))
            .collect();
        items.push(news("Crash", -0.9, ImpactLevel::High));

        let signal = CombinedSignal::from_components("ETH", None, items, None, None);
        assert_eq!(signal.news_signal, SignalStrength::StrongBuy);
        assert_eq!(signal.confidence, 1.0);
        assert!(signal
            .reasoning
            .contains(&"News sentiment: 6 articles analyzed".to_string()));
    }

    #[test]
    fn test_critical_news_warning_truncates_headline() {
        let headline = "Major exchange collapses after hack drains customer wallets overnight";
        let items = vec![news(headline, -0.9, ImpactLevel::Critical)];
        let signal = CombinedSignal::from_components("BTC", None, items, None, None);
        assert_eq!(
            signal.warnings,
            vec![format!("Critical news: {}...", &headline[..50])]
        );
    }

    #[test]
    fn test_technicals_average_rsi_and_ma() {
        let technicals = TechnicalIndicators {
            symbol: "BTC".to_string(),
            rsi_14: Some(25.0),
            sma_50: Some(110.0),
            sma_200: Some(100.0),
            ..Default::default()
        };
        // RSI StrongBuy, MA (price 105 < sma50) Sell -> avg 3.5 -> Buy
        let signal = CombinedSignal::from_components(
            "BTC",
            Some(market("BTC", 105.0, 0.0)),
            Vec::new(),
            None,
            Some(technicals),
        );
        assert_eq!(signal.technical_signal, SignalStrength::Buy);
        assert!(signal.reasoning.contains(&"RSI: 25.0".to_string()));

        // Without market data only RSI counts
        let rsi_only = TechnicalIndicators {
            rsi_14: Some(65.0),
            sma_50: Some(110.0),
            ..Default::default()
        };
        let signal = CombinedSignal::from_components("BTC", None, Vec::new(), None, Some(rsi_only));
        assert_eq!(signal.technical_signal, SignalStrength::Sell);
        assert_eq!(signal.overall_signal, SignalStrength::Sell);
    }

    #[test]
    fn test_empty_technicals_are_ignored() {
        let signal = CombinedSignal::from_components(
            "BTC",
            None,
            Vec::new(),
            None,
            Some(TechnicalIndicators::default()),
        );
        assert_eq!(signal.confidence, 0.0);
        assert_eq!(signal.technical_signal, SignalStrength::Neutral);
    }

    #[test]
    fn test_calculate_is_repeatable() {
        let mut signal = CombinedSignal::new("BTC");
        signal.market_data = Some(market("BTC", 1.0, -15.0));
        signal.calculate();
        signal.calculate();
        assert_eq!(signal.warnings.len(), 1);
        assert_eq!(signal.overall_signal, SignalStrength::StrongSell);
    }

    #[test]
    fn test_unique_id_and_report() {
        let signal = CombinedSignal::new("SOL");
        let id = signal.unique_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id, signal.clone().unique_id());

        let report = signal.to_report();
        assert_eq!(report["overall_signal"], "NEUTRAL");
        assert_eq!(report["risk_level"], "medium");
        assert!(signal.to_json().unwrap().contains("\"symbol\": \"SOL\""));
    }
}
