//! Data pipeline module for fetching market data, news, and sentiment
//! Provides the domain model shared by the collectors and the signal engine

pub mod cache;
pub mod errors;
pub mod indicators;
pub mod market;
pub mod news;
pub mod rate_limit;
pub mod retry;
pub mod sentiment;

// Re-export commonly used types
pub use cache::TtlCache;
pub use errors::{DataError, DataResult};
pub use indicators::{compute_technicals, Bar};
pub use market::MarketDataClient;
pub use news::NewsClient;
pub use rate_limit::{Permit, RateLimitStatus, RateLimits, Service};
pub use sentiment::FearGreedClient;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::time::Duration;

/// Shared HTTP client for all collectors
pub fn http_client(timeout_seconds: u64) -> DataResult<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .user_agent(concat!("cryptorag/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Five-step directional signal. The numeric value is what gets averaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalStrength {
    StrongSell = 1,
    Sell = 2,
    Neutral = 3,
    Buy = 4,
    StrongBuy = 5,
}

impl SignalStrength {
    pub fn value(&self) -> u8 {
        *self as u8
    }

    pub fn name(&self) -> &'static str {
        match self {
            SignalStrength::StrongBuy => "STRONG_BUY",
            SignalStrength::Buy => "BUY",
            SignalStrength::Neutral => "NEUTRAL",
            SignalStrength::Sell => "SELL",
            SignalStrength::StrongSell => "STRONG_SELL",
        }
    }

    pub fn from_value(value: u8) -> Self {
        match value {
            0 | 1 => SignalStrength::StrongSell,
            2 => SignalStrength::Sell,
            3 => SignalStrength::Neutral,
            4 => SignalStrength::Buy,
            _ => SignalStrength::StrongBuy,
        }
    }

    /// Snap an averaged signal value back onto the scale.
    /// Ties round to even, so 2.5 is SELL and 3.5 is BUY.
    pub fn from_average(average: f64) -> Self {
        if !average.is_finite() {
            return SignalStrength::Neutral;
        }
        let rounded = average.round_ties_even().clamp(1.0, 5.0);
        Self::from_value(rounded as u8)
    }

    pub fn is_bullish(&self) -> bool {
        matches!(self, SignalStrength::Buy | SignalStrength::StrongBuy)
    }

    pub fn is_bearish(&self) -> bool {
        matches!(self, SignalStrength::Sell | SignalStrength::StrongSell)
    }
}

impl fmt::Display for SignalStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Quality rating for data points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataQuality {
    Verified,
    Reliable,
    Uncertain,
    Unreliable,
}

impl DataQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataQuality::Verified => "verified",
            DataQuality::Reliable => "reliable",
            DataQuality::Uncertain => "uncertain",
            DataQuality::Unreliable => "unreliable",
        }
    }
}

/// How much a news item is expected to move the market
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl ImpactLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImpactLevel::Low => "low",
            ImpactLevel::Medium => "medium",
            ImpactLevel::High => "high",
            ImpactLevel::Critical => "critical",
        }
    }

    pub fn is_high_impact(&self) -> bool {
        *self >= ImpactLevel::High
    }
}

impl fmt::Display for ImpactLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Spot market snapshot for one asset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketData {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub volume_24h: f64,
    pub market_cap: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Percent
    pub change_24h: f64,
    pub change_7d: Option<f64>,
    pub circulating_supply: Option<f64>,
    pub total_supply: Option<f64>,
    pub source: String,
    pub quality: DataQuality,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl MarketData {
    pub fn signal_strength(&self) -> SignalStrength {
        if self.change_24h > 10.0 {
            SignalStrength::StrongBuy
        } else if self.change_24h > 3.0 {
            SignalStrength::Buy
        } else if self.change_24h < -10.0 {
            SignalStrength::StrongSell
        } else if self.change_24h < -3.0 {
            SignalStrength::Sell
        } else {
            SignalStrength::Neutral
        }
    }

    pub fn to_vector_metadata(&self) -> Value {
        json!({
            "symbol": self.symbol,
            "timestamp": self.timestamp.to_rfc3339(),
            "price": self.price,
            "volume_24h": self.volume_24h,
            "change_24h": self.change_24h,
            "source": self.source,
            "quality": self.quality.as_str(),
            "data_type": "market_data",
        })
    }

    pub fn to_embedding_text(&self) -> String {
        format!(
            "Cryptocurrency {} trading at ${:.2} with 24h volume of ${} and 24h change of {:.2}%. \
             Market cap: ${}. Daily range: ${:.2} - ${:.2}",
            self.symbol,
            self.price,
            format_thousands(self.volume_24h),
            self.change_24h,
            format_thousands(self.market_cap),
            self.low,
            self.high
        )
    }
}

/// News article with lexicon sentiment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub headline: String,
    pub source: String,
    pub published_at: DateTime<Utc>,
    pub url: String,
    pub content: String,
    /// -1.0 to 1.0
    pub sentiment_score: f64,
    /// 0.0 to 1.0
    pub relevance_score: f64,
    pub mentioned_coins: Vec<String>,
    pub categories: Vec<String>,
    pub impact_level: ImpactLevel,
    pub quality: DataQuality,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl NewsItem {
    pub fn signal_strength(&self) -> SignalStrength {
        let high_impact = self.impact_level.is_high_impact();
        if self.sentiment_score > 0.5 && high_impact {
            SignalStrength::StrongBuy
        } else if self.sentiment_score > 0.2 {
            SignalStrength::Buy
        } else if self.sentiment_score < -0.5 && high_impact {
            SignalStrength::StrongSell
        } else if self.sentiment_score < -0.2 {
            SignalStrength::Sell
        } else {
            SignalStrength::Neutral
        }
    }

    pub fn sentiment_label(&self) -> &'static str {
        if self.sentiment_score > 0.0 {
            "positive"
        } else if self.sentiment_score < 0.0 {
            "negative"
        } else {
            "neutral"
        }
    }

    pub fn to_vector_metadata(&self) -> Value {
        json!({
            "headline": truncate_chars(&self.headline, 100),
            "source": self.source,
            "published_at": self.published_at.to_rfc3339(),
            "sentiment_score": self.sentiment_score,
            "relevance_score": self.relevance_score,
            "impact_level": self.impact_level.as_str(),
            "mentioned_coins": self.mentioned_coins.join(","),
            "data_type": "news",
        })
    }

    pub fn to_embedding_text(&self) -> String {
        let coins_text = if self.mentioned_coins.is_empty() {
            String::new()
        } else {
            format!("Mentions: {}", self.mentioned_coins.join(", "))
        };
        format!(
            "{}. Published by {}. Sentiment: {}. Impact: {}. {}",
            self.headline,
            self.source,
            self.sentiment_label(),
            self.impact_level,
            coins_text
        )
    }
}

/// Market-wide sentiment indicators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSentiment {
    pub timestamp: DateTime<Utc>,
    /// 0-100
    pub fear_greed_index: u8,
    pub fear_greed_label: String,
    pub social_volume: Option<u64>,
    /// -1.0 to 1.0
    pub social_sentiment: Option<f64>,
    pub google_trends: Option<u8>,
    pub reddit_mentions: Option<u64>,
    pub twitter_mentions: Option<u64>,
    pub source: String,
    pub quality: DataQuality,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl MarketSentiment {
    pub fn market_mood(&self) -> &'static str {
        match self.fear_greed_index {
            0..=19 => "Extreme panic - potential buying opportunity",
            20..=39 => "Fear dominant - market cautious",
            40..=59 => "Neutral sentiment - market balanced",
            60..=79 => "Greed increasing - potential overheating",
            _ => "Extreme greed - high risk of correction",
        }
    }

    /// Extreme fear reads as a buy, extreme greed as a sell
    pub fn contrarian_signal(&self) -> SignalStrength {
        let index = self.fear_greed_index;
        if index < 20 {
            SignalStrength::StrongBuy
        } else if index > 80 {
            SignalStrength::StrongSell
        } else if index < 35 {
            SignalStrength::Buy
        } else if index > 65 {
            SignalStrength::Sell
        } else {
            SignalStrength::Neutral
        }
    }

    pub fn is_extreme(&self) -> bool {
        self.fear_greed_index < 20 || self.fear_greed_index > 80
    }

    pub fn to_vector_metadata(&self) -> Value {
        json!({
            "timestamp": self.timestamp.to_rfc3339(),
            "fear_greed_index": self.fear_greed_index,
            "fear_greed_label": self.fear_greed_label,
            "social_volume": self.social_volume.unwrap_or(0),
            "social_sentiment": self.social_sentiment.unwrap_or(0.0),
            "data_type": "sentiment",
        })
    }

    pub fn to_embedding_text(&self) -> String {
        let social_text = match self.social_volume {
            Some(volume) if volume > 0 => format!("Social volume: {} mentions. ", volume),
            _ => String::new(),
        };
        format!(
            "Market sentiment shows {} with Fear & Greed Index at {}. {}Overall market mood: {}",
            self.fear_greed_label,
            self.fear_greed_index,
            social_text,
            self.market_mood()
        )
    }
}

/// Label used by Alternative.me for a Fear & Greed value
pub fn classify_index(index: u8) -> &'static str {
    match index {
        0..=24 => "Extreme Fear",
        25..=44 => "Fear",
        45..=55 => "Neutral",
        56..=75 => "Greed",
        _ => "Extreme Greed",
    }
}

/// Technical analysis snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TechnicalIndicators {
    pub symbol: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub rsi_14: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub bollinger_upper: Option<f64>,
    pub bollinger_middle: Option<f64>,
    pub bollinger_lower: Option<f64>,
    pub sma_50: Option<f64>,
    pub sma_200: Option<f64>,
    pub ema_12: Option<f64>,
    pub ema_26: Option<f64>,
    pub volume_sma_20: Option<f64>,
    /// Average True Range
    pub atr_14: Option<f64>,
    pub support_level: Option<f64>,
    pub resistance_level: Option<f64>,
}

impl TechnicalIndicators {
    pub fn rsi_signal(&self) -> SignalStrength {
        let Some(rsi) = nonzero(self.rsi_14) else {
            return SignalStrength::Neutral;
        };
        if rsi < 30.0 {
            SignalStrength::StrongBuy
        } else if rsi < 40.0 {
            SignalStrength::Buy
        } else if rsi > 70.0 {
            SignalStrength::StrongSell
        } else if rsi > 60.0 {
            SignalStrength::Sell
        } else {
            SignalStrength::Neutral
        }
    }

    /// Golden cross / death cross reading against the current price
    pub fn ma_signal(&self, current_price: f64) -> SignalStrength {
        let (Some(sma_50), Some(sma_200)) = (nonzero(self.sma_50), nonzero(self.sma_200)) else {
            return SignalStrength::Neutral;
        };

        if sma_50 > sma_200 && current_price > sma_50 {
            SignalStrength::StrongBuy
        } else if sma_50 < sma_200 && current_price < sma_50 {
            SignalStrength::StrongSell
        } else if current_price > sma_50 {
            SignalStrength::Buy
        } else if current_price < sma_50 {
            SignalStrength::Sell
        } else {
            SignalStrength::Neutral
        }
    }

    pub fn has_rsi(&self) -> bool {
        nonzero(self.rsi_14).is_some()
    }

    pub fn has_sma_50(&self) -> bool {
        nonzero(self.sma_50).is_some()
    }
}

/// Missing and zero readings are treated alike
fn nonzero(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v != 0.0)
}

/// Whole-number rendering with thousands separators, e.g. 1234567.8 -> "1,234,568"
pub fn format_thousands(value: f64) -> String {
    let rounded = value.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded < 0.0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Validation helpers
pub mod validation {
    use super::*;

    /// Validate and normalise a ticker symbol (e.g. "btc" -> "BTC")
    pub fn validate_symbol(symbol: &str) -> DataResult<String> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(DataError::InvalidSymbol("Symbol cannot be empty".to_string()));
        }

        if symbol.len() > 10 {
            return Err(DataError::InvalidSymbol(format!(
                "{} (max 10 chars)",
                symbol
            )));
        }

        if !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(DataError::InvalidSymbol(format!(
                "{} (only letters and digits allowed)",
                symbol
            )));
        }

        Ok(symbol.to_ascii_uppercase())
    }

    pub fn validate_market_data(data: &MarketData) -> DataResult<()> {
        validate_symbol(&data.symbol)?;

        if data.price <= 0.0 {
            return Err(DataError::validation_error("price", "Price must be positive"));
        }

        if data.high <= 0.0 || data.low <= 0.0 {
            return Err(DataError::validation_error("high_low", "High and low must be positive"));
        }

        if data.volume_24h < 0.0 {
            return Err(DataError::validation_error("volume_24h", "Volume cannot be negative"));
        }

        if data.high < data.low {
            return Err(DataError::validation_error(
                "high_low",
                "High price cannot be less than low price",
            ));
        }

        Ok(())
    }

    pub fn validate_sentiment_score(score: f64) -> DataResult<()> {
        if !(-1.0..=1.0).contains(&score) {
            return Err(DataError::validation_error(
                "sentiment_score",
                "Sentiment score must be between -1.0 and 1.0",
            ));
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_from_average_rounds_half_to_even() {
        assert_eq!(SignalStrength::from_average(2.5), SignalStrength::Sell);
        assert_eq!(SignalStrength::from_average(3.5), SignalStrength::Buy);
        assert_eq!(SignalStrength::from_average(3.49), SignalStrength::Neutral);
        assert_eq!(SignalStrength::from_average(4.6), SignalStrength::StrongBuy);
        assert_eq!(SignalStrength::from_average(0.2), SignalStrength::StrongSell);
        assert_eq!(SignalStrength::from_average(9.0), SignalStrength::StrongBuy);
        assert_eq!(SignalStrength::from_average(f64::NAN), SignalStrength::Neutral);
    }

    #[test]
    fn test_price_signal_thresholds() {
        assert_eq!(market("BTC", 1.0, 10.5).signal_strength(), SignalStrength::StrongBuy);
        assert_eq!(market("BTC", 1.0, 10.0).signal_strength(), SignalStrength::Buy);
        assert_eq!(market("BTC", 1.0, 3.0).signal_strength(), SignalStrength::Neutral);
        assert_eq!(market("BTC", 1.0, -3.1).signal_strength(), SignalStrength::Sell);
        assert_eq!(market("BTC", 1.0, -10.1).signal_strength(), SignalStrength::StrongSell);
    }

    #[test]
    fn test_news_signal_requires_impact_for_strong() {
        assert_eq!(
            news("ETF approved", 0.8, ImpactLevel::High).signal_strength(),
            SignalStrength::StrongBuy
        );
        assert_eq!(
            news("Rally", 0.8, ImpactLevel::Low).signal_strength(),
            SignalStrength::Buy
        );
        assert_eq!(
            news("Hack", -0.9, ImpactLevel::Critical).signal_strength(),
            SignalStrength::StrongSell
        );
        assert_eq!(
            news("Dip", -0.3, ImpactLevel::Medium).signal_strength(),
            SignalStrength::Sell
        );
        assert_eq!(
            news("Flat", 0.2, ImpactLevel::High).signal_strength(),
            SignalStrength::Neutral
        );
    }

    #[test]
    fn test_contrarian_sentiment() {
        assert_eq!(sentiment(10).contrarian_signal(), SignalStrength::StrongBuy);
        assert_eq!(sentiment(20).contrarian_signal(), SignalStrength::Buy);
        assert_eq!(sentiment(50).contrarian_signal(), SignalStrength::Neutral);
        assert_eq!(sentiment(66).contrarian_signal(), SignalStrength::Sell);
        assert_eq!(sentiment(81).contrarian_signal(), SignalStrength::StrongSell);
        assert!(sentiment(19).is_extreme());
        assert!(!sentiment(80).is_extreme());
    }

    #[test]
    fn test_market_mood_bands() {
        assert!(sentiment(5).market_mood().starts_with("Extreme panic"));
        assert!(sentiment(39).market_mood().starts_with("Fear dominant"));
        assert!(sentiment(40).market_mood().starts_with("Neutral"));
        assert!(sentiment(79).market_mood().starts_with("Greed increasing"));
        assert!(sentiment(80).market_mood().starts_with("Extreme greed"));
    }

    #[test]
    fn test_classify_index() {
        assert_eq!(classify_index(10), "Extreme Fear");
        assert_eq!(classify_index(30), "Fear");
        assert_eq!(classify_index(50), "Neutral");
        assert_eq!(classify_index(70), "Greed");
        assert_eq!(classify_index(90), "Extreme Greed");
    }

    #[test]
    fn test_rsi_signal() {
        let mut t = TechnicalIndicators::default();
        assert_eq!(t.rsi_signal(), SignalStrength::Neutral);
        t.rsi_14 = Some(0.0);
        assert_eq!(t.rsi_signal(), SignalStrength::Neutral);
        t.rsi_14 = Some(25.0);
        assert_eq!(t.rsi_signal(), SignalStrength::StrongBuy);
        t.rsi_14 = Some(35.0);
        assert_eq!(t.rsi_signal(), SignalStrength::Buy);
        t.rsi_14 = Some(65.0);
        assert_eq!(t.rsi_signal(), SignalStrength::Sell);
        t.rsi_14 = Some(75.0);
        assert_eq!(t.rsi_signal(), SignalStrength::StrongSell);
    }

    #[test]
    fn test_ma_signal_crosses() {
        let golden = TechnicalIndicators {
            sma_50: Some(110.0),
            sma_200: Some(100.0),
            ..Default::default()
        };
        assert_eq!(golden.ma_signal(120.0), SignalStrength::StrongBuy);
        assert_eq!(golden.ma_signal(105.0), SignalStrength::Sell);

        let death = TechnicalIndicators {
            sma_50: Some(90.0),
            sma_200: Some(100.0),
            ..Default::default()
        };
        assert_eq!(death.ma_signal(80.0), SignalStrength::StrongSell);
        assert_eq!(death.ma_signal(95.0), SignalStrength::Buy);

        let partial = TechnicalIndicators {
            sma_50: Some(90.0),
            ..Default::default()
        };
        assert_eq!(partial.ma_signal(95.0), SignalStrength::Neutral);
    }

    #[test]
    fn test_embedding_texts() {
        let m = market("BTC", 50_000.0, 2.5);
        let text = m.to_embedding_text();
        assert!(text.starts_with("Cryptocurrency BTC trading at $50000.00"));
        assert!(text.contains("24h volume of $1,234,567"));
        assert!(text.contains("24h change of 2.50%"));

        let n = news("Bitcoin surges", 1.0, ImpactLevel::Low);
        assert_eq!(
            n.to_embedding_text(),
            "Bitcoin surges. Published by CoinDesk. Sentiment: positive. Impact: low. Mentions: BTC"
        );

        let mut s = sentiment(15);
        s.social_volume = Some(1200);
        let text = s.to_embedding_text();
        assert!(text.contains("Extreme Fear with Fear & Greed Index at 15"));
        assert!(text.contains("Social volume: 1200 mentions."));
    }

    #[test]
    fn test_vector_metadata_tags() {
        let long = "x".repeat(150);
        let meta = news(&long, 0.0, ImpactLevel::Medium).to_vector_metadata();
        assert_eq!(meta["data_type"], "news");
        assert_eq!(meta["headline"].as_str().unwrap().len(), 100);
        assert_eq!(meta["impact_level"], "medium");

        assert_eq!(market("ETH", 3000.0, 0.0).to_vector_metadata()["data_type"], "market_data");
        assert_eq!(sentiment(50).to_vector_metadata()["social_volume"], 0);
    }

    #[test]
    fn test_format_thousands() {
        assert_eq!(format_thousands(0.0), "0");
        assert_eq!(format_thousands(999.4), "999");
        assert_eq!(format_thousands(1000.0), "1,000");
        assert_eq!(format_thousands(1_234_567.8), "1,234,568");
        assert_eq!(format_thousands(-12_345.0), "-12,345");
    }

    #[test]
    fn test_symbol_validation() {
        assert_eq!(validation::validate_symbol(" btc ").unwrap(), "BTC");
        assert!(validation::validate_symbol("").is_err());
        assert!(validation::validate_symbol("X:BTCUSD").is_err());
        assert!(validation::validate_symbol("ABCDEFGHIJK").is_err());
    }

    #[test]
    fn test_market_validation() {
        let mut m = market("SOL", 150.0, 1.0);
        assert!(validation::validate_market_data(&m).is_ok());
        m.high = 1.0;
        m.low = 2.0;
        assert!(validation::validate_market_data(&m).is_err());
        assert!(validation::validate_sentiment_score(1.5).is_err());
    }
}
