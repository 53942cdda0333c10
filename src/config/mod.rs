use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::trading::RiskLevel;

/// Upper bound for MAX_RETRIES
pub const MAX_RETRIES_LIMIT: u32 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub apis: ApiConfig,
    pub endpoints: EndpointConfig,
    pub collection: CollectionConfig,
    pub cache: CacheConfig,
    pub llm: LlmConfig,
    pub trading: TradingConfig,
    pub storage: StorageConfig,
    pub log_level: String,
}

/// Keys are skipped when the config is serialized
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(skip_serializing)]
    pub polygon_api_key: Option<String>,
    #[serde(skip_serializing)]
    pub cryptocompare_api_key: Option<String>,
    #[serde(skip_serializing)]
    pub openai_api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub polygon: String,
    pub coingecko: String,
    pub cryptocompare: String,
    pub alternative: String,
    pub openai: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub default_symbols: Vec<String>,
    pub update_interval_secs: u64,
    pub max_retries: u32,
    pub timeout_seconds: u64,
    pub max_concurrent_requests: usize,
    pub technicals_lookback_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub market_ttl_secs: u64,
    pub news_ttl_secs: u64,
    pub sentiment_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    /// Used for "think harder" analysis
    pub advanced_model: String,
    pub embedding_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    pub min_confidence: f64,
    pub max_risk_level: RiskLevel,
    /// Informational only, no orders are ever placed
    pub paper_trading: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    #[serde(skip_serializing)]
    pub database_url: Option<String>,
}

/// Parse an env var, falling back to `default` when it is unset
fn env_or<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse()
        .with_context(|| format!("Invalid {} value", key))
}

/// Unset and blank values both count as missing
fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub fn parse_symbols(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_ascii_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file - this sets env vars that aren't already set
        dotenv::dotenv().ok();

        let defaults = Config::default();

        let max_risk_level = env::var("MAX_RISK_LEVEL").unwrap_or_else(|_| "high".to_string());
        let max_risk_level = RiskLevel::from_str(&max_risk_level)
            .with_context(|| format!("Invalid MAX_RISK_LEVEL value: {}", max_risk_level))?;

        let config = Config {
            apis: ApiConfig {
                polygon_api_key: optional_env("POLYGON_API_KEY"),
                cryptocompare_api_key: optional_env("CRYPTOCOMPARE_API_KEY"),
                openai_api_key: optional_env("OPENAI_API_KEY"),
            },
            endpoints: EndpointConfig {
                polygon: env::var("POLYGON_BASE_URL").unwrap_or(defaults.endpoints.polygon),
                coingecko: env::var("COINGECKO_BASE_URL").unwrap_or(defaults.endpoints.coingecko),
                cryptocompare: env::var("CRYPTOCOMPARE_BASE_URL")
                    .unwrap_or(defaults.endpoints.cryptocompare),
                alternative: env::var("ALTERNATIVE_BASE_URL")
                    .unwrap_or(defaults.endpoints.alternative),
                openai: env::var("OPENAI_API_BASE").unwrap_or(defaults.endpoints.openai),
            },
            collection: CollectionConfig {
                default_symbols: parse_symbols(
                    &env::var("DEFAULT_SYMBOLS").unwrap_or_else(|_| "BTC,ETH,SOL".to_string()),
                ),
                update_interval_secs: env_or("DATA_UPDATE_INTERVAL", "300")?,
                max_retries: env_or("MAX_RETRIES", "3")?,
                timeout_seconds: env_or("TIMEOUT", "30")?,
                max_concurrent_requests: env_or("MAX_CONCURRENT_REQUESTS", "10")?,
                technicals_lookback_days: env_or("TECHNICALS_LOOKBACK_DAYS", "250")?,
            },
            cache: CacheConfig {
                market_ttl_secs: env_or("MARKET_CACHE_TTL", "300")?,
                news_ttl_secs: env_or("NEWS_CACHE_TTL", "1800")?,
                sentiment_ttl_secs: env_or("SENTIMENT_CACHE_TTL", "3600")?,
            },
            llm: LlmConfig {
                model: env::var("LLM_MODEL").unwrap_or(defaults.llm.model),
                advanced_model: env::var("LLM_ADVANCED_MODEL")
                    .unwrap_or(defaults.llm.advanced_model),
                embedding_model: env::var("EMBEDDING_MODEL")
                    .unwrap_or(defaults.llm.embedding_model),
                max_tokens: env_or("MAX_TOKENS", "2000")?,
                temperature: env_or("TEMPERATURE", "0.7")?,
            },
            trading: TradingConfig {
                min_confidence: env_or("MIN_CONFIDENCE", "0.7")?,
                max_risk_level,
                paper_trading: env::var("PAPER_TRADING")
                    .unwrap_or_else(|_| "true".to_string())
                    .parse()
                    .context("Invalid PAPER_TRADING value (use true/false)")?,
            },
            storage: StorageConfig {
                data_dir: env::var("DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.data_dir),
                database_url: optional_env("DATABASE_URL"),
            },
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        };

        Ok(config)
    }

    /// Check every setting, reporting all problems at once.
    /// Creates the data directory when it is missing.
    pub fn validate(&self) -> Result<()> {
        let mut issues = Vec::new();

        if self.apis.polygon_api_key.is_none() {
            tracing::warn!("POLYGON_API_KEY not set, market data falls back to CoinGecko");
        }

        if !(0.0..=1.0).contains(&self.trading.min_confidence) {
            issues.push("MIN_CONFIDENCE must be between 0 and 1".to_string());
        }

        if self.collection.default_symbols.is_empty() {
            issues.push("DEFAULT_SYMBOLS cannot be empty".to_string());
        }

        if self.collection.update_interval_secs == 0 {
            issues.push("DATA_UPDATE_INTERVAL must be positive".to_string());
        }

        if !(1..=MAX_RETRIES_LIMIT).contains(&self.collection.max_retries) {
            issues.push(format!("MAX_RETRIES must be between 1 and {}", MAX_RETRIES_LIMIT));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            issues.push("TEMPERATURE must be between 0 and 2".to_string());
        }

        if !issues.is_empty() {
            bail!("Configuration validation failed: {}", issues.join("; "));
        }

        std::fs::create_dir_all(&self.storage.data_dir).with_context(|| {
            format!(
                "Failed to create data directory {}",
                self.storage.data_dir.display()
            )
        })?;

        Ok(())
    }

    pub fn has_ai(&self) -> bool {
        self.apis.openai_api_key.is_some()
    }

    pub fn memory_path(&self) -> PathBuf {
        self.storage.data_dir.join("memory.json")
    }

    pub fn knowledge_path(&self) -> PathBuf {
        self.storage.data_dir.join("vector_db").join("knowledge.json")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            apis: ApiConfig::default(),
            endpoints: EndpointConfig {
                polygon: "https://api.polygon.io".to_string(),
                coingecko: "https://api.coingecko.com/api/v3".to_string(),
                cryptocompare: "https://min-api.cryptocompare.com".to_string(),
                alternative: "https://api.alternative.me".to_string(),
                openai: "https://api.openai.com/v1".to_string(),
            },
            collection: CollectionConfig {
                default_symbols: vec!["BTC".to_string(), "ETH".to_string(), "SOL".to_string()],
                update_interval_secs: 300,
                max_retries: 3,
                timeout_seconds: 30,
                max_concurrent_requests: 10,
                technicals_lookback_days: 250,
            },
            cache: CacheConfig {
                market_ttl_secs: 300,
                news_ttl_secs: 1800,
                sentiment_ttl_secs: 3600,
            },
            llm: LlmConfig {
                model: "gpt-3.5-turbo".to_string(),
                advanced_model: "gpt-4o".to_string(),
                embedding_model: "text-embedding-ada-002".to_string(),
                max_tokens: 2000,
                temperature: 0.7,
            },
            trading: TradingConfig {
                min_confidence: 0.7,
                max_risk_level: RiskLevel::High,
                paper_trading: true,
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("./crypto_data"),
                database_url: None,
            },
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_symbols() {
        assert_eq!(parse_symbols("btc, eth,,SOL "), vec!["BTC", "ETH", "SOL"]);
        assert!(parse_symbols(" , ").is_empty());
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.collection.default_symbols, vec!["BTC", "ETH", "SOL"]);
        assert_eq!(config.cache.news_ttl_secs, 1800);
        assert_eq!(config.trading.max_risk_level, RiskLevel::High);
        assert!(!config.has_ai());
        assert!(config.knowledge_path().ends_with("vector_db/knowledge.json"));
    }

    #[test]
    fn test_validate_collects_all_issues() {
        let mut config = Config::default();
        config.trading.min_confidence = 1.5;
        config.collection.default_symbols.clear();
        config.collection.max_retries = 0;
        config.llm.temperature = 3.0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("MIN_CONFIDENCE"));
        assert!(err.contains("DEFAULT_SYMBOLS"));
        assert!(err.contains("MAX_RETRIES"));
        assert!(err.contains("TEMPERATURE"));
        assert!(!err.contains("DATA_UPDATE_INTERVAL"));
    }

    #[test]
    fn test_validate_rejects_excessive_retries() {
        let mut config = Config::default();
        config.collection.max_retries = 100;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("MAX_RETRIES must be between 1 and 10"));
    }

    #[test]
    fn test_validate_creates_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = dir.path().join("nested").join("data");

        config.validate().unwrap();
        assert!(config.storage.data_dir.is_dir());
    }

    #[test]
    fn test_keys_not_serialized() {
        let mut config = Config::default();
        config.apis.polygon_api_key = Some("secret".to_string());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
