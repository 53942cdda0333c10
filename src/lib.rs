// cryptorag - multi-source crypto signal collection
// Collects market data, news and Fear & Greed sentiment, combines them into weighted
// trading signals, and optionally grounds LLM analysis in a local vector index.

#![deny(clippy::unwrap_used)]

pub mod config;
pub mod data;
pub mod db;
pub mod embeddings;
pub mod llm;
pub mod memory;
pub mod orchestrator;
pub mod trading;
pub mod vector;

// Re-export commonly used items
pub use config::Config;
pub use data::{DataError, DataResult, MarketData, MarketSentiment, NewsItem, SignalStrength};
pub use orchestrator::CryptoDataPipeline;
pub use trading::CombinedSignal;
