#![allow(dead_code)]

use chrono::Utc;
use cryptorag::data::{classify_index, DataQuality, MarketData, MarketSentiment};
use cryptorag::Config;
use futures::FutureExt;
use mockito::{Server, ServerGuard};
use serde_json::Map;
use std::panic::AssertUnwindSafe;

/// Start a mock server, or None when the sandbox refuses to bind one
pub async fn start_mock_server(test_name: &str) -> Option<ServerGuard> {
    match AssertUnwindSafe(Server::new_async()).catch_unwind().await {
        Ok(server) => Some(server),
        Err(_) => {
            eprintln!("skipping {test_name} - unable to start mock server");
            None
        }
    }
}

/// Config with every endpoint pointed at `server` and a scratch data dir
pub fn config_for(server: &ServerGuard, data_dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.endpoints.polygon = server.url();
    config.endpoints.coingecko = server.url();
    config.endpoints.cryptocompare = server.url();
    config.endpoints.alternative = server.url();
    config.endpoints.openai = server.url();
    config.collection.max_retries = 1;
    config.collection.timeout_seconds = 5;
    config.storage.data_dir = data_dir.to_path_buf();
    config
}

/// Postgres URL for integration tests; None skips them
pub fn database_url() -> Option<String> {
    match std::env::var("DATABASE_URL") {
        Ok(url) if !url.trim().is_empty() => Some(url),
        _ => {
            eprintln!("DATABASE_URL not set, skipping database test");
            None
        }
    }
}

pub fn market(symbol: &str, price: f64, change_24h: f64) -> MarketData {
    MarketData {
        symbol: symbol.to_string(),
        timestamp: Utc::now(),
        price,
        volume_24h: 1_000_000.0,
        market_cap: 0.0,
        open: price,
        high: price,
        low: price,
        close: price,
        change_24h,
        change_7d: None,
        circulating_supply: None,
        total_supply: None,
        source: "coingecko".to_string(),
        quality: DataQuality::Reliable,
        metadata: Map::new(),
    }
}

pub fn sentiment(index: u8) -> MarketSentiment {
    MarketSentiment {
        timestamp: Utc::now(),
        fear_greed_index: index,
        fear_greed_label: classify_index(index).to_string(),
        social_volume: None,
        social_sentiment: None,
        google_trends: None,
        reddit_mentions: None,
        twitter_mentions: None,
        source: "alternative.me".to_string(),
        quality: DataQuality::Reliable,
        metadata: Map::new(),
    }
}
