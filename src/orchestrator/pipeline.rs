//! Multi-source collection pipeline
//! Coordinates market data, news, sentiment and technicals into one signal per symbol

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::data::validation::validate_symbol;
use crate::data::{
    compute_technicals, http_client, DataResult, FearGreedClient, MarketData, MarketDataClient,
    MarketSentiment, NewsClient, NewsItem, RateLimitStatus, RateLimits, Service,
    TechnicalIndicators, TtlCache,
};
use crate::trading::CombinedSignal;

/// Symbol fetched by health checks
const HEALTH_CHECK_SYMBOL: &str = "BTC";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    NotConfigured,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceHealth {
    fn from_result<T>(result: DataResult<T>) -> Self {
        match result {
            Ok(_) => Self {
                status: HealthStatus::Healthy,
                error: None,
            },
            Err(e) => Self {
                status: HealthStatus::Unhealthy,
                error: Some(e.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub market_data: usize,
    pub news: usize,
    pub sentiment: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub timestamp: DateTime<Utc>,
    pub sources: BTreeMap<&'static str, SourceHealth>,
    pub cache: CacheStats,
    pub rate_limits: Vec<RateLimitStatus>,
}

impl HealthReport {
    pub fn all_healthy(&self) -> bool {
        self.sources
            .values()
            .all(|s| s.status != HealthStatus::Unhealthy)
    }
}

pub struct CryptoDataPipeline {
    config: Config,
    market: MarketDataClient,
    news: NewsClient,
    fear_greed: FearGreedClient,
    limits: RateLimits,
    market_cache: TtlCache<String, MarketData>,
    news_cache: TtlCache<String, Vec<NewsItem>>,
    sentiment_cache: TtlCache<(), MarketSentiment>,
}

impl CryptoDataPipeline {
    pub fn new(config: Config) -> DataResult<Self> {
        let client = http_client(config.collection.timeout_seconds)?;

        let pipeline = Self {
            market: MarketDataClient::from_config(client.clone(), &config),
            news: NewsClient::from_config(client.clone(), &config),
            fear_greed: FearGreedClient::from_config(client, &config),
            limits: RateLimits::new(),
            market_cache: TtlCache::new(Duration::from_secs(config.cache.market_ttl_secs)),
            news_cache: TtlCache::new(Duration::from_secs(config.cache.news_ttl_secs)),
            sentiment_cache: TtlCache::new(Duration::from_secs(config.cache.sentiment_ttl_secs)),
            config,
        };

        info!(
            polygon = pipeline.market.has_polygon_key(),
            "Crypto data pipeline initialized"
        );
        Ok(pipeline)
    }

    /// Replace the default free-tier budgets
    pub fn with_rate_limits(mut self, limits: RateLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Collect every source for each symbol and combine into signals.
    /// Output order follows input order; invalid symbols are skipped.
    pub async fn collect_all_data(&self, symbols: &[String]) -> Vec<CombinedSignal> {
        let valid: Vec<String> = symbols
            .iter()
            .filter_map(|symbol| match validate_symbol(symbol) {
                Ok(symbol) => Some(symbol),
                Err(e) => {
                    warn!("Skipping symbol: {}", e);
                    None
                }
            })
            .collect();

        if valid.is_empty() {
            warn!("No valid symbols to collect");
            return Vec::new();
        }

        info!("Collecting data for {} symbols: {}", valid.len(), valid.join(", "));

        // Fear & Greed is market-wide, fetch it once for the whole batch
        let sentiment = self.collect_sentiment().await;

        let concurrency = self.config.collection.max_concurrent_requests.max(1);
        let signals: Vec<CombinedSignal> = stream::iter(valid)
            .map(|symbol| self.collect_symbol(symbol, sentiment.clone()))
            .buffered(concurrency)
            .collect()
            .await;

        info!("Collection complete: {} signals", signals.len());
        signals
    }

    async fn collect_symbol(
        &self,
        symbol: String,
        sentiment: Option<MarketSentiment>,
    ) -> CombinedSignal {
        let (market_data, news_items, technicals) = tokio::join!(
            self.collect_market_data(&symbol),
            self.collect_news(&symbol),
            self.collect_technicals(&symbol),
        );

        let signal =
            CombinedSignal::from_components(symbol, market_data, news_items, sentiment, technicals);
        info!(
            symbol = %signal.symbol,
            signal = %signal.overall_signal,
            confidence = signal.confidence,
            risk = %signal.risk_level,
            "Signal generated"
        );
        signal
    }

    /// Polygon first, CoinGecko as fallback, then the last cached value
    pub async fn collect_market_data(&self, symbol: &str) -> Option<MarketData> {
        if self.market.has_polygon_key() {
            match self.limits.try_acquire(Service::Polygon) {
                Some(permit) => match self.market.fetch_polygon_previous(symbol).await {
                    Ok(data) => {
                        permit.commit();
                        self.market_cache.insert(symbol.to_string(), data.clone()).await;
                        return Some(data);
                    }
                    Err(e) => warn!("Polygon.io failed for {}: {}", symbol, e),
                },
                None => warn!("Polygon.io rate limit reached, skipping for {}", symbol),
            }
        }

        match self.limits.try_acquire(Service::CoinGecko) {
            Some(permit) => match self.market.fetch_coingecko(symbol).await {
                Ok(data) => {
                    permit.commit();
                    self.market_cache.insert(symbol.to_string(), data.clone()).await;
                    return Some(data);
                }
                Err(e) => warn!("CoinGecko failed for {}: {}", symbol, e),
            },
            None => warn!("CoinGecko rate limit reached, skipping for {}", symbol),
        }

        let cached = self.market_cache.get(&symbol.to_string()).await;
        match &cached {
            Some(_) => info!("Using cached market data for {}", symbol),
            None => error!("No market data available for {}", symbol),
        }
        cached
    }

    /// Cached headlines are served before any request
    pub async fn collect_news(&self, symbol: &str) -> Vec<NewsItem> {
        let key = symbol.to_string();
        if let Some(items) = self.news_cache.get(&key).await {
            return items;
        }

        let Some(permit) = self.limits.try_acquire(Service::CryptoCompare) else {
            warn!("CryptoCompare rate limit reached, no news for {}", symbol);
            return Vec::new();
        };

        match self.news.fetch_news(symbol).await {
            Ok(items) => {
                permit.commit();
                self.news_cache.insert(key, items.clone()).await;
                items
            }
            Err(e) => {
                warn!("News collection failed for {}: {}", symbol, e);
                Vec::new()
            }
        }
    }

    pub async fn collect_sentiment(&self) -> Option<MarketSentiment> {
        if let Some(sentiment) = self.sentiment_cache.get(&()).await {
            return Some(sentiment);
        }

        let Some(permit) = self.limits.try_acquire(Service::Alternative) else {
            warn!("Alternative.me rate limit reached, no sentiment this cycle");
            return None;
        };

        match self.fear_greed.fetch_fear_greed().await {
            Ok(sentiment) => {
                permit.commit();
                self.sentiment_cache.insert((), sentiment.clone()).await;
                Some(sentiment)
            }
            Err(e) => {
                warn!("Sentiment collection failed: {}", e);
                None
            }
        }
    }

    /// Indicators from Polygon daily bars; needs a key and budget
    pub async fn collect_technicals(&self, symbol: &str) -> Option<TechnicalIndicators> {
        if !self.market.has_polygon_key() {
            return None;
        }

        let Some(permit) = self.limits.try_acquire(Service::Polygon) else {
            warn!("Polygon.io rate limit reached, no technicals for {}", symbol);
            return None;
        };

        let days = self.config.collection.technicals_lookback_days;
        match self.market.fetch_daily_bars(symbol, days).await {
            Ok(bars) => {
                permit.commit();
                Some(compute_technicals(symbol, &bars))
            }
            Err(e) => {
                warn!("Technicals unavailable for {}: {}", symbol, e);
                None
            }
        }
    }

    /// Hit each source directly, bypassing caches and budgets
    pub async fn health_check(&self) -> HealthReport {
        let mut sources = BTreeMap::new();

        let polygon = if self.market.has_polygon_key() {
            SourceHealth::from_result(self.market.fetch_polygon_previous(HEALTH_CHECK_SYMBOL).await)
        } else {
            SourceHealth {
                status: HealthStatus::NotConfigured,
                error: None,
            }
        };
        sources.insert(Service::Polygon.as_str(), polygon);
        sources.insert(
            Service::CoinGecko.as_str(),
            SourceHealth::from_result(self.market.fetch_coingecko(HEALTH_CHECK_SYMBOL).await),
        );
        sources.insert(
            Service::Alternative.as_str(),
            SourceHealth::from_result(self.fear_greed.fetch_fear_greed().await),
        );

        HealthReport {
            timestamp: Utc::now(),
            sources,
            cache: CacheStats {
                market_data: self.market_cache.len().await,
                news: self.news_cache.len().await,
                sentiment: self.sentiment_cache.len().await,
            },
            rate_limits: self.limits.snapshot(),
        }
    }

    pub fn reset_rate_limits(&self) {
        self.limits.reset_all();
        info!("Rate limits reset");
    }

    pub fn rate_limit_snapshot(&self) -> Vec<RateLimitStatus> {
        self.limits.snapshot()
    }

    /// Collect every `interval` until Ctrl-C
    pub async fn run_periodic<F, Fut>(
        &self,
        symbols: &[String],
        interval: Duration,
        sink: F,
    ) -> usize
    where
        F: FnMut(Vec<CombinedSignal>) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        };
        self.run_until(symbols, interval, sink, shutdown).await
    }

    /// Periodic loop that stops when `shutdown` resolves. Returns completed cycles.
    pub async fn run_until<F, Fut, S>(
        &self,
        symbols: &[String],
        interval: Duration,
        mut sink: F,
        shutdown: S,
    ) -> usize
    where
        F: FnMut(Vec<CombinedSignal>) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
        S: Future<Output = ()>,
    {
        info!(
            "Starting periodic collection every {}s for {}",
            interval.as_secs(),
            symbols.join(", ")
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut cycles = 0;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping periodic collection");
                    break;
                }
                _ = ticker.tick() => {
                    let signals = self.collect_all_data(symbols).await;
                    cycles += 1;
                    if let Err(e) = sink(signals).await {
                        error!("Collection cycle {} failed: {:#}", cycles, e);
                    }
                }
            }
        }

        cycles
    }
}
