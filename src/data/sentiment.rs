use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{classify_index, DataError, DataQuality, DataResult, MarketSentiment};
use crate::config::Config;

/// Alternative.me serves every field as a string
#[derive(Debug, Deserialize)]
struct FearGreedResponse {
    #[serde(default)]
    data: Vec<FearGreedEntry>,
    metadata: Option<FearGreedMetadata>,
}

#[derive(Debug, Deserialize)]
struct FearGreedEntry {
    value: String,
    value_classification: Option<String>,
    timestamp: Option<String>,
    time_until_update: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FearGreedMetadata {
    error: Option<String>,
}

/// Alternative.me Fear & Greed Index client
pub struct FearGreedClient {
    client: reqwest::Client,
    base_url: String,
    max_retries: usize,
}

impl FearGreedClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, max_retries: usize) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_retries,
        }
    }

    pub fn from_config(client: reqwest::Client, config: &Config) -> Self {
        Self::new(
            client,
            &config.endpoints.alternative,
            config.collection.max_retries as usize,
        )
    }

    /// Current index reading
    pub async fn fetch_fear_greed(&self) -> DataResult<MarketSentiment> {
        tracing::info!("Fetching Fear & Greed Index");
        let entries = self.fetch_entries(1).await?;
        let entry = entries
            .into_iter()
            .next()
            .ok_or_else(|| DataError::no_data("market", "fear_greed", "now"))?;

        let sentiment = to_sentiment(entry)?;
        tracing::info!(
            "Fear & Greed Index: {} ({})",
            sentiment.fear_greed_index,
            sentiment.fear_greed_label
        );
        Ok(sentiment)
    }

    /// Last `limit` daily readings, newest first
    pub async fn fetch_history(&self, limit: usize) -> DataResult<Vec<MarketSentiment>> {
        let entries = self.fetch_entries(limit.max(1)).await?;
        entries.into_iter().map(to_sentiment).collect()
    }

    async fn fetch_entries(&self, limit: usize) -> DataResult<Vec<FearGreedEntry>> {
        use super::retry::retry_with_backoff;

        let url = format!("{}/fng/", self.base_url);
        let limit = limit.to_string();

        let response: FearGreedResponse = retry_with_backoff(
            || async {
                let response = self
                    .client
                    .get(&url)
                    .query(&[("limit", limit.as_str())])
                    .send()
                    .await?;

                if !response.status().is_success() {
                    return Err(DataError::from_response("Alternative.me", response).await);
                }

                Ok(response.json::<FearGreedResponse>().await?)
            },
            self.max_retries,
        )
        .await?;

        if let Some(error) = response.metadata.and_then(|m| m.error) {
            return Err(DataError::api_error(200, format!("Alternative.me: {}", error)));
        }

        Ok(response.data)
    }
}

fn to_sentiment(entry: FearGreedEntry) -> DataResult<MarketSentiment> {
    let raw: u16 = entry
        .value
        .trim()
        .parse()
        .map_err(|_| DataError::parse_error(format!("Invalid Fear & Greed value: {}", entry.value)))?;
    let index = raw.min(100) as u8;

    let label = entry
        .value_classification
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| classify_index(index).to_string());

    let timestamp = entry
        .timestamp
        .as_deref()
        .and_then(|t| t.parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now);

    let mut metadata = Map::new();
    if let Some(until) = entry.time_until_update {
        metadata.insert("time_until_update".to_string(), Value::String(until));
    }

    Ok(MarketSentiment {
        timestamp,
        fear_greed_index: index,
        fear_greed_label: label,
        social_volume: None,
        social_sentiment: None,
        google_trends: None,
        reddit_mentions: None,
        twitter_mentions: None,
        source: "alternative.me".to_string(),
        quality: DataQuality::Reliable,
        metadata,
    })
}
