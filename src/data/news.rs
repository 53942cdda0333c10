use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Map;

use super::{truncate_chars, DataError, DataQuality, DataResult, ImpactLevel, NewsItem};
use crate::config::Config;

/// Lexicon-based sentiment keywords (simple approach)
const POSITIVE_WORDS: &[&str] = &[
    "bullish", "surge", "rally", "gain", "rise", "up", "high", "positive", "growth", "increase",
    "soar", "moon", "breakthrough",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bearish", "crash", "fall", "drop", "down", "low", "negative", "decline", "decrease", "plunge",
    "dump", "correction", "fear",
];

const HIGH_IMPACT_WORDS: &[&str] = &[
    "regulation", "sec", "government", "ban", "legal", "hack", "bankruptcy", "collapse", "etf",
    "institutional", "billion",
];

const MEDIUM_IMPACT_WORDS: &[&str] = &["million", "partnership", "upgrade"];

const MAX_ARTICLES: usize = 10;
const MAX_CONTENT_CHARS: usize = 500;

#[derive(Debug, Deserialize)]
struct CryptoCompareResponse {
    #[serde(rename = "Data", default)]
    data: Vec<CryptoCompareArticle>,
    #[serde(rename = "Message", default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CryptoCompareArticle {
    title: String,
    published_on: i64,
    #[serde(default)]
    url: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    categories: String,
    source_info: Option<SourceInfo>,
}

#[derive(Debug, Deserialize)]
struct SourceInfo {
    name: Option<String>,
}

/// Score text from -1 (all negative keywords) to +1 (all positive keywords).
/// Keywords match as substrings of the lowercased text.
pub fn analyze_sentiment(text: &str) -> f64 {
    let text = text.to_lowercase();
    let positive = POSITIVE_WORDS.iter().filter(|w| text.contains(*w)).count();
    let negative = NEGATIVE_WORDS.iter().filter(|w| text.contains(*w)).count();

    let total = positive + negative;
    if total == 0 {
        return 0.0;
    }
    (positive as f64 - negative as f64) / total as f64
}

pub fn assess_impact(headline: &str) -> ImpactLevel {
    let headline = headline.to_lowercase();
    if HIGH_IMPACT_WORDS.iter().any(|w| headline.contains(w)) {
        ImpactLevel::High
    } else if MEDIUM_IMPACT_WORDS.iter().any(|w| headline.contains(w)) {
        ImpactLevel::Medium
    } else {
        ImpactLevel::Low
    }
}

/// CryptoCompare news client (free tier)
pub struct NewsClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    max_retries: usize,
}

impl NewsClient {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        max_retries: usize,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            max_retries,
        }
    }

    pub fn from_config(client: reqwest::Client, config: &Config) -> Self {
        Self::new(
            client,
            &config.endpoints.cryptocompare,
            config.apis.cryptocompare_api_key.clone(),
            config.collection.max_retries as usize,
        )
    }

    /// Latest headlines tagged with `symbol`
    pub async fn fetch_news(&self, symbol: &str) -> DataResult<Vec<NewsItem>> {
        use super::retry::retry_with_backoff;

        tracing::info!("Fetching news for: {}", symbol);
        let url = format!("{}/data/v2/news/", self.base_url);

        let response: CryptoCompareResponse = retry_with_backoff(
            || async {
                let mut request = self
                    .client
                    .get(&url)
                    .query(&[("lang", "EN"), ("categories", symbol)]);
                if let Some(key) = &self.api_key {
                    request = request.header("authorization", format!("Apikey {}", key));
                }

                let response = request.send().await?;
                if !response.status().is_success() {
                    return Err(DataError::from_response("CryptoCompare", response).await);
                }

                Ok(response.json::<CryptoCompareResponse>().await?)
            },
            self.max_retries,
        )
        .await?;

        if response.data.is_empty() {
            tracing::warn!(
                "CryptoCompare returned no articles for {}: {}",
                symbol,
                response.message.as_deref().unwrap_or("no message")
            );
        }

        let upper_symbol = symbol.to_ascii_uppercase();
        let items: Vec<NewsItem> = response
            .data
            .into_iter()
            .take(MAX_ARTICLES)
            .map(|article| {
                let published_at =
                    DateTime::from_timestamp(article.published_on, 0).unwrap_or_else(Utc::now);
                let relevance_score = if article.title.to_ascii_uppercase().contains(&upper_symbol) {
                    0.8
                } else {
                    0.5
                };

                NewsItem {
                    sentiment_score: analyze_sentiment(&article.title),
                    impact_level: assess_impact(&article.title),
                    relevance_score,
                    source: article
                        .source_info
                        .and_then(|s| s.name)
                        .unwrap_or_else(|| "Unknown".to_string()),
                    published_at,
                    url: article.url,
                    content: truncate_chars(&article.body, MAX_CONTENT_CHARS),
                    categories: article
                        .categories
                        .split('|')
                        .filter(|c| !c.is_empty())
                        .map(String::from)
                        .collect(),
                    mentioned_coins: vec![upper_symbol.clone()],
                    headline: article.title,
                    quality: DataQuality::Reliable,
                    metadata: Map::new(),
                }
            })
            .collect();

        tracing::info!("Fetched {} news articles for {}", items.len(), symbol);
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    #[test]
    fn test_sentiment_lexicon() {
        assert_eq!(analyze_sentiment("Bitcoin rally continues"), 1.0);
        assert_eq!(analyze_sentiment("Markets crash as fear spreads"), -1.0);
        assert_eq!(analyze_sentiment("Analysts meet in Lisbon"), 0.0);
        // "surge" positive, "correction" negative
        assert_eq!(analyze_sentiment("Surge ends in correction"), 0.0);
    }

    #[test]
    fn test_sentiment_matches_substrings() {
        // "upgrade" contains "up"
        assert_eq!(analyze_sentiment("Network upgrade scheduled"), 1.0);
    }

    #[test]
    fn test_impact_assessment() {
        assert_eq!(assess_impact("SEC delays spot ETF decision"), ImpactLevel::High);
        assert_eq!(assess_impact("Exchange announces partnership"), ImpactLevel::Medium);
        assert_eq!(assess_impact("Weekly market recap"), ImpactLevel::Low);
    }

    #[tokio::test]
    async fn test_fetch_news_maps_articles() {
        let mut server = Server::new_async().await;
        let articles: Vec<_> = (0..12)
            .map(|i| {
                json!({
                    "id": i.to_string(),
                    "published_on": 1_700_000_000 + i,
                    "title": if i == 0 { "BTC rally lifts market".to_string() } else { format!("Story {}", i) },
                    "url": format!("https://news.example/{}", i),
                    "body": "b".repeat(800),
                    "categories": "BTC|Market",
                    "source_info": {"name": "CoinDesk"}
                })
            })
            .collect();

        let mock = server
            .mock("GET", "/data/v2/news/")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("lang".into(), "EN".into()),
                Matcher::UrlEncoded("categories".into(), "BTC".into()),
            ]))
            .match_header("authorization", "Apikey secret")
            .with_status(200)
            .with_body(json!({"Type": 100, "Message": "ok", "Data": articles}).to_string())
            .create_async()
            .await;

        let client = NewsClient::new(reqwest::Client::new(), server.url(), Some("secret".into()), 1);
        let items = client.fetch_news("BTC").await.unwrap();
        mock.assert_async().await;

        assert_eq!(items.len(), 10);
        let first = &items[0];
        assert_eq!(first.source, "CoinDesk");
        assert_eq!(first.relevance_score, 0.8);
        assert_eq!(first.sentiment_score, 1.0);
        assert_eq!(first.content.len(), 500);
        assert_eq!(first.categories, vec!["BTC", "Market"]);
        assert_eq!(first.mentioned_coins, vec!["BTC"]);
        assert_eq!(items[1].relevance_score, 0.5);
    }

    #[tokio::test]
    async fn test_fetch_news_server_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/data/v2/news/")
            .match_query(Matcher::Any)
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let client = NewsClient::new(reqwest::Client::new(), server.url(), None, 1);
        let err = client.fetch_news("ETH").await.unwrap_err();
        assert!(matches!(err, DataError::Api { status_code: 502, .. }));
    }
}
