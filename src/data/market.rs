use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Map;

use super::{Bar, DataError, DataQuality, DataResult, MarketData};
use crate::config::Config;

/// Polygon.io aggregate response
#[derive(Debug, Deserialize)]
struct PolygonAggregatesResponse {
    results: Option<Vec<PolygonAggregate>>,
    status: String,
}

#[derive(Debug, Deserialize)]
struct PolygonAggregate {
    #[serde(rename = "v")]
    volume: f64,
    #[serde(rename = "o")]
    open: f64,
    #[serde(rename = "c")]
    close: f64,
    #[serde(rename = "h")]
    high: f64,
    #[serde(rename = "l")]
    low: f64,
    /// Unix milliseconds
    #[serde(rename = "t")]
    timestamp: Option<i64>,
}

/// CoinGecko `/coins/markets` entry
#[derive(Debug, Deserialize)]
struct CoinGeckoMarket {
    current_price: Option<f64>,
    market_cap: Option<f64>,
    total_volume: Option<f64>,
    high_24h: Option<f64>,
    low_24h: Option<f64>,
    price_change_percentage_24h: Option<f64>,
    price_change_percentage_7d_in_currency: Option<f64>,
    circulating_supply: Option<f64>,
    total_supply: Option<f64>,
}

/// Polygon crypto ticker for a bare symbol (BTC -> X:BTCUSD)
pub fn polygon_ticker(symbol: &str) -> String {
    if symbol.starts_with("X:") {
        symbol.to_string()
    } else {
        format!("X:{}USD", symbol)
    }
}

/// CoinGecko coin id for a symbol, falling back to the lowercase symbol
pub fn coingecko_id(symbol: &str) -> String {
    match symbol.to_ascii_uppercase().as_str() {
        "BTC" => "bitcoin".to_string(),
        "ETH" => "ethereum".to_string(),
        "SOL" => "solana".to_string(),
        "BNB" => "binancecoin".to_string(),
        "XRP" => "ripple".to_string(),
        "ADA" => "cardano".to_string(),
        "DOGE" => "dogecoin".to_string(),
        other => other.to_ascii_lowercase(),
    }
}

pub struct MarketDataClient {
    client: reqwest::Client,
    polygon_base: String,
    coingecko_base: String,
    polygon_api_key: Option<String>,
    max_retries: usize,
}

impl MarketDataClient {
    pub fn new(
        client: reqwest::Client,
        polygon_base: impl Into<String>,
        coingecko_base: impl Into<String>,
        polygon_api_key: Option<String>,
        max_retries: usize,
    ) -> Self {
        Self {
            client,
            polygon_base: polygon_base.into().trim_end_matches('/').to_string(),
            coingecko_base: coingecko_base.into().trim_end_matches('/').to_string(),
            polygon_api_key,
            max_retries,
        }
    }

    pub fn from_config(client: reqwest::Client, config: &Config) -> Self {
        Self::new(
            client,
            &config.endpoints.polygon,
            &config.endpoints.coingecko,
            config.apis.polygon_api_key.clone(),
            config.collection.max_retries as usize,
        )
    }

    pub fn has_polygon_key(&self) -> bool {
        self.polygon_api_key.is_some()
    }

    fn polygon_key(&self) -> DataResult<&str> {
        self.polygon_api_key.as_deref().ok_or_else(|| {
            DataError::Config(
                "POLYGON_API_KEY environment variable must be set. Get your free API key from https://polygon.io"
                    .to_string(),
            )
        })
    }

    async fn get_polygon_aggregates(&self, url: &str, api_key: &str) -> DataResult<Vec<PolygonAggregate>> {
        use super::retry::retry_with_backoff;

        tracing::debug!("Polygon API request: GET {} apiKey=***", url);

        let response: PolygonAggregatesResponse = retry_with_backoff(
            || async {
                let response = self
                    .client
                    .get(url)
                    .query(&[("apiKey", api_key)])
                    .send()
                    .await?;

                if !response.status().is_success() {
                    let err = DataError::from_response("Polygon.io", response).await;
                    tracing::error!("Polygon.io API failed: {}", err);
                    return Err(err);
                }

                Ok(response.json::<PolygonAggregatesResponse>().await?)
            },
            self.max_retries,
        )
        .await?;

        // DELAYED is returned for free/basic tier subscriptions
        match response.status.as_str() {
            "OK" => {}
            "DELAYED" => {
                tracing::warn!("Polygon.io status: DELAYED (free tier data may not be real-time)");
            }
            status => {
                return Err(DataError::Internal(format!(
                    "Polygon.io returned error status: {}",
                    status
                )));
            }
        }

        Ok(response.results.unwrap_or_default())
    }

    /// Previous-day aggregate from Polygon.io
    pub async fn fetch_polygon_previous(&self, symbol: &str) -> DataResult<MarketData> {
        let api_key = self.polygon_key()?;
        let ticker = polygon_ticker(symbol);
        let url = format!("{}/v2/aggs/ticker/{}/prev", self.polygon_base, ticker);

        let results = self.get_polygon_aggregates(&url, api_key).await?;
        let agg = results
            .into_iter()
            .next()
            .ok_or_else(|| DataError::no_data(symbol, "previous day", "today"))?;

        if agg.open <= 0.0 {
            return Err(DataError::validation_error("open", "Open price must be positive"));
        }

        let timestamp = agg
            .timestamp
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_else(Utc::now);

        tracing::info!("Fetched Polygon.io previous close for {}: {:.2}", symbol, agg.close);

        Ok(MarketData {
            symbol: symbol.to_string(),
            timestamp,
            price: agg.close,
            volume_24h: agg.volume,
            market_cap: 0.0, // Polygon doesn't provide market cap
            open: agg.open,
            high: agg.high,
            low: agg.low,
            close: agg.close,
            change_24h: (agg.close - agg.open) / agg.open * 100.0,
            change_7d: None,
            circulating_supply: None,
            total_supply: None,
            source: "polygon".to_string(),
            quality: DataQuality::Verified,
            metadata: Map::new(),
        })
    }

    /// Spot snapshot from CoinGecko
    pub async fn fetch_coingecko(&self, symbol: &str) -> DataResult<MarketData> {
        use super::retry::retry_with_backoff;

        let coin_id = coingecko_id(symbol);
        let url = format!("{}/coins/markets", self.coingecko_base);

        let markets: Vec<CoinGeckoMarket> = retry_with_backoff(
            || async {
                let response = self
                    .client
                    .get(&url)
                    .query(&[
                        ("vs_currency", "usd"),
                        ("ids", coin_id.as_str()),
                        ("order", "market_cap_desc"),
                        ("sparkline", "false"),
                        ("price_change_percentage", "7d"),
                    ])
                    .send()
                    .await?;

                if !response.status().is_success() {
                    return Err(DataError::from_response("CoinGecko", response).await);
                }

                Ok(response.json::<Vec<CoinGeckoMarket>>().await?)
            },
            self.max_retries,
        )
        .await?;

        let coin = markets
            .into_iter()
            .next()
            .ok_or_else(|| DataError::no_data(symbol, "coingecko", coin_id.as_str()))?;

        let price = coin
            .current_price
            .ok_or_else(|| DataError::parse_error(format!("CoinGecko returned no price for {}", coin_id)))?;

        tracing::info!("Fetched CoinGecko price for {}: {:.2}", symbol, price);

        Ok(MarketData {
            symbol: symbol.to_string(),
            timestamp: Utc::now(),
            price,
            volume_24h: coin.total_volume.unwrap_or(0.0),
            market_cap: coin.market_cap.unwrap_or(0.0),
            // the markets endpoint has no OHLC
            open: price,
            high: coin.high_24h.unwrap_or(price),
            low: coin.low_24h.unwrap_or(price),
            close: price,
            change_24h: coin.price_change_percentage_24h.unwrap_or(0.0),
            change_7d: coin.price_change_percentage_7d_in_currency,
            circulating_supply: coin.circulating_supply,
            total_supply: coin.total_supply,
            source: "coingecko".to_string(),
            quality: DataQuality::Reliable,
            metadata: Map::new(),
        })
    }

    /// Daily bars for the last `days` days, oldest first
    pub async fn fetch_daily_bars(&self, symbol: &str, days: u32) -> DataResult<Vec<Bar>> {
        let api_key = self.polygon_key()?;
        let end_date = Utc::now().date_naive();
        let start_date = end_date - chrono::Duration::days(days as i64);

        let url = format!(
            "{}/v2/aggs/ticker/{}/range/1/day/{}/{}?adjusted=true&sort=asc&limit=5000",
            self.polygon_base,
            polygon_ticker(symbol),
            start_date.format("%Y-%m-%d"),
            end_date.format("%Y-%m-%d"),
        );

        let results = self.get_polygon_aggregates(&url, api_key).await?;
        if results.is_empty() {
            return Err(DataError::no_data(
                symbol.to_string(),
                start_date.to_string(),
                end_date.to_string(),
            ));
        }

        let mut bars = Vec::with_capacity(results.len());
        for agg in results {
            let millis = agg
                .timestamp
                .ok_or_else(|| DataError::parse_error("Polygon bar without timestamp"))?;
            let timestamp = DateTime::from_timestamp_millis(millis)
                .ok_or_else(|| DataError::parse_error(format!("Invalid timestamp: {}", millis)))?;

            bars.push(Bar {
                timestamp,
                open: agg.open,
                high: agg.high,
                low: agg.low,
                close: agg.close,
                volume: agg.volume,
            });
        }

        tracing::info!("Fetched {} daily bars from Polygon.io for {}", bars.len(), symbol);
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn client(server_url: &str, key: Option<&str>) -> MarketDataClient {
        MarketDataClient::new(
            reqwest::Client::new(),
            server_url,
            server_url,
            key.map(String::from),
            1,
        )
    }

    #[test]
    fn test_symbol_mapping() {
        assert_eq!(polygon_ticker("BTC"), "X:BTCUSD");
        assert_eq!(polygon_ticker("X:ETHUSD"), "X:ETHUSD");
        assert_eq!(coingecko_id("doge"), "dogecoin");
        assert_eq!(coingecko_id("PEPE"), "pepe");
    }

    #[tokio::test]
    async fn test_polygon_previous_parses_change() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/v2/aggs/ticker/X:BTCUSD/prev")
            .match_query(Matcher::UrlEncoded("apiKey".into(), "test_key".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "ticker": "X:BTCUSD",
                    "status": "OK",
                    "results": [{"T": "X:BTCUSD", "v": 1500.5, "vw": 50100.0, "o": 50000.0,
                                 "c": 52500.0, "h": 53000.0, "l": 49500.0, "t": 1_700_000_000_000i64}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let data = client(&server.url(), Some("test_key"))
            .fetch_polygon_previous("BTC")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(data.price, 52500.0);
        assert!((data.change_24h - 5.0).abs() < 1e-9);
        assert_eq!(data.source, "polygon");
        assert_eq!(data.quality, DataQuality::Verified);
        assert_eq!(data.market_cap, 0.0);
    }

    #[tokio::test]
    async fn test_polygon_requires_key() {
        let err = client("http://127.0.0.1:9", None)
            .fetch_polygon_previous("BTC")
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::Config(_)));
    }

    #[tokio::test]
    async fn test_network_error_hides_api_key() {
        let err = client("http://127.0.0.1:9", Some("SUPERSECRET"))
            .fetch_polygon_previous("BTC")
            .await
            .unwrap_err();

        assert!(matches!(err, DataError::Network(_)));
        assert!(!err.to_string().contains("SUPERSECRET"));
        assert!(!format!("{:?}", err).contains("SUPERSECRET"));
    }

    #[tokio::test]
    async fn test_polygon_error_status_is_rejected() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/v2/aggs/ticker/X:BTCUSD/prev")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!({"status": "NOT_AUTHORIZED"}).to_string())
            .create_async()
            .await;

        let err = client(&server.url(), Some("k"))
            .fetch_polygon_previous("BTC")
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::Internal(_)));
    }

    #[tokio::test]
    async fn test_coingecko_parses_market() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/coins/markets")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("vs_currency".into(), "usd".into()),
                Matcher::UrlEncoded("ids".into(), "ethereum".into()),
            ]))
            .with_status(200)
            .with_body(
                json!([{
                    "id": "ethereum",
                    "symbol": "eth",
                    "current_price": 3000.0,
                    "market_cap": 360_000_000_000.0,
                    "total_volume": 15_000_000_000.0,
                    "high_24h": 3100.0,
                    "low_24h": 2900.0,
                    "price_change_percentage_24h": -4.2,
                    "price_change_percentage_7d_in_currency": 6.1,
                    "circulating_supply": 120_000_000.0,
                    "total_supply": null
                }])
                .to_string(),
            )
            .create_async()
            .await;

        let data = client(&server.url(), None).fetch_coingecko("ETH").await.unwrap();
        mock.assert_async().await;
        assert_eq!(data.price, 3000.0);
        assert_eq!(data.open, 3000.0);
        assert_eq!(data.change_24h, -4.2);
        assert_eq!(data.change_7d, Some(6.1));
        assert_eq!(data.total_supply, None);
        assert_eq!(data.source, "coingecko");
    }

    #[tokio::test]
    async fn test_coingecko_empty_is_no_data() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/coins/markets")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let err = client(&server.url(), None).fetch_coingecko("ZZZ").await.unwrap_err();
        assert!(matches!(err, DataError::NoData { .. }));
    }

    #[tokio::test]
    async fn test_daily_bars_sorted_input_preserved() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", Matcher::Regex(r"^/v2/aggs/ticker/X:SOLUSD/range/1/day/.*".to_string()))
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                json!({
                    "status": "DELAYED",
                    "results": [
                        {"v": 10.0, "o": 100.0, "c": 101.0, "h": 102.0, "l": 99.0, "t": 1_700_000_000_000i64},
                        {"v": 12.0, "o": 101.0, "c": 103.0, "h": 104.0, "l": 100.0, "t": 1_700_086_400_000i64}
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let bars = client(&server.url(), Some("k"))
            .fetch_daily_bars("SOL", 30)
            .await
            .unwrap();
        assert_eq!(bars.len(), 2);
        assert!(bars[0].timestamp < bars[1].timestamp);
        assert_eq!(bars[1].close, 103.0);
    }
}
