use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    FromRow, PgPool,
};
use std::str::FromStr;
use tracing::info;

use crate::trading::CombinedSignal;

pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        info!("Connecting to PostgreSQL database");

        // Statement caching off so pooled endpoints (pgBouncer) work
        let connect_options = PgConnectOptions::from_str(database_url)
            .context("Failed to parse DATABASE_URL")?
            .statement_cache_capacity(0);

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .min_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(10))
            .idle_timeout(std::time::Duration::from_secs(300))
            .max_lifetime(std::time::Duration::from_secs(1800))
            .connect_with(connect_options)
            .await
            .context("Failed to connect to PostgreSQL database. Check that DATABASE_URL is set correctly.")?;

        info!("Database connection established successfully");
        Ok(Database { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Perform a health check on the database connection
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .persistent(false)
            .fetch_one(&self.pool)
            .await
            .context("Database health check failed")?;

        info!("Database health check passed");
        Ok(())
    }

    pub fn signals(&self) -> SignalRepository {
        SignalRepository::new(self.pool.clone())
    }

    /// Close the database connection pool
    pub async fn close(self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }
}

/// One row of the `signals` table
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StoredSignal {
    pub id: String,
    pub symbol: String,
    pub created_at: DateTime<Utc>,
    pub overall_signal: String,
    pub confidence: f64,
    pub risk_level: String,
    pub price: Option<f64>,
    pub change_24h: Option<f64>,
    pub fear_greed_index: Option<i16>,
    pub news_count: i32,
    pub report: serde_json::Value,
}

pub struct SignalRepository {
    pool: PgPool,
}

impl SignalRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert a signal keyed on its unique id
    pub async fn insert(&self, signal: &CombinedSignal) -> Result<()> {
        let id = signal.unique_id();

        sqlx::query(
            r#"
            INSERT INTO signals (
                id, symbol, created_at, overall_signal, confidence, risk_level,
                price, change_24h, fear_greed_index, news_count, report
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                overall_signal = EXCLUDED.overall_signal,
                confidence = EXCLUDED.confidence,
                risk_level = EXCLUDED.risk_level,
                price = EXCLUDED.price,
                change_24h = EXCLUDED.change_24h,
                fear_greed_index = EXCLUDED.fear_greed_index,
                news_count = EXCLUDED.news_count,
                report = EXCLUDED.report
            "#,
        )
        .bind(&id)
        .bind(&signal.symbol)
        .bind(signal.timestamp)
        .bind(signal.overall_signal.name())
        .bind(signal.confidence)
        .bind(signal.risk_level.as_str())
        .bind(signal.current_price())
        .bind(signal.market_data.as_ref().map(|m| m.change_24h))
        .bind(signal.sentiment.as_ref().map(|s| s.fear_greed_index as i16))
        .bind(signal.news_items.len() as i32)
        .bind(signal.to_report())
        .persistent(false)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to store signal {} for {}", id, signal.symbol))?;

        info!(id = %id, symbol = %signal.symbol, "Signal stored");
        Ok(())
    }

    /// Newest first; all symbols when `symbol` is None
    pub async fn recent(&self, symbol: Option<&str>, limit: i64) -> Result<Vec<StoredSignal>> {
        let rows = sqlx::query_as::<_, StoredSignal>(
            r#"
            SELECT id, symbol, created_at, overall_signal, confidence, risk_level,
                   price, change_24h, fear_greed_index, news_count, report
            FROM signals
            WHERE ($1::TEXT IS NULL OR symbol = $1)
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(symbol)
        .bind(limit)
        .persistent(false)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load recent signals")?;

        Ok(rows)
    }
}
