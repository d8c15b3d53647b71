//! Analytical store access.
//!
//! [`BronzeStore`] is the narrow surface the load client needs; the
//! PostgreSQL implementation lives here as well.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, QueryBuilder};
use tracing::{info, warn};

/// Column list shared by DDL, inserts and samples.
pub const BRONZE_COLUMNS: &str = "game_id, sport_key, sport_title, home_team, away_team, \
    commence_time, bookmaker, market_type, outcome_name, odds, point, extracted_at, \
    ingestion_date, ingestion_timestamp";

pub const BRONZE_COLUMN_COUNT: usize = 14;

/// One row of the bronze table, after type coercion.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct BronzeRow {
    pub game_id: String,
    pub sport_key: String,
    pub sport_title: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: Option<DateTime<Utc>>,
    pub bookmaker: String,
    pub market_type: String,
    pub outcome_name: String,
    pub odds: Option<f64>,
    pub point: Option<f64>,
    pub extracted_at: Option<DateTime<Utc>>,
    pub ingestion_date: NaiveDate,
    pub ingestion_timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait BronzeStore: Send + Sync {
    /// Run a statement that returns no rows (DDL).
    async fn execute(&self, statement: &str) -> Result<(), sqlx::Error>;

    /// Append one batch of rows. Returns the number of rows written.
    async fn insert_batch(&self, table: &str, rows: &[BronzeRow]) -> Result<u64, sqlx::Error>;

    /// Run a single-value integer aggregate.
    async fn fetch_count(&self, query: &str) -> Result<i64, sqlx::Error>;

    /// Run a single-value date aggregate.
    async fn fetch_date(&self, query: &str) -> Result<Option<NaiveDate>, sqlx::Error>;

    /// Read up to `limit` rows.
    async fn fetch_sample(&self, table: &str, limit: i64) -> Result<Vec<BronzeRow>, sqlx::Error>;
}

/// PostgreSQL-backed bronze store.
#[derive(Clone)]
pub struct PgBronzeStore {
    pool: PgPool,
}

impl PgBronzeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with exponential backoff between attempts.
    pub async fn connect_with_retry(url: &str, max_retries: u32) -> Result<Self, sqlx::Error> {
        let mut attempt = 0;
        loop {
            match PgPoolOptions::new()
                .max_connections(4)
                .acquire_timeout(Duration::from_secs(10))
                .connect(url)
                .await
            {
                Ok(pool) => {
                    info!("Connected to analytical store");
                    return Ok(Self::new(pool));
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= max_retries {
                        return Err(e);
                    }
                    warn!("Store connection attempt {} failed: {}. Retrying...", attempt, e);
                    tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
                }
            }
        }
    }
}

#[async_trait]
impl BronzeStore for PgBronzeStore {
    async fn execute(&self, statement: &str) -> Result<(), sqlx::Error> {
        sqlx::query(statement).execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_batch(&self, table: &str, rows: &[BronzeRow]) -> Result<u64, sqlx::Error> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("INSERT INTO {} ({}) ", table, BRONZE_COLUMNS));
        builder.push_values(rows, |mut b, row| {
            b.push_bind(row.game_id.clone())
                .push_bind(row.sport_key.clone())
                .push_bind(row.sport_title.clone())
                .push_bind(row.home_team.clone())
                .push_bind(row.away_team.clone())
                .push_bind(row.commence_time)
                .push_bind(row.bookmaker.clone())
                .push_bind(row.market_type.clone())
                .push_bind(row.outcome_name.clone())
                .push_bind(row.odds)
                .push_bind(row.point)
                .push_bind(row.extracted_at)
                .push_bind(row.ingestion_date)
                .push_bind(row.ingestion_timestamp);
        });

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn fetch_count(&self, query: &str) -> Result<i64, sqlx::Error> {
        let count: Option<i64> = sqlx::query_scalar(query).fetch_one(&self.pool).await?;
        Ok(count.unwrap_or(0))
    }

    async fn fetch_date(&self, query: &str) -> Result<Option<NaiveDate>, sqlx::Error> {
        sqlx::query_scalar(query).fetch_one(&self.pool).await
    }

    async fn fetch_sample(&self, table: &str, limit: i64) -> Result<Vec<BronzeRow>, sqlx::Error> {
        // NUMERIC columns come back as float8 so they decode into f64.
        let query = format!(
            "SELECT game_id, sport_key, sport_title, home_team, away_team, commence_time, \
             bookmaker, market_type, outcome_name, odds::float8 AS odds, point::float8 AS point, \
             extracted_at, ingestion_date, ingestion_timestamp \
             FROM {} ORDER BY ingestion_timestamp DESC LIMIT $1",
            table
        );
        sqlx::query_as::<_, BronzeRow>(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
    }
}
