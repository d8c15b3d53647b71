//! Bronze-layer loading and reporting.
//!
//! Reads the raw file artifact back, coerces column types, stamps batch-level
//! ingestion metadata and appends rows in fixed-size batches. Loading is
//! at-least-once: batches already written stay written when a later one fails.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::StoreConfig;
use crate::store::{BronzeRow, BronzeStore};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("raw file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("failed to read raw file: {0}")]
    Read(#[from] csv::Error),

    #[error("failed to create bronze table: {0}")]
    Schema(#[source] sqlx::Error),

    #[error("insert failed: {0}")]
    Insert(#[source] sqlx::Error),

    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),

    #[error("insert failed after {inserted}/{total} rows: {source}")]
    PartialInsert {
        inserted: usize,
        total: usize,
        #[source]
        source: sqlx::Error,
    },
}

/// Aggregates over the whole bronze table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableStats {
    pub row_count: i64,
    pub latest_date: Option<NaiveDate>,
    pub sports: i64,
    pub matches: i64,
    pub markets: i64,
}

/// A row as it appears in the raw file, before coercion.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRow {
    game_id: String,
    sport_key: String,
    sport_title: String,
    home_team: String,
    away_team: String,
    commence_time: String,
    bookmaker: String,
    market_type: String,
    outcome_name: String,
    odds: String,
    point: String,
    extracted_at: String,
}

pub struct LoadClient {
    store: Arc<dyn BronzeStore>,
    table: String,
    batch_size: usize,
    strict_ddl: bool,
}

impl LoadClient {
    pub fn new(store: Arc<dyn BronzeStore>, config: &StoreConfig) -> Self {
        Self {
            store,
            table: config.table.clone(),
            batch_size: config.batch_size.max(1),
            strict_ddl: config.strict_ddl,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the schema and the date-partitioned bronze table if absent.
    ///
    /// In lenient mode any error is logged and the table is assumed to exist.
    pub async fn ensure_table(&self) -> Result<(), LoadError> {
        info!("Creating {} if absent", self.table);

        let mut statements = Vec::new();
        if let Some((schema, _)) = self.table.split_once('.') {
            statements.push(format!("CREATE SCHEMA IF NOT EXISTS {}", schema));
        }
        statements.push(create_table_sql(&self.table));

        for statement in statements {
            self.run_ddl(&statement).await?;
        }
        info!("Bronze table {} created/verified", self.table);
        Ok(())
    }

    /// Load a raw file into the bronze table. Returns the rows submitted.
    pub async fn load(&self, path: &Path) -> Result<usize, LoadError> {
        info!("Reading raw file {}", path.display());
        let ingestion_timestamp = Utc::now();
        let rows = read_raw_file(path, ingestion_timestamp)?;

        if rows.is_empty() {
            warn!("Raw file {} has no rows", path.display());
            return Ok(0);
        }

        self.run_ddl(&create_partition_sql(&self.table, ingestion_timestamp.date_naive()))
            .await?;

        let total = rows.len();
        info!("Inserting {} rows into {}...", total, self.table);

        let mut inserted = 0usize;
        for batch in rows.chunks(self.batch_size) {
            if let Err(e) = self.store.insert_batch(&self.table, batch).await {
                error!("Insert failed after {}/{} rows: {}", inserted, total, e);
                return Err(if inserted == 0 {
                    LoadError::Insert(e)
                } else {
                    LoadError::PartialInsert {
                        inserted,
                        total,
                        source: e,
                    }
                });
            }
            inserted += batch.len();
            info!("  Inserted {}/{} rows", inserted, total);
        }

        info!("Successfully inserted {} rows to {}", total, self.table);
        Ok(total)
    }

    /// Table-wide aggregates. A failing query degrades to zero/None for its
    /// own entry only.
    pub async fn stats(&self) -> TableStats {
        let t = &self.table;
        let stats = TableStats {
            row_count: self.count(&format!("SELECT COUNT(*) FROM {}", t)).await,
            latest_date: match self
                .store
                .fetch_date(&format!("SELECT MAX(ingestion_date) FROM {}", t))
                .await
            {
                Ok(date) => date,
                Err(e) => {
                    warn!("Stats query for latest date failed: {}", e);
                    None
                }
            },
            sports: self.count(&format!("SELECT COUNT(DISTINCT sport_key) FROM {}", t)).await,
            matches: self.count(&format!("SELECT COUNT(DISTINCT game_id) FROM {}", t)).await,
            markets: self.count(&format!("SELECT COUNT(DISTINCT market_type) FROM {}", t)).await,
        };
        info!("Table statistics: {:?}", stats);
        stats
    }

    /// Most recently ingested rows.
    pub async fn sample(&self, limit: i64) -> Result<Vec<BronzeRow>, LoadError> {
        self.store
            .fetch_sample(&self.table, limit)
            .await
            .map_err(LoadError::Query)
    }

    async fn count(&self, query: &str) -> i64 {
        match self.store.fetch_count(query).await {
            Ok(n) => n,
            Err(e) => {
                warn!("Stats query failed ({}): {}", query, e);
                0
            }
        }
    }

    async fn run_ddl(&self, statement: &str) -> Result<(), LoadError> {
        match self.store.execute(statement).await {
            Ok(()) => Ok(()),
            Err(e) if self.strict_ddl => Err(LoadError::Schema(e)),
            Err(e) => {
                warn!("DDL issue (assuming objects exist): {}", e);
                Ok(())
            }
        }
    }
}

pub fn create_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (
            game_id TEXT,
            sport_key TEXT,
            sport_title TEXT,
            home_team TEXT,
            away_team TEXT,
            commence_time TIMESTAMPTZ,
            bookmaker TEXT,
            market_type TEXT,
            outcome_name TEXT,
            odds NUMERIC(10,4),
            point NUMERIC(10,2),
            extracted_at TIMESTAMPTZ,
            ingestion_date DATE NOT NULL,
            ingestion_timestamp TIMESTAMPTZ NOT NULL
        ) PARTITION BY RANGE (ingestion_date)",
        table
    )
}

pub fn create_partition_sql(table: &str, date: NaiveDate) -> String {
    let next = date + Duration::days(1);
    format!(
        "CREATE TABLE IF NOT EXISTS {}_p{} PARTITION OF {} FOR VALUES FROM ('{}') TO ('{}')",
        table,
        date.format("%Y%m%d"),
        table,
        date,
        next
    )
}

/// Read the raw file and coerce it into bronze rows stamped with one
/// ingestion instant.
pub fn read_raw_file(
    path: &Path,
    ingestion_timestamp: DateTime<Utc>,
) -> Result<Vec<BronzeRow>, LoadError> {
    let mut reader = match csv::Reader::from_path(path) {
        Ok(reader) => reader,
        Err(e) => {
            if let csv::ErrorKind::Io(io) = e.kind() {
                if io.kind() == ErrorKind::NotFound {
                    error!("Raw file not found: {}", path.display());
                    return Err(LoadError::FileNotFound(path.to_path_buf()));
                }
            }
            return Err(LoadError::Read(e));
        }
    };

    let ingestion_date = ingestion_timestamp.date_naive();
    let mut rows = Vec::new();
    for raw in reader.deserialize::<RawRow>() {
        let raw = raw?;
        rows.push(BronzeRow {
            game_id: raw.game_id,
            sport_key: raw.sport_key,
            sport_title: raw.sport_title,
            home_team: raw.home_team,
            away_team: raw.away_team,
            commence_time: parse_timestamp(&raw.commence_time),
            bookmaker: raw.bookmaker,
            market_type: raw.market_type,
            outcome_name: raw.outcome_name,
            odds: parse_number(&raw.odds),
            point: parse_number(&raw.point),
            extracted_at: parse_timestamp(&raw.extracted_at),
            ingestion_date,
            ingestion_timestamp,
        });
    }

    info!("Loaded {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

/// Non-numeric values become null.
fn parse_number(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// RFC 3339, or a naive ISO timestamp taken as UTC. Anything else is null.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}
