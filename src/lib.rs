//! Odds ingestion pipeline.
//!
//! Pulls bookmaker odds for a fixed set of soccer leagues from The Odds API,
//! flattens them into one row per (game, bookmaker, market, outcome), writes
//! the rows to a timestamped raw CSV file and appends that file to a
//! date-partitioned bronze table. A run then validates the counts, triggers
//! the downstream transformation project and emits a notification.

pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod flatten;
pub mod health;
pub mod load;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod sink;
pub mod store;
pub mod transform;

pub use config::Config;
pub use error::{Error, Result};
pub use extract::{Extraction, Extractor};
pub use fetch::{FetchError, OddsApiClient, OddsRequest, OddsSource};
pub use flatten::flatten;
pub use load::{LoadClient, LoadError, TableStats};
pub use models::{ExtractionSummary, League, OddsApiEvent, OddsRecord, SUPPORTED_LEAGUES};
pub use notify::{LogNotifier, Notifier, NotifyError, WebhookNotifier};
pub use pipeline::{Pipeline, PipelineSummary, RunNotification, RunSettings, RunStatus};
pub use sink::{SinkError, SinkWriter};
pub use store::{BronzeRow, BronzeStore, PgBronzeStore};
pub use transform::{CommandTransformer, SkipTransformer, TransformError, Transformer};
