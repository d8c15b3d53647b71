//! One pipeline run: Extract → Load → Validate → Summarize, then the
//! always-run Transform → Test, then Notify.
//!
//! Extract and Load are retried with a fixed backoff. When a step finally
//! fails its dependents are skipped, but transformation still runs so that
//! bronze data already present can be rebuilt.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::Result;
use crate::extract::Extractor;
use crate::fetch::OddsSource;
use crate::load::{LoadClient, TableStats};
use crate::models::ExtractionSummary;
use crate::notify::{LogNotifier, Notifier, WebhookNotifier};
use crate::sink::SinkWriter;
use crate::store::BronzeStore;
use crate::transform::{self, Transformer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum StepOutcome {
    Success,
    Failed(String),
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub step: String,
    pub outcome: StepOutcome,
}

/// Counts and table statistics for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineSummary {
    pub run_id: Uuid,
    pub run_date: DateTime<Utc>,
    pub extracted_rows: usize,
    pub loaded_rows: usize,
    pub total_bronze_rows: i64,
    pub sports_covered: i64,
    pub matches_total: i64,
    pub market_types: i64,
    pub latest_data_date: String,
    /// `success` when rows were loaded, `no_data` otherwise.
    pub status: String,
    pub leagues: Vec<ExtractionSummary>,
}

/// Payload handed to the notifier at the end of every run.
#[derive(Debug, Clone, Serialize)]
pub struct RunNotification {
    pub run_id: Uuid,
    pub run_date: DateTime<Utc>,
    pub status: RunStatus,
    pub summary: Option<PipelineSummary>,
    pub steps: Vec<StepReport>,
    pub error: Option<String>,
}

impl RunNotification {
    pub fn headline(&self) -> String {
        match (&self.status, &self.summary) {
            (RunStatus::Success, Some(s)) => format!(
                "Odds pipeline run {}: {} rows extracted, {} rows loaded",
                self.run_id, s.extracted_rows, s.loaded_rows
            ),
            (RunStatus::Success, None) => format!("Odds pipeline run {} succeeded", self.run_id),
            (RunStatus::Failed, _) => format!(
                "Odds pipeline run {} failed: {}",
                self.run_id,
                self.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }

    pub fn loaded_rows(&self) -> usize {
        self.summary.as_ref().map(|s| s.loaded_rows).unwrap_or(0)
    }
}

/// Extract step handoff.
#[derive(Debug, Clone)]
pub struct ExtractOutput {
    pub raw_file: Option<PathBuf>,
    pub row_count: usize,
    pub leagues: Vec<ExtractionSummary>,
}

/// Load step handoff. `stats` is absent when there was nothing to load.
#[derive(Debug, Clone)]
pub struct LoadOutput {
    pub rows_loaded: usize,
    pub stats: Option<TableStats>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validation {
    pub extracted: usize,
    pub loaded: usize,
    pub passed: bool,
}

/// What a run extracts and how it retries.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub leagues: Vec<String>,
    pub regions: Vec<String>,
    pub bookmaker: String,
    pub raw_file_prefix: String,
    pub step_retries: u32,
    pub step_retry_delay: Duration,
}

impl RunSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            leagues: config.leagues.clone(),
            regions: config.regions.clone(),
            bookmaker: config.bookmaker.clone(),
            raw_file_prefix: config.raw_file_prefix.clone(),
            step_retries: config.step_retries,
            step_retry_delay: config.step_retry_delay,
        }
    }
}

pub struct Pipeline {
    settings: RunSettings,
    extractor: Extractor,
    sink: SinkWriter,
    loader: LoadClient,
    transformer: Box<dyn Transformer>,
    notifier: Box<dyn Notifier>,
}

impl Pipeline {
    pub fn new(
        settings: RunSettings,
        extractor: Extractor,
        sink: SinkWriter,
        loader: LoadClient,
        transformer: Box<dyn Transformer>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        Self {
            settings,
            extractor,
            sink,
            loader,
            transformer,
            notifier,
        }
    }

    /// Wire the production components from configuration.
    pub fn from_config(
        config: &Config,
        source: Arc<dyn OddsSource>,
        store: Arc<dyn BronzeStore>,
    ) -> Result<Self> {
        let notifier: Box<dyn Notifier> = match &config.notify_webhook_url {
            Some(url) => Box::new(
                WebhookNotifier::new(url.clone()).map_err(|e| {
                    crate::error::Error::Config(format!("NOTIFY_WEBHOOK_URL: {}", e))
                })?,
            ),
            None => Box::new(LogNotifier),
        };

        Ok(Self::new(
            RunSettings::from_config(config),
            Extractor::new(source, config.markets.clone()),
            SinkWriter::new(config.raw_data_dir.clone()),
            LoadClient::new(store, &config.store),
            transform::from_config(&config.transform),
            notifier,
        ))
    }

    /// Fetch every league and persist the combined rows to a raw file.
    pub async fn extract_step(&self) -> Result<ExtractOutput> {
        info!("[START] Extract");
        let extraction = self
            .extractor
            .extract(
                Some(self.settings.leagues.as_slice()),
                &self.settings.regions,
                &self.settings.bookmaker,
            )
            .await;

        if extraction.is_empty() {
            warn!("No data extracted from API");
        }
        let raw_file = self
            .sink
            .write(&extraction.records, &self.settings.raw_file_prefix)?;

        Ok(ExtractOutput {
            raw_file,
            row_count: extraction.records.len(),
            leagues: extraction.summaries,
        })
    }

    /// Append the raw file to the bronze table and read back table stats.
    pub async fn load_step(&self, extracted: &ExtractOutput) -> Result<LoadOutput> {
        info!("[START] Load");
        let Some(path) = &extracted.raw_file else {
            warn!("No raw file to load (no data extracted)");
            return Ok(LoadOutput {
                rows_loaded: 0,
                stats: None,
            });
        };

        self.loader.ensure_table().await?;
        info!("Loading {} rows to {}...", extracted.row_count, self.loader.table());
        let rows_loaded = self.loader.load(path).await?;
        let stats = self.loader.stats().await;

        info!("Load complete: {} rows loaded", rows_loaded);
        Ok(LoadOutput {
            rows_loaded,
            stats: Some(stats),
        })
    }

    /// Run the whole chain once and send the notification.
    pub async fn run(&self) -> RunNotification {
        let run_id = Uuid::new_v4();
        let run_date = Utc::now();
        let retries = self.settings.step_retries;
        let delay = self.settings.step_retry_delay;
        let mut steps = Vec::new();
        let mut first_error: Option<String> = None;

        info!("Starting pipeline run {}", run_id);

        let extracted = record(
            &mut steps,
            &mut first_error,
            "extract",
            with_retries("extract", retries, delay, || self.extract_step()).await,
        );

        let loaded = match &extracted {
            Some(out) => record(
                &mut steps,
                &mut first_error,
                "load",
                with_retries("load", retries, delay, || self.load_step(out)).await,
            ),
            None => {
                skip(&mut steps, "load");
                None
            }
        };

        let summary = match (&extracted, &loaded) {
            (Some(e), Some(l)) => {
                let validation = validate(e.row_count, l.rows_loaded);
                steps.push(success("validate"));
                let summary =
                    summarize(run_id, run_date, &validation, l.stats.as_ref(), &e.leagues);
                steps.push(success("summarize"));
                Some(summary)
            }
            _ => {
                skip(&mut steps, "validate");
                skip(&mut steps, "summarize");
                None
            }
        };

        // Transformation runs whatever happened upstream.
        record(
            &mut steps,
            &mut first_error,
            "transform",
            self.transformer.run_models().await.map_err(Into::into),
        );
        record(
            &mut steps,
            &mut first_error,
            "test",
            self.transformer.run_tests().await.map_err(Into::into),
        );

        let status = if first_error.is_none() {
            RunStatus::Success
        } else {
            RunStatus::Failed
        };

        let notification = RunNotification {
            run_id,
            run_date,
            status,
            summary,
            steps,
            error: first_error,
        };

        if let Err(e) = self.notifier.notify(&notification).await {
            error!("Failed to send notification: {}", e);
        }

        info!("Pipeline run {} finished: {:?}", run_id, status);
        notification
    }
}

/// Compare extracted and loaded counts. Mismatches are logged only.
pub fn validate(extracted: usize, loaded: usize) -> Validation {
    info!("Extracted: {} rows, loaded: {} rows", extracted, loaded);

    if extracted == 0 {
        warn!("No data extracted - nothing to validate");
    } else if loaded != extracted {
        warn!("Row mismatch: extracted {} but loaded {}", extracted, loaded);
    }

    let validation = Validation {
        extracted,
        loaded,
        passed: loaded > 0,
    };
    info!("Validation complete: validation_passed={}", validation.passed);
    validation
}

pub fn summarize(
    run_id: Uuid,
    run_date: DateTime<Utc>,
    validation: &Validation,
    stats: Option<&TableStats>,
    leagues: &[ExtractionSummary],
) -> PipelineSummary {
    let stats = stats.cloned().unwrap_or_default();
    PipelineSummary {
        run_id,
        run_date,
        extracted_rows: validation.extracted,
        loaded_rows: validation.loaded,
        total_bronze_rows: stats.row_count,
        sports_covered: stats.sports,
        matches_total: stats.matches,
        market_types: stats.markets,
        latest_data_date: stats
            .latest_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "N/A".to_string()),
        status: if validation.loaded > 0 { "success" } else { "no_data" }.to_string(),
        leagues: leagues.to_vec(),
    }
}

/// Retry `op` up to `retries` extra times with a fixed delay.
pub async fn with_retries<T, F, Fut>(
    step: &str,
    retries: u32,
    delay: Duration,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < retries => {
                attempt += 1;
                warn!(
                    "Step {} failed (attempt {}/{}): {}. Retrying in {:?}",
                    step,
                    attempt,
                    retries + 1,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

fn success(step: &str) -> StepReport {
    StepReport {
        step: step.to_string(),
        outcome: StepOutcome::Success,
    }
}

fn skip(steps: &mut Vec<StepReport>, step: &str) {
    info!("Skipping {} (upstream failed)", step);
    steps.push(StepReport {
        step: step.to_string(),
        outcome: StepOutcome::Skipped,
    });
}

fn record<T>(
    steps: &mut Vec<StepReport>,
    first_error: &mut Option<String>,
    step: &str,
    result: Result<T>,
) -> Option<T> {
    match result {
        Ok(value) => {
            steps.push(success(step));
            Some(value)
        }
        Err(e) => {
            error!("Step {} failed: {}", step, e);
            let message = e.to_string();
            first_error.get_or_insert_with(|| format!("{}: {}", step, message));
            steps.push(StepReport {
                step: step.to_string(),
                outcome: StepOutcome::Failed(message),
            });
            None
        }
    }
}
