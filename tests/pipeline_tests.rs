//! End-to-end runs against an in-memory provider and bronze store.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};

use odds_pipeline::config::StoreConfig;
use odds_pipeline::load::read_raw_file;
use odds_pipeline::models::{Bookmaker, Market, Outcome};
use odds_pipeline::pipeline::StepOutcome;
use odds_pipeline::{
    BronzeRow, BronzeStore, Extractor, FetchError, LoadClient, Notifier, NotifyError,
    OddsApiEvent, OddsRequest, OddsSource, Pipeline, RunNotification, RunSettings, RunStatus,
    SinkWriter, TransformError, Transformer,
};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeSource {
    games: HashMap<String, Vec<OddsApiEvent>>,
    rate_limited: Vec<String>,
    requested: Mutex<Vec<String>>,
}

#[async_trait]
impl OddsSource for FakeSource {
    async fn fetch_odds(&self, request: OddsRequest<'_>) -> Result<Vec<OddsApiEvent>, FetchError> {
        self.requested.lock().unwrap().push(request.league.to_string());
        if self.rate_limited.iter().any(|l| l == request.league) {
            return Err(FetchError::RateLimited);
        }
        Ok(self.games.get(request.league).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
struct MemoryStore {
    rows: Mutex<Vec<BronzeRow>>,
    fail_inserts: bool,
}

#[async_trait]
impl BronzeStore for MemoryStore {
    async fn execute(&self, _statement: &str) -> Result<(), sqlx::Error> {
        Ok(())
    }

    async fn insert_batch(&self, _table: &str, rows: &[BronzeRow]) -> Result<u64, sqlx::Error> {
        if self.fail_inserts {
            return Err(sqlx::Error::PoolTimedOut);
        }
        self.rows.lock().unwrap().extend_from_slice(rows);
        Ok(rows.len() as u64)
    }

    async fn fetch_count(&self, query: &str) -> Result<i64, sqlx::Error> {
        let rows = self.rows.lock().unwrap();
        let distinct = |f: fn(&BronzeRow) -> &str| {
            let mut v: Vec<&str> = rows.iter().map(f).collect();
            v.sort();
            v.dedup();
            v.len() as i64
        };
        Ok(if query.contains("sport_key") {
            distinct(|r| r.sport_key.as_str())
        } else if query.contains("game_id") {
            distinct(|r| r.game_id.as_str())
        } else if query.contains("market_type") {
            distinct(|r| r.market_type.as_str())
        } else {
            rows.len() as i64
        })
    }

    async fn fetch_date(&self, _query: &str) -> Result<Option<NaiveDate>, sqlx::Error> {
        Ok(self.rows.lock().unwrap().iter().map(|r| r.ingestion_date).max())
    }

    async fn fetch_sample(&self, _table: &str, limit: i64) -> Result<Vec<BronzeRow>, sqlx::Error> {
        Ok(self.rows.lock().unwrap().iter().take(limit as usize).cloned().collect())
    }
}

#[derive(Clone, Default)]
struct CountingTransformer {
    models: Arc<AtomicUsize>,
    tests: Arc<AtomicUsize>,
}

#[async_trait]
impl Transformer for CountingTransformer {
    async fn run_models(&self) -> Result<(), TransformError> {
        self.models.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn run_tests(&self) -> Result<(), TransformError> {
        self.tests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Clone, Default)]
struct RecordingNotifier {
    sent: Arc<Mutex<Vec<RunNotification>>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &RunNotification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn outcome(name: &str, price: f64, point: Option<f64>) -> Outcome {
    Outcome {
        name: name.into(),
        price: Some(price),
        point,
    }
}

/// One game with betway h2h (3 outcomes) and totals (2 outcomes), plus a
/// second bookmaker that must be ignored.
fn game(id: &str, home: &str, away: &str) -> OddsApiEvent {
    let betway = Bookmaker {
        key: "betway".into(),
        title: "Betway".into(),
        last_update: None,
        markets: vec![
            Market {
                key: "h2h".into(),
                last_update: None,
                outcomes: vec![
                    outcome(home, 2.1, None),
                    outcome(away, 3.4, None),
                    outcome("Draw", 3.3, None),
                ],
            },
            Market {
                key: "totals".into(),
                last_update: None,
                outcomes: vec![
                    outcome("Over", 1.9, Some(2.5)),
                    outcome("Under", 1.95, Some(2.5)),
                ],
            },
        ],
    };
    let other = Bookmaker {
        key: "pinnacle".into(),
        title: "Pinnacle".into(),
        last_update: None,
        markets: betway.markets.clone(),
    };

    OddsApiEvent {
        id: id.into(),
        sport_key: "ignored".into(),
        sport_title: "Soccer".into(),
        commence_time: Utc.with_ymd_and_hms(2026, 10, 17, 14, 0, 0).single(),
        home_team: home.into(),
        away_team: away.into(),
        bookmakers: vec![betway, other],
    }
}

struct Harness {
    pipeline: Pipeline,
    source: Arc<FakeSource>,
    store: Arc<MemoryStore>,
    transformer: CountingTransformer,
    notifier: RecordingNotifier,
}

fn harness(source: FakeSource, store: MemoryStore, leagues: &[&str], raw_dir: &Path) -> Harness {
    let source = Arc::new(source);
    let store = Arc::new(store);
    let transformer = CountingTransformer::default();
    let notifier = RecordingNotifier::default();

    let settings = RunSettings {
        leagues: leagues.iter().map(|l| l.to_string()).collect(),
        regions: vec!["uk".into(), "us".into()],
        bookmaker: "betway".into(),
        raw_file_prefix: "odds_extracted".into(),
        step_retries: 0,
        step_retry_delay: Duration::from_millis(1),
    };
    let loader = LoadClient::new(
        store.clone(),
        &StoreConfig {
            database_url: String::new(),
            table: "bronze.odds_raw".into(),
            batch_size: 3,
            strict_ddl: false,
        },
    );

    let pipeline = Pipeline::new(
        settings,
        Extractor::new(source.clone(), vec![]),
        SinkWriter::new(raw_dir),
        loader,
        Box::new(transformer.clone()),
        Box::new(notifier.clone()),
    );

    Harness {
        pipeline,
        source,
        store,
        transformer,
        notifier,
    }
}

fn outcome_of<'a>(run: &'a RunNotification, step: &str) -> &'a StepOutcome {
    &run.steps
        .iter()
        .find(|s| s.step == step)
        .unwrap_or_else(|| panic!("no step {}", step))
        .outcome
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_unknown_league_is_never_requested() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = FakeSource::default();
    source.games.insert(
        "soccer_epl".into(),
        vec![game("g1", "Arsenal", "Chelsea"), game("g2", "Everton", "Fulham")],
    );
    let h = harness(source, MemoryStore::default(), &["soccer_epl", "bogus_key"], dir.path());

    let run = h.pipeline.run().await;

    assert_eq!(*h.source.requested.lock().unwrap(), vec!["soccer_epl".to_string()]);
    assert_eq!(run.status, RunStatus::Success);
    let summary = run.summary.as_ref().unwrap();
    assert_eq!(summary.extracted_rows, 10);
    assert_eq!(summary.loaded_rows, 10);
    assert_eq!(summary.leagues.len(), 1);
    assert_eq!(summary.leagues[0].league_key, "soccer_epl");
    assert_eq!(summary.leagues[0].matches_found, 2);
    assert!(h.store.rows.lock().unwrap().iter().all(|r| r.sport_key == "soccer_epl"));
}

#[tokio::test]
async fn test_rate_limited_league_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = FakeSource::default();
    source
        .games
        .insert("soccer_epl".into(), vec![game("g1", "Arsenal", "Chelsea")]);
    source
        .games
        .insert("soccer_italy_serie_a".into(), vec![game("g2", "Inter", "Roma")]);
    source.rate_limited.push("soccer_spain_la_liga".into());
    let h = harness(
        source,
        MemoryStore::default(),
        &["soccer_epl", "soccer_spain_la_liga", "soccer_italy_serie_a"],
        dir.path(),
    );

    let run = h.pipeline.run().await;

    assert_eq!(h.source.requested.lock().unwrap().len(), 3);
    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(*outcome_of(&run, "extract"), StepOutcome::Success);
    let summary = run.summary.as_ref().unwrap();
    assert_eq!(summary.loaded_rows, 10);
    assert_eq!(summary.sports_covered, 2);
    assert_eq!(summary.matches_total, 2);
    assert_eq!(summary.market_types, 2);
}

#[tokio::test]
async fn test_empty_run_writes_nothing_but_still_transforms() {
    let dir = tempfile::tempdir().unwrap();
    let raw_dir = dir.path().join("raw");
    let h = harness(
        FakeSource::default(),
        MemoryStore::default(),
        &["soccer_epl", "soccer_uefa_champs_league"],
        &raw_dir,
    );

    let run = h.pipeline.run().await;

    assert!(!raw_dir.exists());
    assert_eq!(run.status, RunStatus::Success);
    assert!(run.error.is_none());
    let summary = run.summary.as_ref().unwrap();
    assert_eq!(summary.loaded_rows, 0);
    assert_eq!(summary.status, "no_data");
    assert_eq!(summary.latest_data_date, "N/A");
    assert_eq!(h.transformer.models.load(Ordering::SeqCst), 1);
    assert_eq!(h.transformer.tests.load(Ordering::SeqCst), 1);
    assert_eq!(h.notifier.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_load_failure_fails_run_but_transform_runs() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = FakeSource::default();
    source
        .games
        .insert("soccer_epl".into(), vec![game("g1", "Arsenal", "Chelsea")]);
    let store = MemoryStore {
        fail_inserts: true,
        ..Default::default()
    };
    let h = harness(source, store, &["soccer_epl"], dir.path());

    let run = h.pipeline.run().await;

    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.summary.is_none());
    assert!(run.error.as_deref().unwrap().starts_with("load:"));
    assert_eq!(*outcome_of(&run, "extract"), StepOutcome::Success);
    assert!(matches!(outcome_of(&run, "load"), StepOutcome::Failed(_)));
    assert_eq!(*outcome_of(&run, "validate"), StepOutcome::Skipped);
    assert_eq!(*outcome_of(&run, "summarize"), StepOutcome::Skipped);
    assert_eq!(*outcome_of(&run, "transform"), StepOutcome::Success);
    assert_eq!(h.transformer.models.load(Ordering::SeqCst), 1);

    let sent = h.notifier.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].status, RunStatus::Failed);
}

#[tokio::test]
async fn test_raw_file_round_trip_preserves_fields() {
    let dir = tempfile::tempdir().unwrap();
    let games = [game("g1", "Arsenal", "Chelsea")];
    let records = odds_pipeline::flatten(&games, "soccer_epl", "betway");
    assert_eq!(records.len(), 5);

    let path = SinkWriter::new(dir.path())
        .write(&records, "odds_extracted")
        .unwrap()
        .unwrap();
    let ingested_at = Utc::now();
    let rows = read_raw_file(&path, ingested_at).unwrap();

    assert_eq!(rows.len(), records.len());
    for (record, row) in records.iter().zip(&rows) {
        assert_eq!(row.game_id, record.game_id);
        assert_eq!(row.sport_key, record.sport_key);
        assert_eq!(row.sport_title, record.sport_title);
        assert_eq!(row.home_team, record.home_team);
        assert_eq!(row.away_team, record.away_team);
        assert_eq!(row.commence_time, record.commence_time);
        assert_eq!(row.bookmaker, record.bookmaker);
        assert_eq!(row.market_type, record.market_type);
        assert_eq!(row.outcome_name, record.outcome_name);
        assert_eq!(row.odds, Some(record.odds));
        assert_eq!(row.point, record.point);
        assert_eq!(row.extracted_at, Some(record.extracted_at));
        assert_eq!(row.ingestion_timestamp, ingested_at);
        assert_eq!(row.ingestion_date, ingested_at.date_naive());

        match row.market_type.as_str() {
            "totals" => assert_eq!(row.point, Some(2.5)),
            _ => assert_eq!(row.point, None),
        }
    }
}

#[tokio::test]
async fn test_sample_reads_back_loaded_rows() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = FakeSource::default();
    source
        .games
        .insert("soccer_epl".into(), vec![game("g1", "Arsenal", "Chelsea")]);
    let h = harness(source, MemoryStore::default(), &["soccer_epl"], dir.path());
    h.pipeline.run().await;

    let loader = LoadClient::new(
        h.store.clone(),
        &StoreConfig {
            database_url: String::new(),
            table: "bronze.odds_raw".into(),
            batch_size: 100,
            strict_ddl: true,
        },
    );
    let sample = loader.sample(2).await.unwrap();
    assert_eq!(sample.len(), 2);
    assert_eq!(sample[0].game_id, "g1");
    assert_eq!(sample[0].bookmaker, "betway");
}
