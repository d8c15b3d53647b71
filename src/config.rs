//! Pipeline configuration.
//!
//! Everything comes from the environment (optionally seeded from `.env`),
//! with Docker secret files as the fallback for credentials. The resulting
//! struct is passed explicitly into each component's constructor.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::models::{DEFAULT_MARKETS, SUPPORTED_LEAGUES};
use crate::store::BRONZE_COLUMN_COUNT;

pub const DEFAULT_BASE_URL: &str = "https://api.the-odds-api.com/v4";
pub const DEFAULT_TABLE: &str = "bronze.odds_raw";
pub const DEFAULT_BATCH_SIZE: usize = 100;
/// One multi-row INSERT binds every column of every row; PostgreSQL accepts
/// at most `u16::MAX` parameters per statement.
pub const MAX_BATCH_SIZE: usize = u16::MAX as usize / BRONZE_COLUMN_COUNT;

const ODDS_API_KEY_SECRET: &str = "/run/secrets/odds_api_key";
const STORE_TOKEN_SECRET: &str = "/run/secrets/store_token";

/// Provider access.
#[derive(Clone)]
pub struct OddsApiConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
}

/// Analytical store access and load policy.
#[derive(Clone)]
pub struct StoreConfig {
    pub database_url: String,
    pub table: String,
    pub batch_size: usize,
    /// When false, errors while creating the bronze table are logged and
    /// the table is assumed to exist.
    pub strict_ddl: bool,
}

/// Downstream transformation project. `project_dir = None` disables it.
#[derive(Clone, Debug)]
pub struct TransformConfig {
    pub project_dir: Option<PathBuf>,
    pub run_command: String,
    pub test_command: String,
}

/// Configuration
#[derive(Clone)]
pub struct Config {
    pub odds_api: OddsApiConfig,
    pub bookmaker: String,
    pub regions: Vec<String>,
    pub markets: Vec<String>,
    pub leagues: Vec<String>,
    pub store: StoreConfig,
    pub raw_data_dir: PathBuf,
    pub raw_file_prefix: String,
    /// If true, run once and exit (no polling loop)
    pub run_once: bool,
    pub poll_interval_seconds: u64,
    pub step_retries: u32,
    pub step_retry_delay: Duration,
    pub health_port: u16,
    pub transform: TransformConfig,
    pub notify_webhook_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string());

        // API key
        let api_key = match get("ODDS_API_KEY") {
            Some(v) if !v.is_empty() => v,
            Some(_) => return Err(Error::Config("ODDS_API_KEY is set but empty".into())),
            None => read_secret_file(ODDS_API_KEY_SECRET).ok_or_else(|| {
                Error::Config(format!(
                    "ODDS_API_KEY not set and no secret mounted at {}",
                    ODDS_API_KEY_SECRET
                ))
            })?,
        };
        reject_placeholder("ODDS_API_KEY", &api_key)?;

        let regions = split_list(get("REGIONS").as_deref().unwrap_or("uk,us"));
        if regions.is_empty() {
            return Err(Error::Config("REGIONS must list at least one region".into()));
        }

        let markets = match get("MARKETS").map(|v| split_list(&v)) {
            Some(m) if !m.is_empty() => m,
            _ => DEFAULT_MARKETS.iter().map(|m| m.to_string()).collect(),
        };

        let leagues = match get("LEAGUES").map(|v| split_list(&v)) {
            Some(l) if !l.is_empty() => l,
            _ => SUPPORTED_LEAGUES.iter().map(|l| l.key.to_string()).collect(),
        };

        let batch_size = parse_or(&get, "LOAD_BATCH_SIZE", DEFAULT_BATCH_SIZE)?;
        if batch_size == 0 || batch_size > MAX_BATCH_SIZE {
            return Err(Error::Config(format!(
                "LOAD_BATCH_SIZE must be between 1 and {}",
                MAX_BATCH_SIZE
            )));
        }

        let store = StoreConfig {
            database_url: database_url(&get)?,
            table: get("BRONZE_TABLE")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_TABLE.to_string()),
            batch_size,
            strict_ddl: parse_bool(get("STRICT_DDL")),
        };

        let transform = TransformConfig {
            project_dir: get("TRANSFORM_DIR").filter(|v| !v.is_empty()).map(PathBuf::from),
            run_command: get("TRANSFORM_RUN_COMMAND").filter(|v| !v.is_empty()).unwrap_or_else(|| {
                "dbt run --profiles-dir . --select staging intermediate marts".to_string()
            }),
            test_command: get("TRANSFORM_TEST_COMMAND")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "dbt test --profiles-dir .".to_string()),
        };

        Ok(Self {
            odds_api: OddsApiConfig {
                api_key,
                base_url: get("ODDS_API_BASE_URL")
                    .filter(|v| !v.is_empty())
                    .map(|v| v.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
                timeout: Duration::from_secs(parse_or(&get, "ODDS_API_TIMEOUT_SECONDS", 15)?),
            },
            bookmaker: get("BOOKMAKER")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "betway".to_string()),
            regions,
            markets,
            leagues,
            store,
            raw_data_dir: PathBuf::from(
                get("RAW_DATA_DIR")
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| "data/raw".to_string()),
            ),
            raw_file_prefix: get("RAW_FILE_PREFIX")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "odds_extracted".to_string()),
            run_once: parse_bool(get("RUN_ONCE")),
            poll_interval_seconds: parse_or(&get, "POLL_INTERVAL_SECONDS", 10_800)?,
            step_retries: parse_or(&get, "STEP_RETRIES", 2)?,
            step_retry_delay: Duration::from_secs(parse_or(&get, "STEP_RETRY_DELAY_SECONDS", 300)?),
            health_port: parse_or(&get, "HEALTH_PORT", 8083)?,
            transform,
            notify_webhook_url: get("NOTIFY_WEBHOOK_URL").filter(|v| !v.is_empty()),
        })
    }
}

/// Resolve the store URL: `DATABASE_URL` wins, otherwise it is composed from
/// host, path and token.
fn database_url<G>(get: &G) -> Result<String>
where
    G: Fn(&str) -> Option<String>,
{
    match get("DATABASE_URL") {
        Some(v) if !v.is_empty() => return Ok(v),
        Some(_) => return Err(Error::Config("DATABASE_URL is set but empty".into())),
        None => {}
    }

    let host = get("STORE_HOST")
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::Config("neither DATABASE_URL nor STORE_HOST is set".into()))?;
    let path = get("STORE_PATH")
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::Config("STORE_PATH is not set".into()))?;
    let token = match get("STORE_TOKEN") {
        Some(v) if !v.is_empty() => v,
        _ => read_secret_file(STORE_TOKEN_SECRET).ok_or_else(|| {
            Error::Config(format!(
                "STORE_TOKEN not set and no secret mounted at {}",
                STORE_TOKEN_SECRET
            ))
        })?,
    };
    reject_placeholder("STORE_TOKEN", &token)?;
    let user = get("STORE_USER").filter(|v| !v.is_empty()).unwrap_or_else(|| "odds".to_string());

    // Userinfo and path are percent-encoded by `Url`; tokens may contain '@', '/' or '#'.
    let invalid = |what: &str| Error::Config(format!("cannot build store URL: invalid {}", what));
    let mut url = reqwest::Url::parse(&format!("postgres://{}", normalize_host(&host)))
        .map_err(|_| invalid("STORE_HOST"))?;
    url.set_username(&user).map_err(|_| invalid("STORE_USER"))?;
    url.set_password(Some(&token)).map_err(|_| invalid("STORE_TOKEN"))?;
    url.set_path(path.trim_start_matches('/'));
    Ok(url.to_string())
}

/// Strip a scheme and anything after the authority: workspace URLs are
/// often pasted whole.
fn normalize_host(host: &str) -> &str {
    let host = host
        .strip_prefix("https://")
        .or_else(|| host.strip_prefix("http://"))
        .unwrap_or(host);
    host.split('/').next().unwrap_or(host)
}

/// Read a secret from a Docker secret file, if mounted.
fn read_secret_file(file_path: &str) -> Option<String> {
    std::fs::read_to_string(file_path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Prevent accidental use of sample/placeholder credentials.
fn reject_placeholder(name: &str, value: &str) -> Result<()> {
    let lower = value.to_lowercase();
    if lower.contains("change_me") || lower.contains("your_") || lower.starts_with("sample") {
        return Err(Error::Config(format!(
            "{} appears to be a placeholder value; replace with your real credential",
            name
        )));
    }
    Ok(())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(value: Option<String>) -> bool {
    matches!(
        value.as_deref().map(str::to_lowercase).as_deref(),
        Some("true") | Some("1") | Some("yes")
    )
}

fn parse_or<G, T>(get: &G, key: &str, default: T) -> Result<T>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match get(key).filter(|v| !v.is_empty()) {
        Some(v) => v
            .parse()
            .map_err(|_| Error::Config(format!("{} has an invalid value: {}", key, v))),
        None => Ok(default),
    }
}
