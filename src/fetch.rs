//! HTTP client for The Odds API.
//!
//! One request per (league, market set). Failures come back as a typed
//! [`FetchError`]; the aggregator decides they are non-fatal.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::OddsApiConfig;
use crate::models::{OddsApiEvent, Sport, DEFAULT_MARKETS};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("authentication failed: invalid API key")]
    Unauthorized,

    #[error("rate limited: no requests remaining")]
    RateLimited,

    #[error("provider unreachable: {0}")]
    Unreachable(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("failed to decode provider response: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Parameters for one odds request.
#[derive(Debug, Clone, Copy)]
pub struct OddsRequest<'a> {
    pub league: &'a str,
    pub regions: &'a [String],
    /// Empty means the full default market set.
    pub markets: &'a [String],
    pub bookmakers: &'a [String],
}

/// Provider-reported request quota, as last seen in response headers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuotaSnapshot {
    pub remaining: Option<u64>,
    pub used: Option<u64>,
}

/// Source of raw games for one league.
#[async_trait]
pub trait OddsSource: Send + Sync {
    async fn fetch_odds(&self, request: OddsRequest<'_>) -> Result<Vec<OddsApiEvent>, FetchError>;
}

/// Odds client
pub struct OddsApiClient {
    http_client: reqwest::Client,
    api_key: String,
    base_url: String,
    quota: RwLock<QuotaSnapshot>,
}

impl OddsApiClient {
    pub fn new(config: &OddsApiConfig) -> Result<Self, FetchError> {
        // HTTP client with timeouts
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout.min(std::time::Duration::from_secs(10)))
            .pool_max_idle_per_host(2)
            .build()
            .map_err(|e| FetchError::Unreachable(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            quota: RwLock::new(QuotaSnapshot::default()),
        })
    }

    /// Quota reported by the most recent response.
    pub async fn quota(&self) -> QuotaSnapshot {
        *self.quota.read().await
    }

    /// List the provider's sports catalogue.
    pub async fn list_sports(&self) -> Result<Vec<Sport>, FetchError> {
        let url = format!("{}/sports/", self.base_url);
        let sports: Vec<Sport> = self
            .get_json(&url, &[("apiKey", self.api_key.clone())])
            .await?;
        info!("Retrieved {} sports", sports.len());
        Ok(sports)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let response = self
            .http_client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| FetchError::Unreachable(e.to_string()))?;

        self.record_quota(response.headers()).await;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Unreachable(format!("failed to read response body: {}", e)))?;

        if let Some(err) = classify_status(status, &body) {
            return Err(err);
        }

        serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }

    async fn record_quota(&self, headers: &HeaderMap) {
        let snapshot = QuotaSnapshot {
            remaining: header_u64(headers, "x-requests-remaining"),
            used: header_u64(headers, "x-requests-used"),
        };
        if snapshot.remaining.is_none() && snapshot.used.is_none() {
            return;
        }
        if let Some(remaining) = snapshot.remaining {
            info!("API requests remaining: {}", remaining);
        }
        *self.quota.write().await = snapshot;
    }
}

#[async_trait]
impl OddsSource for OddsApiClient {
    /// Fetch odds for one league from `/sports/{league}/odds/`.
    async fn fetch_odds(&self, request: OddsRequest<'_>) -> Result<Vec<OddsApiEvent>, FetchError> {
        if request.regions.is_empty() {
            return Err(FetchError::InvalidRequest("regions must not be empty".into()));
        }

        let url = format!("{}/sports/{}/odds/", self.base_url, request.league);
        let markets = if request.markets.is_empty() {
            DEFAULT_MARKETS.join(",")
        } else {
            request.markets.join(",")
        };

        debug!("Requesting {} markets={}", request.league, markets);

        let events: Vec<OddsApiEvent> = self
            .get_json(
                &url,
                &[
                    ("apiKey", self.api_key.clone()),
                    ("regions", request.regions.join(",")),
                    ("markets", markets),
                    ("bookmakers", request.bookmakers.join(",")),
                    ("oddsFormat", "decimal".to_string()),
                ],
            )
            .await?;

        info!("Fetched {} matches for {}", events.len(), request.league);
        Ok(events)
    }
}

/// Map a non-success status to its failure kind.
pub fn classify_status(status: StatusCode, body: &str) -> Option<FetchError> {
    if status.is_success() {
        return None;
    }
    Some(match status {
        StatusCode::UNAUTHORIZED => FetchError::Unauthorized,
        StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimited,
        _ => FetchError::Http {
            status: status.as_u16(),
            body: body.to_string(),
        },
    })
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .map(|v| v as u64)
}
