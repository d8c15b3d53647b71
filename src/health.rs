//! Daemon-mode health endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::RwLock;

use crate::pipeline::{RunNotification, RunStatus};

/// Service health state
#[derive(Clone, Default)]
pub struct HealthState {
    pub last_run_time: Arc<RwLock<Option<DateTime<Utc>>>>,
    pub last_rows_loaded: Arc<RwLock<usize>>,
    pub last_status: Arc<RwLock<Option<RunStatus>>>,
    pub consecutive_failures: Arc<RwLock<usize>>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, run: &RunNotification) {
        *self.last_run_time.write().await = Some(run.run_date);
        *self.last_rows_loaded.write().await = run.loaded_rows();
        *self.last_status.write().await = Some(run.status);
        let mut failures = self.consecutive_failures.write().await;
        match run.status {
            RunStatus::Success => *failures = 0,
            RunStatus::Failed => *failures += 1,
        }
    }
}

/// Health check handler
async fn health_handler(
    State(health): State<HealthState>,
) -> (StatusCode, Json<serde_json::Value>) {
    let last_run = *health.last_run_time.read().await;
    let last_rows = *health.last_rows_loaded.read().await;
    let last_status = *health.last_status.read().await;
    let failures = *health.consecutive_failures.read().await;

    let status = if failures > 2 { "degraded" } else { "ok" };
    let http_status = if failures > 5 {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        http_status,
        Json(json!({
            "service": "odds-pipeline",
            "version": env!("CARGO_PKG_VERSION"),
            "status": status,
            "last_run": last_run.map(|t| t.to_rfc3339()),
            "last_run_status": last_status,
            "last_rows_loaded": last_rows,
            "consecutive_failures": failures
        })),
    )
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}
