//! Odds pipeline service.
//!
//! With `RUN_ONCE=true` a single run is executed and the exit code reflects
//! its status. Otherwise the pipeline runs every `POLL_INTERVAL_SECONDS` and
//! serves `/health` until interrupted.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{error, info};

use odds_pipeline::health::{self, HealthState};
use odds_pipeline::{Config, OddsApiClient, PgBronzeStore, Pipeline, RunStatus};

const STORE_CONNECT_RETRIES: u32 = 5;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("odds_pipeline=info".parse()?),
        )
        .init();

    info!("Odds pipeline v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env().context("failed to load configuration")?;

    let source = OddsApiClient::new(&config.odds_api).context("failed to build odds client")?;
    let store = PgBronzeStore::connect_with_retry(&config.store.database_url, STORE_CONNECT_RETRIES)
        .await
        .context("failed to connect to analytical store")?;
    let pipeline = Pipeline::from_config(&config, Arc::new(source), Arc::new(store))?;

    // Check if running in one-shot mode (manual trigger)
    if config.run_once {
        info!("Running in one-shot mode (RUN_ONCE=true)");
        let run = pipeline.run().await;
        if run.status == RunStatus::Failed {
            bail!("{}", run.headline());
        }
        return Ok(());
    }

    let health_state = HealthState::new();
    let health_addr = format!("0.0.0.0:{}", config.health_port);
    let listener = tokio::net::TcpListener::bind(&health_addr)
        .await
        .with_context(|| format!("failed to bind health endpoint on {}", health_addr))?;
    info!("Health endpoint listening on {}", health_addr);

    let app = health::router(health_state.clone());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Health server stopped: {}", e);
        }
    });

    // Handle shutdown gracefully (continuous mode)
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    tokio::select! {
        _ = run_forever(&pipeline, &health_state, config.poll_interval_seconds) => {}
        _ = ctrl_c => {
            info!("Shutting down...");
        }
    }

    Ok(())
}

/// Main polling loop. Runs never overlap: each one is awaited before the
/// next sleep starts.
async fn run_forever(pipeline: &Pipeline, health: &HealthState, poll_interval_seconds: u64) {
    info!(
        "Starting odds pipeline loop (poll interval: {}s)",
        poll_interval_seconds
    );

    loop {
        let start = std::time::Instant::now();
        let run = pipeline.run().await;
        health.record(&run).await;
        info!(
            "Run {} completed with status {:?} in {:?}",
            run.run_id,
            run.status,
            start.elapsed()
        );

        tokio::time::sleep(Duration::from_secs(poll_interval_seconds)).await;
    }
}
