//! Connectivity check for the odds provider and the analytical store.
//!
//! Lists the provider's sports, reports the remaining quota, makes sure the
//! bronze table exists and prints its statistics plus a handful of rows.

use anyhow::{Context, Result};
use tracing::info;

use odds_pipeline::{Config, LoadClient, OddsApiClient, PgBronzeStore};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("odds_pipeline=info".parse()?),
        )
        .init();

    let config = Config::from_env().context("failed to load configuration")?;

    let client = OddsApiClient::new(&config.odds_api)?;
    let sports = client
        .list_sports()
        .await
        .context("odds provider check failed")?;
    let active = sports.iter().filter(|s| s.active).count();
    let quota = client.quota().await;
    info!(
        "Odds provider OK: {} sports ({} active), requests remaining={:?} used={:?}",
        sports.len(),
        active,
        quota.remaining,
        quota.used
    );

    let store = PgBronzeStore::connect_with_retry(&config.store.database_url, 1)
        .await
        .context("analytical store check failed")?;
    let loader = LoadClient::new(Arc::new(store), &config.store);
    loader.ensure_table().await?;

    let stats = loader.stats().await;
    info!(
        "{}: {} rows, {} sports, {} matches, {} market types, latest partition {:?}",
        loader.table(),
        stats.row_count,
        stats.sports,
        stats.matches,
        stats.markets,
        stats.latest_date
    );

    for row in loader.sample(10).await? {
        println!("{}", serde_json::to_string(&row)?);
    }

    Ok(())
}
