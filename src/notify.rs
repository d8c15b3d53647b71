//! Run notifications.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info};

use crate::pipeline::{RunNotification, RunStatus};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook rejected notification with status {0}")]
    Rejected(u16),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &RunNotification) -> Result<(), NotifyError>;
}

/// Writes the notification to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &RunNotification) -> Result<(), NotifyError> {
        match notification.status {
            RunStatus::Success => info!("[SUCCESS] {}", notification.headline()),
            RunStatus::Failed => error!("[FAILED] {}", notification.headline()),
        }
        if let Some(summary) = &notification.summary {
            info!(
                "Run {}: extracted={} loaded={} bronze_total={} sports={} matches={} markets={} latest={}",
                summary.run_id,
                summary.extracted_rows,
                summary.loaded_rows,
                summary.total_bronze_rows,
                summary.sports_covered,
                summary.matches_total,
                summary.market_types,
                summary.latest_data_date,
            );
            for league in &summary.leagues {
                info!(
                    "  {}: {} matches, {} records",
                    league.league_name, league.matches_found, league.records_produced
                );
            }
        }
        Ok(())
    }
}

/// POSTs the notification as JSON.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &RunNotification) -> Result<(), NotifyError> {
        let response = self.client.post(&self.url).json(notification).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(status.as_u16()));
        }
        info!("Notification delivered ({})", notification.headline());
        Ok(())
    }
}
