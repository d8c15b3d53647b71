//! League aggregation: fetch and flatten each requested league in turn.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::fetch::{OddsRequest, OddsSource};
use crate::flatten::flatten;
use crate::models::{ExtractionSummary, League, OddsRecord, SUPPORTED_LEAGUES};

/// Combined rows of one run plus the per-league counts behind them.
#[derive(Debug, Default)]
pub struct Extraction {
    pub records: Vec<OddsRecord>,
    pub summaries: Vec<ExtractionSummary>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub struct Extractor {
    source: Arc<dyn OddsSource>,
    markets: Vec<String>,
}

impl Extractor {
    pub fn new(source: Arc<dyn OddsSource>, markets: Vec<String>) -> Self {
        Self { source, markets }
    }

    /// Extract every requested league, sequentially.
    ///
    /// `leagues = None` means all supported leagues; unknown keys are dropped
    /// before any request is made. Per-league failures are logged and the
    /// league contributes zero rows. Never fails as a whole.
    pub async fn extract(
        &self,
        leagues: Option<&[String]>,
        regions: &[String],
        bookmaker: &str,
    ) -> Extraction {
        let selected = select_leagues(leagues);
        let bookmakers = [bookmaker.to_string()];
        let mut extraction = Extraction::default();

        info!("Extracting odds for {} leagues", selected.len());

        for league in selected {
            let request = OddsRequest {
                league: league.key,
                regions,
                markets: &self.markets,
                bookmakers: &bookmakers,
            };

            let games = match self.source.fetch_odds(request).await {
                Ok(games) => games,
                Err(e) => {
                    warn!("Skipping {}: {}", league.key, e);
                    continue;
                }
            };

            let records = flatten(&games, league.key, bookmaker);
            if records.is_empty() {
                info!("No {} odds for {} ({} matches)", bookmaker, league.key, games.len());
                continue;
            }

            info!(
                "{}: {} matches, {} records",
                league.name,
                games.len(),
                records.len()
            );
            extraction.summaries.push(ExtractionSummary {
                league_key: league.key.to_string(),
                league_name: league.name.to_string(),
                matches_found: games.len(),
                records_produced: records.len(),
                extracted_at: Utc::now(),
            });
            extraction.records.extend(records);
        }

        info!(
            "Extraction complete: {} records from {} leagues",
            extraction.records.len(),
            extraction.summaries.len()
        );
        extraction
    }
}

/// Requested leagues filtered to the supported set, in request order.
pub fn select_leagues(requested: Option<&[String]>) -> Vec<League> {
    match requested {
        None => SUPPORTED_LEAGUES.to_vec(),
        Some(keys) => {
            let mut out: Vec<League> = Vec::new();
            for key in keys {
                match League::find(key) {
                    Some(league) if !out.contains(&league) => out.push(league),
                    Some(_) => {}
                    None => warn!("Ignoring unsupported league {}", key),
                }
            }
            out
        }
    }
}
