//! Provider payloads and the flat row types produced from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The Odds API event structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct OddsApiEvent {
    pub id: String,
    pub sport_key: String,
    pub sport_title: String,
    pub commence_time: Option<DateTime<Utc>>,
    pub home_team: String,
    pub away_team: String,
    pub bookmakers: Vec<Bookmaker>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Bookmaker {
    pub key: String,
    pub title: String,
    pub last_update: Option<DateTime<Utc>>,
    pub markets: Vec<Market>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Market {
    pub key: String,
    pub last_update: Option<DateTime<Utc>>,
    pub outcomes: Vec<Outcome>,
}

/// One priced option. Prices are requested in decimal format.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Outcome {
    pub name: String,
    pub price: Option<f64>,
    pub point: Option<f64>,
}

/// Entry of the `/sports/` catalogue.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Sport {
    pub key: String,
    pub group: String,
    pub title: String,
    pub description: String,
    pub active: bool,
    pub has_outrights: bool,
}

/// A league this pipeline knows how to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct League {
    pub key: &'static str,
    pub name: &'static str,
}

/// Soccer leagues tracked by the pipeline.
pub const SUPPORTED_LEAGUES: [League; 4] = [
    League {
        key: "soccer_epl",
        name: "English Premier League",
    },
    League {
        key: "soccer_spain_la_liga",
        name: "La Liga",
    },
    League {
        key: "soccer_italy_serie_a",
        name: "Serie A",
    },
    League {
        key: "soccer_uefa_champs_league",
        name: "UEFA Champions League",
    },
];

/// Featured markets the odds endpoint serves for soccer.
pub const DEFAULT_MARKETS: [&str; 3] = ["h2h", "spreads", "totals"];

impl League {
    pub fn find(key: &str) -> Option<League> {
        SUPPORTED_LEAGUES.iter().copied().find(|l| l.key == key)
    }
}

/// Whether outcomes of this market carry a line (`point`).
pub fn market_requires_line(market_key: &str) -> bool {
    let base = market_key.strip_prefix("alternate_").unwrap_or(market_key);
    base.starts_with("spreads") || base.starts_with("totals") || base.starts_with("team_totals")
}

/// Normalized odds row: one outcome price point for the tracked bookmaker.
///
/// Field order is the column order of the raw file artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsRecord {
    pub game_id: String,
    pub sport_key: String,
    pub sport_title: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: Option<DateTime<Utc>>,
    pub bookmaker: String,
    pub market_type: String,
    pub outcome_name: String,
    pub odds: f64,
    pub point: Option<f64>,
    pub extracted_at: DateTime<Utc>,
}

/// Per-league extraction counts for the current run. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionSummary {
    pub league_key: String,
    pub league_name: String,
    pub matches_found: usize,
    pub records_produced: usize,
    pub extracted_at: DateTime<Utc>,
}
