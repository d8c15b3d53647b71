//! Game → bookmaker → market → outcome flattening.

use chrono::Utc;
use tracing::debug;

use crate::models::{market_requires_line, OddsApiEvent, OddsRecord};

/// Flatten raw games into one row per outcome of the tracked bookmaker.
///
/// Rows keep provider response order. Every row of one call shares the same
/// `extracted_at` instant. Outcomes without a positive price are dropped, and
/// `point` is only kept for markets that carry a line.
pub fn flatten(games: &[OddsApiEvent], league_key: &str, bookmaker: &str) -> Vec<OddsRecord> {
    let extracted_at = Utc::now();
    let mut records = Vec::new();

    for game in games {
        for book in game.bookmakers.iter().filter(|b| b.key == bookmaker) {
            for market in &book.markets {
                let has_line = market_requires_line(&market.key);

                for outcome in &market.outcomes {
                    let odds = match outcome.price {
                        Some(price) if price.is_finite() && price > 0.0 => price,
                        _ => {
                            debug!(
                                "Skipping unpriced outcome {} in {}/{}",
                                outcome.name, game.id, market.key
                            );
                            continue;
                        }
                    };

                    records.push(OddsRecord {
                        game_id: game.id.clone(),
                        sport_key: league_key.to_string(),
                        sport_title: game.sport_title.clone(),
                        home_team: game.home_team.clone(),
                        away_team: game.away_team.clone(),
                        commence_time: game.commence_time,
                        bookmaker: book.key.clone(),
                        market_type: market.key.clone(),
                        outcome_name: outcome.name.clone(),
                        odds,
                        point: if has_line { outcome.point } else { None },
                        extracted_at,
                    });
                }
            }
        }
    }

    records
}
