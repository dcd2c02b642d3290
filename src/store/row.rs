//! Row codec between `MatchRecord` and the `live_<sport>` columns.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{IngestError, Result};
use crate::model::{MatchRecord, OtherOdds, Sport, StatusCode};

/// One row of a sport table, column for column.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct MatchRow {
    pub match_id: String,
    pub match_data: Value,
    pub home_team: String,
    pub away_team: String,
    pub status: String,
    pub score: String,
    pub home_score: String,
    pub away_score: String,
    pub batting_team: Option<String>,
    pub is_live: bool,
    pub home_odds: Option<String>,
    pub away_odds: Option<String>,
    pub draw_odds: Option<String>,
    pub other_odds: Option<Value>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl MatchRow {
    /// `match_data` carries the full canonical record, `raw` included.
    /// An empty `other_odds` bag is stored as NULL.
    pub fn encode(record: &MatchRecord) -> Result<Self> {
        let match_data = serde_json::to_value(record)?;
        let other_odds = if record.other_odds.is_empty() {
            None
        } else {
            Some(serde_json::to_value(&record.other_odds)?)
        };

        Ok(Self {
            match_id: record.match_id.clone(),
            match_data,
            home_team: record.home_team.clone(),
            away_team: record.away_team.clone(),
            status: record.status_code.as_str().to_string(),
            score: record.score.clone(),
            home_score: record.home_score.clone(),
            away_score: record.away_score.clone(),
            batting_team: record.batting_team.clone(),
            is_live: record.is_live,
            home_odds: record.home_odds.clone(),
            away_odds: record.away_odds.clone(),
            draw_odds: record.draw_odds.clone(),
            other_odds,
            last_updated: None,
        })
    }

    /// Rebuilds the record. Normalized fields come from the columns; `raw`,
    /// `sport` and `scraped_at` come from `match_data`.
    pub fn decode(&self) -> Result<MatchRecord> {
        let data = self
            .match_data
            .as_object()
            .ok_or_else(|| IngestError::Parse(format!("{}: match_data is not an object", self.match_id)))?;

        let sport: Sport = data
            .get("sport")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .ok_or_else(|| IngestError::Parse(format!("{}: match_data has no sport", self.match_id)))?;
        let scraped_at: DateTime<Utc> = data
            .get("scraped_at")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_else(|| self.last_updated.unwrap_or_else(Utc::now));
        let status_text = data
            .get("status_text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let raw = data.get("raw").cloned().unwrap_or(Value::Null);
        let other_odds: OtherOdds = match &self.other_odds {
            Some(v) => serde_json::from_value(v.clone())?,
            None => OtherOdds::new(),
        };

        Ok(MatchRecord {
            sport,
            match_id: self.match_id.clone(),
            home_team: self.home_team.clone(),
            away_team: self.away_team.clone(),
            is_live: self.is_live,
            status_code: StatusCode::parse(&self.status),
            status_text,
            score: self.score.clone(),
            home_score: self.home_score.clone(),
            away_score: self.away_score.clone(),
            batting_team: self.batting_team.clone(),
            home_odds: self.home_odds.clone(),
            away_odds: self.away_odds.clone(),
            draw_odds: self.draw_odds.clone(),
            other_odds,
            raw,
            scraped_at,
        })
    }
}
