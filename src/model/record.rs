//! Canonical in-memory match record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::IngestError;

/// Supported sports. Each maps to one `live_<sport>` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Sport {
    Football,
    Cricket,
    Tennis,
    Basketball,
    TableTennis,
    IceHockey,
    Esports,
    Volleyball,
    Baseball,
    Badminton,
    AmericanFootball,
    Handball,
    WaterPolo,
    Snooker,
    Rugby,
    Motorsport,
}

impl Sport {
    pub const ALL: [Sport; 16] = [
        Sport::Football,
        Sport::Cricket,
        Sport::Tennis,
        Sport::Basketball,
        Sport::TableTennis,
        Sport::IceHockey,
        Sport::Esports,
        Sport::Volleyball,
        Sport::Baseball,
        Sport::Badminton,
        Sport::AmericanFootball,
        Sport::Handball,
        Sport::WaterPolo,
        Sport::Snooker,
        Sport::Rugby,
        Sport::Motorsport,
    ];

    /// Kebab-case slug, as used in URLs and the `SPORTS` variable.
    pub fn slug(&self) -> &'static str {
        match self {
            Sport::Football => "football",
            Sport::Cricket => "cricket",
            Sport::Tennis => "tennis",
            Sport::Basketball => "basketball",
            Sport::TableTennis => "table-tennis",
            Sport::IceHockey => "ice-hockey",
            Sport::Esports => "esports",
            Sport::Volleyball => "volleyball",
            Sport::Baseball => "baseball",
            Sport::Badminton => "badminton",
            Sport::AmericanFootball => "american-football",
            Sport::Handball => "handball",
            Sport::WaterPolo => "water-polo",
            Sport::Snooker => "snooker",
            Sport::Rugby => "rugby",
            Sport::Motorsport => "motorsport",
        }
    }

    /// Table name. Only ever built from this fixed set, so safe to splice into SQL.
    pub fn table(&self) -> &'static str {
        match self {
            Sport::Football => "live_football",
            Sport::Cricket => "live_cricket",
            Sport::Tennis => "live_tennis",
            Sport::Basketball => "live_basketball",
            Sport::TableTennis => "live_table_tennis",
            Sport::IceHockey => "live_ice_hockey",
            Sport::Esports => "live_esports",
            Sport::Volleyball => "live_volleyball",
            Sport::Baseball => "live_baseball",
            Sport::Badminton => "live_badminton",
            Sport::AmericanFootball => "live_american_football",
            Sport::Handball => "live_handball",
            Sport::WaterPolo => "live_water_polo",
            Sport::Snooker => "live_snooker",
            Sport::Rugby => "live_rugby",
            Sport::Motorsport => "live_motorsport",
        }
    }

    /// Whether the primary market has a draw outcome.
    pub fn has_draw(&self) -> bool {
        matches!(
            self,
            Sport::Football | Sport::Cricket | Sport::IceHockey | Sport::Handball | Sport::Rugby
        )
    }
}

impl fmt::Display for Sport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Sport {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        Sport::ALL
            .iter()
            .copied()
            .find(|sport| sport.slug() == wanted)
            .ok_or_else(|| IngestError::Config(format!("unknown sport '{}'", s)))
    }
}

/// Normalized match status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum StatusCode {
    Upcoming,
    Live,
    Break,
    Finished,
    #[default]
    Unknown,
}

impl StatusCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::Upcoming => "upcoming",
            StatusCode::Live => "live",
            StatusCode::Break => "break",
            StatusCode::Finished => "finished",
            StatusCode::Unknown => "unknown",
        }
    }

    pub fn is_in_play(&self) -> bool {
        matches!(self, StatusCode::Live | StatusCode::Break)
    }

    pub fn parse(s: &str) -> StatusCode {
        match s {
            "upcoming" => StatusCode::Upcoming,
            "live" => StatusCode::Live,
            "break" => StatusCode::Break,
            "finished" => StatusCode::Finished,
            _ => StatusCode::Unknown,
        }
    }
}

/// Primary match-winner prices as decimal strings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PrimaryOdds {
    pub home: Option<String>,
    pub away: Option<String>,
    pub draw: Option<String>,
}

impl PrimaryOdds {
    pub fn is_empty(&self) -> bool {
        self.home.is_none() && self.away.is_none() && self.draw.is_none()
    }
}

/// Non-primary markets: market name -> selection -> decimal price.
pub type OtherOdds = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub sport: Sport,
    /// Source-namespaced id, e.g. `sf_1234`, `s24_998`, `cb_team-a-vs-team-b`.
    pub match_id: String,
    pub home_team: String,
    pub away_team: String,
    pub is_live: bool,
    pub status_code: StatusCode,
    pub status_text: String,
    /// Display composite stored in the `score` column.
    pub score: String,
    pub home_score: String,
    pub away_score: String,
    pub batting_team: Option<String>,
    pub home_odds: Option<String>,
    pub away_odds: Option<String>,
    pub draw_odds: Option<String>,
    pub other_odds: OtherOdds,
    pub raw: Value,
    pub scraped_at: DateTime<Utc>,
}

impl MatchRecord {
    /// Empty record for the given source id. Adapters fill in the rest.
    pub fn new(sport: Sport, match_id: impl Into<String>, raw: Value) -> Self {
        Self {
            sport,
            match_id: match_id.into(),
            home_team: String::new(),
            away_team: String::new(),
            is_live: false,
            status_code: StatusCode::Unknown,
            status_text: String::new(),
            score: String::new(),
            home_score: String::new(),
            away_score: String::new(),
            batting_team: None,
            home_odds: None,
            away_odds: None,
            draw_odds: None,
            other_odds: OtherOdds::new(),
            raw,
            scraped_at: Utc::now(),
        }
    }

    pub fn with_teams(mut self, home: impl Into<String>, away: impl Into<String>) -> Self {
        self.home_team = home.into();
        self.away_team = away.into();
        self
    }

    pub fn with_odds(mut self, odds: PrimaryOdds) -> Self {
        self.set_odds(odds);
        self
    }

    pub fn set_odds(&mut self, odds: PrimaryOdds) {
        self.home_odds = odds.home;
        self.away_odds = odds.away;
        self.draw_odds = odds.draw;
    }

    pub fn primary_odds(&self) -> PrimaryOdds {
        PrimaryOdds {
            home: self.home_odds.clone(),
            away: self.away_odds.clone(),
            draw: self.draw_odds.clone(),
        }
    }

    /// Sets both scores and derives the composite when the source gave none.
    pub fn set_scores(&mut self, home: impl Into<String>, away: impl Into<String>) {
        self.home_score = home.into();
        self.away_score = away.into();
        if self.score.is_empty() {
            self.score = composite_score(&self.home_score, &self.away_score);
        }
    }

    pub fn has_score(&self) -> bool {
        !self.score.trim().is_empty()
            || !self.home_score.trim().is_empty()
            || !self.away_score.trim().is_empty()
    }

    /// Namespaces a source-local id, e.g. `namespaced("sf", "42") == "sf_42"`.
    pub fn namespaced(prefix: &str, local_id: &str) -> String {
        format!("{}_{}", prefix, local_id)
    }
}

fn composite_score(home: &str, away: &str) -> String {
    match (home.trim(), away.trim()) {
        ("", "") => String::new(),
        (home, "") => home.to_string(),
        ("", away) => away.to_string(),
        (home, away) => format!("{} - {}", home, away),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sport_slugs_parse_back() {
        for sport in Sport::ALL {
            assert_eq!(sport.slug().parse::<Sport>().unwrap(), sport);
        }
        assert_eq!("TABLE_TENNIS".parse::<Sport>().unwrap(), Sport::TableTennis);
        assert!("curling".parse::<Sport>().is_err());
    }

    #[test]
    fn tables_are_unique_and_prefixed() {
        let mut tables: Vec<_> = Sport::ALL.iter().map(|s| s.table()).collect();
        tables.sort();
        tables.dedup();
        assert_eq!(tables.len(), 16);
        assert!(tables.iter().all(|t| t.starts_with("live_") && !t.contains('-')));
    }

    #[test]
    fn set_scores_keeps_source_composite() {
        let mut rec = MatchRecord::new(Sport::Cricket, "sf_1", json!({}));
        rec.score = "200/3 (32.0)".to_string();
        rec.set_scores("200/3", "");
        assert_eq!(rec.score, "200/3 (32.0)");

        let mut rec = MatchRecord::new(Sport::Football, "s24_1", json!({}));
        rec.set_scores("2", "1");
        assert_eq!(rec.score, "2 - 1");
        assert!(rec.has_score());
    }

    #[test]
    fn new_record_has_no_score_or_odds() {
        let rec = MatchRecord::new(Sport::Tennis, MatchRecord::namespaced("s24", "7"), json!(null));
        assert_eq!(rec.match_id, "s24_7");
        assert!(!rec.has_score());
        assert!(rec.primary_odds().is_empty());
    }
}
