//! JSON-API adapter.
//!
//! Live events come from `/api/v1/sport/<sport>/events/live`; odds are a
//! second call per event, `/api/v1/event/<id>/odds/1/all`. When the default
//! provider has no markets, `/api/v1/event/<id>/odds/providers` lists the
//! alternatives and each is tried in order.
//!
//! The site blocks bare HTTP clients, so every call is made with `fetch()`
//! from inside a browser page opened on the site's origin.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::{HttpFetcher, SourceAdapter, Variant};
use crate::browser::{BrowserPool, ContextKind, PageLease};
use crate::error::{IngestError, Result};
use crate::model::odds::{fractional_to_decimal, valid_price};
use crate::model::status::classify;
use crate::model::{MatchRecord, OtherOdds, PrimaryOdds, Sport, StatusCode};

pub const TAG: &str = "s24";
const DEFAULT_PROVIDER: &str = "1";
/// Alternative providers tried per event, each round one request batch.
const FALLBACK_ROUNDS: usize = 3;
/// Same-origin document to run fetches from; small and always present.
const ORIGIN_ANCHOR: &str = "/robots.txt";
/// Market names treated as the primary match-winner market.
const PRIMARY_MARKETS: &[&str] = &["full time", "home/away", "match winner", "winner", "1x2", "to win"];

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct LiveEvent {
    pub id: u64,
    pub home_team: Team,
    pub away_team: Team,
    pub home_score: Score,
    pub away_score: Score,
    pub status: EventStatus,
    pub start_timestamp: Option<i64>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct Team {
    pub id: Option<u64>,
    pub name: String,
    pub short_name: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Score {
    pub current: Option<Value>,
    pub display: Option<Value>,
}

impl Score {
    fn text(&self) -> String {
        self.display
            .as_ref()
            .or(self.current.as_ref())
            .map(|v| match v {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => String::new(),
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct EventStatus {
    pub code: Option<i64>,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct OddsMarket {
    pub market_name: String,
    pub choice_group: Option<String>,
    pub choices: Vec<OddsChoice>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct OddsChoice {
    pub name: String,
    pub fractional_value: Option<String>,
    pub decimal_value: Option<Value>,
}

impl OddsChoice {
    fn decimal(&self) -> Option<String> {
        if let Some(v) = self.decimal_value.as_ref().and_then(valid_price) {
            return Some(v);
        }
        self.fractional_value.as_deref().and_then(fractional_to_decimal)
    }
}

pub struct JsonApiAdapter {
    http: HttpFetcher,
    browser: Arc<BrowserPool>,
}

impl JsonApiAdapter {
    pub fn new(http: HttpFetcher, browser: Arc<BrowserPool>) -> Self {
        Self { http, browser }
    }

    async fn collect(&self, page: &mut PageLease, sport: Sport) -> Result<Vec<MatchRecord>> {
        page.goto(&self.http.url(ORIGIN_ANCHOR)).await?;

        let live_url = self
            .http
            .url(&format!("api/v1/sport/{}/events/live", api_sport_slug(sport)));
        let listing = page.fetch_json(&live_url).await?;
        let events = parse_events(&listing)?;
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let odds_urls: Vec<String> = events
            .iter()
            .map(|(event, _)| self.odds_url(event.id, DEFAULT_PROVIDER))
            .collect();
        let mut odds = page.fetch_json_many(&odds_urls).await?;

        self.fill_from_fallback_providers(page, &events, &mut odds).await;

        Ok(events
            .into_iter()
            .zip(odds)
            .map(|((event, raw_event), raw_odds)| to_record(sport, &event, raw_event, raw_odds))
            .collect())
    }

    /// Events whose default provider had nothing try the other providers.
    /// Round `n` asks every still-empty event's `n`-th alternative at once,
    /// for at most `FALLBACK_ROUNDS` rounds. A failed round ends the search;
    /// those events keep their empty odds.
    async fn fill_from_fallback_providers(&self, page: &mut PageLease, events: &[(LiveEvent, Value)], odds: &mut [Value]) {
        let missing: Vec<usize> = (0..events.len()).filter(|i| markets(&odds[*i]).is_empty()).collect();
        if missing.is_empty() {
            return;
        }

        let provider_urls: Vec<String> = missing
            .iter()
            .map(|i| self.http.url(&format!("api/v1/event/{}/odds/providers", events[*i].0.id)))
            .collect();
        let listings = match page.fetch_json_many(&provider_urls).await {
            Ok(listings) => listings,
            Err(e) => {
                debug!(source = TAG, "provider listing failed; {} events keep no odds: {}", missing.len(), e);
                return;
            }
        };
        let alternatives: Vec<(usize, Vec<String>)> = missing
            .iter()
            .zip(listings.iter())
            .map(|(slot, listing)| {
                let others = provider_ids(listing)
                    .into_iter()
                    .filter(|p| p != DEFAULT_PROVIDER)
                    .collect();
                (*slot, others)
            })
            .collect();

        for round in 0..FALLBACK_ROUNDS {
            let wanted: Vec<(usize, &String)> = alternatives
                .iter()
                .filter(|(slot, _)| markets(&odds[*slot]).is_empty())
                .filter_map(|(slot, others)| others.get(round).map(|p| (*slot, p)))
                .collect();
            if wanted.is_empty() {
                break;
            }
            let urls: Vec<String> = wanted
                .iter()
                .map(|(slot, provider)| self.odds_url(events[*slot].0.id, provider))
                .collect();
            let answers = match page.fetch_json_many(&urls).await {
                Ok(answers) => answers,
                Err(e) => {
                    debug!(source = TAG, round, "fallback odds failed: {}", e);
                    break;
                }
            };
            for ((slot, provider), alt) in wanted.into_iter().zip(answers) {
                if !markets(&alt).is_empty() {
                    debug!(source = TAG, event = events[slot].0.id, provider = %provider, "odds from fallback provider");
                    odds[slot] = alt;
                }
            }
        }
    }

    fn odds_url(&self, event_id: u64, provider: &str) -> String {
        self.http
            .url(&format!("api/v1/event/{}/odds/{}/all", event_id, provider))
    }
}

#[async_trait]
impl SourceAdapter for JsonApiAdapter {
    fn name(&self) -> &str {
        TAG
    }

    fn variant(&self) -> Variant {
        Variant::JsonApi
    }

    fn sports(&self) -> &[Sport] {
        &Sport::ALL
    }

    async fn fetch(&self, sport: Sport) -> Result<Vec<MatchRecord>> {
        let mut page = self.browser.lease(ContextKind::Desktop).await?;
        let result = self.collect(&mut page, sport).await;
        page.release().await;
        result
    }
}

/// Path segment the API uses for each sport.
pub fn api_sport_slug(sport: Sport) -> &'static str {
    match sport {
        Sport::WaterPolo => "waterpolo",
        other => other.slug(),
    }
}

/// Typed events paired with their untouched JSON. Events that do not
/// deserialize are skipped one by one.
fn parse_events(listing: &Value) -> Result<Vec<(LiveEvent, Value)>> {
    let list = match listing.get("events") {
        Some(Value::Array(list)) => list,
        Some(_) => return Err(IngestError::Parse("events is not an array".to_string())),
        None if listing.is_null() => return Err(IngestError::Fetch("live listing request failed".to_string())),
        None => return Ok(Vec::new()),
    };

    let mut events = Vec::with_capacity(list.len());
    for raw in list {
        match serde_json::from_value::<LiveEvent>(raw.clone()) {
            Ok(event) if event.id != 0 => events.push((event, raw.clone())),
            Ok(_) => debug!(source = TAG, "skipping event without id"),
            Err(e) => debug!(source = TAG, "skipping malformed event: {}", e),
        }
    }
    Ok(events)
}

fn markets(odds: &Value) -> Vec<OddsMarket> {
    odds.get("markets")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|m| serde_json::from_value::<OddsMarket>(m.clone()).ok())
                .filter(|m| !m.choices.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn provider_ids(listing: &Value) -> Vec<String> {
    let Some(list) = listing.get("providers").and_then(Value::as_array) else {
        return Vec::new();
    };
    list.iter()
        .filter_map(|p| p.get("provider").unwrap_or(p).get("id"))
        .filter_map(|id| match id {
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        })
        .collect()
}

fn status_code(status: &EventStatus) -> StatusCode {
    let description = status.description.to_lowercase();
    match status.kind.as_str() {
        "notstarted" => StatusCode::Upcoming,
        "inprogress" if ["halftime", "break", "pause", "interrupted"].iter().any(|w| description.contains(w)) => {
            StatusCode::Break
        }
        "inprogress" => StatusCode::Live,
        "finished" | "canceled" | "postponed" | "abandoned" => StatusCode::Finished,
        _ => StatusCode::Unknown,
    }
}

/// Splits markets into the primary match-winner prices and the rest.
pub fn split_markets(markets: &[OddsMarket]) -> (PrimaryOdds, OtherOdds) {
    let mut primary = PrimaryOdds::default();
    let mut other = OtherOdds::new();
    let mut primary_found = false;

    for market in markets {
        let prices: BTreeMap<String, String> = market
            .choices
            .iter()
            .filter_map(|c| c.decimal().map(|d| (c.name.clone(), d)))
            .collect();
        if prices.is_empty() {
            continue;
        }

        let is_primary = !primary_found
            && PRIMARY_MARKETS.contains(&market.market_name.to_lowercase().as_str())
            && prices.contains_key("1")
            && prices.contains_key("2");
        if is_primary {
            primary = PrimaryOdds {
                home: prices.get("1").cloned(),
                away: prices.get("2").cloned(),
                draw: prices.get("X").cloned(),
            };
            primary_found = true;
            continue;
        }

        let name = match &market.choice_group {
            Some(group) if !group.is_empty() => format!("{}:{} {}", TAG, market.market_name, group),
            _ => format!("{}:{}", TAG, market.market_name),
        };
        other.insert(name, prices);
    }

    (primary, other)
}

fn to_record(sport: Sport, event: &LiveEvent, raw_event: Value, raw_odds: Value) -> MatchRecord {
    let match_id = MatchRecord::namespaced(TAG, &event.id.to_string());
    let team_name = |team: &Team| -> String {
        if !team.name.trim().is_empty() {
            team.name.trim().to_string()
        } else if let Some(id) = team.id {
            crate::model::teams::fallback_name(&id.to_string())
        } else {
            String::new()
        }
    };

    let mut record = MatchRecord::new(sport, match_id, json!({"event": raw_event, "odds": raw_odds}))
        .with_teams(team_name(&event.home_team), team_name(&event.away_team));
    record.set_scores(event.home_score.text(), event.away_score.text());

    let status = classify(
        status_code(&event.status),
        &[event.status.description.as_str()],
        record.has_score(),
    );
    record.status_code = status.code;
    record.is_live = status.is_live;
    record.status_text = event.status.description.clone();

    let (primary, other) = split_markets(&markets(&record.raw["odds"]));
    record.set_odds(primary);
    record.other_odds = other;
    record
}
