//! SSR-blob adapter.
//!
//! The site serializes its hydration state into the page as
//! `window.__INITIAL_STATE__`. Live matches sit under
//! `state.<sport>.matchesData_matches` on the listing page, or
//! `state.<sport>.home-new.matchesData.liveMatches` on the home layout.
//! Team names come from a fixtures listing that maps team ids to names.
//!
//! Each fetch tries a desktop page, then a mobile page, then a plain HTTP
//! fetch with the blob cut out of the inline script.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{text, walk, HttpFetcher, SourceAdapter, Variant};
use crate::browser::{BrowserPool, ContextKind};
use crate::error::{IngestError, Result};
use crate::model::odds::{extract_other, extract_primary};
use crate::model::status::{normalize, StatusTable};
use crate::model::{MatchRecord, Sport, TeamDirectory};

pub const TAG: &str = "sf";
pub const STATE_GLOBAL: &str = "__INITIAL_STATE__";

const MATCH_PATHS: &[&[&str]] = &[&["matchesData_matches"], &["home-new", "matchesData", "liveMatches"]];
const TEAM_PATHS: &[&[&str]] = &[&["teams"], &["fixtures", "teams"], &["matchesData", "teams"]];

const SPORTS: &[Sport] = &[
    Sport::Cricket,
    Sport::Football,
    Sport::Tennis,
    Sport::Basketball,
    Sport::TableTennis,
    Sport::Badminton,
    Sport::Volleyball,
    Sport::Esports,
];

pub struct SsrAdapter {
    http: HttpFetcher,
    browser: Arc<BrowserPool>,
    teams: TeamDirectory,
    status: StatusTable,
}

impl SsrAdapter {
    pub fn new(http: HttpFetcher, browser: Arc<BrowserPool>, teams: TeamDirectory) -> Self {
        Self {
            http,
            browser,
            teams,
            status: StatusTable::caret_tokens(),
        }
    }

    fn listing_url(&self, sport: Sport) -> String {
        self.http.url(&format!("{}/live", sport.slug()))
    }

    fn fixtures_url(&self, sport: Sport) -> String {
        self.http.url(&format!("{}/fixtures", sport.slug()))
    }

    /// Sport subtree of the hydration state, loaded in a browser page.
    async fn state_via_browser(&self, url: &str, sport: Sport, kind: ContextKind) -> Result<Value> {
        let mut page = self.browser.lease(kind).await?;
        let result = async {
            page.goto(url).await?;
            page.evaluate(&state_script(sport)).await
        }
        .await;
        page.release().await;

        match result? {
            Value::Null => Err(IngestError::Parse(format!("{} not present on {}", STATE_GLOBAL, url))),
            state => Ok(state),
        }
    }

    async fn state_via_http(&self, url: &str, sport: Sport) -> Result<Value> {
        let html = self.http.get_text(url, ContextKind::Desktop).await?;
        let state = extract_state_blob(&html)
            .ok_or_else(|| IngestError::Parse(format!("no {} blob in {}", STATE_GLOBAL, url)))?;
        state
            .get(sport.slug())
            .cloned()
            .ok_or_else(|| IngestError::Parse(format!("state has no '{}' subtree", sport.slug())))
    }

    /// Desktop page, then mobile page, then plain HTTP.
    async fn load_state(&self, url: &str, sport: Sport) -> Result<Value> {
        let mut last_err = None;
        for kind in [ContextKind::Desktop, ContextKind::Mobile] {
            match self.state_via_browser(url, sport, kind).await {
                Ok(state) => return Ok(state),
                Err(e) => {
                    debug!(source = TAG, sport = %sport, context = kind.as_str(), "state load failed: {}", e);
                    last_err = Some(e);
                }
            }
        }
        match self.state_via_http(url, sport).await {
            Ok(state) => Ok(state),
            Err(e) => {
                if let Some(prev) = last_err {
                    debug!(source = TAG, sport = %sport, "browser attempts failed: {}", prev);
                }
                Err(e)
            }
        }
    }

    /// Maps one raw match object. `None` means the object is unusable.
    async fn to_record(&self, sport: Sport, raw: &Value) -> Option<MatchRecord> {
        let local_id = match_local_id(raw)?;
        let match_id = MatchRecord::namespaced(TAG, &local_id);
        let home_id = text(raw, "b");
        let away_id = text(raw, "c");
        if home_id.is_empty() || away_id.is_empty() {
            warn!(source = TAG, match_id = %match_id, "skipping match without team ids");
            return None;
        }

        let cache = self.teams.cache(TAG, sport).await;
        let home_team = cache.resolve(&home_id).await;
        let away_team = cache.resolve(&away_id).await;

        let mut record = MatchRecord::new(sport, match_id, raw.clone()).with_teams(home_team, away_team);
        record.set_scores(text(raw, "j"), text(raw, "k"));

        let detail = text(raw, "st");
        let result = text(raw, "res");
        let status = normalize(&self.status, &text(raw, "a"), &[detail.as_str(), result.as_str()], record.has_score());
        record.status_code = status.code;
        record.is_live = status.is_live;
        record.status_text = if result.is_empty() { detail } else { result };

        if sport == Sport::Cricket {
            let batting = text(raw, "bt");
            if !batting.is_empty() {
                record.batting_team = Some(cache.resolve(&batting).await);
            }
        }

        record.set_odds(extract_primary(raw));
        record.other_odds = extract_other(raw, TAG);
        Some(record)
    }
}

#[async_trait]
impl SourceAdapter for SsrAdapter {
    fn name(&self) -> &str {
        TAG
    }

    fn variant(&self) -> Variant {
        Variant::SsrBlob
    }

    fn sports(&self) -> &[Sport] {
        SPORTS
    }

    async fn warmup(&self) -> Result<()> {
        for sport in SPORTS {
            match self.team_seed(*sport).await {
                Ok(entries) => {
                    let cache = self.teams.cache(TAG, *sport).await;
                    let added = cache.extend(entries).await;
                    info!(source = TAG, sport = %sport, added, "team cache warmed");
                }
                // Missing names degrade to ids; not a failure.
                Err(e) => warn!(source = TAG, sport = %sport, "team seeding failed: {}", e),
            }
        }
        Ok(())
    }

    async fn fetch(&self, sport: Sport) -> Result<Vec<MatchRecord>> {
        let url = self.listing_url(sport);
        let state = self.load_state(&url, sport).await?;
        let matches = match_list(&state);

        let mut records = Vec::with_capacity(matches.len());
        for raw in matches {
            if let Some(record) = self.to_record(sport, raw).await {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn team_seed(&self, sport: Sport) -> Result<Vec<(String, String)>> {
        let url = self.fixtures_url(sport);
        let state = self.load_state(&url, sport).await?;
        Ok(team_entries(&state))
    }
}

/// Returns the sport subtree only; the full state can be megabytes.
fn state_script(sport: Sport) -> String {
    let key = serde_json::to_string(sport.slug()).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        "(() => {{ const s = window.{STATE_GLOBAL}; return s && s[{key}] ? JSON.parse(JSON.stringify(s[{key}])) : null; }})()"
    )
}

/// First non-empty match array among the known layouts.
pub fn match_list(state: &Value) -> &[Value] {
    MATCH_PATHS
        .iter()
        .filter_map(|path| walk(state, path).and_then(Value::as_array))
        .find(|list| !list.is_empty())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn match_local_id(raw: &Value) -> Option<String> {
    for key in ["id", "mi", "matchId"] {
        let id = text(raw, key);
        if !id.is_empty() {
            return Some(id);
        }
    }
    // No explicit id: teams plus start time are stable across polls.
    let (home, away, start) = (text(raw, "b"), text(raw, "c"), text(raw, "ti"));
    if home.is_empty() || away.is_empty() || start.is_empty() {
        return None;
    }
    Some(format!("{}_{}_{}", home, away, start))
}

/// Team map in either `{id: "Name"}`, `{id: {"name": ..}}` or
/// `[{"id": .., "name": ..}]` form.
pub fn team_entries(state: &Value) -> Vec<(String, String)> {
    let Some(teams) = TEAM_PATHS.iter().find_map(|path| walk(state, path)) else {
        return Vec::new();
    };

    let name_of = |v: &Value| -> Option<String> {
        match v {
            Value::String(s) => Some(s.clone()),
            Value::Object(_) => ["name", "n", "fullName", "shortName"]
                .iter()
                .map(|k| text(v, k))
                .find(|s| !s.is_empty()),
            _ => None,
        }
    };

    match teams {
        Value::Object(map) => map
            .iter()
            .filter_map(|(id, v)| name_of(v).map(|name| (id.clone(), name)))
            .collect(),
        Value::Array(list) => list
            .iter()
            .filter_map(|v| {
                let id = text(v, "id");
                let name = name_of(v)?;
                (!id.is_empty()).then_some((id, name))
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Cuts `window.__INITIAL_STATE__ = {...}` out of an HTML document.
pub fn extract_state_blob(html: &str) -> Option<Value> {
    let marker = format!("{} =", STATE_GLOBAL);
    let start = html.find(&marker).or_else(|| html.find(&format!("{}=", STATE_GLOBAL)))?;
    let after = &html[start..];
    let open = after.find('{')?;
    let object = balanced_object(&after[open..])?;
    serde_json::from_str(object).ok()
}

/// The prefix of `s` (which starts with `{`) up to its matching `}`.
fn balanced_object(s: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, ch) in s.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&s[..=idx]);
                }
            }
            _ => {}
        }
    }
    None
}
