//! DOM adapter: match rows scraped from a rendered live listing.
//!
//! Rows look like
//!
//! ```html
//! <div class="match-row" data-id="123">
//!   <a href="/match/ind-vs-aus-123">..</a>
//!   <span class="team-home">India</span> <span class="score-home">2</span>
//!   <span class="team-away">Australia</span> <span class="score-away">1</span>
//!   <span class="match-status">HT</span>
//!   <div class="odds"><span class="odd">1.9</span><span class="odd">3.4</span><span class="odd">4.0</span></div>
//! </div>
//! ```

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{HttpFetcher, SourceAdapter, Variant};
use crate::browser::{BrowserPool, ContextKind};
use crate::error::{IngestError, Result};
use crate::model::odds::extract_primary;
use crate::model::status::{classify, StatusTable};
use crate::model::{MatchRecord, Sport, StatusCode};

pub const TAG: &str = "cb";
pub const ROW_SELECTOR: &str = ".match-row";
const ROW_WAIT: Duration = Duration::from_secs(5);

const SPORTS: &[Sport] = &[Sport::Football, Sport::Cricket, Sport::Tennis, Sport::Basketball];

pub struct DomAdapter {
    http: HttpFetcher,
    browser: Arc<BrowserPool>,
}

impl DomAdapter {
    pub fn new(http: HttpFetcher, browser: Arc<BrowserPool>) -> Self {
        Self { http, browser }
    }

    fn listing_url(&self, sport: Sport) -> String {
        self.http.url(&format!("live/{}", sport.slug()))
    }

    /// Rendered listing HTML, or `None` when no rows appeared in time.
    async fn rendered(&self, sport: Sport) -> Result<Option<String>> {
        let url = self.listing_url(sport);
        let mut page = self.browser.lease(ContextKind::Desktop).await?;
        let result = async {
            page.goto(&url).await?;
            if !page.wait_for_selector(ROW_SELECTOR, ROW_WAIT).await? {
                debug!(source = TAG, sport = %sport, "no match rows on {}", url);
                return Ok(None);
            }
            page.content().await.map(Some)
        }
        .await;
        page.release().await;
        result
    }
}

#[async_trait]
impl SourceAdapter for DomAdapter {
    fn name(&self) -> &str {
        TAG
    }

    fn variant(&self) -> Variant {
        Variant::Dom
    }

    fn sports(&self) -> &[Sport] {
        SPORTS
    }

    async fn fetch(&self, sport: Sport) -> Result<Vec<MatchRecord>> {
        match self.rendered(sport).await? {
            Some(html) => parse_rows(&html, sport),
            None => Ok(Vec::new()),
        }
    }
}

fn dom_statuses() -> StatusTable {
    StatusTable::new(&[
        ("live", StatusCode::Live),
        ("in play", StatusCode::Live),
        ("ht", StatusCode::Break),
        ("break", StatusCode::Break),
        ("ft", StatusCode::Finished),
        ("aet", StatusCode::Finished),
        ("ended", StatusCode::Finished),
        ("upcoming", StatusCode::Upcoming),
    ])
}

/// Status tokens outside the table: a kick-off time (`19:30`) is upcoming,
/// a running minute (`67'`) is live.
fn status_token(table: &StatusTable, token: &str) -> StatusCode {
    let code = table.lookup(token);
    if code != StatusCode::Unknown {
        return code;
    }
    let token = token.trim();
    if is_clock(token) {
        StatusCode::Upcoming
    } else if is_minute(token) {
        StatusCode::Live
    } else {
        StatusCode::Unknown
    }
}

fn is_clock(token: &str) -> bool {
    match token.split_once(':') {
        Some((h, m)) => {
            !h.is_empty() && h.len() <= 2 && m.len() == 2 && h.chars().chain(m.chars()).all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

fn is_minute(token: &str) -> bool {
    let digits = token.trim_end_matches(['\'', '+']);
    let digits = digits.split('+').next().unwrap_or_default();
    token.ends_with('\'') && !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

struct RowSelectors {
    row: Selector,
    link: Selector,
    home: Selector,
    away: Selector,
    home_score: Selector,
    away_score: Selector,
    status: Selector,
    odds: Selector,
}

impl RowSelectors {
    fn new() -> Result<Self> {
        Ok(Self {
            row: selector(ROW_SELECTOR)?,
            link: selector("a[href]")?,
            home: selector(".team-home")?,
            away: selector(".team-away")?,
            home_score: selector(".score-home")?,
            away_score: selector(".score-away")?,
            status: selector(".match-status")?,
            odds: selector(".odds .odd")?,
        })
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| IngestError::Parse(format!("bad selector '{}': {:?}", css, e)))
}

/// Parses every match row in the document. Rows without an id or without
/// both team names are skipped.
pub fn parse_rows(html: &str, sport: Sport) -> Result<Vec<MatchRecord>> {
    let selectors = RowSelectors::new()?;
    let table = dom_statuses();
    let document = Html::parse_document(html);

    let mut records = Vec::new();
    for row in document.select(&selectors.row) {
        match parse_row(&row, &selectors, &table, sport) {
            Some(record) => records.push(record),
            None => warn!(source = TAG, sport = %sport, "skipping unparseable match row"),
        }
    }
    debug!(source = TAG, sport = %sport, rows = records.len(), "parsed match rows");
    Ok(records)
}

fn parse_row(row: &ElementRef, sel: &RowSelectors, table: &StatusTable, sport: Sport) -> Option<MatchRecord> {
    let local_id = row_id(row, sel)?;
    let home = cell(row, &sel.home);
    let away = cell(row, &sel.away);
    if home.is_empty() || away.is_empty() {
        return None;
    }

    let home_score = cell(row, &sel.home_score);
    let away_score = cell(row, &sel.away_score);
    let status_text = cell(row, &sel.status);
    let prices: Vec<String> = row.select(&sel.odds).map(|e| element_text(&e)).collect();

    let mut cells = Map::new();
    for (key, value) in [
        ("home", &home),
        ("away", &away),
        ("home_score", &home_score),
        ("away_score", &away_score),
        ("status", &status_text),
    ] {
        cells.insert(key.to_string(), Value::String(value.clone()));
    }
    let raw = json!({
        "cells": cells,
        "odds": row_odds(&prices),
        "html": row.html(),
    });

    let mut record = MatchRecord::new(sport, MatchRecord::namespaced(TAG, &local_id), raw).with_teams(home, away);
    record.set_scores(home_score, away_score);

    let status = classify(status_token(table, &status_text), &[status_text.as_str()], record.has_score());
    record.status_code = status.code;
    record.is_live = status.is_live;
    record.status_text = status_text;

    record.set_odds(extract_primary(&record.raw));
    Some(record)
}

/// `data-id`, else the last path segment of the row link.
fn row_id(row: &ElementRef, sel: &RowSelectors) -> Option<String> {
    if let Some(id) = row.value().attr("data-id").map(str::trim).filter(|s| !s.is_empty()) {
        return Some(id.to_string());
    }
    let href = row.select(&sel.link).next()?.value().attr("href")?;
    let path = href.split(['?', '#']).next().unwrap_or_default();
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn cell(row: &ElementRef, sel: &Selector) -> String {
    row.select(sel).next().map(|e| element_text(&e)).unwrap_or_default()
}

fn element_text(e: &ElementRef) -> String {
    e.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Three prices are home/draw/away; two are home/away.
fn row_odds(prices: &[String]) -> Value {
    match prices {
        [home, draw, away, ..] => json!({"home": home, "draw": draw, "away": away}),
        [home, away] => json!({"home": home, "away": away}),
        _ => json!({}),
    }
}
