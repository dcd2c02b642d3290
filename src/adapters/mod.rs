//! Source adapters.
//!
//! An adapter talks to exactly one source and turns its payloads into
//! `MatchRecord`s for one or more sports. Three variants exist: SSR-blob
//! (hydration state read from a rendered page), JSON-API (endpoints called
//! from inside a browser page) and DOM (match rows scraped from HTML).
//!
//! Adapters may return errors internally; `fetch_soft` is the boundary that
//! turns every failure, timeout or panic into an empty list plus a log line.

pub mod dom;
pub mod http;
pub mod json_api;
pub mod registry;
pub mod ssr;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::error::Result;
use crate::model::{MatchRecord, Sport};

pub use http::HttpFetcher;
pub use registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    SsrBlob,
    JsonApi,
    Dom,
}

impl Variant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::SsrBlob => "ssr",
            Variant::JsonApi => "json_api",
            Variant::Dom => "dom",
        }
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Source tag; also the `match_id` namespace prefix.
    fn name(&self) -> &str;

    fn variant(&self) -> Variant;

    fn sports(&self) -> &[Sport];

    /// One-time startup work, e.g. seeding team caches.
    async fn warmup(&self) -> Result<()> {
        Ok(())
    }

    async fn fetch(&self, sport: Sport) -> Result<Vec<MatchRecord>>;

    /// Team id -> name entries for the sport, if the source ships ids only.
    async fn team_seed(&self, _sport: Sport) -> Result<Vec<(String, String)>> {
        Ok(Vec::new())
    }
}

/// How one adapter call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Ok(usize),
    Failed(String),
    TimedOut,
    Panicked,
}

#[derive(Debug)]
pub struct AdapterResult {
    pub source: String,
    pub records: Vec<MatchRecord>,
    pub outcome: FetchOutcome,
}

/// Runs one adapter fetch in its own task under a deadline.
///
/// Never fails: errors, deadline expiry and panics all yield an empty list.
pub async fn fetch_soft(adapter: Arc<dyn SourceAdapter>, sport: Sport, deadline: Duration) -> AdapterResult {
    let source = adapter.name().to_string();
    let task = {
        let adapter = Arc::clone(&adapter);
        tokio::spawn(async move { tokio::time::timeout(deadline, adapter.fetch(sport)).await })
    };

    let (records, outcome) = match task.await {
        Ok(Ok(Ok(records))) => {
            let n = records.len();
            (records, FetchOutcome::Ok(n))
        }
        Ok(Ok(Err(e))) => {
            warn!(source = %source, sport = %sport, kind = e.kind(), "adapter fetch failed: {}", e);
            (Vec::new(), FetchOutcome::Failed(e.to_string()))
        }
        Ok(Err(_)) => {
            warn!(source = %source, sport = %sport, "adapter fetch exceeded {:?}", deadline);
            (Vec::new(), FetchOutcome::TimedOut)
        }
        Err(e) => {
            error!(source = %source, sport = %sport, "adapter task aborted: {}", e);
            (Vec::new(), FetchOutcome::Panicked)
        }
    };

    debug!(source = %source, sport = %sport, records = records.len(), "adapter fetch done");
    AdapterResult {
        source,
        records,
        outcome,
    }
}

/// Walks an object path, e.g. `["cricket", "home-new", "matchesData"]`.
pub fn walk<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |v, key| v.get(*key))
}

/// Reads a field as display text: strings as-is, numbers formatted.
pub fn text(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}
