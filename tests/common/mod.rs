#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use live_ingestion::adapters::{Registry, SourceAdapter, Variant};
use live_ingestion::browser::{BrowserBackend, BrowserLauncher, BrowserPool, ContextKind, PageSession};
use live_ingestion::model::{MatchRecord, PrimaryOdds, Sport, TeamDirectory};
use live_ingestion::store::MemoryStore;
use live_ingestion::{Config, IngestContext, IngestError, Result};

pub fn test_config(extra: &[(&str, &str)]) -> Config {
    let extra: Vec<(String, String)> = extra.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    Config::from_lookup(|key| {
        if key == "DB_CONNECTION_STRING" {
            return Some("postgres://unused@localhost/test".to_string());
        }
        extra.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    })
    .unwrap()
}

pub fn record(sport: Sport, id: &str, home_odds: &str) -> MatchRecord {
    let mut record = MatchRecord::new(sport, id, json!({"id": id}))
        .with_teams("Home", "Away")
        .with_odds(PrimaryOdds {
            home: Some(home_odds.to_string()),
            away: Some("2.5".to_string()),
            draw: None,
        });
    record.set_scores("1", "0");
    record.is_live = true;
    record
}

pub enum Behaviour {
    Records(Vec<(String, String)>),
    Fail,
    Panic,
    Hang,
    /// Returns the records after a delay.
    Slow(Duration, Vec<(String, String)>),
}

/// Adapter returning a fixed answer for every sport it serves.
pub struct FakeAdapter {
    pub name: &'static str,
    pub sports: Vec<Sport>,
    pub behaviour: Behaviour,
    pub calls: AtomicUsize,
    started: std::sync::Mutex<Vec<tokio::time::Instant>>,
}

impl FakeAdapter {
    pub fn new(name: &'static str, sports: &[Sport], behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            name,
            sports: sports.to_vec(),
            behaviour,
            calls: AtomicUsize::new(0),
            started: std::sync::Mutex::new(Vec::new()),
        })
    }

    pub fn returning(name: &'static str, sports: &[Sport], rows: &[(&str, &str)]) -> Arc<Self> {
        let rows = rows.iter().map(|(id, odds)| (id.to_string(), odds.to_string())).collect();
        Self::new(name, sports, Behaviour::Records(rows))
    }

    /// Start times of every fetch, for cadence checks.
    pub fn started(&self) -> Vec<tokio::time::Instant> {
        self.started.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for FakeAdapter {
    fn name(&self) -> &str {
        self.name
    }

    fn variant(&self) -> Variant {
        Variant::JsonApi
    }

    fn sports(&self) -> &[Sport] {
        &self.sports
    }

    async fn fetch(&self, sport: Sport) -> Result<Vec<MatchRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.lock().unwrap().push(tokio::time::Instant::now());
        match &self.behaviour {
            Behaviour::Records(rows) => Ok(rows.iter().map(|(id, odds)| record(sport, id, odds)).collect()),
            Behaviour::Fail => Err(IngestError::Fetch("upstream returned 503".to_string())),
            Behaviour::Panic => panic!("adapter bug"),
            Behaviour::Slow(delay, rows) => {
                tokio::time::sleep(*delay).await;
                Ok(rows.iter().map(|(id, odds)| record(sport, id, odds)).collect())
            }
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
        }
    }
}

pub const FAILED_EVALUATION: &str = "!evaluation-failed";

/// Page that answers in-page fetches from a canned route table.
pub struct FakePage {
    routes: Arc<Vec<(String, Value)>>,
    alive: Arc<AtomicBool>,
    stall: Duration,
}

impl FakePage {
    fn answer(&self, url: &str) -> Value {
        self.routes
            .iter()
            .find(|(fragment, _)| url.contains(fragment.as_str()))
            .map(|(_, v)| v.clone())
            .unwrap_or(Value::Null)
    }

    fn check(&self) -> Result<()> {
        if self.alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(IngestError::BrowserUnavailable("target closed".to_string()))
        }
    }
}

#[async_trait]
impl PageSession for FakePage {
    async fn goto(&mut self, _url: &str) -> Result<()> {
        self.check()
    }

    async fn evaluate(&mut self, script: &str) -> Result<Value> {
        self.check()?;
        if !self.stall.is_zero() {
            tokio::time::sleep(self.stall).await;
            self.check()?;
        }
        // Scripts built by the pool embed the URL list as a JSON array.
        let start = script.find('[').unwrap_or(0);
        let end = script.find(']').map(|i| i + 1).unwrap_or(script.len());
        let urls: Vec<String> = serde_json::from_str(&script[start..end]).unwrap_or_default();
        let answers: Vec<Value> = urls.iter().map(|u| self.answer(u)).collect();
        // A route answering FAILED_EVALUATION makes the whole evaluation fail.
        if answers.iter().any(|a| a.as_str() == Some(FAILED_EVALUATION)) {
            return Err(IngestError::Fetch("in-page fetch threw".to_string()));
        }
        if script.contains("v => v[0]") {
            Ok(answers.into_iter().next().unwrap_or(Value::Null))
        } else {
            Ok(Value::Array(answers))
        }
    }

    async fn has_element(&mut self, _selector: &str) -> Result<bool> {
        self.check()?;
        Ok(false)
    }

    async fn content(&mut self) -> Result<String> {
        self.check()?;
        Ok("<html></html>".to_string())
    }

    async fn close(self: Box<Self>) {}
}

pub struct FakeBackend {
    routes: Arc<Vec<(String, Value)>>,
    alive: Arc<AtomicBool>,
    stall: Duration,
}

impl FakeBackend {
    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl BrowserBackend for FakeBackend {
    async fn open_page(&self, _kind: ContextKind) -> Result<Box<dyn PageSession>> {
        if !self.is_alive() {
            return Err(IngestError::BrowserUnavailable("browser closed".to_string()));
        }
        Ok(Box::new(FakePage {
            routes: Arc::clone(&self.routes),
            alive: Arc::clone(&self.alive),
            stall: self.stall,
        }))
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.kill();
    }
}

/// Launcher that remembers every backend it started.
pub struct FakeLauncher {
    routes: Arc<Vec<(String, Value)>>,
    /// Time each launch takes.
    launch_delay: Duration,
    /// Time every in-page evaluation takes.
    page_stall: Duration,
    pub launched: std::sync::Mutex<Vec<Arc<FakeBackend>>>,
}

impl FakeLauncher {
    pub fn new(routes: Vec<(&str, Value)>) -> Arc<Self> {
        Self::with_delays(routes, Duration::ZERO, Duration::ZERO)
    }

    pub fn with_delays(routes: Vec<(&str, Value)>, launch_delay: Duration, page_stall: Duration) -> Arc<Self> {
        Arc::new(Self {
            routes: Arc::new(routes.into_iter().map(|(k, v)| (k.to_string(), v)).collect()),
            launch_delay,
            page_stall,
            launched: std::sync::Mutex::new(Vec::new()),
        })
    }

    pub fn latest(&self) -> Arc<FakeBackend> {
        self.launched.lock().unwrap().last().cloned().unwrap()
    }

    pub fn launches(&self) -> usize {
        self.launched.lock().unwrap().len()
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Arc<dyn BrowserBackend>> {
        if !self.launch_delay.is_zero() {
            tokio::time::sleep(self.launch_delay).await;
        }
        let backend = Arc::new(FakeBackend {
            routes: Arc::clone(&self.routes),
            alive: Arc::new(AtomicBool::new(true)),
            stall: self.page_stall,
        });
        self.launched.lock().unwrap().push(Arc::clone(&backend));
        Ok(backend)
    }
}

pub fn context(
    config: Config,
    store: MemoryStore,
    browser: Arc<BrowserPool>,
    adapters: Vec<Arc<dyn SourceAdapter>>,
) -> IngestContext {
    IngestContext::new(
        config,
        Arc::new(store),
        browser,
        Registry::from_adapters(adapters),
        TeamDirectory::new(),
    )
}

pub fn fakes(list: Vec<Arc<FakeAdapter>>) -> Vec<Arc<dyn SourceAdapter>> {
    list.into_iter().map(|a| a as Arc<dyn SourceAdapter>).collect()
}

pub fn idle_browser() -> Arc<BrowserPool> {
    Arc::new(BrowserPool::new(FakeLauncher::new(Vec::new()), 1))
}
