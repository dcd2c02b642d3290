//! Explicit shared state handed to the scheduler and background tasks.
//!
//! Built once at startup. Nothing in the crate reaches for a process-wide
//! singleton; everything a tick needs comes through here.

use std::sync::Arc;

use crate::adapters::Registry;
use crate::browser::BrowserPool;
use crate::config::Config;
use crate::model::TeamDirectory;
use crate::status::HealthState;
use crate::store::MatchStore;

#[derive(Clone)]
pub struct IngestContext {
    pub config: Arc<Config>,
    pub store: Arc<dyn MatchStore>,
    pub browser: Arc<BrowserPool>,
    pub registry: Registry,
    pub teams: TeamDirectory,
    pub health: HealthState,
}

impl IngestContext {
    pub fn new(
        config: Config,
        store: Arc<dyn MatchStore>,
        browser: Arc<BrowserPool>,
        registry: Registry,
        teams: TeamDirectory,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            browser,
            registry,
            teams,
            health: HealthState::new(),
        }
    }

    /// Shares a health state created before the context, so the status
    /// endpoint can answer during startup.
    pub fn with_health(mut self, health: HealthState) -> Self {
        self.health = health;
        self
    }
}
