//! Per-sport polling.
//!
//! Every sport runs its own tick loop. A tick fans out to the sport's
//! adapters concurrently, merges their records by priority, writes them in
//! one bulk upsert and then logs stuck rows:
//!
//! `Idle -> Fetching -> Merging -> Upserting -> Idle`
//!
//! Ticks start `tick_interval` after the previous tick started. An overrunning
//! tick is followed immediately by the next one, with no backlog.

pub mod dedupe;
pub mod freshness;

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::adapters::{fetch_soft, FetchOutcome, Variant};
use crate::context::IngestContext;
use crate::model::Sport;
use crate::shutdown::stopped;
use crate::store::UpsertCounts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickState {
    Idle,
    Fetching,
    Merging,
    Upserting,
}

/// What one tick did.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub sport: Sport,
    pub fetches: Vec<(String, FetchOutcome)>,
    pub merged: usize,
    pub duplicates: usize,
    pub upserted: Option<UpsertCounts>,
    pub stuck: Vec<String>,
    /// Reason the tick went back to `Idle` early, if it did.
    pub failure: Option<String>,
}

impl TickReport {
    fn new(sport: Sport) -> Self {
        Self {
            sport,
            fetches: Vec::new(),
            merged: 0,
            duplicates: 0,
            upserted: None,
            stuck: Vec::new(),
            failure: None,
        }
    }

    pub fn fetched(&self) -> usize {
        self.fetches
            .iter()
            .map(|(_, outcome)| match outcome {
                FetchOutcome::Ok(n) => *n,
                _ => 0,
            })
            .sum()
    }
}

pub struct Scheduler {
    ctx: IngestContext,
}

impl Scheduler {
    pub fn new(ctx: IngestContext) -> Self {
        Self { ctx }
    }

    /// Configured sports that at least one adapter serves.
    pub fn sports(&self) -> Vec<Sport> {
        let mut sports = Vec::new();
        for sport in &self.ctx.config.sports {
            if self.ctx.registry.for_sport(*sport).is_empty() {
                warn!(sport = %sport, "no adapter serves this sport; not polling it");
            } else {
                sports.push(*sport);
            }
        }
        sports
    }

    fn deadline(&self, variant: Variant) -> Duration {
        match variant {
            Variant::JsonApi => self.ctx.config.json_api_timeout,
            Variant::SsrBlob | Variant::Dom => self.ctx.config.browser_timeout,
        }
    }

    /// One full tick for one sport. Never fails; problems end up in the
    /// report and the log.
    pub async fn run_tick(&self, sport: Sport) -> TickReport {
        let mut report = TickReport::new(sport);
        let mut state = TickState::Idle;

        advance(&mut state, TickState::Fetching);
        let adapters = self.ctx.registry.for_sport(sport);
        let calls = adapters
            .iter()
            .map(|adapter| fetch_soft(Arc::clone(adapter), sport, self.deadline(adapter.variant())));
        let results = join_all(calls).await;
        report.fetches = results.iter().map(|r| (r.source.clone(), r.outcome.clone())).collect();

        advance(&mut state, TickState::Merging);
        let (records, duplicates) = dedupe::merge(results);
        report.merged = records.len();
        report.duplicates = duplicates;
        if duplicates > 0 {
            debug!(duplicates, "lower-priority copies discarded");
        }

        advance(&mut state, TickState::Upserting);
        if records.is_empty() {
            debug!("nothing to upsert");
        } else {
            match self.ctx.store.bulk_upsert(sport, &records).await {
                Ok(counts) => {
                    self.ctx.health.record_success(counts.total()).await;
                    report.upserted = Some(counts);
                }
                Err(e) if e.is_schema() => {
                    error!(kind = e.kind(), "schema mismatch on {}; tick dropped: {}", sport.table(), e);
                    self.ctx.health.record_error();
                    report.failure = Some(e.to_string());
                }
                Err(e) => {
                    warn!(kind = e.kind(), "upsert rolled back: {}", e);
                    self.ctx.health.record_error();
                    report.failure = Some(e.to_string());
                }
            }
        }

        if report.failure.is_none() {
            match self.ctx.store.find_stuck(sport, self.ctx.config.stuck_threshold).await {
                Ok(stuck) => {
                    if !stuck.is_empty() {
                        warn!(count = stuck.len(), ids = ?stuck, "live rows not updated within {:?}", self.ctx.config.stuck_threshold);
                    }
                    report.stuck = stuck;
                }
                Err(e) => warn!(kind = e.kind(), "stuck-row query failed: {}", e),
            }
        }

        advance(&mut state, TickState::Idle);
        info!(
            fetched = report.fetched(),
            merged = report.merged,
            inserted = report.upserted.map(|c| c.inserted).unwrap_or(0),
            updated = report.upserted.map(|c| c.updated).unwrap_or(0),
            stuck = report.stuck.len(),
            "tick done"
        );
        report
    }

    /// One tick per sport, all sports concurrently.
    pub async fn run_once(&self) -> Vec<TickReport> {
        let ticks = self
            .sports()
            .into_iter()
            .map(|sport| self.run_tick(sport).instrument(info_span!("tick", sport = %sport)));
        join_all(ticks).await
    }

    async fn sport_loop(self: Arc<Self>, sport: Sport, mut shutdown: watch::Receiver<bool>) {
        let interval = self.ctx.config.tick_interval;
        let mut next = Instant::now();
        loop {
            tokio::select! {
                _ = sleep_until(next) => {}
                _ = stopped(&mut shutdown) => break,
            }
            next = Instant::now() + interval;
            self.run_tick(sport)
                .instrument(info_span!("tick", sport = %sport))
                .await;
            if *shutdown.borrow() {
                break;
            }
        }
        debug!(sport = %sport, "tick loop stopped");
    }

    /// Polls every sport until shutdown, then waits up to the grace window
    /// for in-flight ticks before aborting them.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let sports = self.sports();
        let mut tasks = JoinSet::new();
        for sport in &sports {
            tasks.spawn(Arc::clone(&self).sport_loop(*sport, shutdown.clone()));
        }
        self.ctx.health.set_running(true);
        info!(sports = sports.len(), "Scheduler started");

        stopped(&mut shutdown).await;
        self.ctx.health.set_running(false);

        let grace = self.ctx.config.shutdown_grace;
        info!("Scheduler stopping; waiting up to {:?} for in-flight ticks", grace);
        let drain = async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    if e.is_panic() {
                        error!("tick loop panicked: {}", e);
                    }
                }
            }
        };
        if timeout(grace, drain).await.is_err() {
            warn!("In-flight ticks did not finish within {:?}; aborting", grace);
            tasks.abort_all();
        }
        info!("Scheduler stopped");
    }
}

fn advance(state: &mut TickState, next: TickState) {
    debug!(from = ?*state, to = ?next, "tick state");
    *state = next;
}
