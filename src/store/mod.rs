//! Store gateway: idempotent upserts and freshness queries over the
//! per-sport `live_<sport>` tables.

pub mod memory;
pub mod postgres;
pub mod row;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::error::Result;
use crate::model::{MatchRecord, Sport};

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use row::MatchRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertCounts {
    pub inserted: usize,
    pub updated: usize,
}

impl UpsertCounts {
    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Snapshot of one sport table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Freshness {
    pub max_last_updated: Option<DateTime<Utc>>,
    pub total: i64,
    pub live_count: i64,
}

impl Freshness {
    /// Age of the newest row, if any.
    pub fn staleness(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.max_last_updated
            .map(|ts| (now - ts).to_std().unwrap_or(Duration::ZERO))
    }
}

/// Persistence seam used by the scheduler.
///
/// Callers hand over already-normalized records; implementations do no
/// validation beyond column typing.
#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn upsert(&self, record: &MatchRecord) -> Result<UpsertOutcome>;

    /// All records of one sport in a single transaction: all or nothing.
    async fn bulk_upsert(&self, sport: Sport, records: &[MatchRecord]) -> Result<UpsertCounts>;

    async fn freshness(&self, sport: Sport) -> Result<Freshness>;

    /// Ids of rows marked live whose `last_updated` is older than `threshold`.
    async fn find_stuck(&self, sport: Sport, threshold: Duration) -> Result<Vec<String>>;
}
