//! In-memory gateway with the same contract as the Postgres one.
//!
//! Used by the scheduler tests and for running the pipeline without a
//! database. Failures can be injected per sport.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::{Freshness, MatchRow, MatchStore, UpsertCounts, UpsertOutcome};
use crate::error::{IngestError, Result};
use crate::model::{MatchRecord, Sport};

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<HashMap<Sport, HashMap<String, MatchRow>>>>,
    failing: Arc<RwLock<HashSet<Sport>>>,
    /// Records whose id matches fail mid-batch, to exercise rollback.
    poison: Arc<RwLock<HashSet<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every subsequent write for `sport` fails with a transient error.
    pub async fn fail_sport(&self, sport: Sport) {
        self.failing.write().await.insert(sport);
    }

    pub async fn poison_match(&self, match_id: &str) {
        self.poison.write().await.insert(match_id.to_string());
    }

    pub async fn row(&self, sport: Sport, match_id: &str) -> Option<MatchRow> {
        let tables = self.tables.read().await;
        tables.get(&sport).and_then(|t| t.get(match_id)).cloned()
    }

    pub async fn count(&self, sport: Sport) -> usize {
        let tables = self.tables.read().await;
        tables.get(&sport).map(|t| t.len()).unwrap_or(0)
    }

    /// Backdates a row, for staleness tests.
    pub async fn set_last_updated(&self, sport: Sport, match_id: &str, at: DateTime<Utc>) {
        let mut tables = self.tables.write().await;
        if let Some(row) = tables.get_mut(&sport).and_then(|t| t.get_mut(match_id)) {
            row.last_updated = Some(at);
        }
    }

    fn apply(table: &mut HashMap<String, MatchRow>, mut row: MatchRow) -> UpsertOutcome {
        let now = Utc::now();
        match table.get(&row.match_id) {
            Some(existing) => {
                row.last_updated = Some(existing.last_updated.map_or(now, |prev| prev.max(now)));
                table.insert(row.match_id.clone(), row);
                UpsertOutcome::Updated
            }
            None => {
                row.last_updated = Some(now);
                table.insert(row.match_id.clone(), row);
                UpsertOutcome::Inserted
            }
        }
    }

    async fn check_writable(&self, sport: Sport, records: &[MatchRecord]) -> Result<()> {
        if self.failing.read().await.contains(&sport) {
            return Err(IngestError::PersistTransient(format!("{} table unavailable", sport)));
        }
        let poison = self.poison.read().await;
        if let Some(bad) = records.iter().find(|r| poison.contains(&r.match_id)) {
            return Err(IngestError::PersistTransient(format!("write failed for {}", bad.match_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl MatchStore for MemoryStore {
    async fn upsert(&self, record: &MatchRecord) -> Result<UpsertOutcome> {
        self.check_writable(record.sport, std::slice::from_ref(record)).await?;
        let row = MatchRow::encode(record)?;
        let mut tables = self.tables.write().await;
        Ok(Self::apply(tables.entry(record.sport).or_default(), row))
    }

    async fn bulk_upsert(&self, sport: Sport, records: &[MatchRecord]) -> Result<UpsertCounts> {
        self.check_writable(sport, records).await?;
        let rows = records
            .iter()
            .map(MatchRow::encode)
            .collect::<Result<Vec<_>>>()?;

        let mut tables = self.tables.write().await;
        let table = tables.entry(sport).or_default();
        let mut counts = UpsertCounts::default();
        for row in rows {
            counts.record(Self::apply(table, row));
        }
        Ok(counts)
    }

    async fn freshness(&self, sport: Sport) -> Result<Freshness> {
        let tables = self.tables.read().await;
        let Some(table) = tables.get(&sport) else {
            return Ok(Freshness {
                max_last_updated: None,
                total: 0,
                live_count: 0,
            });
        };
        Ok(Freshness {
            max_last_updated: table.values().filter_map(|r| r.last_updated).max(),
            total: table.len() as i64,
            live_count: table.values().filter(|r| r.is_live).count() as i64,
        })
    }

    async fn find_stuck(&self, sport: Sport, threshold: Duration) -> Result<Vec<String>> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(threshold)
                .map_err(|e| IngestError::Config(format!("threshold out of range: {}", e)))?;
        let tables = self.tables.read().await;
        let mut stuck: Vec<(DateTime<Utc>, String)> = tables
            .get(&sport)
            .map(|table| {
                table
                    .values()
                    .filter(|r| r.is_live)
                    .filter_map(|r| r.last_updated.filter(|ts| *ts < cutoff).map(|ts| (ts, r.match_id.clone())))
                    .collect()
            })
            .unwrap_or_default();
        stuck.sort();
        Ok(stuck.into_iter().map(|(_, id)| id).collect())
    }
}
