//! Postgres-backed gateway.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, Postgres};
use sqlx::{Executor, PgPool};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::{Freshness, MatchRow, MatchStore, UpsertCounts, UpsertOutcome};
use crate::error::{IngestError, Result};
use crate::model::{MatchRecord, Sport};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connects with exponential backoff between attempts.
    pub async fn connect(url: &str, max_connections: u32, max_retries: u32) -> Result<Self> {
        let mut attempt = 0;
        loop {
            match PgPoolOptions::new()
                .max_connections(max_connections)
                .acquire_timeout(Duration::from_secs(10))
                .connect(url)
                .await
            {
                Ok(pool) => {
                    info!("Connected to PostgreSQL");
                    return Ok(Self { pool });
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= max_retries {
                        return Err(IngestError::PersistTransient(format!(
                            "failed to connect to database after {} attempts: {}",
                            max_retries, e
                        )));
                    }
                    warn!("Database connection attempt {} failed: {}. Retrying...", attempt, e);
                    tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
                }
            }
        }
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn upsert_with<'e, E>(executor: E, sport: Sport, record: &MatchRecord) -> Result<UpsertOutcome>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = MatchRow::encode(record)?;
        let sql = upsert_sql(sport);
        let (inserted,): (bool,) = sqlx::query_as(&sql)
            .bind(&row.match_id)
            .bind(&row.match_data)
            .bind(&row.home_team)
            .bind(&row.away_team)
            .bind(&row.status)
            .bind(&row.score)
            .bind(&row.home_score)
            .bind(&row.away_score)
            .bind(&row.batting_team)
            .bind(row.is_live)
            .bind(&row.home_odds)
            .bind(&row.away_odds)
            .bind(&row.draw_odds)
            .bind(&row.other_odds)
            .fetch_one(executor)
            .await?;

        Ok(if inserted {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Updated
        })
    }

    /// Reads one row back, for diagnostics and tests.
    pub async fn fetch_row(&self, sport: Sport, match_id: &str) -> Result<Option<MatchRow>> {
        let sql = format!(
            r#"
            SELECT match_id, match_data, home_team, away_team, status, score,
                   home_score, away_score, batting_team, is_live,
                   home_odds, away_odds, draw_odds, other_odds,
                   last_updated::timestamptz AS last_updated
            FROM {} WHERE match_id = $1
            "#,
            sport.table()
        );
        let row = sqlx::query_as::<_, MatchRow>(&sql)
            .bind(match_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}

/// Insert-or-update keyed by `match_id`.
///
/// `last_updated` never moves backwards, and `xmax = 0` tells a fresh
/// insert from a conflict update.
fn upsert_sql(sport: Sport) -> String {
    let table = sport.table();
    format!(
        r#"
        INSERT INTO {table} (
            match_id, match_data, home_team, away_team, status, score,
            home_score, away_score, batting_team, is_live,
            home_odds, away_odds, draw_odds, other_odds, last_updated
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, now())
        ON CONFLICT (match_id) DO UPDATE SET
            match_data = EXCLUDED.match_data,
            home_team = EXCLUDED.home_team,
            away_team = EXCLUDED.away_team,
            status = EXCLUDED.status,
            score = EXCLUDED.score,
            home_score = EXCLUDED.home_score,
            away_score = EXCLUDED.away_score,
            batting_team = EXCLUDED.batting_team,
            is_live = EXCLUDED.is_live,
            home_odds = EXCLUDED.home_odds,
            away_odds = EXCLUDED.away_odds,
            draw_odds = EXCLUDED.draw_odds,
            other_odds = EXCLUDED.other_odds,
            last_updated = GREATEST(now(), {table}.last_updated)
        RETURNING (xmax = 0) AS inserted
        "#
    )
}

#[async_trait]
impl MatchStore for PgStore {
    #[instrument(skip(self, record), fields(match_id = %record.match_id))]
    async fn upsert(&self, record: &MatchRecord) -> Result<UpsertOutcome> {
        Self::upsert_with(&self.pool, record.sport, record).await
    }

    #[instrument(skip(self, records), fields(sport = %sport, n = records.len()))]
    async fn bulk_upsert(&self, sport: Sport, records: &[MatchRecord]) -> Result<UpsertCounts> {
        let mut counts = UpsertCounts::default();
        if records.is_empty() {
            return Ok(counts);
        }

        // Dropping the transaction on any error rolls the whole sport back.
        let mut tx = self.pool.begin().await?;
        for record in records {
            let outcome = Self::upsert_with(&mut *tx, sport, record).await?;
            counts.record(outcome);
        }
        tx.commit().await?;

        debug!(
            inserted = counts.inserted,
            updated = counts.updated,
            "bulk upsert committed"
        );
        Ok(counts)
    }

    async fn freshness(&self, sport: Sport) -> Result<Freshness> {
        let sql = format!(
            r#"
            SELECT max(last_updated)::timestamptz,
                   count(*),
                   count(*) FILTER (WHERE is_live)
            FROM {}
            "#,
            sport.table()
        );
        let (max_last_updated, total, live_count): (Option<DateTime<Utc>>, i64, i64) =
            sqlx::query_as(&sql).fetch_one(&self.pool).await?;

        Ok(Freshness {
            max_last_updated,
            total,
            live_count,
        })
    }

    async fn find_stuck(&self, sport: Sport, threshold: Duration) -> Result<Vec<String>> {
        let sql = format!(
            r#"
            SELECT match_id FROM {}
            WHERE is_live AND last_updated < now() - make_interval(secs => $1)
            ORDER BY last_updated
            "#,
            sport.table()
        );
        let ids: Vec<(String,)> = sqlx::query_as(&sql)
            .bind(threshold.as_secs_f64())
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }
}
