//! Periodic freshness report over every polled sport table.

use chrono::Utc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::context::IngestContext;
use crate::model::Sport;
use crate::store::Freshness;

pub fn spawn_reporter(ctx: IngestContext, sports: Vec<Sport>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    let every = ctx.config.freshness_log_interval;
    let threshold = ctx.config.stuck_threshold;
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sleep(every) => {}
                _ = shutdown.changed() => {}
            }
            if *shutdown.borrow() {
                break;
            }
            for sport in &sports {
                match ctx.store.freshness(*sport).await {
                    Ok(snapshot) => report(*sport, &snapshot, threshold),
                    Err(e) => warn!(sport = %sport, kind = e.kind(), "freshness query failed: {}", e),
                }
            }
        }
        debug!("freshness reporter stopped");
    })
}

/// True when the table has live rows but nothing was written recently.
pub fn is_stale(snapshot: &Freshness, threshold: Duration, now: chrono::DateTime<Utc>) -> bool {
    snapshot.live_count > 0 && snapshot.staleness(now).map(|age| age > threshold).unwrap_or(false)
}

fn report(sport: Sport, snapshot: &Freshness, threshold: Duration) {
    let now = Utc::now();
    let age = snapshot.staleness(now).map(|d| d.as_secs());
    if is_stale(snapshot, threshold, now) {
        warn!(
            sport = %sport,
            total = snapshot.total,
            live = snapshot.live_count,
            staleness_secs = age,
            "sport table is stale"
        );
    } else {
        info!(
            sport = %sport,
            total = snapshot.total,
            live = snapshot.live_count,
            staleness_secs = age,
            "freshness"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_only_with_live_rows() {
        let now = Utc::now();
        let old = Freshness {
            max_last_updated: Some(now - chrono::Duration::minutes(12)),
            total: 3,
            live_count: 1,
        };
        let threshold = Duration::from_secs(600);
        assert!(is_stale(&old, threshold, now));

        let idle = Freshness { live_count: 0, ..old.clone() };
        assert!(!is_stale(&idle, threshold, now));

        let empty = Freshness {
            max_last_updated: None,
            total: 0,
            live_count: 0,
        };
        assert!(!is_stale(&empty, threshold, now));
    }
}
