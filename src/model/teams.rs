//! Team-name caches.
//!
//! Sources that ship only team ids get their names from a cache seeded at
//! startup by crawling a fixtures listing. One cache per (source, sport).

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use super::record::Sport;

/// Thread-safe id -> display name map.
#[derive(Clone, Default)]
pub struct TeamCache {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl TeamCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, team_id: &str) -> Option<String> {
        let cache = self.inner.read().await;
        cache.get(team_id).cloned()
    }

    /// Resolves an id, degrading to `"Team <id>"` on a miss.
    pub async fn resolve(&self, team_id: &str) -> String {
        match self.get(team_id).await {
            Some(name) => name,
            None => fallback_name(team_id),
        }
    }

    /// Inserts only if absent. Returns true when the entry was added.
    pub async fn insert_if_absent(&self, team_id: String, name: String) -> bool {
        let mut cache = self.inner.write().await;
        match cache.entry(team_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(name);
                true
            }
        }
    }

    /// Bulk seed. Existing entries are overwritten with the seeded names.
    pub async fn extend<I>(&self, entries: I) -> usize
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut cache = self.inner.write().await;
        let before = cache.len();
        for (id, name) in entries {
            if !id.is_empty() && !name.trim().is_empty() {
                cache.insert(id, name.trim().to_string());
            }
        }
        cache.len() - before
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

pub fn fallback_name(team_id: &str) -> String {
    format!("Team {}", team_id)
}

/// All team caches, keyed by source tag and sport.
///
/// Built once at startup; handing out a `TeamCache` clone shares the map.
#[derive(Clone, Default)]
pub struct TeamDirectory {
    caches: Arc<RwLock<HashMap<(String, Sport), TeamCache>>>,
}

impl TeamDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn cache(&self, source: &str, sport: Sport) -> TeamCache {
        {
            let caches = self.caches.read().await;
            if let Some(cache) = caches.get(&(source.to_string(), sport)) {
                return cache.clone();
            }
        }

        let mut caches = self.caches.write().await;
        caches
            .entry((source.to_string(), sport))
            .or_insert_with(TeamCache::new)
            .clone()
    }

    pub async fn log_sizes(&self) {
        let caches = self.caches.read().await;
        for ((source, sport), cache) in caches.iter() {
            info!(source = %source, sport = %sport, teams = cache.len().await, "team cache seeded");
        }
    }
}
