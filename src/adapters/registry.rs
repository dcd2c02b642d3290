//! Adapter registry: which adapters serve which sport, in priority order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use super::dom::DomAdapter;
use super::json_api::JsonApiAdapter;
use super::ssr::SsrAdapter;
use super::{HttpFetcher, SourceAdapter};
use crate::browser::BrowserPool;
use crate::config::SourceUrls;
use crate::model::{Sport, TeamDirectory};
use crate::shutdown::stopped;

#[derive(Clone, Default)]
pub struct Registry {
    by_sport: HashMap<Sport, Vec<Arc<dyn SourceAdapter>>>,
    all: Vec<Arc<dyn SourceAdapter>>,
}

impl Registry {
    /// Adapters in priority order. When two adapters yield the same
    /// `match_id` the earlier one wins.
    pub fn from_adapters(adapters: Vec<Arc<dyn SourceAdapter>>) -> Self {
        let mut by_sport: HashMap<Sport, Vec<Arc<dyn SourceAdapter>>> = HashMap::new();
        for adapter in &adapters {
            for sport in adapter.sports() {
                by_sport.entry(*sport).or_default().push(Arc::clone(adapter));
            }
        }
        Self { by_sport, all: adapters }
    }

    /// Builds the production adapters. A source without a base URL is left
    /// out.
    pub fn build(
        sources: &SourceUrls,
        client: reqwest::Client,
        browser: Arc<BrowserPool>,
        teams: TeamDirectory,
        rate_per_sec: u32,
    ) -> Self {
        let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();
        let fetcher = |base: &str| HttpFetcher::new(client.clone(), base, rate_per_sec);

        match &sources.ssr {
            Some(base) => adapters.push(Arc::new(SsrAdapter::new(fetcher(base.as_str()), Arc::clone(&browser), teams.clone()))),
            None => warn!("SSR_SOURCE_URL not set; SSR-blob adapter disabled"),
        }
        match &sources.json_api {
            Some(base) => adapters.push(Arc::new(JsonApiAdapter::new(fetcher(base.as_str()), Arc::clone(&browser)))),
            None => warn!("JSON_SOURCE_URL not set; JSON-API adapter disabled"),
        }
        match &sources.dom {
            Some(base) => adapters.push(Arc::new(DomAdapter::new(fetcher(base.as_str()), Arc::clone(&browser)))),
            None => warn!("DOM_SOURCE_URL not set; DOM adapter disabled"),
        }

        let registry = Self::from_adapters(adapters);
        for adapter in registry.all() {
            info!(
                source = adapter.name(),
                variant = adapter.variant().as_str(),
                sports = adapter.sports().len(),
                "adapter registered"
            );
        }
        registry
    }

    pub fn for_sport(&self, sport: Sport) -> &[Arc<dyn SourceAdapter>] {
        self.by_sport.get(&sport).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn all(&self) -> &[Arc<dyn SourceAdapter>] {
        &self.all
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    /// Runs every adapter's warmup concurrently. Failures and timeouts are
    /// logged; the service starts regardless. Returns false if shutdown
    /// arrived first.
    pub async fn warmup_all(&self, limit: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
        let tasks = self.all.iter().map(|adapter| {
            let adapter = Arc::clone(adapter);
            async move {
                match tokio::time::timeout(limit, adapter.warmup()).await {
                    Ok(Ok(())) => info!(source = adapter.name(), "adapter warmed up"),
                    Ok(Err(e)) => warn!(source = adapter.name(), "adapter warmup failed: {}", e),
                    Err(_) => warn!(source = adapter.name(), "adapter warmup exceeded {:?}", limit),
                }
            }
        });
        tokio::select! {
            _ = futures::future::join_all(tasks) => true,
            _ = stopped(shutdown) => {
                info!("Shutdown requested during warmup");
                false
            }
        }
    }
}
