//! Process wiring: builds the ingest context, starts the background tasks
//! and runs the scheduler until a shutdown signal.

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::adapters::{HttpFetcher, Registry};
use crate::browser::{BrowserPool, ChromiumLauncher};
use crate::config::Config;
use crate::context::IngestContext;
use crate::model::TeamDirectory;
use crate::scheduler::{freshness, Scheduler};
use crate::shutdown::Shutdown;
use crate::status::{self, HealthState};
use crate::store::PgStore;

const DB_CONNECT_RETRIES: u32 = 5;
const SUPERVISOR_INTERVAL: Duration = Duration::from_secs(5);

pub async fn run(config: Config) -> Result<()> {
    let shutdown = Shutdown::new();
    shutdown.spawn_signal_handler();
    let health = HealthState::new();
    let status_task = status::serve(config.port, health.clone(), shutdown.subscribe())
        .await
        .with_context(|| format!("failed to bind status port {}", config.port))?;

    let store = PgStore::connect(&config.database_url, config.db_max_connections, DB_CONNECT_RETRIES)
        .await
        .context("failed to connect to the database")?;

    let launcher = ChromiumLauncher::new(config.browser_headless, config.chrome_executable.clone());
    let browser = Arc::new(BrowserPool::new(Arc::new(launcher), config.browser_pages));
    if let Err(e) = browser.start().await {
        warn!("Browser failed to start; browser-backed adapters return nothing until it does: {}", e);
    }
    let supervisor = browser.spawn_supervisor(SUPERVISOR_INTERVAL, shutdown.subscribe());

    let client = HttpFetcher::build_client()?;
    let teams = TeamDirectory::new();
    let registry = Registry::build(
        &config.sources,
        client,
        Arc::clone(&browser),
        teams.clone(),
        config.source_rate_per_sec,
    );
    if registry.is_empty() {
        bail!("no source is configured; set SSR_SOURCE_URL, JSON_SOURCE_URL or DOM_SOURCE_URL");
    }

    let warmed = registry
        .warmup_all(config.browser_timeout * 4, &mut shutdown.subscribe())
        .await;
    teams.log_sizes().await;

    let ctx = IngestContext::new(config, Arc::new(store), Arc::clone(&browser), registry, teams).with_health(health);
    let scheduler = Arc::new(Scheduler::new(ctx.clone()));

    if !warmed {
        info!("Skipping polling; shutdown arrived during startup");
    } else if ctx.config.run_once {
        info!("Running in one-shot mode (RUN_ONCE=true)");
        ctx.health.set_running(true);
        let reports = scheduler.run_once().await;
        let written: usize = reports.iter().filter_map(|r| r.upserted).map(|c| c.total()).sum();
        info!(sports = reports.len(), written, "One-shot run completed");
        shutdown.trigger();
    } else {
        let reporter = freshness::spawn_reporter(ctx.clone(), scheduler.sports(), shutdown.subscribe());
        Arc::clone(&scheduler).run(shutdown.subscribe()).await;
        let _ = reporter.await;
    }

    ctx.health.set_running(false);
    shutdown.trigger();
    let _ = supervisor.await;
    browser.shutdown().await;
    let _ = status_task.await;
    info!("Shutdown complete");
    Ok(())
}
