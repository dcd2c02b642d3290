//! Process configuration, read from the environment only.

use anyhow::{anyhow, Result};
use std::env;
use std::time::Duration;

use crate::model::Sport;

pub const DEFAULT_JSON_SOURCE_URL: &str = "https://www.sofascore.com";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub port: u16,
    pub tick_interval: Duration,
    pub json_api_timeout: Duration,
    pub browser_timeout: Duration,
    pub stuck_threshold: Duration,
    pub freshness_log_interval: Duration,
    pub shutdown_grace: Duration,
    pub browser_pages: usize,
    pub browser_headless: bool,
    pub chrome_executable: Option<String>,
    pub sports: Vec<Sport>,
    pub sources: SourceUrls,
    pub source_rate_per_sec: u32,
    /// If true, run one tick per sport and exit (no polling loop)
    pub run_once: bool,
}

/// Base URL of each source. `None` disables that source.
#[derive(Debug, Clone, Default)]
pub struct SourceUrls {
    pub ssr: Option<String>,
    pub json_api: Option<String>,
    pub dom: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes `std::env`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = match lookup("DB_CONNECTION_STRING") {
            Some(v) if !v.trim().is_empty() => v.trim().to_string(),
            Some(_) => return Err(anyhow!("DB_CONNECTION_STRING is set but empty")),
            None => return Err(anyhow!("DB_CONNECTION_STRING is required")),
        };

        let number = |key: &str, default: u64| -> u64 {
            lookup(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };
        let flag = |key: &str, default: bool| -> bool {
            lookup(key)
                .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(default)
        };
        let url = |key: &str| -> Option<String> {
            lookup(key)
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .filter(|v| !v.is_empty())
        };

        let sports = match lookup("SPORTS").filter(|v| !v.trim().is_empty()) {
            Some(list) => parse_sports(&list)?,
            None => Sport::ALL.to_vec(),
        };

        Ok(Self {
            database_url,
            db_max_connections: number("DB_MAX_CONNECTIONS", 10).max(1) as u32,
            port: lookup("PORT")
                .and_then(|v| v.trim().parse::<u16>().ok())
                .filter(|p| *p != 0)
                .unwrap_or(8080),
            tick_interval: Duration::from_millis(number("TICK_INTERVAL_MS", 1000).max(50)),
            json_api_timeout: Duration::from_secs(number("JSON_API_TIMEOUT_SECS", 10).max(1)),
            browser_timeout: Duration::from_secs(number("BROWSER_TIMEOUT_SECS", 30).max(1)),
            stuck_threshold: Duration::from_secs(number("STUCK_THRESHOLD_SECS", 600)),
            freshness_log_interval: Duration::from_secs(number("FRESHNESS_LOG_SECS", 60).max(1)),
            shutdown_grace: Duration::from_secs(number("SHUTDOWN_GRACE_SECS", 10)),
            browser_pages: number("BROWSER_PAGES", 2).max(1) as usize,
            browser_headless: flag("BROWSER_HEADLESS", true),
            chrome_executable: url("CHROME_EXECUTABLE"),
            sports,
            sources: SourceUrls {
                ssr: url("SSR_SOURCE_URL"),
                json_api: url("JSON_SOURCE_URL").or_else(|| Some(DEFAULT_JSON_SOURCE_URL.to_string())),
                dom: url("DOM_SOURCE_URL"),
            },
            source_rate_per_sec: number("SOURCE_RATE_PER_SEC", 20).max(1) as u32,
            run_once: flag("RUN_ONCE", false),
        })
    }
}

fn parse_sports(list: &str) -> Result<Vec<Sport>> {
    let mut sports = Vec::new();
    for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let sport: Sport = item.parse().map_err(|e| anyhow!("SPORTS: {}", e))?;
        if !sports.contains(&sport) {
            sports.push(sport);
        }
    }
    Ok(sports)
}
