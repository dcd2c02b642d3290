//! Liveness surface: a single `GET /` on `PORT`.

use axum::{extract::State, http::StatusCode, routing::get, Router};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::shutdown::stopped;

/// Scheduler health, shared between the tick tasks and the HTTP handler.
#[derive(Clone, Default)]
pub struct HealthState {
    running: Arc<AtomicBool>,
    pub last_tick_time: Arc<RwLock<Option<DateTime<Utc>>>>,
    pub last_tick_count: Arc<AtomicUsize>,
    pub consecutive_failures: Arc<AtomicUsize>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn record_success(&self, count: usize) {
        *self.last_tick_time.write().await = Some(Utc::now());
        self.last_tick_count.store(count, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failures(&self) -> usize {
        self.consecutive_failures.load(Ordering::Relaxed)
    }
}

async fn liveness(State(health): State<HealthState>) -> (StatusCode, &'static str) {
    if health.is_running() {
        (StatusCode::OK, "running")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "stopped")
    }
}

pub fn router(health: HealthState) -> Router {
    Router::new().route("/", get(liveness)).with_state(health)
}

/// Binds `0.0.0.0:<port>` and serves until shutdown.
pub async fn serve(port: u16, health: HealthState, mut shutdown: watch::Receiver<bool>) -> std::io::Result<JoinHandle<()>> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Status endpoint listening on {}", addr);

    let app = router(health);
    Ok(tokio::spawn(async move {
        let graceful = async move { stopped(&mut shutdown).await };
        if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(graceful).await {
            error!("Status server failed: {}", e);
        }
    }))
}
