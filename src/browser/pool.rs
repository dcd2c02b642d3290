use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, OwnedSemaphorePermit, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info, warn};

use super::{BrowserBackend, BrowserLauncher, ContextKind, PageSession};
use crate::error::{IngestError, Result};

/// How long a lease waits for a free page slot before giving up.
const DEFAULT_LEASE_WAIT: Duration = Duration::from_secs(20);
const SELECTOR_POLL: Duration = Duration::from_millis(100);

/// Shared, bounded access to the single browser process.
pub struct BrowserPool {
    launcher: Arc<dyn BrowserLauncher>,
    browser: RwLock<Option<Arc<dyn BrowserBackend>>>,
    /// Serializes relaunches. The slot lock is never held across a launch.
    relaunching: Mutex<()>,
    permits: Arc<Semaphore>,
    lease_wait: Duration,
}

impl BrowserPool {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, max_pages: usize) -> Self {
        Self {
            launcher,
            browser: RwLock::new(None),
            relaunching: Mutex::new(()),
            permits: Arc::new(Semaphore::new(max_pages.max(1))),
            lease_wait: DEFAULT_LEASE_WAIT,
        }
    }

    pub fn with_lease_wait(mut self, wait: Duration) -> Self {
        self.lease_wait = wait;
        self
    }

    /// Launches the browser. A failure is returned but leaves the pool
    /// usable: the supervisor keeps retrying.
    pub async fn start(&self) -> Result<()> {
        let backend = self.launcher.launch().await?;
        *self.browser.write().await = Some(backend);
        info!("Browser launched");
        Ok(())
    }

    pub async fn is_alive(&self) -> bool {
        self.browser
            .read()
            .await
            .as_ref()
            .map(|b| b.is_alive())
            .unwrap_or(false)
    }

    async fn live_backend(&self) -> Result<Arc<dyn BrowserBackend>> {
        match self.browser.read().await.as_ref() {
            Some(b) if b.is_alive() => Ok(Arc::clone(b)),
            Some(_) => Err(IngestError::BrowserUnavailable("browser process is dead".to_string())),
            None => Err(IngestError::BrowserUnavailable("browser not started".to_string())),
        }
    }

    /// Leases a page of the given kind. Fails fast if the browser is dead.
    pub async fn lease(&self, kind: ContextKind) -> Result<PageLease> {
        self.live_backend().await?;

        let permit = timeout(self.lease_wait, Arc::clone(&self.permits).acquire_owned())
            .await
            .map_err(|_| IngestError::BrowserUnavailable("timed out waiting for a page slot".to_string()))?
            .map_err(|_| IngestError::BrowserUnavailable("browser pool closed".to_string()))?;

        // The browser may have died while we queued for a slot.
        let backend = self.live_backend().await?;
        let session = backend.open_page(kind).await.map_err(|e| {
            if backend.is_alive() {
                e
            } else {
                IngestError::BrowserUnavailable(format!("browser died opening page: {}", e))
            }
        })?;

        debug!(kind = kind.as_str(), "page leased");
        Ok(PageLease {
            session: Some(session),
            kind,
            _permit: permit,
        })
    }

    /// Relaunches the browser if it is missing or dead. Returns true if a
    /// relaunch happened.
    ///
    /// Leases taken while the launch is in progress fail fast instead of
    /// waiting for it.
    pub async fn relaunch_if_dead(&self) -> Result<bool> {
        let _relaunch = self.relaunching.lock().await;
        if self.is_alive().await || self.permits.is_closed() {
            return Ok(false);
        }

        let old = self.browser.write().await.take();
        if let Some(old) = old {
            old.close().await;
        }

        warn!("Browser is not running; relaunching");
        let backend = self.launcher.launch().await?;

        let mut slot = self.browser.write().await;
        if self.permits.is_closed() {
            drop(slot);
            backend.close().await;
            debug!("pool shut down during relaunch; new browser closed");
            return Ok(false);
        }
        if slot.as_ref().map(|b| b.is_alive()).unwrap_or(false) {
            // `start` filled the slot meanwhile; keep its browser.
            drop(slot);
            backend.close().await;
            return Ok(false);
        }
        *slot = Some(backend);
        info!("Browser relaunched");
        Ok(true)
    }

    /// Background task that keeps the browser alive until shutdown.
    pub fn spawn_supervisor(self: &Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = sleep(interval) => {}
                    _ = shutdown.changed() => {}
                }
                if *shutdown.borrow() {
                    break;
                }
                if let Err(e) = pool.relaunch_if_dead().await {
                    error!("Browser relaunch failed: {}", e);
                }
            }
            debug!("browser supervisor stopped");
        })
    }

    /// Closes the browser. Leases taken afterwards fail.
    pub async fn shutdown(&self) {
        self.permits.close();
        if let Some(backend) = self.browser.write().await.take() {
            backend.close().await;
            info!("Browser closed");
        }
    }

    pub fn available_pages(&self) -> usize {
        self.permits.available_permits()
    }
}

/// A leased page. Holds one pool slot until released or dropped.
pub struct PageLease {
    session: Option<Box<dyn PageSession>>,
    kind: ContextKind,
    _permit: OwnedSemaphorePermit,
}

impl PageLease {
    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    fn session(&mut self) -> Result<&mut Box<dyn PageSession>> {
        self.session
            .as_mut()
            .ok_or_else(|| IngestError::BrowserUnavailable("page already released".to_string()))
    }

    pub async fn goto(&mut self, url: &str) -> Result<()> {
        self.session()?.goto(url).await
    }

    pub async fn evaluate(&mut self, script: &str) -> Result<Value> {
        self.session()?.evaluate(script).await
    }

    pub async fn content(&mut self) -> Result<String> {
        self.session()?.content().await
    }

    /// Polls until the selector matches or the timeout passes.
    pub async fn wait_for_selector(&mut self, selector: &str, wait: Duration) -> Result<bool> {
        let deadline = Instant::now() + wait;
        loop {
            if self.session()?.has_element(selector).await? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            sleep(SELECTOR_POLL).await;
        }
    }

    /// GETs a JSON endpoint from inside the page so the request carries the
    /// page's cookies and TLS fingerprint. Non-2xx yields `Null`.
    pub async fn fetch_json(&mut self, url: &str) -> Result<Value> {
        let script = fetch_script(&[url], false);
        let value = self.evaluate(&script).await?;
        Ok(value)
    }

    /// Same as `fetch_json` for several URLs issued concurrently in-page.
    /// The result has one entry per URL, in order.
    pub async fn fetch_json_many(&mut self, urls: &[String]) -> Result<Vec<Value>> {
        if urls.is_empty() {
            return Ok(Vec::new());
        }
        let refs: Vec<&str> = urls.iter().map(String::as_str).collect();
        let script = fetch_script(&refs, true);
        match self.evaluate(&script).await? {
            Value::Array(values) if values.len() == urls.len() => Ok(values),
            other => Err(IngestError::Parse(format!(
                "in-page fetch returned {} for {} urls",
                kind_of(&other),
                urls.len()
            ))),
        }
    }

    /// Closes the page and frees the slot.
    pub async fn release(mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
        }
    }
}

impl Drop for PageLease {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move { session.close().await });
            }
        }
    }
}

fn fetch_script(urls: &[&str], many: bool) -> String {
    let list = serde_json::to_string(urls).unwrap_or_else(|_| "[]".to_string());
    let body = format!(
        r#"Promise.all({list}.map(u => fetch(u, {{
            credentials: 'include',
            headers: {{ 'Accept': 'application/json, text/plain, */*' }}
        }}).then(r => r.ok ? r.json() : null).catch(() => null)))"#
    );
    if many {
        body
    } else {
        format!("{body}.then(v => v[0])")
    }
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
