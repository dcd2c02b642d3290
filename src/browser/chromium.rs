//! Chromium driver over the DevTools protocol.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetTouchEmulationEnabledParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{BrowserBackend, BrowserLauncher, ContextKind, PageSession, STEALTH_SCRIPT};
use crate::error::{IngestError, Result};

pub struct ChromiumLauncher {
    headless: bool,
    executable: Option<PathBuf>,
}

impl ChromiumLauncher {
    pub fn new(headless: bool, executable: Option<String>) -> Self {
        Self {
            headless,
            executable: executable.map(PathBuf::from),
        }
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Arc<dyn BrowserBackend>> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(1920, 1080)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu");
        if !self.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(IngestError::BrowserUnavailable)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| IngestError::BrowserUnavailable(format!("launch failed: {}", e)))?;

        // The handler drives the CDP connection; when it ends the browser is gone.
        let alive = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&alive);
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("browser handler event error: {}", e);
                }
            }
            flag.store(false, Ordering::Release);
            warn!("Browser connection closed");
        });

        Ok(Arc::new(ChromiumBrowser {
            browser: Mutex::new(browser),
            alive,
        }))
    }
}

pub struct ChromiumBrowser {
    browser: Mutex<Browser>,
    alive: Arc<AtomicBool>,
}

#[async_trait]
impl BrowserBackend for ChromiumBrowser {
    async fn open_page(&self, kind: ContextKind) -> Result<Box<dyn PageSession>> {
        if !self.is_alive() {
            return Err(IngestError::BrowserUnavailable("browser process exited".to_string()));
        }

        let page = {
            let browser = self.browser.lock().await;
            browser.new_page("about:blank").await?
        };

        let profile = kind.profile();
        page.execute(SetUserAgentOverrideParams::new(profile.user_agent)).await?;
        page.execute(SetDeviceMetricsOverrideParams::new(
            profile.width,
            profile.height,
            profile.scale,
            profile.mobile,
        ))
        .await?;
        if profile.mobile {
            page.execute(SetTouchEmulationEnabledParams::new(true)).await?;
        }
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
            .await?;

        Ok(Box::new(ChromiumPage { page }))
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    async fn close(&self) {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            debug!("browser close: {}", e);
        }
        let _ = browser.wait().await;
        self.alive.store(false, Ordering::Release);
    }
}

pub struct ChromiumPage {
    page: Page,
}

#[async_trait]
impl PageSession for ChromiumPage {
    async fn goto(&mut self, url: &str) -> Result<()> {
        self.page.goto(url).await?;
        Ok(())
    }

    async fn evaluate(&mut self, script: &str) -> Result<Value> {
        let result = self.page.evaluate(script).await?;
        Ok(result.into_value::<Value>().unwrap_or(Value::Null))
    }

    async fn has_element(&mut self, selector: &str) -> Result<bool> {
        match self.page.find_element(selector).await {
            Ok(_) => Ok(true),
            Err(e) => {
                let err = IngestError::from(e);
                if err.is_browser() {
                    Err(err)
                } else {
                    Ok(false)
                }
            }
        }
    }

    async fn content(&mut self) -> Result<String> {
        Ok(self.page.content().await?)
    }

    async fn close(self: Box<Self>) {
        if let Err(e) = self.page.close().await {
            debug!("page close: {}", e);
        }
    }
}
