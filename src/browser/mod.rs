//! Headless-browser access for adapters that need JavaScript or a real
//! browser fingerprint.
//!
//! One browser process serves the whole service through `BrowserPool`,
//! which bounds concurrent pages and relaunches the browser after a crash.
//! The traits here are the seam between the pool and the Chromium driver.

pub mod chromium;
pub mod pool;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::error::Result;

pub use chromium::ChromiumLauncher;
pub use pool::{BrowserPool, PageLease};

/// Removes the `navigator.webdriver` tell and a few other headless markers.
pub const STEALTH_SCRIPT: &str = r#"
Object.defineProperty(Object.getPrototypeOf(navigator), 'webdriver', { get: () => undefined });
window.chrome = window.chrome || { runtime: {} };
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
"#;

/// Which kind of browser context a page is opened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
    Desktop,
    Mobile,
}

/// Device emulation applied to every page of a context kind.
#[derive(Debug, Clone, Copy)]
pub struct DeviceProfile {
    pub user_agent: &'static str,
    pub width: i64,
    pub height: i64,
    pub scale: f64,
    pub mobile: bool,
}

pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
pub const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1";

impl ContextKind {
    pub fn profile(&self) -> DeviceProfile {
        match self {
            ContextKind::Desktop => DeviceProfile {
                user_agent: DESKTOP_USER_AGENT,
                width: 1920,
                height: 1080,
                scale: 1.0,
                mobile: false,
            },
            ContextKind::Mobile => DeviceProfile {
                user_agent: MOBILE_USER_AGENT,
                width: 390,
                height: 844,
                scale: 3.0,
                mobile: true,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContextKind::Desktop => "desktop",
            ContextKind::Mobile => "mobile",
        }
    }
}

/// One open tab.
#[async_trait]
pub trait PageSession: Send {
    async fn goto(&mut self, url: &str) -> Result<()>;

    /// Evaluates an expression; promises are awaited. `undefined` is `Null`.
    async fn evaluate(&mut self, script: &str) -> Result<Value>;

    /// Whether at least one element matches the selector right now.
    async fn has_element(&mut self, selector: &str) -> Result<bool>;

    /// Current document HTML.
    async fn content(&mut self) -> Result<String>;

    async fn close(self: Box<Self>);
}

/// A running browser process.
#[async_trait]
pub trait BrowserBackend: Send + Sync {
    async fn open_page(&self, kind: ContextKind) -> Result<Box<dyn PageSession>>;

    fn is_alive(&self) -> bool;

    async fn close(&self);
}

/// Starts browser processes; called at startup and by the supervisor.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn BrowserBackend>>;
}
