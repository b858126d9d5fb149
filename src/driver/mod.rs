//! Browser automation port.
//!
//! Defines the [`Driver`] trait that abstracts over the live browser session
//! (currently Chromium via chromiumoxide). The acquisition subsystem and the
//! report flows only ever talk to this trait; browser launch, login, and tab
//! lifecycle belong to the caller that owns the concrete driver.

pub mod chromium;

use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

/// How to locate an element on the rendered page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// CSS selector; the first visible match is used.
    Css(String),
    /// Exact trimmed visible text of the element.
    Text(String),
    /// Trimmed visible text prefix (for labels with dynamic suffixes,
    /// e.g. a tab rendered as `All (1,204)`).
    TextPrefix(String),
}

impl Target {
    pub fn css(s: impl Into<String>) -> Self {
        Target::Css(s.into())
    }

    pub fn text(s: impl Into<String>) -> Self {
        Target::Text(s.into())
    }

    pub fn text_prefix(s: impl Into<String>) -> Self {
        Target::TextPrefix(s.into())
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Css(s) => write!(f, "css={s}"),
            Target::Text(s) => write!(f, "text={s}"),
            Target::TextPrefix(s) => write!(f, "text^={s}"),
        }
    }
}

/// Capability surface over one live browser session.
///
/// Single-owner resource: callers must not interact with the same session
/// concurrently. Every method leaves the page in a state where the next
/// call composes (no modal focus stolen, no pending dialogs).
#[async_trait]
pub trait Driver: Send + Sync {
    /// Navigate to a URL, waiting for the DOM to be ready.
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()>;

    /// Click an element.
    async fn click(&self, target: &Target) -> Result<()>;

    /// Hover an element (dispatches mouse-over events, which is what opens
    /// hover-triggered submenus in the target app).
    async fn hover(&self, target: &Target) -> Result<()>;

    /// Fill the first visible input matching `selector` with `value`.
    async fn fill(&self, selector: &str, value: &str) -> Result<()>;

    /// Evaluate JavaScript in the page context and return the result.
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    /// Read the rendered text of the first element matching `selector`.
    async fn read_text(&self, selector: &str) -> Result<String>;

    /// Send a single key press to the page (e.g. `Escape`).
    async fn press_key(&self, key: &str) -> Result<()>;

    /// Click at viewport coordinates (used to defocus overlays).
    async fn click_at(&self, x: f64, y: f64) -> Result<()>;

    /// The page's current URL.
    async fn current_url(&self) -> Result<String>;

    /// Click `target` and capture the file download that click starts.
    /// Returns the path of the completed file in the driver's staging
    /// directory; the caller owns moving it to its final destination.
    async fn download_via_click(&self, target: &Target, timeout: Duration) -> Result<PathBuf>;
}
