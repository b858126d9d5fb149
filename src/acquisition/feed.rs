//! Notification feed scanning.
//!
//! The feed is an in-app panel behind a bell icon. A scan opens the panel,
//! collects every visible "ready to download" link plus its surrounding
//! context text, and closes the panel again so the next poll starts from
//! the same UI state.

use super::clock::Clock;
use super::{FeedEntry, FeedSource};
use crate::driver::{Driver, Target};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// The notification bell in the app shell. It carries no stable attribute,
/// so this is positional: the one deliberately brittle selector in the
/// flow.
const BELL_SELECTOR: &str = "body > div:nth-of-type(1) > div:nth-of-type(1) > div:nth-of-type(2) > div > div > div:nth-of-type(2) > div:nth-of-type(3)";

/// Time for the panel to render its entries after the bell is clicked.
const PANEL_SETTLE: Duration = Duration::from_secs(2);

/// Collects every visible link labeled "here" (case-insensitive, trailing
/// punctuation tolerated) and, for each, walks up to 5 ancestor containers
/// looking for one whose text carries a time indicator (AM/PM). That
/// container's full text is the entry's context; when none qualifies, the
/// nearest ancestor's text is kept as a fallback.
const COLLECT_SCRIPT: &str = r#"(() => {
    const out = [];
    for (const link of document.querySelectorAll('a')) {
        const label = link.textContent.trim().toLowerCase().replace(/[.!,;:]+$/, '');
        if (label !== 'here' || link.offsetWidth === 0) continue;
        let context = '';
        let node = link;
        for (let depth = 0; depth < 5 && node.parentElement; depth++) {
            node = node.parentElement;
            const text = (node.innerText || '').trim();
            if (depth === 0) context = text;
            if (text.includes('AM') || text.includes('PM')) { context = text; break; }
        }
        out.push({ link: link.href, context });
    }
    return out;
})()"#;

/// Open the notification panel. A failed bell click is tolerated: the
/// panel may already be open, and a genuinely closed panel simply yields
/// an empty snapshot downstream.
pub(crate) async fn open_panel(driver: &dyn Driver, clock: &dyn Clock) {
    if let Err(e) = driver.click(&Target::css(BELL_SELECTOR)).await {
        debug!("bell click failed, continuing: {e:#}");
    }
    clock.sleep(PANEL_SETTLE).await;
}

/// Close the notification panel and restore focus. Best-effort on every
/// step: the worst case is an already-closed panel.
pub(crate) async fn close_panel(driver: &dyn Driver, clock: &dyn Clock) {
    let _ = driver.press_key("Escape").await;
    clock.sleep(Duration::from_millis(500)).await;
    let _ = driver.click_at(500.0, 400.0).await;
}

#[derive(Deserialize)]
struct RawEntry {
    link: String,
    #[serde(default)]
    context: String,
}

/// Production [`FeedSource`] over the live browser session.
pub struct NotificationScanner<'a> {
    driver: &'a dyn Driver,
    clock: &'a dyn Clock,
}

impl<'a> NotificationScanner<'a> {
    pub fn new(driver: &'a dyn Driver, clock: &'a dyn Clock) -> Self {
        Self { driver, clock }
    }

    async fn collect(&self) -> Result<Vec<FeedEntry>> {
        let value = self.driver.evaluate(COLLECT_SCRIPT).await?;
        let raw: Vec<RawEntry> =
            serde_json::from_value(value).context("unexpected feed entry shape")?;
        let observed_at = self.clock.now();
        Ok(raw
            .into_iter()
            .map(|r| FeedEntry {
                link: r.link,
                context: r.context,
                observed_at,
            })
            .collect())
    }
}

#[async_trait]
impl FeedSource for NotificationScanner<'_> {
    async fn scan(&mut self) -> Result<Vec<FeedEntry>> {
        open_panel(self.driver, self.clock).await;
        let result = self.collect().await;
        // The panel must be closed on every exit path, including errors,
        // so repeated polling composes without UI state drift.
        close_panel(self.driver, self.clock).await;
        result
    }
}
