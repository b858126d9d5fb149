//! Email Activity CSV — the asynchronous export.
//!
//! Filtering to "Last Year" and firing the export are direct UI sequences;
//! everything after the trigger goes through the acquisition subsystem,
//! because the platform only signals completion through the notification
//! feed.

use crate::acquisition::clock::Clock;
use crate::acquisition::download::NotificationDownloader;
use crate::acquisition::feed::NotificationScanner;
use crate::acquisition::{acquire, AcquireError, AcquisitionConfig, ExportTrigger};
use crate::driver::{Driver, Target};
use crate::progress::ProgressScope;
use crate::reports::ReportKind;
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

const REPORTS_URL: &str = "https://run.reply.io/Dashboard/Material#/reports/emails";
const FILTERS_TOGGLE: &str = r#"[data-test-id="filters-drawer-toggle-button"]"#;
const NAV_TIMEOUT: Duration = Duration::from_secs(30);

/// Fires one contact-CSV export from the emails report page.
pub struct ContactExportTrigger<'a> {
    driver: &'a dyn Driver,
    clock: &'a dyn Clock,
}

impl<'a> ContactExportTrigger<'a> {
    pub fn new(driver: &'a dyn Driver, clock: &'a dyn Clock) -> Self {
        Self { driver, clock }
    }

    /// The confirm button sits inside a popover that also contains the
    /// dropdown's own "Export" label, so the click is scoped to the
    /// popover; outside it, the last visible "Export" button is the
    /// confirm one.
    async fn confirm_in_popover(&self) -> Result<()> {
        let script = r#"(() => {
            for (const scope of document.querySelectorAll('.MuiPopover-paper, .MuiPaper-root')) {
                for (const btn of scope.querySelectorAll('button')) {
                    if (btn.textContent.trim() === 'Export' && (btn.offsetWidth > 0 || btn.offsetHeight > 0)) {
                        btn.click();
                        return { success: true };
                    }
                }
            }
            const visible = [...document.querySelectorAll('button')].filter(b =>
                b.textContent.trim() === 'Export' && (b.offsetWidth > 0 || b.offsetHeight > 0));
            if (visible.length) { visible[visible.length - 1].click(); return { success: true }; }
            return { success: false };
        })()"#;
        let value = self.driver.evaluate(script).await?;
        let success = value
            .get("success")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if !success {
            bail!("export confirm button not found");
        }
        Ok(())
    }
}

#[async_trait]
impl ExportTrigger for ContactExportTrigger<'_> {
    async fn fire(&mut self) -> Result<()> {
        self.driver.click(&Target::text("Export")).await?;
        self.clock.sleep(Duration::from_secs(1)).await;

        self.driver.click(&Target::text("Export contact CSV")).await?;
        self.clock.sleep(Duration::from_millis(500)).await;

        self.confirm_in_popover().await?;
        self.clock.sleep(Duration::from_secs(3)).await;
        Ok(())
    }
}

/// Produce the Email Activity CSV: filter, then trigger-poll-download via
/// the acquisition subsystem.
pub async fn download(
    driver: &dyn Driver,
    clock: &dyn Clock,
    download_dir: &Path,
    config: &AcquisitionConfig,
    progress: &mut ProgressScope,
) -> Result<PathBuf, AcquireError> {
    apply_last_year_filter(driver, clock).await?;

    let dest = download_dir.join(ReportKind::EmailActivity.artifact_name());
    let mut trigger = ContactExportTrigger::new(driver, clock);
    let mut feed = NotificationScanner::new(driver, clock);
    let mut fetcher = NotificationDownloader::new(driver, clock, dest, config.capture_timeout);

    acquire(config, clock, &mut trigger, &mut feed, &mut fetcher, progress).await
}

/// Scope the report to the last year before exporting. The drawer is
/// closed again afterwards so it does not overlap the export dropdown.
async fn apply_last_year_filter(driver: &dyn Driver, clock: &dyn Clock) -> Result<()> {
    driver.navigate(REPORTS_URL, NAV_TIMEOUT).await?;
    clock.sleep(Duration::from_secs(5)).await;

    driver.click(&Target::css(FILTERS_TOGGLE)).await?;
    clock.sleep(Duration::from_secs(1)).await;

    driver.click(&Target::text("Date")).await?;
    clock.sleep(Duration::from_secs(1)).await;

    driver.click(&Target::text("Last Year")).await?;
    clock.sleep(Duration::from_secs(1)).await;

    driver.click(&Target::text("Apply")).await?;
    clock.sleep(Duration::from_secs(5)).await;

    driver.click(&Target::css(FILTERS_TOGGLE)).await?;
    clock.sleep(Duration::from_secs(1)).await;
    Ok(())
}
