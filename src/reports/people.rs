//! People CSV — the synchronous export.
//!
//! People list → "All" tab → select all in list → More → Export to CSV
//! (hover opens the submenu; clicking would close it) → "Basic fields",
//! which starts the download directly.

use crate::acquisition::clock::Clock;
use crate::acquisition::download::persist_artifact;
use crate::driver::{Driver, Target};
use crate::reports::ReportKind;
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::time::Duration;

const PEOPLE_URL: &str = "https://run.reply.io/Dashboard/Material#/people/list";
const NAV_TIMEOUT: Duration = Duration::from_secs(30);
const CAPTURE_TIMEOUT: Duration = Duration::from_secs(60);

pub async fn download(
    driver: &dyn Driver,
    clock: &dyn Clock,
    download_dir: &Path,
) -> Result<PathBuf> {
    driver.navigate(PEOPLE_URL, NAV_TIMEOUT).await?;
    clock.sleep(Duration::from_secs(5)).await;

    // The tab label carries a live count, e.g. `All (1,204)`.
    driver.click(&Target::text_prefix("All (")).await?;
    clock.sleep(Duration::from_secs(2)).await;

    driver
        .click(&Target::css(r#"[data-test-id="select-control-button"]"#))
        .await?;
    clock.sleep(Duration::from_secs(1)).await;

    driver.click(&Target::text("All in list")).await?;
    clock.sleep(Duration::from_secs(2)).await;

    driver.click(&Target::text("More")).await?;
    clock.sleep(Duration::from_secs(1)).await;

    driver.hover(&Target::text("Export to CSV")).await?;
    clock.sleep(Duration::from_secs(1)).await;

    let captured = driver
        .download_via_click(&Target::text("Basic fields"), CAPTURE_TIMEOUT)
        .await?;

    persist_artifact(
        &captured,
        &download_dir.join(ReportKind::People.artifact_name()),
    )
}
