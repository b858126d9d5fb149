//! Artifact capture for a matched feed entry.
//!
//! The matched element may have gone stale between the scan that found it
//! and the download click (the panel re-renders on every open), so the link
//! is re-resolved by its href immediately before clicking.

use super::clock::Clock;
use super::feed;
use super::{ArtifactFetcher, MatchResult};
use crate::driver::{Driver, Target};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Production [`ArtifactFetcher`]: reopen the panel, click the matched
/// link, capture the file, persist it to the fixed destination.
pub struct NotificationDownloader<'a> {
    driver: &'a dyn Driver,
    clock: &'a dyn Clock,
    dest: PathBuf,
    capture_timeout: Duration,
}

impl<'a> NotificationDownloader<'a> {
    pub fn new(
        driver: &'a dyn Driver,
        clock: &'a dyn Clock,
        dest: PathBuf,
        capture_timeout: Duration,
    ) -> Self {
        Self {
            driver,
            clock,
            dest,
            capture_timeout,
        }
    }

    async fn capture(&self, matched: &MatchResult) -> Result<PathBuf> {
        // Re-resolve by identifier; the element from the scan snapshot is
        // not guaranteed to still be attached.
        let by_href = Target::css(format!("a[href=\"{}\"]", matched.entry.link));
        let captured = match self
            .driver
            .download_via_click(&by_href, self.capture_timeout)
            .await
        {
            Ok(path) => path,
            Err(e) => {
                warn!("matched link not clickable by href, falling back to label: {e:#}");
                self.driver
                    .download_via_click(&Target::text_prefix("here"), self.capture_timeout)
                    .await?
            }
        };
        persist_artifact(&captured, &self.dest)
    }
}

#[async_trait]
impl ArtifactFetcher for NotificationDownloader<'_> {
    async fn fetch(&mut self, matched: &MatchResult) -> Result<PathBuf> {
        feed::open_panel(self.driver, self.clock).await;
        let result = self.capture(matched).await;
        feed::close_panel(self.driver, self.clock).await;
        result
    }
}

/// Move a captured file onto its destination, overwriting any prior
/// artifact. The copy goes to a sibling staging file first so the final
/// rename is atomic; the destination never holds a partial write.
pub(crate) fn persist_artifact(captured: &Path, dest: &Path) -> Result<PathBuf> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let staged = dest.with_extension("part");
    std::fs::copy(captured, &staged)
        .with_context(|| format!("failed to stage {}", captured.display()))?;
    std::fs::rename(&staged, dest)
        .with_context(|| format!("failed to move artifact onto {}", dest.display()))?;
    let _ = std::fs::remove_file(captured);
    Ok(dest.to_path_buf())
}
