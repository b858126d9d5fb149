//! Login and workspace flows.
//!
//! Direct, sequential UI workflows with no retry logic. These own the parts
//! of the browser session that happen before any report flow runs: signing
//! in, listing workspaces, and switching the active workspace.

use crate::acquisition::clock::Clock;
use crate::driver::{Driver, Target};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub const BASE_URL: &str = "https://run.reply.io/";

const NAV_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// A workspace visible to the signed-in account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub team_id: u64,
    pub name: String,
}

/// Sign in if the app redirects to the login screen; a session restored
/// from cookies skips straight through.
pub async fn login(driver: &dyn Driver, clock: &dyn Clock, creds: &Credentials) -> Result<()> {
    driver.navigate(BASE_URL, NAV_TIMEOUT).await?;
    clock.sleep(Duration::from_secs(3)).await;

    let url = driver.current_url().await.unwrap_or_default();
    if url.contains("oauth") || url.to_ascii_lowercase().contains("login") {
        driver.fill("input", &creds.email).await?;
        driver.fill("input[type=\"password\"]", &creds.password).await?;
        driver.click(&Target::text("Sign in")).await?;
        wait_for_app(driver, clock, Duration::from_secs(20)).await;
    }
    clock.sleep(Duration::from_secs(3)).await;
    Ok(())
}

/// Wait until the post-login app shell is loaded. Tolerates a timeout: some
/// tenants land on an interstitial that still resolves after the deadline.
async fn wait_for_app(driver: &dyn Driver, clock: &dyn Clock, timeout: Duration) {
    let step = Duration::from_millis(500);
    let mut waited = Duration::ZERO;
    while waited < timeout {
        if let Ok(url) = driver.current_url().await {
            let lower = url.to_ascii_lowercase();
            if url.contains("run.reply.io") && !lower.contains("login") && !lower.contains("oauth")
            {
                debug!(%url, "app shell reached");
                return;
            }
        }
        clock.sleep(step).await;
        waited += step;
    }
    warn!("login redirect did not settle within {}s, continuing", timeout.as_secs());
}

const WORKSPACE_SCRIPT: &str = r#"(() => {
    const out = [];
    for (const link of document.querySelectorAll('a[href*="SwitchTeam"]')) {
        out.push({ href: link.href, name: link.textContent.trim() });
    }
    if (out.length === 0) {
        for (const item of document.querySelectorAll('[data-team-id]')) {
            out.push({ team_id: item.getAttribute('data-team-id'), name: item.textContent.trim() });
        }
    }
    return out;
})()"#;

#[derive(Deserialize)]
struct RawWorkspace {
    #[serde(default)]
    href: Option<String>,
    #[serde(default)]
    team_id: Option<String>,
    name: String,
}

/// Scrape the workspaces available on the team-switch page.
pub async fn fetch_workspaces(driver: &dyn Driver, clock: &dyn Clock) -> Result<Vec<Workspace>> {
    driver
        .navigate(&format!("{BASE_URL}Home/SwitchTeam"), NAV_TIMEOUT)
        .await?;
    clock.sleep(Duration::from_secs(3)).await;

    let value = driver.evaluate(WORKSPACE_SCRIPT).await?;
    parse_workspaces(value)
}

fn parse_workspaces(value: serde_json::Value) -> Result<Vec<Workspace>> {
    let raw: Vec<RawWorkspace> =
        serde_json::from_value(value).context("unexpected workspace list shape")?;

    let mut workspaces = Vec::new();
    for entry in raw {
        let team_id = match (&entry.href, &entry.team_id) {
            (Some(href), _) => team_id_from_href(href),
            (None, Some(id)) => id.parse().ok(),
            (None, None) => None,
        };
        // Switch links without a teamId query (e.g. the page's own chrome)
        // carry no workspace.
        if let Some(team_id) = team_id {
            workspaces.push(Workspace {
                team_id,
                name: entry.name,
            });
        }
    }
    Ok(workspaces)
}

fn team_id_from_href(href: &str) -> Option<u64> {
    let url = Url::parse(href).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "teamId")
        .and_then(|(_, value)| value.parse().ok())
}

/// Switch the active workspace. The app reloads the whole shell, which is
/// why the settle wait is the longest in the session flow.
pub async fn switch_workspace(driver: &dyn Driver, clock: &dyn Clock, team_id: u64) -> Result<()> {
    driver
        .navigate(
            &format!("{BASE_URL}Home/SwitchTeam?teamId={team_id}"),
            NAV_TIMEOUT,
        )
        .await?;
    clock.sleep(Duration::from_secs(8)).await;
    Ok(())
}
