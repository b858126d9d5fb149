//! Chromium-based driver using chromiumoxide.

use super::{Driver, Target};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams, DispatchMouseEventType,
    MouseButton,
};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. HARVESTER_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("HARVESTER_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.harvester/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".harvester/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".harvester/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".harvester/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".harvester/chromium/chrome-linux64/chrome"),
                home.join(".harvester/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser", "chrome"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS locations
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Production [`Driver`] backed by a headless Chromium instance.
///
/// Downloads are routed into `staging_dir`; `download_via_click` watches that
/// directory for the completed file.
pub struct ChromiumDriver {
    browser: Browser,
    page: Page,
    staging_dir: PathBuf,
}

impl ChromiumDriver {
    /// Launch Chromium and open a single blank page.
    pub async fn launch(headless: bool, staging_dir: &Path) -> Result<Self> {
        let chrome_path = find_chromium().context(
            "Chromium not found. Install Chrome/Chromium or set HARVESTER_CHROMIUM_PATH.",
        )?;

        std::fs::create_dir_all(staging_dir)
            .with_context(|| format!("failed to create {}", staging_dir.display()))?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(1920, 1080)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking");
        if headless {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        // Spawn the CDP handler task
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to create page")?;

        // Route file downloads into the staging directory.
        page.execute(
            SetDownloadBehaviorParams::builder()
                .behavior(SetDownloadBehaviorBehavior::Allow)
                .download_path(staging_dir.to_string_lossy().to_string())
                .build()
                .map_err(|e| anyhow!("invalid download behavior params: {e}"))?,
        )
        .await
        .context("failed to configure download capture")?;

        Ok(Self {
            browser,
            page,
            staging_dir: staging_dir.to_path_buf(),
        })
    }

    /// Close the page and shut the browser down.
    pub async fn shutdown(mut self) -> Result<()> {
        let _ = self.page.close().await;
        let _ = self.browser.close().await;
        Ok(())
    }

    async fn run_interaction(&self, script: String, what: &str) -> Result<()> {
        let result = self
            .page
            .evaluate(script)
            .await
            .with_context(|| format!("{what} script failed"))?;
        let value: serde_json::Value = result
            .into_value()
            .map_err(|e| anyhow!("failed to convert {what} result: {e:?}"))?;
        let success = value
            .get("success")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if !success {
            let reason = value
                .get("reason")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");
            bail!("{what} failed: {reason}");
        }
        Ok(())
    }
}

#[async_trait]
impl Driver for ChromiumDriver {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        let result = tokio::time::timeout(timeout, self.page.goto(url)).await;
        match result {
            Ok(Ok(_)) => {
                let _ = self.page.wait_for_navigation().await;
                Ok(())
            }
            Ok(Err(e)) => bail!("navigation to {url} failed: {e}"),
            Err(_) => bail!("navigation to {url} timed out after {}ms", timeout.as_millis()),
        }
    }

    async fn click(&self, target: &Target) -> Result<()> {
        let script = format!(
            r#"(() => {{
                const el = {finder};
                if (!el) return {{ success: false, reason: 'no element for {target}' }};
                el.scrollIntoView({{ block: 'center' }});
                el.click();
                return {{ success: true }};
            }})()"#,
            finder = finder_expr(target),
            target = sanitize_js_string(&target.to_string()),
        );
        self.run_interaction(script, "click").await
    }

    async fn hover(&self, target: &Target) -> Result<()> {
        let script = format!(
            r#"(() => {{
                const el = {finder};
                if (!el) return {{ success: false, reason: 'no element for {target}' }};
                el.scrollIntoView({{ block: 'center' }});
                for (const type of ['mouseover', 'mouseenter', 'mousemove']) {{
                    el.dispatchEvent(new MouseEvent(type, {{ bubbles: true, cancelable: true, view: window }}));
                }}
                return {{ success: true }};
            }})()"#,
            finder = finder_expr(target),
            target = sanitize_js_string(&target.to_string()),
        );
        self.run_interaction(script, "hover").await
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let script = format!(
            r#"(() => {{
                let el = null;
                for (const c of document.querySelectorAll('{sel}')) {{
                    if (c.offsetWidth > 0 || c.offsetHeight > 0) {{ el = c; break; }}
                }}
                if (!el) return {{ success: false, reason: 'no visible input for {sel}' }};
                el.focus();
                el.value = '{val}';
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return {{ success: true }};
            }})()"#,
            sel = sanitize_js_string(selector),
            val = sanitize_js_string(value),
        );
        self.run_interaction(script, "fill").await
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("JS evaluation failed")?;
        result
            .into_value()
            .map_err(|e| anyhow!("failed to convert JS result: {e:?}"))
    }

    async fn read_text(&self, selector: &str) -> Result<String> {
        let script = format!(
            "(() => {{ const el = document.querySelector('{}'); return el ? el.innerText : null; }})()",
            sanitize_js_string(selector)
        );
        let value = self.evaluate(&script).await?;
        match value.as_str() {
            Some(s) => Ok(s.to_string()),
            None => bail!("no element matches selector {selector}"),
        }
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        for event_type in [DispatchKeyEventType::KeyDown, DispatchKeyEventType::KeyUp] {
            let params = DispatchKeyEventParams::builder()
                .r#type(event_type)
                .key(key)
                .code(key)
                .build()
                .map_err(|e| anyhow!("invalid key event: {e}"))?;
            self.page
                .execute(params)
                .await
                .with_context(|| format!("failed to press {key}"))?;
        }
        Ok(())
    }

    async fn click_at(&self, x: f64, y: f64) -> Result<()> {
        for event_type in [
            DispatchMouseEventType::MousePressed,
            DispatchMouseEventType::MouseReleased,
        ] {
            let params = DispatchMouseEventParams::builder()
                .r#type(event_type)
                .x(x)
                .y(y)
                .button(MouseButton::Left)
                .click_count(1)
                .build()
                .map_err(|e| anyhow!("invalid mouse event: {e}"))?;
            self.page
                .execute(params)
                .await
                .context("failed to click at coordinates")?;
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .context("failed to get URL")?
            .map(|u| u.to_string())
            .unwrap_or_default();
        Ok(url)
    }

    async fn download_via_click(&self, target: &Target, timeout: Duration) -> Result<PathBuf> {
        let before = dir_snapshot(&self.staging_dir)?;
        self.click(target).await?;

        // The browser writes a partial file first; wait for a new entry
        // whose size is stable across two consecutive checks.
        let started = Instant::now();
        let mut last_seen: Option<(PathBuf, u64)> = None;
        loop {
            if started.elapsed() >= timeout {
                bail!(
                    "download did not complete within {}s",
                    timeout.as_secs()
                );
            }
            tokio::time::sleep(Duration::from_millis(250)).await;

            let Some(candidate) = newest_completed_file(&self.staging_dir, &before)? else {
                continue;
            };
            let size = std::fs::metadata(&candidate)?.len();
            match &last_seen {
                Some((path, prev)) if *path == candidate && *prev == size && size > 0 => {
                    debug!(path = %candidate.display(), size, "download captured");
                    return Ok(candidate);
                }
                _ => last_seen = Some((candidate, size)),
            }
        }
    }
}

/// JS expression evaluating to the element for `target`, or `null`.
///
/// CSS targets resolve to the first visible match; text targets resolve to
/// the deepest visible element whose trimmed text matches, so a label nested
/// in a button resolves to the label's clickable container rather than
/// `<body>`.
fn finder_expr(target: &Target) -> String {
    match target {
        Target::Css(sel) => format!(
            r#"(() => {{
                const all = document.querySelectorAll('{sel}');
                for (const el of all) {{
                    if (el.offsetWidth > 0 || el.offsetHeight > 0) return el;
                }}
                return all[0] || null;
            }})()"#,
            sel = sanitize_js_string(sel)
        ),
        Target::Text(text) => text_finder(text, false),
        Target::TextPrefix(prefix) => text_finder(prefix, true),
    }
}

fn text_finder(needle: &str, prefix: bool) -> String {
    let cmp = if prefix {
        "t.startsWith(needle)"
    } else {
        "t === needle"
    };
    format!(
        r#"(() => {{
            const needle = '{needle}';
            const matches = [...document.querySelectorAll('*')].filter(el => {{
                if (el.offsetWidth === 0 && el.offsetHeight === 0) return false;
                const t = el.textContent.trim();
                return {cmp};
            }});
            return matches.find(el => !matches.some(o => o !== el && el.contains(o))) || null;
        }})()"#,
        needle = sanitize_js_string(needle),
    )
}

/// Sanitize a string for safe injection into a JavaScript string literal.
///
/// Escapes all characters that could break out of a JS string context:
/// backslashes, quotes, backticks, newlines, and script tags.
fn sanitize_js_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 8);
    for ch in s.chars() {
        match ch {
            '\\' => result.push_str("\\\\"),
            '\'' => result.push_str("\\'"),
            '"' => result.push_str("\\\""),
            '`' => result.push_str("\\`"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            '\0' => {} // Strip null bytes
            '<' => result.push_str("\\x3c"), // Prevent </script> injection
            '>' => result.push_str("\\x3e"),
            _ => result.push(ch),
        }
    }
    result
}

fn dir_snapshot(dir: &Path) -> Result<HashSet<PathBuf>> {
    let mut entries = HashSet::new();
    for entry in std::fs::read_dir(dir)? {
        entries.insert(entry?.path());
    }
    Ok(entries)
}

/// The newest file in `dir` that is not in `before` and is not an
/// in-progress browser download.
fn newest_completed_file(dir: &Path, before: &HashSet<PathBuf>) -> Result<Option<PathBuf>> {
    let mut newest: Option<(PathBuf, std::time::SystemTime)> = None;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if before.contains(&path) || !path.is_file() {
            continue;
        }
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if name.ends_with(".crdownload") || name.ends_with(".tmp") {
            continue;
        }
        let modified = entry
            .metadata()?
            .modified()
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
        match &newest {
            Some((_, prev)) if *prev >= modified => {}
            _ => newest = Some((path, modified)),
        }
    }
    Ok(newest.map(|(p, _)| p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_basic() {
        assert_eq!(sanitize_js_string("hello"), "hello");
        assert_eq!(sanitize_js_string("it's"), "it\\'s");
        assert_eq!(sanitize_js_string("a\"b"), "a\\\"b");
    }

    #[test]
    fn test_sanitize_script_tags() {
        let sanitized = sanitize_js_string("</script><script>");
        assert!(!sanitized.contains("</script>"));
    }

    #[test]
    fn test_finder_expr_escapes_target() {
        let expr = finder_expr(&Target::text("Export'); alert(1); ('"));
        assert!(expr.contains("\\'"));
        assert!(!expr.contains("alert(1); ('"));
    }

    #[test]
    fn test_newest_completed_file_skips_partials() {
        let dir = tempfile::tempdir().unwrap();
        let before = dir_snapshot(dir.path()).unwrap();

        std::fs::write(dir.path().join("export.csv.crdownload"), b"partial").unwrap();
        assert!(newest_completed_file(dir.path(), &before)
            .unwrap()
            .is_none());

        std::fs::write(dir.path().join("export.csv"), b"id,email\n").unwrap();
        let found = newest_completed_file(dir.path(), &before).unwrap().unwrap();
        assert_eq!(found.file_name().unwrap(), "export.csv");
    }

    #[test]
    fn test_newest_completed_file_ignores_baseline() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("old.csv"), b"stale").unwrap();
        let before = dir_snapshot(dir.path()).unwrap();
        assert!(newest_completed_file(dir.path(), &before)
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_click_and_read() {
        let staging = tempfile::tempdir().unwrap();
        let driver = ChromiumDriver::launch(true, staging.path())
            .await
            .expect("failed to launch driver");

        driver
            .navigate(
                "data:text/html,<button onclick=\"document.title='clicked'\">Press me</button>",
                Duration::from_secs(10),
            )
            .await
            .expect("navigation failed");

        driver
            .click(&Target::text("Press me"))
            .await
            .expect("click failed");

        let title = driver
            .evaluate("document.title")
            .await
            .expect("evaluate failed");
        assert_eq!(title.as_str().unwrap(), "clicked");

        driver.shutdown().await.expect("shutdown failed");
    }
}
