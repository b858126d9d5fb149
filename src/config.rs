//! Environment and client-registry configuration.
//!
//! Settings come from the environment (a `.env` file is loaded by the
//! binary entry point); the per-client registry is a `clients.json` file
//! mapping client ids to workspace ids and optional credential overrides.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::session::Credentials;

/// Process-wide settings resolved from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Account email used when a client has no override.
    pub email: Option<String>,
    /// Account password used when a client has no override.
    pub password: Option<String>,
    /// Root directory for downloaded artifacts (one subdirectory per
    /// client).
    pub download_dir: PathBuf,
    /// Run the browser headless. Set `HARVESTER_HEADLESS=false` to watch.
    pub headless: bool,
    /// Path of the client registry file.
    pub clients_file: PathBuf,
}

impl Settings {
    pub fn from_env() -> Self {
        let download_dir = std::env::var("HARVESTER_DOWNLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("harvester-reports"));
        let clients_file = std::env::var("HARVESTER_CLIENTS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("clients.json"));
        Self {
            email: std::env::var("REPLY_EMAIL").ok(),
            password: std::env::var("REPLY_PASSWORD").ok(),
            download_dir,
            headless: parse_headless(std::env::var("HARVESTER_HEADLESS").ok().as_deref()),
            clients_file,
        }
    }

    /// Resolve credentials for a client, preferring its overrides over the
    /// environment account.
    pub fn credentials_for(&self, client: Option<&ClientEntry>) -> Result<Credentials> {
        let email = client
            .and_then(|c| c.reply_io_email.clone())
            .or_else(|| self.email.clone());
        let password = client
            .and_then(|c| c.reply_io_password.clone())
            .or_else(|| self.password.clone());
        match (email, password) {
            (Some(email), Some(password)) => Ok(Credentials { email, password }),
            _ => bail!(
                "no Reply.io credentials configured; set REPLY_EMAIL and REPLY_PASSWORD or add overrides to the client entry"
            ),
        }
    }
}

fn parse_headless(value: Option<&str>) -> bool {
    !matches!(
        value.map(|v| v.trim().to_ascii_lowercase()),
        Some(v) if v == "false" || v == "0" || v == "no"
    )
}

/// One entry of `clients.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientEntry {
    /// Workspace id in the platform.
    pub team_id: u64,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Per-client credential overrides.
    #[serde(default)]
    pub reply_io_email: Option<String>,
    #[serde(default)]
    pub reply_io_password: Option<String>,
}

impl ClientEntry {
    pub fn name_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.display_name.as_deref().unwrap_or(fallback)
    }
}

/// Load the client registry. A missing file is an empty registry, not an
/// error, so a fresh checkout can run `harvester doctor`.
pub fn load_clients(path: &Path) -> Result<BTreeMap<String, ClientEntry>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid client registry {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_clients_parses_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clients.json");
        std::fs::write(
            &path,
            r#"{
                "acme": { "team_id": 4821, "display_name": "Acme Corp" },
                "globex": {
                    "team_id": 9107,
                    "reply_io_email": "ops@globex.example",
                    "reply_io_password": "hunter2"
                }
            }"#,
        )
        .unwrap();

        let clients = load_clients(&path).unwrap();
        assert_eq!(clients.len(), 2);
        assert_eq!(clients["acme"].team_id, 4821);
        assert_eq!(clients["acme"].name_or("acme"), "Acme Corp");
        assert_eq!(clients["globex"].name_or("globex"), "globex");
        assert_eq!(
            clients["globex"].reply_io_email.as_deref(),
            Some("ops@globex.example")
        );
    }

    #[test]
    fn test_missing_registry_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let clients = load_clients(&dir.path().join("nope.json")).unwrap();
        assert!(clients.is_empty());
    }

    #[test]
    fn test_parse_headless() {
        assert!(parse_headless(None));
        assert!(parse_headless(Some("true")));
        assert!(!parse_headless(Some("false")));
        assert!(!parse_headless(Some("0")));
        assert!(!parse_headless(Some(" FALSE ")));
    }

    #[test]
    fn test_credentials_prefer_client_overrides() {
        let settings = Settings {
            email: Some("default@example.com".to_string()),
            password: Some("default-pw".to_string()),
            download_dir: PathBuf::from("/tmp"),
            headless: true,
            clients_file: PathBuf::from("clients.json"),
        };
        let client = ClientEntry {
            team_id: 1,
            display_name: None,
            reply_io_email: Some("override@example.com".to_string()),
            reply_io_password: None,
        };

        let creds = settings.credentials_for(Some(&client)).unwrap();
        assert_eq!(creds.email, "override@example.com");
        assert_eq!(creds.password, "default-pw");

        let fallback = settings.credentials_for(None).unwrap();
        assert_eq!(fallback.email, "default@example.com");
    }

    #[test]
    fn test_credentials_missing_is_an_error() {
        let settings = Settings {
            email: None,
            password: None,
            download_dir: PathBuf::from("/tmp"),
            headless: true,
            clients_file: PathBuf::from("clients.json"),
        };
        assert!(settings.credentials_for(None).is_err());
    }
}
