// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! The two report flows and the per-client pipeline.
//!
//! The People CSV is a synchronous export (a UI sequence ends in a direct
//! download); the Email Activity CSV is asynchronous and goes through the
//! acquisition subsystem. Each pipeline run owns its own browser session;
//! two clients fetched concurrently share no state.

pub mod email_activity;
pub mod people;

use crate::acquisition::clock::{Clock, SystemClock};
use crate::acquisition::AcquisitionConfig;
use crate::config::{load_clients, ClientEntry, Settings};
use crate::driver::chromium::ChromiumDriver;
use crate::driver::Driver;
use crate::progress::{ProgressEventKind, ProgressScope};
use crate::session::{self, Credentials};
use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Which of the two reports to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum ReportKind {
    People,
    EmailActivity,
}

impl ReportKind {
    /// Fixed artifact name per report kind; overwritten on each run.
    pub fn artifact_name(&self) -> &'static str {
        match self {
            ReportKind::People => "people.csv",
            ReportKind::EmailActivity => "email_activity.csv",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReportKind::People => "people",
            ReportKind::EmailActivity => "email activity",
        }
    }
}

/// Paths of the two captured artifacts.
#[derive(Debug, Clone)]
pub struct FetchedReports {
    pub people: PathBuf,
    pub email_activity: PathBuf,
}

/// Run the full pipeline for one configured client: login, switch
/// workspace, capture both reports.
pub async fn fetch_all(
    settings: &Settings,
    client_id: &str,
    max_attempts: u32,
    progress: &mut ProgressScope,
) -> Result<FetchedReports> {
    let (client, creds) = resolve_client(settings, client_id)?;
    let download_dir = settings.download_dir.join(client_id);

    info!(client_id, team_id = client.team_id, "starting report pipeline");
    let driver = launch_driver(settings, &download_dir).await?;
    let clock = SystemClock;

    // The browser session must come down on every path; abandoning it
    // would leak a Chromium process per failed request.
    let outcome = async {
        open_workspace(&driver, &clock, &creds, client.team_id, progress).await?;
        let people = capture_report(
            &driver,
            &clock,
            ReportKind::People,
            max_attempts,
            &download_dir,
            progress,
        )
        .await?;
        let email_activity = capture_report(
            &driver,
            &clock,
            ReportKind::EmailActivity,
            max_attempts,
            &download_dir,
            progress,
        )
        .await?;
        Ok(FetchedReports {
            people,
            email_activity,
        })
    }
    .await;
    let _ = driver.shutdown().await;
    outcome
}

/// Capture a single report for one configured client.
pub async fn fetch_report(
    settings: &Settings,
    client_id: &str,
    kind: ReportKind,
    max_attempts: u32,
    progress: &mut ProgressScope,
) -> Result<PathBuf> {
    let (client, creds) = resolve_client(settings, client_id)?;
    let download_dir = settings.download_dir.join(client_id);

    info!(client_id, team_id = client.team_id, report = kind.label(), "starting report flow");
    let driver = launch_driver(settings, &download_dir).await?;
    let clock = SystemClock;

    let outcome = async {
        open_workspace(&driver, &clock, &creds, client.team_id, progress).await?;
        capture_report(&driver, &clock, kind, max_attempts, &download_dir, progress).await
    }
    .await;
    let _ = driver.shutdown().await;
    outcome
}

fn resolve_client(settings: &Settings, client_id: &str) -> Result<(ClientEntry, Credentials)> {
    let clients = load_clients(&settings.clients_file)?;
    let Some(client) = clients.get(client_id) else {
        bail!(
            "client '{client_id}' not found in {}",
            settings.clients_file.display()
        );
    };
    let creds = settings.credentials_for(Some(client))?;
    Ok((client.clone(), creds))
}

async fn launch_driver(settings: &Settings, download_dir: &Path) -> Result<ChromiumDriver> {
    let staging_dir = download_dir.join(".staging");
    ChromiumDriver::launch(settings.headless, &staging_dir)
        .await
        .context("failed to start browser session")
}

async fn open_workspace(
    driver: &dyn Driver,
    clock: &dyn Clock,
    creds: &Credentials,
    team_id: u64,
    progress: &mut ProgressScope,
) -> Result<()> {
    progress.phase("Signing in to Reply.io...");
    session::login(driver, clock, creds).await?;

    progress.phase(format!("Switching to workspace {team_id}..."));
    session::switch_workspace(driver, clock, team_id).await
}

async fn capture_report(
    driver: &dyn Driver,
    clock: &dyn Clock,
    kind: ReportKind,
    max_attempts: u32,
    download_dir: &Path,
    progress: &mut ProgressScope,
) -> Result<PathBuf> {
    progress.phase(format!("Downloading {} report...", kind.label()));
    let path = match kind {
        ReportKind::People => people::download(driver, clock, download_dir).await?,
        ReportKind::EmailActivity => {
            let config = AcquisitionConfig {
                max_attempts,
                ..AcquisitionConfig::default()
            };
            email_activity::download(driver, clock, download_dir, &config, progress)
                .await
                .context("email activity acquisition failed")?
        }
    };
    emit_saved(progress, kind, &path);
    Ok(path)
}

fn emit_saved(progress: &mut ProgressScope, kind: ReportKind, path: &Path) {
    let bytes = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    info!(report = kind.label(), path = %path.display(), bytes, "artifact saved");
    progress.emit(ProgressEventKind::ArtifactSaved {
        report: kind.label().to_string(),
        path: path.display().to_string(),
        bytes,
    });
}
