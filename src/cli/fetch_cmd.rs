//! `harvester fetch <client>` — download reports for one client.

use crate::config::Settings;
use crate::progress::{self, ProgressEventKind, ProgressScope};
use crate::reports::{self, ReportKind};
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Run the fetch command. With `report` unset, both reports are produced.
pub async fn run(
    client_id: &str,
    report: Option<ReportKind>,
    max_attempts: u32,
    no_headless: bool,
) -> Result<()> {
    let mut settings = Settings::from_env();
    if no_headless {
        settings.headless = false;
    }

    let (tx, mut rx) = progress::channel();

    // Render progress events on a spinner while the pipeline runs.
    let printer = tokio::spawn(async move {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}").expect("static template"),
        );
        spinner.enable_steady_tick(Duration::from_millis(120));

        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                // A lagged receiver skips overwritten events and catches up.
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            };
            match event.event {
                ProgressEventKind::Phase { message } => spinner.set_message(message),
                ProgressEventKind::TriggerIssued { attempt, .. } => {
                    spinner.set_message(format!("export triggered (attempt {attempt})"))
                }
                ProgressEventKind::PollTick {
                    poll, elapsed_secs, ..
                } => spinner.set_message(format!(
                    "waiting for export notification ({elapsed_secs}s, poll {poll})"
                )),
                ProgressEventKind::MatchFound { strategy, .. } => {
                    spinner.set_message(format!("export notification matched ({strategy})"))
                }
                ProgressEventKind::AttemptExhausted { attempt, .. } => {
                    spinner.println(format!("  attempt {attempt} timed out, re-triggering"))
                }
                ProgressEventKind::ArtifactSaved {
                    report,
                    path,
                    bytes,
                } => spinner.println(format!("  {report}: {path} ({bytes} bytes)")),
                ProgressEventKind::Warning { message } => {
                    spinner.println(format!("  warning: {message}"))
                }
                ProgressEventKind::Done { .. } | ProgressEventKind::Failed { .. } => break,
            }
        }
        spinner.finish_and_clear();
    });

    let mut scope = ProgressScope::new(Some(tx), uuid::Uuid::new_v4().to_string());
    let result = run_fetch(&settings, client_id, report, max_attempts, &mut scope).await;
    match &result {
        Ok(_) => scope.emit(ProgressEventKind::Done {
            message: "done".to_string(),
        }),
        Err(e) => scope.emit(ProgressEventKind::Failed {
            message: format!("{e:#}"),
        }),
    }
    let _ = printer.await;

    for (kind, path) in result? {
        println!("{:>14}: {}", kind.label(), path.display());
    }
    Ok(())
}

async fn run_fetch(
    settings: &Settings,
    client_id: &str,
    report: Option<ReportKind>,
    max_attempts: u32,
    scope: &mut ProgressScope,
) -> Result<Vec<(ReportKind, std::path::PathBuf)>> {
    match report {
        Some(kind) => {
            let path =
                reports::fetch_report(settings, client_id, kind, max_attempts, scope).await?;
            Ok(vec![(kind, path)])
        }
        None => {
            let fetched = reports::fetch_all(settings, client_id, max_attempts, scope).await?;
            Ok(vec![
                (ReportKind::People, fetched.people),
                (ReportKind::EmailActivity, fetched.email_activity),
            ])
        }
    }
}
