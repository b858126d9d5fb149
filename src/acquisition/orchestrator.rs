//! Retry orchestration: drive up to N trigger-then-poll attempts and hand
//! the first match to the artifact fetcher.
//!
//! `Idle → Triggering(k) → Polling(k) → {Success, Triggering(k+1),
//! ExhaustedFailure}`. Trigger records are never discarded between
//! attempts: each poll phase disambiguates against the union of all
//! triggers issued so far, so a job from an early attempt that completes
//! late is still recognized and accepted.

use super::clock::Clock;
use super::matcher::{BaselineDiff, Matcher, TimeWindow};
use super::poll::{PollLoop, PollOutcome};
use super::{
    AcquireError, AcquisitionConfig, ArtifactFetcher, ExportTrigger, FeedSource, StrategyKind,
    TriggerRecord,
};
use crate::progress::{ProgressEventKind, ProgressScope};
use std::path::PathBuf;
use tracing::{info, warn};

/// Run one full acquisition: trigger, poll, retry, download.
///
/// Returns the destination path of the captured artifact, or the terminal
/// [`AcquireError`].
pub async fn acquire(
    config: &AcquisitionConfig,
    clock: &dyn Clock,
    trigger: &mut dyn ExportTrigger,
    feed: &mut dyn FeedSource,
    fetcher: &mut dyn ArtifactFetcher,
    progress: &mut ProgressScope,
) -> Result<PathBuf, AcquireError> {
    let started = clock.now();

    // Strategy A captures its baseline before the first trigger. A failed
    // baseline scan degrades to an empty baseline: over-matching is
    // preferable to aborting before the export was even requested.
    let matcher: Box<dyn Matcher> = match config.strategy {
        StrategyKind::BaselineDiff => {
            let baseline = match feed.scan().await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("baseline scan failed, starting from an empty baseline: {e:#}");
                    Vec::new()
                }
            };
            info!(baseline_entries = baseline.len(), "pre-trigger baseline captured");
            Box::new(BaselineDiff::from_entries(&baseline))
        }
        StrategyKind::TimeWindow => Box::new(TimeWindow::new(config.window_tolerance_min)),
    };

    let poll_loop = PollLoop::new(clock, config.poll_interval, config.attempt_deadline);
    let mut triggers: Vec<TriggerRecord> = Vec::new();
    let mut last_trigger_error: Option<anyhow::Error> = None;

    for attempt in 1..=config.max_attempts {
        // Capture the instant *before* the action: completion heuristics
        // are measured from request time, not response time.
        let triggered_at = clock.now();
        match trigger.fire().await {
            Ok(()) => {
                info!(attempt, %triggered_at, "export trigger issued");
                progress.emit(ProgressEventKind::TriggerIssued {
                    attempt,
                    triggered_at: triggered_at.to_rfc3339(),
                });
                triggers.push(TriggerRecord {
                    attempt,
                    triggered_at,
                });
                last_trigger_error = None;
            }
            Err(e) => {
                warn!(attempt, "export trigger failed: {e:#}");
                progress.emit(ProgressEventKind::Warning {
                    message: format!("export trigger failed on attempt {attempt}"),
                });
                last_trigger_error = Some(e);
            }
        }

        // Until a trigger has succeeded nothing can match; consume the
        // attempt and re-trigger. Once at least one job is outstanding the
        // poll phase runs even after a failed re-trigger, because an
        // earlier job may complete during this window.
        if triggers.is_empty() {
            continue;
        }

        match poll_loop
            .run(attempt, feed, matcher.as_ref(), &triggers, progress)
            .await
        {
            PollOutcome::Matched(matched) => {
                info!(
                    attempt,
                    link = %matched.entry.link,
                    strategy = %matched.strategy,
                    "export notification matched"
                );
                progress.emit(ProgressEventKind::MatchFound {
                    attempt,
                    link: matched.entry.link.clone(),
                    strategy: matched.strategy.to_string(),
                });
                // A failed capture of a resolved match is fatal here; the
                // caller decides whether to redo the acquisition.
                return fetcher
                    .fetch(&matched)
                    .await
                    .map_err(|source| AcquireError::Download { source });
            }
            PollOutcome::TimedOut { polls, elapsed } => {
                warn!(attempt, polls, ?elapsed, "attempt exhausted without a match");
                progress.emit(ProgressEventKind::AttemptExhausted {
                    attempt,
                    polls,
                    elapsed_secs: elapsed.as_secs(),
                });
            }
        }
    }

    let elapsed_secs = (clock.now() - started).to_std().unwrap_or_default().as_secs();
    if triggers.is_empty() {
        // Every attempt failed before an export was even enqueued; report
        // the trigger failure rather than a misleading timeout.
        return Err(AcquireError::Trigger {
            attempt: config.max_attempts,
            source: last_trigger_error
                .unwrap_or_else(|| anyhow::anyhow!("no trigger was issued")),
        });
    }
    Err(AcquireError::Exhausted {
        attempts: config.max_attempts,
        elapsed_secs,
    })
}
