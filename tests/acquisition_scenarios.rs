//! End-to-end acquisition scenarios over simulated time.
//!
//! Drives the full trigger → poll → match → download cycle with a virtual
//! clock and scripted collaborators: no browser, no real sleeping. Each
//! scenario pins one distributed-systems property of the subsystem:
//! - success within a few polls of the export completing
//! - retry with trigger records retained across attempts
//! - exhaustion after the configured number of attempts
//! - idempotence of a re-run against a refreshed baseline

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};
use reply_harvester::acquisition::{
    acquire, AcquireError, AcquisitionConfig, ArtifactFetcher, Clock, ExportTrigger, FeedEntry,
    FeedSource, MatchResult, SimClock, StrategyKind,
};
use reply_harvester::progress::{self, ProgressEvent, ProgressEventKind, ProgressScope};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Scenario Builders ──

fn at(h: u32, m: u32, s: u32) -> DateTime<Local> {
    Local.with_ymd_and_hms(2026, 3, 5, h, m, s).unwrap()
}

fn entry(link: &str, context: &str) -> FeedEntry {
    FeedEntry {
        link: link.to_string(),
        context: context.to_string(),
        observed_at: at(14, 3, 0),
    }
}

type Timeline = Arc<Mutex<Vec<(DateTime<Local>, FeedEntry)>>>;

/// Feed whose entries become visible at scheduled instants.
struct TimelineFeed {
    clock: SimClock,
    timeline: Timeline,
}

#[async_trait]
impl FeedSource for TimelineFeed {
    async fn scan(&mut self) -> Result<Vec<FeedEntry>> {
        let now = self.clock.now();
        Ok(self
            .timeline
            .lock()
            .unwrap()
            .iter()
            .filter(|(visible_at, _)| *visible_at <= now)
            .map(|(_, e)| e.clone())
            .collect())
    }
}

/// Trigger that records when each fire happened.
struct RecordingTrigger {
    clock: SimClock,
    fired_at: Vec<DateTime<Local>>,
}

#[async_trait]
impl ExportTrigger for RecordingTrigger {
    async fn fire(&mut self) -> Result<()> {
        self.fired_at.push(self.clock.now());
        Ok(())
    }
}

/// Fetcher that writes a real file so persistence can be asserted.
struct FileWritingFetcher {
    dest: PathBuf,
    fetched: Vec<MatchResult>,
}

#[async_trait]
impl ArtifactFetcher for FileWritingFetcher {
    async fn fetch(&mut self, matched: &MatchResult) -> Result<PathBuf> {
        std::fs::write(&self.dest, b"Contact,Email\nJane Doe,jane@acme.example\n")?;
        self.fetched.push(matched.clone());
        Ok(self.dest.clone())
    }
}

struct Harness {
    clock: SimClock,
    trigger: RecordingTrigger,
    feed: TimelineFeed,
    fetcher: FileWritingFetcher,
    _dir: tempfile::TempDir,
}

fn harness(start: DateTime<Local>, timeline: Vec<(DateTime<Local>, FeedEntry)>) -> Harness {
    let clock = SimClock::starting_at(start);
    let timeline: Timeline = Arc::new(Mutex::new(timeline));
    let dir = tempfile::tempdir().unwrap();
    Harness {
        clock: clock.clone(),
        trigger: RecordingTrigger {
            clock: clock.clone(),
            fired_at: Vec::new(),
        },
        feed: TimelineFeed {
            clock,
            timeline,
        },
        fetcher: FileWritingFetcher {
            dest: dir.path().join("email_activity.csv"),
            fetched: Vec::new(),
        },
        _dir: dir,
    }
}

fn config(max_attempts: u32, deadline_secs: u64, strategy: StrategyKind) -> AcquisitionConfig {
    AcquisitionConfig {
        max_attempts,
        poll_interval: Duration::from_secs(5),
        attempt_deadline: Duration::from_secs(deadline_secs),
        window_tolerance_min: 6,
        strategy,
        capture_timeout: Duration::from_secs(60),
    }
}

fn drain(rx: &mut progress::ProgressReceiver) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ── Scenario 1: export completes within a few polls ──

#[tokio::test]
async fn scenario_success_within_three_polls() {
    let start = at(14, 3, 0);
    let mut h = harness(
        start,
        vec![(
            at(14, 3, 10),
            entry(
                "https://run.reply.io/exports/8831",
                "Your export is ready. Download it here. 02:05 PM",
            ),
        )],
    );

    let path = acquire(
        &config(4, 300, StrategyKind::TimeWindow),
        &h.clock,
        &mut h.trigger,
        &mut h.feed,
        &mut h.fetcher,
        &mut ProgressScope::disabled(),
    )
    .await
    .expect("acquisition should succeed");

    // Matched on the third poll, within 15 seconds of simulated time.
    assert!(h.clock.now() - start <= chrono::Duration::seconds(15));
    assert_eq!(h.trigger.fired_at.len(), 1);
    assert_eq!(h.fetcher.fetched.len(), 1);
    assert_eq!(
        h.fetcher.fetched[0].entry.link,
        "https://run.reply.io/exports/8831"
    );
    assert!(path.exists());
    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("jane@acme.example"));
}

// ── Scenario 2: first attempt times out, second succeeds ──

#[tokio::test]
async fn scenario_retry_succeeds_on_second_attempt() {
    // Attempt 1 triggers at 14:03 and polls an empty feed for 3 minutes.
    // Attempt 2 triggers at 14:06; its export completes at 14:07:30 and the
    // feed shows "02:07 PM", inside attempt 2's window.
    let start = at(14, 3, 0);
    let mut h = harness(
        start,
        vec![(
            at(14, 7, 30),
            entry("https://run.reply.io/exports/8832", "Export done at 02:07 PM"),
        )],
    );

    let (tx, mut rx) = progress::channel();
    let mut scope = ProgressScope::new(Some(tx), "scenario-2");

    let path = acquire(
        &config(4, 180, StrategyKind::TimeWindow),
        &h.clock,
        &mut h.trigger,
        &mut h.feed,
        &mut h.fetcher,
        &mut scope,
    )
    .await
    .expect("second attempt should succeed");

    assert!(path.exists());
    assert_eq!(h.trigger.fired_at.len(), 2);
    assert_eq!(h.trigger.fired_at[0], at(14, 3, 0));
    assert_eq!(h.trigger.fired_at[1], at(14, 6, 0));

    let events = drain(&mut rx);
    let triggers = events
        .iter()
        .filter(|e| matches!(e.event, ProgressEventKind::TriggerIssued { .. }))
        .count();
    let exhausted = events
        .iter()
        .filter(|e| matches!(e.event, ProgressEventKind::AttemptExhausted { .. }))
        .count();
    let matched: Vec<_> = events
        .iter()
        .filter_map(|e| match &e.event {
            ProgressEventKind::MatchFound { attempt, .. } => Some(*attempt),
            _ => None,
        })
        .collect();
    assert_eq!(triggers, 2);
    assert_eq!(exhausted, 1);
    assert_eq!(matched, vec![2]);
}

// ── Scenario 2b: a slow result from attempt 1 is accepted during
//    attempt 2's polling window ──

#[tokio::test]
async fn scenario_slow_result_from_earlier_attempt_is_accepted() {
    // Tolerance 3 min. Attempt 1 at 14:03 (window 02:03 to 02:06 PM),
    // attempt 2 at 14:05 (window 02:05 to 02:08 PM). "02:04 PM" means only
    // attempt 1's window covers it, and it appears while attempt 2 is
    // polling. Accepting it requires the union of all trigger records.
    let start = at(14, 3, 0);
    let mut h = harness(
        start,
        vec![(
            at(14, 5, 30),
            entry("https://run.reply.io/exports/8833", "finished at 02:04 PM"),
        )],
    );

    let mut cfg = config(4, 120, StrategyKind::TimeWindow);
    cfg.window_tolerance_min = 3;

    let path = acquire(
        &cfg,
        &h.clock,
        &mut h.trigger,
        &mut h.feed,
        &mut h.fetcher,
        &mut ProgressScope::disabled(),
    )
    .await
    .expect("cross-attempt match should succeed");

    assert!(path.exists());
    assert_eq!(h.trigger.fired_at.len(), 2);
    assert_eq!(h.fetcher.fetched[0].entry.context, "finished at 02:04 PM");
}

// ── Scenario 3: every attempt times out ──

#[tokio::test]
async fn scenario_all_attempts_exhausted() {
    let start = at(14, 3, 0);
    let mut h = harness(start, vec![]);

    let err = acquire(
        &config(3, 60, StrategyKind::TimeWindow),
        &h.clock,
        &mut h.trigger,
        &mut h.feed,
        &mut h.fetcher,
        &mut ProgressScope::disabled(),
    )
    .await
    .expect_err("no entries should exhaust all attempts");

    match err {
        AcquireError::Exhausted {
            attempts,
            elapsed_secs,
        } => {
            assert_eq!(attempts, 3);
            assert!(elapsed_secs >= 180);
        }
        other => panic!("expected Exhausted, got {other}"),
    }
    assert_eq!(h.trigger.fired_at.len(), 3);
    assert!(h.fetcher.fetched.is_empty());
    assert!(!h.fetcher.dest.exists());
}

// ── Scenario 4: re-run against a refreshed baseline ──

#[tokio::test]
async fn scenario_rerun_ignores_previous_runs_artifact() {
    // The previous run's entry is still in the feed when a fresh run
    // starts. The fresh baseline captures it, so it must not be selected
    // again.
    let start = at(15, 0, 0);
    let mut h = harness(
        start,
        vec![(
            at(14, 10, 0),
            entry("https://run.reply.io/exports/8831", "ready at 02:05 PM"),
        )],
    );

    let err = acquire(
        &config(1, 60, StrategyKind::BaselineDiff),
        &h.clock,
        &mut h.trigger,
        &mut h.feed,
        &mut h.fetcher,
        &mut ProgressScope::disabled(),
    )
    .await
    .expect_err("stale entry must not match a fresh run");

    assert!(matches!(err, AcquireError::Exhausted { .. }));
    assert!(h.fetcher.fetched.is_empty());
}
