//! Fixed-cadence poll loop: scan the feed, try to match, sleep, repeat.
//!
//! State machine per attempt: `Polling → {Matched, TimedOut}`. A transient
//! failure of a single scan is treated as "no entries observed this cycle",
//! not as a fatal error; the next poll retries the interaction.

use super::clock::Clock;
use super::matcher::Matcher;
use super::{FeedSource, MatchResult, TriggerRecord};
use crate::progress::{ProgressEventKind, ProgressScope};
use std::time::Duration;
use tracing::debug;

/// Emit a progress tick every this many polls (plus on match), so SSE
/// consumers see liveness without one event per 5-second cycle.
const TICK_EVERY: u32 = 6;

/// Terminal state of one attempt's polling phase.
#[derive(Debug)]
pub enum PollOutcome {
    /// A feed entry was attributed to one of our triggers.
    Matched(MatchResult),
    /// The per-attempt deadline elapsed with no attributable entry.
    TimedOut { polls: u32, elapsed: Duration },
}

/// One attempt's polling phase over an injected clock.
pub struct PollLoop<'a> {
    clock: &'a dyn Clock,
    interval: Duration,
    deadline: Duration,
}

impl<'a> PollLoop<'a> {
    pub fn new(clock: &'a dyn Clock, interval: Duration, deadline: Duration) -> Self {
        Self {
            clock,
            interval,
            deadline,
        }
    }

    /// Poll until an entry matches or the deadline elapses.
    ///
    /// The deadline is checked against cumulative elapsed time before each
    /// scan, so the loop times out no earlier than the configured ceiling
    /// and no later than one interval past it.
    pub async fn run(
        &self,
        attempt: u32,
        feed: &mut dyn FeedSource,
        matcher: &dyn Matcher,
        triggers: &[TriggerRecord],
        progress: &mut ProgressScope,
    ) -> PollOutcome {
        let started = self.clock.now();
        let mut polls: u32 = 0;

        loop {
            let elapsed = (self.clock.now() - started).to_std().unwrap_or_default();
            if elapsed >= self.deadline {
                debug!(attempt, polls, ?elapsed, "poll phase timed out");
                return PollOutcome::TimedOut { polls, elapsed };
            }

            polls += 1;
            let mut entries = match feed.scan().await {
                Ok(entries) => entries,
                Err(e) => {
                    // Transient UI failure: count as an empty snapshot.
                    debug!(attempt, poll = polls, "feed scan failed, empty snapshot: {e:#}");
                    Vec::new()
                }
            };

            if let Some(index) = matcher.select(&entries, triggers) {
                let entry = entries.swap_remove(index);
                debug!(attempt, poll = polls, link = %entry.link, "feed entry matched");
                return PollOutcome::Matched(MatchResult {
                    entry,
                    strategy: matcher.kind(),
                });
            }

            if polls % TICK_EVERY == 0 {
                progress.emit(ProgressEventKind::PollTick {
                    attempt,
                    poll: polls,
                    entries_seen: entries.len(),
                    elapsed_secs: elapsed.as_secs(),
                });
            }

            self.clock.sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::clock::SimClock;
    use crate::acquisition::matcher::TimeWindow;
    use crate::acquisition::FeedEntry;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::{DateTime, Local, TimeZone};

    const INTERVAL: Duration = Duration::from_secs(5);
    const DEADLINE: Duration = Duration::from_secs(300);

    fn start_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 5, 14, 3, 0).unwrap()
    }

    /// Feed whose entries become visible at scheduled instants.
    struct ScriptedFeed {
        clock: SimClock,
        timeline: Vec<(DateTime<Local>, FeedEntry)>,
        /// Fail the first N scans before producing snapshots.
        fail_first: u32,
        scans: u32,
    }

    impl ScriptedFeed {
        fn new(clock: SimClock, timeline: Vec<(DateTime<Local>, FeedEntry)>) -> Self {
            Self {
                clock,
                timeline,
                fail_first: 0,
                scans: 0,
            }
        }
    }

    #[async_trait]
    impl FeedSource for ScriptedFeed {
        async fn scan(&mut self) -> Result<Vec<FeedEntry>> {
            self.scans += 1;
            if self.scans <= self.fail_first {
                return Err(anyhow!("bell did not respond"));
            }
            let now = self.clock.now();
            Ok(self
                .timeline
                .iter()
                .filter(|(visible_at, _)| *visible_at <= now)
                .map(|(_, e)| e.clone())
                .collect())
        }
    }

    fn entry(link: &str, context: &str) -> FeedEntry {
        FeedEntry {
            link: link.to_string(),
            context: context.to_string(),
            observed_at: start_time(),
        }
    }

    fn triggers_at_start() -> Vec<TriggerRecord> {
        vec![TriggerRecord {
            attempt: 1,
            triggered_at: start_time(),
        }]
    }

    #[tokio::test]
    async fn test_empty_feed_times_out_exactly_at_ceiling() {
        let clock = SimClock::starting_at(start_time());
        let mut feed = ScriptedFeed::new(clock.clone(), vec![]);
        let matcher = TimeWindow::new(6);
        let poll_loop = PollLoop::new(&clock, INTERVAL, DEADLINE);

        let outcome = poll_loop
            .run(
                1,
                &mut feed,
                &matcher,
                &triggers_at_start(),
                &mut ProgressScope::disabled(),
            )
            .await;

        match outcome {
            PollOutcome::TimedOut { polls, elapsed } => {
                // Never earlier than the ceiling, never more than one
                // interval later.
                assert!(elapsed >= DEADLINE);
                assert!(elapsed < DEADLINE + INTERVAL);
                assert_eq!(elapsed, DEADLINE);
                assert_eq!(polls, 60);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_match_on_third_poll() {
        let clock = SimClock::starting_at(start_time());
        let appears_at = start_time() + chrono::Duration::seconds(10);
        let mut feed = ScriptedFeed::new(
            clock.clone(),
            vec![(appears_at, entry("https://x/ours", "ready at 02:05 PM"))],
        );
        let matcher = TimeWindow::new(6);
        let poll_loop = PollLoop::new(&clock, INTERVAL, DEADLINE);

        let outcome = poll_loop
            .run(
                1,
                &mut feed,
                &matcher,
                &triggers_at_start(),
                &mut ProgressScope::disabled(),
            )
            .await;

        match outcome {
            PollOutcome::Matched(matched) => {
                assert_eq!(matched.entry.link, "https://x/ours");
                assert_eq!(feed.scans, 3);
                // Two sleeps before the matching scan.
                assert_eq!(clock.now(), appears_at);
            }
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transient_scan_failures_are_swallowed() {
        let clock = SimClock::starting_at(start_time());
        let mut feed = ScriptedFeed::new(
            clock.clone(),
            vec![(start_time(), entry("https://x/ours", "02:03 PM"))],
        );
        feed.fail_first = 2;
        let matcher = TimeWindow::new(6);
        let poll_loop = PollLoop::new(&clock, INTERVAL, DEADLINE);

        let outcome = poll_loop
            .run(
                1,
                &mut feed,
                &matcher,
                &triggers_at_start(),
                &mut ProgressScope::disabled(),
            )
            .await;

        match outcome {
            PollOutcome::Matched(matched) => {
                assert_eq!(matched.entry.link, "https://x/ours");
                assert_eq!(feed.scans, 3);
            }
            other => panic!("expected match after transient failures, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_all_scans_failing_is_a_timeout_not_an_error() {
        let clock = SimClock::starting_at(start_time());
        let mut feed = ScriptedFeed::new(clock.clone(), vec![]);
        feed.fail_first = u32::MAX;
        let matcher = TimeWindow::new(6);
        let poll_loop = PollLoop::new(&clock, INTERVAL, DEADLINE);

        let outcome = poll_loop
            .run(
                1,
                &mut feed,
                &matcher,
                &triggers_at_start(),
                &mut ProgressScope::disabled(),
            )
            .await;

        assert!(matches!(outcome, PollOutcome::TimedOut { .. }));
    }
}
