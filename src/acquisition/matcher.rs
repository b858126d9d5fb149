//! Match disambiguation — which feed entry, if any, belongs to our triggers.
//!
//! The platform exposes no job id, so correlation is a heuristic predicate
//! over the accumulated trigger context. Two interchangeable strategies are
//! kept behind one trait so a more reliable correlation (a job id, should
//! the platform ever expose one) can replace them without touching the poll
//! loop or the retry orchestrator.

use super::{FeedEntry, StrategyKind, TriggerRecord};
use chrono::Duration as ChronoDuration;
use std::collections::HashSet;

/// Decides which scanned entry, if any, belongs to the given triggers.
pub trait Matcher: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Index of the selected entry, or `None`. When several entries
    /// qualify in one snapshot, the first in scan order wins; duplicate
    /// completions are rare and any matching artifact satisfies the
    /// request.
    fn select(&self, entries: &[FeedEntry], triggers: &[TriggerRecord]) -> Option<usize>;
}

/// Strategy A: an entry is a candidate iff its link target was not visible
/// before the first trigger.
///
/// Correct while a single trigger is outstanding; under retries it cannot
/// attribute an entry to a particular attempt (anything new matches).
pub struct BaselineDiff {
    baseline: HashSet<String>,
}

impl BaselineDiff {
    pub fn new(baseline: HashSet<String>) -> Self {
        Self { baseline }
    }

    /// Capture the baseline from a pre-trigger snapshot.
    pub fn from_entries(entries: &[FeedEntry]) -> Self {
        Self::new(entries.iter().map(|e| e.link.clone()).collect())
    }
}

impl Matcher for BaselineDiff {
    fn kind(&self) -> StrategyKind {
        StrategyKind::BaselineDiff
    }

    fn select(&self, entries: &[FeedEntry], _triggers: &[TriggerRecord]) -> Option<usize> {
        entries.iter().position(|e| !self.baseline.contains(&e.link))
    }
}

/// Strategy B: an entry is a candidate iff its context text contains a
/// feed-format instant within the tolerance window of *any* accumulated
/// trigger.
///
/// Robust to multiple outstanding attempts: a job from attempt 1 that
/// completes during attempt 2's polling window still matches attempt 1's
/// window.
pub struct TimeWindow {
    tolerance_min: i64,
}

impl TimeWindow {
    pub fn new(tolerance_min: i64) -> Self {
        Self { tolerance_min }
    }

    /// Every acceptable display-format instant: for each trigger, the
    /// trigger minute plus `0..=tolerance` minutes forward, rendered the
    /// way the feed renders times (zero-padded 12-hour clock, minute
    /// resolution, AM/PM suffix).
    fn acceptable_instants(&self, triggers: &[TriggerRecord]) -> HashSet<String> {
        let mut instants = HashSet::new();
        for trigger in triggers {
            for minutes in 0..=self.tolerance_min {
                let instant = trigger.triggered_at + ChronoDuration::minutes(minutes);
                instants.insert(instant.format("%I:%M %p").to_string());
            }
        }
        instants
    }
}

impl Matcher for TimeWindow {
    fn kind(&self) -> StrategyKind {
        StrategyKind::TimeWindow
    }

    fn select(&self, entries: &[FeedEntry], triggers: &[TriggerRecord]) -> Option<usize> {
        let instants = self.acceptable_instants(triggers);
        entries
            .iter()
            .position(|e| instants.iter().any(|instant| e.context.contains(instant)))
    }
}
