// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! Export acquisition subsystem.
//!
//! The platform enqueues an export job asynchronously and exposes no job id;
//! completion is observable only through the in-app notification feed. This
//! module owns the full cycle: trigger the export, poll the feed, decide
//! which entry (if any) belongs to one of our triggers, retry the cycle a
//! bounded number of times, and capture exactly one artifact.
//!
//! Seams are traits so the state machines run deterministically under test:
//! the feed, the trigger, the artifact capture, and the clock are all
//! injected.

pub mod clock;
pub mod download;
pub mod feed;
pub mod matcher;
pub mod orchestrator;
pub mod poll;

pub use clock::{Clock, SimClock, SystemClock};
pub use matcher::{BaselineDiff, Matcher, TimeWindow};
pub use orchestrator::acquire;
pub use poll::{PollLoop, PollOutcome};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// One issued export trigger. Immutable; accumulated across attempts and
/// kept until the acquisition terminates, because a job from an early
/// attempt may complete during a later attempt's polling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerRecord {
    /// 1-based attempt index.
    pub attempt: u32,
    /// Wall-clock instant captured immediately *before* the trigger action
    /// was issued. Completion heuristics are measured from request time.
    pub triggered_at: DateTime<Local>,
}

/// One "ready to download" entry scraped from the notification feed.
/// Produced fresh on every poll; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    /// The entry's link target (href). Opaque identifier for matching.
    pub link: String,
    /// Text of the closest enclosing container that carries a time
    /// indicator; possibly empty when none was found.
    pub context: String,
    /// When this snapshot observed the entry.
    pub observed_at: DateTime<Local>,
}

/// Which correlation heuristic decided a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// Candidate = any entry absent from the pre-trigger baseline.
    BaselineDiff,
    /// Candidate = any entry whose context contains a display-format
    /// instant within some trigger's tolerance window.
    TimeWindow,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::BaselineDiff => write!(f, "baseline-diff"),
            StrategyKind::TimeWindow => write!(f, "time-window"),
        }
    }
}

/// The single entry selected from a poll snapshot.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub entry: FeedEntry,
    pub strategy: StrategyKind,
}

/// Default number of trigger-then-poll attempts per acquisition.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Tunables for one acquisition. Defaults mirror the production flow:
/// poll every 5 s for up to 5 min, re-trigger up to 4 times.
#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    /// Maximum trigger-then-poll attempts before giving up.
    pub max_attempts: u32,
    /// Fixed cadence between feed polls.
    pub poll_interval: Duration,
    /// Per-attempt polling ceiling.
    pub attempt_deadline: Duration,
    /// Forward tolerance, in minutes, for the time-window strategy. The
    /// feed displays minute-level granularity, so minute 0 is included.
    pub window_tolerance_min: i64,
    /// Which disambiguation strategy to run.
    pub strategy: StrategyKind,
    /// Ceiling for the click-and-capture of a matched artifact.
    pub capture_timeout: Duration,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            poll_interval: Duration::from_secs(5),
            attempt_deadline: Duration::from_secs(300),
            window_tolerance_min: 6,
            strategy: StrategyKind::TimeWindow,
            capture_timeout: Duration::from_secs(60),
        }
    }
}

/// Fires the platform UI sequence that enqueues one export job.
#[async_trait]
pub trait ExportTrigger: Send {
    async fn fire(&mut self) -> Result<()>;
}

/// Produces the current, complete set of "ready" entries in the
/// notification feed. Implementations must be side-effect neutral: repeated
/// calls compose without drifting UI state.
#[async_trait]
pub trait FeedSource: Send {
    async fn scan(&mut self) -> Result<Vec<FeedEntry>>;
}

/// Captures the artifact behind a matched entry and persists it to its
/// destination path.
#[async_trait]
pub trait ArtifactFetcher: Send {
    async fn fetch(&mut self, matched: &MatchResult) -> Result<PathBuf>;
}

/// Terminal failures of one acquisition. Transient UI failures inside a
/// poll cycle are swallowed (an empty snapshot for that cycle), and a
/// single attempt's timeout only surfaces through the final `Exhausted`.
#[derive(Debug, Error)]
pub enum AcquireError {
    /// The trigger UI sequence itself never succeeded on any attempt.
    #[error("export trigger failed on attempt {attempt}: {source:#}")]
    Trigger {
        attempt: u32,
        #[source]
        source: anyhow::Error,
    },

    /// Every attempt's poll phase exhausted its deadline.
    #[error("no export notification matched after {attempts} attempts ({elapsed_secs}s elapsed)")]
    Exhausted { attempts: u32, elapsed_secs: u64 },

    /// A match was found but the artifact could not be captured. Fatal and
    /// not retried here: the caller decides whether to redo the whole
    /// acquisition.
    #[error("artifact download failed: {source:#}")]
    Download {
        #[source]
        source: anyhow::Error,
    },

    /// A failure outside the trigger/poll cycle (navigation, filters).
    #[error("browser session error: {0:#}")]
    Session(#[from] anyhow::Error),
}
