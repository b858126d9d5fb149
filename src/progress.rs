// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! Progress event types and broadcast channel for acquisition telemetry.
//!
//! Long-running flows emit [`ProgressEvent`]s which flow through a
//! `tokio::sync::broadcast` channel to all subscribers (CLI spinner, SSE
//! clients). When no subscriber exists, events are silently dropped. The
//! events are purely observational; nothing in the control flow depends on
//! them.

use serde::{Deserialize, Serialize};

/// A progress event emitted during report acquisition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// The request ID this event belongs to.
    pub request_id: String,
    /// Monotonically increasing sequence number.
    pub seq: u64,
    /// The kind of progress event.
    pub event: ProgressEventKind,
}

/// The specific kind of progress event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressEventKind {
    /// A human-readable phase transition (login, workspace switch, ...).
    Phase { message: String },
    /// An export trigger was issued.
    TriggerIssued { attempt: u32, triggered_at: String },
    /// A notification-feed poll completed without a match.
    PollTick {
        attempt: u32,
        poll: u32,
        entries_seen: usize,
        elapsed_secs: u64,
    },
    /// A feed entry was matched to one of our triggers.
    MatchFound {
        attempt: u32,
        link: String,
        strategy: String,
    },
    /// One trigger-then-poll attempt exhausted its deadline.
    AttemptExhausted {
        attempt: u32,
        polls: u32,
        elapsed_secs: u64,
    },
    /// An artifact reached its destination path.
    ArtifactSaved {
        report: String,
        path: String,
        bytes: u64,
    },
    /// A non-fatal warning occurred.
    Warning { message: String },
    /// The whole flow finished successfully.
    Done { message: String },
    /// The whole flow failed.
    Failed { message: String },
}

/// Sender handle for emitting progress events.
pub type ProgressSender = tokio::sync::broadcast::Sender<ProgressEvent>;

/// Receiver handle for consuming progress events.
pub type ProgressReceiver = tokio::sync::broadcast::Receiver<ProgressEvent>;

/// Create a new progress broadcast channel with a bounded buffer.
///
/// 256 events is enough for a full two-report run (a few phase events plus
/// one tick per poll across all attempts).
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    tokio::sync::broadcast::channel(256)
}

/// Emitter bound to one request: carries the request id and sequence counter
/// so call sites only name the event.
pub struct ProgressScope {
    tx: Option<ProgressSender>,
    request_id: String,
    seq: u64,
}

impl ProgressScope {
    pub fn new(tx: Option<ProgressSender>, request_id: impl Into<String>) -> Self {
        Self {
            tx,
            request_id: request_id.into(),
            seq: 0,
        }
    }

    /// A scope that drops every event (for tests and fire-and-forget runs).
    pub fn disabled() -> Self {
        Self::new(None, "")
    }

    /// Emit an event, silently ignoring send errors (which occur when no
    /// receivers are listening).
    pub fn emit(&mut self, event: ProgressEventKind) {
        if let Some(ref sender) = self.tx {
            self.seq += 1;
            let _ = sender.send(ProgressEvent {
                request_id: self.request_id.clone(),
                seq: self.seq,
                event,
            });
        }
    }

    /// Convenience for the common free-text phase message.
    pub fn phase(&mut self, message: impl Into<String>) {
        self.emit(ProgressEventKind::Phase {
            message: message.into(),
        });
    }
}
