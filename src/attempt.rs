//! Per-attempt bookkeeping for the streaming client.

use std::time::Duration;
use tokio::time::Instant;

/// How an attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    RetryableFailure,
    TerminalFailure,
    Cancelled,
}

/// Timing and outcome of one try at a streaming call.
///
/// Created when the attempt starts, handed to the event handler when it ends,
/// then dropped.
#[derive(Debug, Clone)]
pub struct Attempt {
    /// 0-based attempt index.
    pub index: u32,
    pub started_at: Instant,
    pub connection_established_at: Option<Instant>,
    pub first_fragment_at: Option<Instant>,
    pub ended_at: Option<Instant>,
    /// Fragments yielded to the caller during this attempt.
    pub fragment_count: u32,
    /// `None` while the attempt is in progress.
    pub outcome: Option<AttemptOutcome>,
}

impl Attempt {
    pub fn begin(index: u32) -> Self {
        Self {
            index,
            started_at: Instant::now(),
            connection_established_at: None,
            first_fragment_at: None,
            ended_at: None,
            fragment_count: 0,
            outcome: None,
        }
    }

    /// Record the connection as established; returns the time it took.
    pub fn mark_connected(&mut self) -> Duration {
        let now = Instant::now();
        self.connection_established_at = Some(now);
        now.duration_since(self.started_at)
    }

    /// Record the first fragment; returns the time since the connection was
    /// ready.
    pub fn mark_first_fragment(&mut self) -> Duration {
        let now = Instant::now();
        self.first_fragment_at = Some(now);
        let since = self.connection_established_at.unwrap_or(self.started_at);
        now.duration_since(since)
    }

    pub fn finish(&mut self, outcome: AttemptOutcome) {
        self.ended_at = Some(Instant::now());
        self.outcome = Some(outcome);
    }

    /// Elapsed time from start to end (or to now, if still running).
    pub fn duration(&self) -> Duration {
        self.ended_at
            .unwrap_or_else(Instant::now)
            .duration_since(self.started_at)
    }
}
