//! The append-only run trace.

use super::StageKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a single stage attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The attempt produced an output.
    Succeeded,
    /// The attempt failed.
    Failed {
        /// Error message.
        message: String,
        /// Whether the executor considered the failure retryable.
        retryable: bool,
    },
    /// The attempt exceeded its time budget.
    TimedOut {
        /// Error message.
        message: String,
    },
    /// The run was cancelled during the attempt.
    Cancelled {
        /// Cancellation reason.
        reason: String,
    },
}

impl AttemptOutcome {
    /// Returns true if the attempt succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed { message, .. } => write!(f, "failed: {message}"),
            Self::TimedOut { message } => write!(f, "timed out: {message}"),
            Self::Cancelled { reason } => write!(f, "cancelled: {reason}"),
        }
    }
}

/// One stage attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Stage that ran.
    pub stage: StageKind,
    /// Attempt number, starting at 1.
    pub attempt: usize,
    /// When the attempt started.
    pub started_at: DateTime<Utc>,
    /// When the attempt ended.
    pub ended_at: DateTime<Utc>,
    /// How the attempt ended.
    pub outcome: AttemptOutcome,
    /// Free-form summary (e.g. "4/5 fetched").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl TraceEntry {
    /// Creates a new entry that ends now.
    #[must_use]
    pub fn new(
        stage: StageKind,
        attempt: usize,
        started_at: DateTime<Utc>,
        outcome: AttemptOutcome,
    ) -> Self {
        Self {
            stage,
            attempt,
            started_at,
            ended_at: Utc::now(),
            outcome,
            detail: None,
        }
    }

    /// Sets the detail summary.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Returns the duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> f64 {
        (self.ended_at - self.started_at).num_milliseconds() as f64
    }
}

/// Ordered log of every stage attempt in a run, retries included.
///
/// Entries can only be appended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTrace {
    entries: Vec<TraceEntry>,
}

impl RunTrace {
    /// Creates an empty trace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn record(&mut self, entry: TraceEntry) {
        self.entries.push(entry);
    }

    /// All entries in the order they were recorded.
    #[must_use]
    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    /// Entries for one stage.
    pub fn attempts_for(&self, stage: StageKind) -> impl Iterator<Item = &TraceEntry> {
        self.entries.iter().filter(move |e| e.stage == stage)
    }

    /// Number of attempts recorded for a stage.
    #[must_use]
    pub fn attempt_count(&self, stage: StageKind) -> usize {
        self.attempts_for(stage).count()
    }

    /// Stages that have a successful attempt, in order.
    #[must_use]
    pub fn completed_stages(&self) -> Vec<StageKind> {
        self.entries
            .iter()
            .filter(|e| e.outcome.is_success())
            .map(|e| e.stage)
            .collect()
    }

    /// The most recent entry.
    #[must_use]
    pub fn last(&self) -> Option<&TraceEntry> {
        self.entries.last()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Wall-clock span from the first start to the last end, in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> f64 {
        match (self.entries.first(), self.entries.last()) {
            (Some(first), Some(last)) => (last.ended_at - first.started_at).num_milliseconds() as f64,
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(message: &str) -> AttemptOutcome {
        AttemptOutcome::Failed {
            message: message.to_string(),
            retryable: true,
        }
    }

    #[test]
    fn test_trace_records_in_order() {
        let mut trace = RunTrace::new();
        let started = Utc::now();

        trace.record(TraceEntry::new(StageKind::Search, 1, started, failed("reset")));
        trace.record(TraceEntry::new(StageKind::Search, 2, started, AttemptOutcome::Succeeded));
        trace.record(TraceEntry::new(StageKind::Map, 1, started, AttemptOutcome::Succeeded));

        assert_eq!(trace.len(), 3);
        assert_eq!(trace.attempt_count(StageKind::Search), 2);
        assert_eq!(trace.attempt_count(StageKind::Scrape), 0);
        assert_eq!(trace.completed_stages(), vec![StageKind::Search, StageKind::Map]);
        assert_eq!(trace.last().map(|e| e.stage), Some(StageKind::Map));
    }

    #[test]
    fn test_entry_duration() {
        let started = Utc::now();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let entry = TraceEntry::new(StageKind::Scrape, 1, started, AttemptOutcome::Succeeded)
            .with_detail("3/3 fetched");

        assert!(entry.duration_ms() >= 10.0);
        assert_eq!(entry.detail.as_deref(), Some("3/3 fetched"));
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(AttemptOutcome::Succeeded.to_string(), "succeeded");
        assert_eq!(failed("boom").to_string(), "failed: boom");
        assert_eq!(
            AttemptOutcome::Cancelled { reason: "user abort".to_string() }.to_string(),
            "cancelled: user abort"
        );
    }

    #[test]
    fn test_trace_serialization() {
        let mut trace = RunTrace::new();
        trace.record(TraceEntry::new(StageKind::Analyze, 1, Utc::now(), failed("malformed")));

        let json = serde_json::to_string(&trace).unwrap();
        let deserialized: RunTrace = serde_json::from_str(&json).unwrap();

        assert_eq!(trace, deserialized);
        assert!(json.contains(r#""status":"failed""#));
    }
}
