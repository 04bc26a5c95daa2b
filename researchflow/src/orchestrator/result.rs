//! The structured result of a research run.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::core::{AnalysisReport, Corpus, PublishResult, ResearchRequest, RunTrace, StageKind};
use crate::resolver::Resolution;

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Published to the resolved target with confirmation.
    Success,
    /// A report was published, but to the PDF fallback or without confirmation.
    Partial,
    /// No report was published.
    Failed,
}

impl RunStatus {
    /// Returns the status name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Partial => "PARTIAL",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a run did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    /// The stage that failed, if the pipeline started.
    pub stage: Option<StageKind>,
    /// Description of the failure.
    pub message: String,
    /// True if the run was cancelled.
    pub cancelled: bool,
}

/// Everything a caller learns about a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Unique id of the run.
    pub run_id: Uuid,
    /// Overall outcome.
    pub status: RunStatus,
    /// The parsed request, if the prompt could be parsed.
    pub request: Option<ResearchRequest>,
    /// How the publish target was chosen.
    pub resolution: Option<Resolution>,
    /// The report, if Analyze completed.
    pub report: Option<AnalysisReport>,
    /// Where the report was published, if Publish completed.
    pub publish: Option<PublishResult>,
    /// The scraped corpus, if Scrape completed.
    pub corpus: Option<Corpus>,
    /// Every stage attempt.
    pub trace: RunTrace,
    /// What went wrong, for partial and failed runs.
    pub failure: Option<RunFailure>,
}

impl RunResult {
    /// Returns true for a fully successful run.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Returns true if a report was published somewhere.
    #[must_use]
    pub fn is_published(&self) -> bool {
        self.publish.is_some()
    }

    /// Returns true if the run was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.failure.as_ref().is_some_and(|f| f.cancelled)
    }
}
