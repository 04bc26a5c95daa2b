//! The Stage trait and the five research stages.
//!
//! A stage consumes a typed input, calls its adapters through the
//! [`StageContext`], and returns a typed output or a [`StageError`]. Stages
//! never call each other and do not know their position in the pipeline.

mod analyze;
mod map;
mod publish;
mod scrape;
mod search;

pub use analyze::{AnalyzeInput, AnalyzeStage};
pub use map::{normalize_url, MapStage};
pub use publish::{PublishInput, PublishOutcome, PublishStage};
pub use scrape::ScrapeStage;
pub use search::SearchStage;

use async_trait::async_trait;
use std::fmt::Debug;

use crate::context::StageContext;
use crate::core::StageKind;
use crate::errors::StageError;
use crate::pipeline::StagePolicy;

/// Trait for pipeline stages.
///
/// Input is taken by reference so that a retried attempt sees exactly what
/// the first attempt saw.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// What the stage consumes.
    type Input: Send + Sync;
    /// What the stage produces.
    type Output: Send;

    /// Which stage this is.
    fn kind(&self) -> StageKind;

    /// Attempt count, backoff and attempt timeout.
    fn policy(&self) -> &StagePolicy;

    /// Runs one attempt.
    async fn execute(&self, input: &Self::Input, ctx: &StageContext) -> Result<Self::Output, StageError>;

    /// A short summary of an output for the run trace.
    fn summarize(&self, _output: &Self::Output) -> Option<String> {
        None
    }
}
