//! Pipeline execution.
//!
//! This module provides:
//! - Retry policy with backoff and jitter
//! - Per-stage execution policy
//! - The executor that runs the five stages in order and records the trace

mod executor;
mod policy;
mod retry;

pub use executor::{Checkpoint, PipelineArtifacts, PipelineExecutor, PipelineFailure, PipelineOutcome};
pub use policy::StagePolicy;
pub use retry::{BackoffStrategy, JitterStrategy, RetryConfig, RetryDecision, RetryState};
