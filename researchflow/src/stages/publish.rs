//! Publish stage: report in, published artifact out.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::Stage;
use crate::adapters::{PublishAdapter, PublishReceipt};
use crate::config::ResearchConfig;
use crate::context::StageContext;
use crate::core::{AnalysisReport, PublishResult, PublishTargetKind, StageKind};
use crate::errors::{AdapterError, StageError};
use crate::pipeline::StagePolicy;

/// What the Publish stage consumes.
#[derive(Debug, Clone)]
pub struct PublishInput {
    /// The report to publish.
    pub report: AnalysisReport,
    /// The backend chosen by the target resolver.
    pub target: PublishTargetKind,
}

/// What the Publish stage produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    /// Where the report landed.
    pub result: PublishResult,
    /// True if the chosen backend failed and the PDF backend was used instead.
    pub fell_back: bool,
    /// Why the chosen backend failed, when it did.
    pub fallback_reason: Option<String>,
}

/// Publishes to the resolved backend, falling back once to the local PDF
/// backend if that fails.
#[derive(Debug, Clone)]
pub struct PublishStage {
    policy: StagePolicy,
}

impl PublishStage {
    /// Creates a publish stage.
    #[must_use]
    pub fn new(policy: StagePolicy) -> Self {
        Self { policy }
    }

    /// Creates a publish stage from run configuration.
    #[must_use]
    pub fn from_config(config: &ResearchConfig) -> Self {
        Self::new(config.policy_for(StageKind::Publish))
    }
}

async fn publish_with(
    ctx: &StageContext,
    adapter: &Arc<dyn PublishAdapter>,
    report: &AnalysisReport,
) -> Result<PublishReceipt, AdapterError> {
    ctx.call(adapter.name(), ctx.config().adapter_timeout(), adapter.publish(report))
        .await
}

fn published(backend: PublishTargetKind, receipt: PublishReceipt) -> PublishResult {
    PublishResult {
        backend,
        location: receipt.location,
        confirmed: receipt.confirmed,
    }
}

#[async_trait]
impl Stage for PublishStage {
    type Input = PublishInput;
    type Output = PublishOutcome;

    fn kind(&self) -> StageKind {
        StageKind::Publish
    }

    fn policy(&self) -> &StagePolicy {
        &self.policy
    }

    async fn execute(&self, input: &PublishInput, ctx: &StageContext) -> Result<PublishOutcome, StageError> {
        let publishers = &ctx.adapters().publishers;
        let target = input.target;

        let primary_error = match publishers.get(target) {
            Some(adapter) => match publish_with(ctx, adapter, &input.report).await {
                Ok(receipt) => {
                    info!(backend = %target, location = %receipt.location, "Report published");
                    return Ok(PublishOutcome {
                        result: published(target, receipt),
                        fell_back: false,
                        fallback_reason: None,
                    });
                }
                Err(e) if e.is_cancelled() => {
                    return Err(StageError::cancelled(StageKind::Publish, e.to_string()));
                }
                Err(e) => e,
            },
            None => AdapterError::unavailable(target.as_str(), "no adapter configured"),
        };

        if target == PublishTargetKind::Pdf {
            return Err(StageError::fatal(StageKind::Publish, primary_error.to_string()));
        }

        warn!(backend = %target, error = %primary_error, "Publish failed, falling back to PDF");
        match publish_with(ctx, publishers.pdf(), &input.report).await {
            Ok(receipt) => {
                info!(location = %receipt.location, "Report published to PDF fallback");
                Ok(PublishOutcome {
                    result: published(PublishTargetKind::Pdf, receipt),
                    fell_back: true,
                    fallback_reason: Some(primary_error.to_string()),
                })
            }
            Err(e) if e.is_cancelled() => Err(StageError::cancelled(StageKind::Publish, e.to_string())),
            Err(e) => Err(StageError::fatal(
                StageKind::Publish,
                format!("{primary_error}; PDF fallback failed: {e}"),
            )),
        }
    }

    fn summarize(&self, output: &PublishOutcome) -> Option<String> {
        Some(format!("{} -> {}", output.result.backend, output.result.location))
    }
}
