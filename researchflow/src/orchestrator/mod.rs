//! The orchestrator: prompt in, [`RunResult`] out.
//!
//! Parses the prompt, resolves the publish target against the configured
//! backends, runs the pipeline and folds its outcome into a [`RunResult`].
//! Nothing escapes as an error: every failure is reported through the
//! result's status and trace.

mod prompt;
mod result;

pub use prompt::parse_prompt;
pub use result::{RunFailure, RunResult, RunStatus};

use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::adapters::ToolAdapterSet;
use crate::cancellation::CancellationToken;
use crate::config::ResearchConfig;
use crate::context::StageContext;
use crate::core::{ResearchRequest, RunTrace, StageKind};
use crate::errors::PromptError;
use crate::events::{EventSink, NoOpEventSink};
use crate::pipeline::{Checkpoint, PipelineExecutor, PipelineOutcome};
use crate::resolver::{Resolution, TargetResolver};
use crate::stages::PublishOutcome;

/// Runs research requests end to end.
pub struct Orchestrator {
    config: Arc<ResearchConfig>,
    adapters: Arc<ToolAdapterSet>,
    executor: PipelineExecutor,
    resolver: TargetResolver,
    sink: Arc<dyn EventSink>,
}

impl Orchestrator {
    /// Creates an orchestrator for `config` using `adapters`.
    #[must_use]
    pub fn new(config: ResearchConfig, adapters: ToolAdapterSet) -> Self {
        Self {
            executor: PipelineExecutor::from_config(&config),
            resolver: TargetResolver::new(config.default_target),
            config: Arc::new(config),
            adapters: Arc::new(adapters),
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Publishes lifecycle events of every run to `sink`.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// The run configuration.
    #[must_use]
    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    /// The configured adapters.
    #[must_use]
    pub fn adapters(&self) -> &ToolAdapterSet {
        &self.adapters
    }

    /// Parses a prompt without running anything.
    pub fn parse_request(&self, prompt: &str) -> Result<ResearchRequest, PromptError> {
        parse_prompt(prompt)
    }

    /// Runs the prompt to completion.
    pub async fn run(&self, prompt: &str) -> RunResult {
        self.run_with_cancellation(prompt, Arc::new(CancellationToken::new()))
            .await
    }

    /// Runs the prompt, stopping early if `token` is cancelled.
    pub async fn run_with_cancellation(
        &self,
        prompt: &str,
        token: Arc<CancellationToken>,
    ) -> RunResult {
        let run_id = Uuid::new_v4();
        match parse_prompt(prompt) {
            Ok(request) => self.execute(run_id, request, token).await,
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Rejected research prompt");
                RunResult {
                    run_id,
                    status: RunStatus::Failed,
                    request: None,
                    resolution: None,
                    report: None,
                    publish: None,
                    corpus: None,
                    trace: RunTrace::new(),
                    failure: Some(RunFailure {
                        stage: None,
                        message: e.to_string(),
                        cancelled: false,
                    }),
                }
            }
        }
    }

    /// Runs an already parsed request.
    pub async fn run_request(
        &self,
        request: ResearchRequest,
        token: Arc<CancellationToken>,
    ) -> RunResult {
        self.execute(Uuid::new_v4(), request, token).await
    }

    async fn execute(
        &self,
        run_id: Uuid,
        request: ResearchRequest,
        token: Arc<CancellationToken>,
    ) -> RunResult {
        let resolution = self
            .resolver
            .resolve_detailed(&request, &self.adapters.publishers.available());
        if resolution.fell_back {
            warn!(
                run_id = %run_id,
                requested = ?resolution.requested,
                "Requested publish target is not configured, using PDF"
            );
        }

        let ctx = StageContext::new(self.adapters.clone(), self.config.clone())
            .with_token(token)
            .with_event_sink(self.sink.clone())
            .with_run_id(run_id);
        let outcome = self.executor.run(&request, resolution.resolved, &ctx).await;

        let result = assemble(run_id, request, resolution, outcome);
        info!(
            run_id = %run_id,
            status = %result.status,
            attempts = result.trace.len(),
            location = result.publish.as_ref().map(|p| p.location.as_str()),
            "Research run finished"
        );
        result
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("adapters", &self.adapters)
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

/// Why a published run is only partial, if it is.
fn degradation(resolution: &Resolution, publish: &PublishOutcome) -> Option<String> {
    if resolution.fell_back {
        let requested = resolution
            .requested
            .map_or_else(|| "requested target".to_string(), |t| t.to_string());
        return Some(format!("{requested} is not configured; published to PDF instead"));
    }
    if publish.fell_back {
        let reason = publish.fallback_reason.as_deref().unwrap_or("unknown error");
        return Some(format!("publish to the resolved target failed ({reason}); published to PDF instead"));
    }
    if !publish.result.confirmed {
        return Some(format!(
            "{} did not confirm the published artifact",
            publish.result.backend
        ));
    }
    None
}

fn assemble(
    run_id: Uuid,
    request: ResearchRequest,
    resolution: Resolution,
    outcome: PipelineOutcome,
) -> RunResult {
    let PipelineOutcome { trace, result } = outcome;

    match result {
        Ok(artifacts) => {
            let degradation = degradation(&resolution, &artifacts.publish);
            let status = if degradation.is_some() {
                RunStatus::Partial
            } else {
                RunStatus::Success
            };
            RunResult {
                run_id,
                status,
                request: Some(request),
                resolution: Some(resolution),
                report: Some(artifacts.report),
                publish: Some(artifacts.publish.result),
                corpus: Some(artifacts.corpus),
                trace,
                failure: degradation.map(|message| RunFailure {
                    stage: Some(StageKind::Publish),
                    message,
                    cancelled: false,
                }),
            }
        }
        Err(mut failure) => {
            let partial = failure.error.partial_corpus.take();
            let (corpus, report) = match failure.last_output {
                Some(Checkpoint::Analyzed { corpus, report }) => (Some(corpus), Some(report)),
                Some(Checkpoint::Scraped(corpus)) => (Some(corpus), None),
                Some(Checkpoint::Searched(_) | Checkpoint::Mapped(_)) | None => (partial, None),
            };
            RunResult {
                run_id,
                status: RunStatus::Failed,
                request: Some(request),
                resolution: Some(resolution),
                report,
                publish: None,
                corpus,
                trace,
                failure: Some(RunFailure {
                    stage: Some(failure.error.stage),
                    cancelled: failure.error.is_cancelled(),
                    message: failure.error.message,
                }),
            }
        }
    }
}
