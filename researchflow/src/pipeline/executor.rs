//! The pipeline executor.
//!
//! Runs Search, Map, Scrape, Analyze and Publish in that order, threading each
//! output into the next input. Every attempt of every stage is recorded in the
//! [`RunTrace`]. When a stage gives up, the remaining stages are skipped and
//! the last completed output is returned with the failure.

use chrono::Utc;
use serde_json::json;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::retry::{RetryDecision, RetryState};
use crate::config::ResearchConfig;
use crate::context::StageContext;
use crate::core::{
    AnalysisReport, AttemptOutcome, Corpus, PublishTargetKind, ResearchRequest, RunTrace,
    SearchResultSet, StageKind, TraceEntry, UrlSet,
};
use crate::errors::{StageError, StageErrorKind};
use crate::events::{
    RUN_COMPLETED, RUN_STARTED, STAGE_COMPLETED, STAGE_FAILED, STAGE_RETRYING, STAGE_STARTED,
};
use crate::stages::{
    AnalyzeInput, AnalyzeStage, MapStage, PublishInput, PublishOutcome, PublishStage, ScrapeStage,
    SearchStage, Stage,
};

/// The output of the last stage that completed before a failure.
#[derive(Debug, Clone, PartialEq)]
pub enum Checkpoint {
    /// Search completed.
    Searched(SearchResultSet),
    /// Map completed.
    Mapped(UrlSet),
    /// Scrape completed.
    Scraped(Corpus),
    /// Analyze completed.
    Analyzed {
        /// The scraped corpus.
        corpus: Corpus,
        /// The synthesized report.
        report: AnalysisReport,
    },
}

impl Checkpoint {
    /// The stage that produced this output.
    #[must_use]
    pub fn stage(&self) -> StageKind {
        match self {
            Self::Searched(_) => StageKind::Search,
            Self::Mapped(_) => StageKind::Map,
            Self::Scraped(_) => StageKind::Scrape,
            Self::Analyzed { .. } => StageKind::Analyze,
        }
    }

    /// The scraped corpus, if Scrape completed.
    #[must_use]
    pub fn corpus(&self) -> Option<&Corpus> {
        match self {
            Self::Scraped(corpus) | Self::Analyzed { corpus, .. } => Some(corpus),
            Self::Searched(_) | Self::Mapped(_) => None,
        }
    }

    /// The report, if Analyze completed.
    #[must_use]
    pub fn report(&self) -> Option<&AnalysisReport> {
        match self {
            Self::Analyzed { report, .. } => Some(report),
            _ => None,
        }
    }
}

/// Everything a fully completed pipeline produced.
#[derive(Debug, Clone)]
pub struct PipelineArtifacts {
    /// The scraped corpus.
    pub corpus: Corpus,
    /// The synthesized report.
    pub report: AnalysisReport,
    /// Where the report was published.
    pub publish: PublishOutcome,
}

/// A pipeline that stopped early.
#[derive(Debug, Clone)]
pub struct PipelineFailure {
    /// The error that stopped the pipeline.
    pub error: StageError,
    /// Output of the last completed stage, if any.
    pub last_output: Option<Checkpoint>,
}

impl PipelineFailure {
    fn new(error: StageError, last_output: Option<Checkpoint>) -> Self {
        Self { error, last_output }
    }

    /// The stage that failed.
    #[must_use]
    pub fn stage(&self) -> StageKind {
        self.error.stage
    }

    /// Returns true if the run was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.error.is_cancelled()
    }
}

/// The result of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// Every stage attempt, in order.
    pub trace: RunTrace,
    /// The artifacts, or the failure with the last completed output.
    pub result: Result<PipelineArtifacts, PipelineFailure>,
}

/// Runs the fixed five-stage research pipeline.
#[derive(Debug, Clone)]
pub struct PipelineExecutor {
    search: SearchStage,
    map: MapStage,
    scrape: ScrapeStage,
    analyze: AnalyzeStage,
    publish: PublishStage,
}

impl PipelineExecutor {
    /// Creates an executor from explicit stages.
    #[must_use]
    pub fn new(
        search: SearchStage,
        map: MapStage,
        scrape: ScrapeStage,
        analyze: AnalyzeStage,
        publish: PublishStage,
    ) -> Self {
        Self {
            search,
            map,
            scrape,
            analyze,
            publish,
        }
    }

    /// Creates an executor whose stages follow `config`.
    #[must_use]
    pub fn from_config(config: &ResearchConfig) -> Self {
        Self::new(
            SearchStage::from_config(config),
            MapStage::from_config(config),
            ScrapeStage::from_config(config),
            AnalyzeStage::from_config(config),
            PublishStage::from_config(config),
        )
    }

    /// Runs every stage for `request`, publishing to `target`.
    pub async fn run(
        &self,
        request: &ResearchRequest,
        target: PublishTargetKind,
        ctx: &StageContext,
    ) -> PipelineOutcome {
        let start = Instant::now();
        let mut trace = RunTrace::new();

        info!(run_id = %ctx.run_id(), topic = request.topic(), target = %target, "Pipeline started");
        ctx.sink().try_emit(
            RUN_STARTED,
            Some(json!({
                "run_id": ctx.run_id(),
                "topic": request.topic(),
                "target": target,
            })),
        );

        let result = self.run_stages(request, target, ctx, &mut trace).await;
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        match &result {
            Ok(_) => info!(run_id = %ctx.run_id(), duration_ms, "Pipeline completed"),
            Err(failure) => warn!(
                run_id = %ctx.run_id(),
                stage = %failure.stage(),
                error = %failure.error.message,
                duration_ms,
                "Pipeline stopped"
            ),
        }
        ctx.sink().try_emit(
            RUN_COMPLETED,
            Some(json!({
                "run_id": ctx.run_id(),
                "success": result.is_ok(),
                "failed_stage": result.as_ref().err().map(PipelineFailure::stage),
                "attempts": trace.len(),
                "duration_ms": duration_ms,
            })),
        );

        PipelineOutcome { trace, result }
    }

    async fn run_stages(
        &self,
        request: &ResearchRequest,
        target: PublishTargetKind,
        ctx: &StageContext,
        trace: &mut RunTrace,
    ) -> Result<PipelineArtifacts, PipelineFailure> {
        let topic = request.topic().to_string();

        let hits = match self.run_stage(&self.search, &topic, ctx, trace).await {
            Ok(hits) => hits,
            Err(error) => return Err(PipelineFailure::new(error, None)),
        };

        let urls = match self.run_stage(&self.map, &hits, ctx, trace).await {
            Ok(urls) => urls,
            Err(error) => return Err(PipelineFailure::new(error, Some(Checkpoint::Searched(hits)))),
        };

        let corpus = match self.run_stage(&self.scrape, &urls, ctx, trace).await {
            Ok(corpus) => corpus,
            Err(error) => return Err(PipelineFailure::new(error, Some(Checkpoint::Mapped(urls)))),
        };

        let analyze_input = AnalyzeInput { topic, corpus };
        let report = match self.run_stage(&self.analyze, &analyze_input, ctx, trace).await {
            Ok(report) => report,
            Err(error) => {
                return Err(PipelineFailure::new(
                    error,
                    Some(Checkpoint::Scraped(analyze_input.corpus)),
                ))
            }
        };
        let corpus = analyze_input.corpus;

        let publish_input = PublishInput { report, target };
        match self.run_stage(&self.publish, &publish_input, ctx, trace).await {
            Ok(publish) => Ok(PipelineArtifacts {
                corpus,
                report: publish_input.report,
                publish,
            }),
            Err(error) => Err(PipelineFailure::new(
                error,
                Some(Checkpoint::Analyzed {
                    corpus,
                    report: publish_input.report,
                }),
            )),
        }
    }

    /// Runs one stage under its policy, recording every attempt in `trace`.
    ///
    /// Retryable errors are retried with backoff until the attempt budget is
    /// spent, after which the stage fails fatally. Other errors stop at once.
    pub async fn run_stage<S: Stage>(
        &self,
        stage: &S,
        input: &S::Input,
        ctx: &StageContext,
        trace: &mut RunTrace,
    ) -> Result<S::Output, StageError> {
        let kind = stage.kind();
        let policy = stage.policy();
        let mut state = RetryState::new();

        loop {
            if let Err(error) = ctx.token().ensure_active(kind) {
                debug!(stage = %kind, reason = %error.message, "Stage skipped after cancellation");
                return Err(error);
            }

            let attempt = state.begin_attempt();
            let started_at = Utc::now();
            let timer = Instant::now();

            debug!(stage = %kind, attempt, "Stage attempt started");
            ctx.sink().try_emit(
                STAGE_STARTED,
                Some(json!({
                    "run_id": ctx.run_id(),
                    "stage": kind,
                    "attempt": attempt,
                })),
            );

            let result = match policy.attempt_timeout {
                Some(limit) => match tokio::time::timeout(limit, stage.execute(input, ctx)).await {
                    Ok(result) => result,
                    Err(_) => Err(StageError::timed_out(kind, limit)),
                },
                None => stage.execute(input, ctx).await,
            };
            let duration_ms = timer.elapsed().as_secs_f64() * 1000.0;

            let error = match result {
                Ok(output) => {
                    let mut entry = TraceEntry::new(kind, attempt, started_at, AttemptOutcome::Succeeded);
                    if let Some(detail) = stage.summarize(&output) {
                        entry = entry.with_detail(detail);
                    }
                    info!(stage = %kind, attempt, duration_ms, detail = ?entry.detail, "Stage completed");
                    trace.record(entry);
                    ctx.sink().try_emit(
                        STAGE_COMPLETED,
                        Some(json!({
                            "run_id": ctx.run_id(),
                            "stage": kind,
                            "attempt": attempt,
                            "duration_ms": duration_ms,
                        })),
                    );
                    return Ok(output);
                }
                Err(error) => error,
            };

            let mut entry = TraceEntry::new(kind, attempt, started_at, attempt_outcome(&error));
            if let Some(corpus) = &error.partial_corpus {
                entry = entry.with_detail(partial_detail(corpus));
            }
            trace.record(entry);

            let decision = if error.is_retryable() {
                state.after_failure(&policy.retry)
            } else {
                RetryDecision::GiveUp
            };

            match decision {
                RetryDecision::Retry(delay) => {
                    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                    warn!(
                        stage = %kind,
                        attempt,
                        delay_ms,
                        error = %error.message,
                        "Stage attempt failed, retrying"
                    );
                    ctx.sink().try_emit(
                        STAGE_RETRYING,
                        Some(json!({
                            "run_id": ctx.run_id(),
                            "stage": kind,
                            "attempt": attempt,
                            "delay_ms": delay_ms,
                            "error": error.message,
                            "duration_ms": duration_ms,
                        })),
                    );

                    // A cancel cuts the backoff short; the check above then stops the stage.
                    tokio::select! {
                        biased;
                        () = ctx.token().cancelled() => {}
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::GiveUp => {
                    let error = if error.is_retryable() {
                        StageError::fatal(
                            kind,
                            format!("{} (gave up after {attempt} attempts)", error.message),
                        )
                    } else {
                        error
                    };
                    warn!(stage = %kind, attempt, error = %error.message, "Stage failed");
                    ctx.sink().try_emit(
                        STAGE_FAILED,
                        Some(json!({
                            "run_id": ctx.run_id(),
                            "stage": kind,
                            "attempt": attempt,
                            "kind": error.kind,
                            "error": error.message,
                            "duration_ms": duration_ms,
                        })),
                    );
                    return Err(error);
                }
            }
        }
    }
}

/// "1/2 fetched before stopping: https://a/ ok, https://b/ failed"
fn partial_detail(corpus: &Corpus) -> String {
    let urls: Vec<String> = corpus
        .documents()
        .iter()
        .map(|doc| format!("{} {}", doc.url, if doc.is_success() { "ok" } else { "failed" }))
        .collect();
    format!(
        "{}/{} fetched before stopping: {}",
        corpus.success_count(),
        corpus.len(),
        urls.join(", ")
    )
}

fn attempt_outcome(error: &StageError) -> AttemptOutcome {
    match error.kind {
        StageErrorKind::Cancelled => AttemptOutcome::Cancelled {
            reason: error.message.clone(),
        },
        StageErrorKind::TimedOut => AttemptOutcome::TimedOut {
            message: error.message.clone(),
        },
        StageErrorKind::Retryable | StageErrorKind::Fatal => AttemptOutcome::Failed {
            message: error.message.clone(),
            retryable: error.is_retryable(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationToken;
    use crate::events::CollectingEventSink;
    use crate::pipeline::{JitterStrategy, RetryConfig, StagePolicy};
    use crate::testing::{stub_adapters, StubScraper};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    /// Replays a scripted sequence of results, then succeeds.
    #[derive(Debug)]
    struct ScriptedStage {
        policy: StagePolicy,
        script: Mutex<VecDeque<Result<u32, StageError>>>,
        delay: Option<Duration>,
    }

    impl ScriptedStage {
        fn new(attempts: usize, script: Vec<Result<u32, StageError>>) -> Self {
            let retry = RetryConfig::new()
                .with_max_attempts(attempts)
                .with_base_delay_ms(100)
                .with_jitter(JitterStrategy::None);
            Self {
                policy: StagePolicy::new(retry),
                script: Mutex::new(script.into()),
                delay: None,
            }
        }

        fn with_timeout(mut self, timeout: Duration, delay: Duration) -> Self {
            self.policy = self.policy.with_attempt_timeout(Some(timeout));
            self.delay = Some(delay);
            self
        }
    }

    #[async_trait]
    impl Stage for ScriptedStage {
        type Input = u32;
        type Output = u32;

        fn kind(&self) -> StageKind {
            StageKind::Search
        }

        fn policy(&self) -> &StagePolicy {
            &self.policy
        }

        async fn execute(&self, input: &u32, _ctx: &StageContext) -> Result<u32, StageError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.script.lock().pop_front().unwrap_or(Ok(*input))
        }
    }

    fn context() -> (StageContext, Arc<CollectingEventSink>) {
        let sink = Arc::new(CollectingEventSink::new());
        let ctx = StageContext::new(Arc::new(stub_adapters()), Arc::new(ResearchConfig::default()))
            .with_event_sink(sink.clone());
        (ctx, sink)
    }

    fn retryable(message: &str) -> Result<u32, StageError> {
        Err(StageError::retryable(StageKind::Search, message))
    }

    fn executor() -> PipelineExecutor {
        PipelineExecutor::from_config(&ResearchConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let (ctx, sink) = context();
        let stage = ScriptedStage::new(3, vec![retryable("reset"), retryable("reset")]);
        let mut trace = RunTrace::new();

        let output = executor().run_stage(&stage, &7, &ctx, &mut trace).await.unwrap();

        assert_eq!(output, 7);
        assert_eq!(trace.attempt_count(StageKind::Search), 3);
        assert!(!trace.entries()[0].outcome.is_success());
        assert!(trace.entries()[2].outcome.is_success());
        assert_eq!(
            sink.event_types(),
            vec![
                "stage.started",
                "stage.retrying",
                "stage.started",
                "stage.retrying",
                "stage.started",
                "stage.completed",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_become_fatal() {
        let (ctx, sink) = context();
        let stage = ScriptedStage::new(2, vec![retryable("empty"), retryable("empty")]);
        let mut trace = RunTrace::new();

        let err = executor().run_stage(&stage, &1, &ctx, &mut trace).await.unwrap_err();

        assert_eq!(err.kind, StageErrorKind::Fatal);
        assert!(err.message.contains("gave up after 2 attempts"));
        assert_eq!(trace.len(), 2);
        assert_eq!(sink.events_of_type("stage.failed").len(), 1);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let (ctx, _) = context();
        let stage = ScriptedStage::new(
            3,
            vec![Err(StageError::fatal(StageKind::Search, "credentials rejected"))],
        );
        let mut trace = RunTrace::new();

        let err = executor().run_stage(&stage, &1, &ctx, &mut trace).await.unwrap_err();

        assert_eq!(err.message, "credentials rejected");
        assert_eq!(trace.len(), 1);
        assert_eq!(
            trace.entries()[0].outcome,
            AttemptOutcome::Failed {
                message: "credentials rejected".to_string(),
                retryable: false,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_is_retried() {
        let (ctx, _) = context();
        let stage = ScriptedStage::new(2, Vec::new())
            .with_timeout(Duration::from_millis(50), Duration::from_millis(200));
        let mut trace = RunTrace::new();

        let err = executor().run_stage(&stage, &1, &ctx, &mut trace).await.unwrap_err();

        assert_eq!(trace.len(), 2);
        assert!(matches!(trace.entries()[0].outcome, AttemptOutcome::TimedOut { .. }));
        assert_eq!(err.kind, StageErrorKind::Fatal);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_backoff() {
        let (ctx, _) = context();
        let token = ctx.token().clone();
        let stage = ScriptedStage::new(5, vec![retryable("reset"), retryable("reset")]);
        let mut trace = RunTrace::new();

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel("user abort");
        });
        let err = executor().run_stage(&stage, &1, &ctx, &mut trace).await.unwrap_err();
        canceller.await.unwrap();

        assert!(err.is_cancelled());
        assert_eq!(err.message, "user abort");
        assert_eq!(trace.len(), 1);
    }

    #[tokio::test]
    async fn test_full_run_produces_artifacts() {
        let (ctx, sink) = context();
        let request = ResearchRequest::new("history of the internet", None, "history of the internet");

        let outcome = executor().run(&request, PublishTargetKind::Pdf, &ctx).await;
        let artifacts = outcome.result.unwrap();

        assert_eq!(artifacts.publish.result.backend, PublishTargetKind::Pdf);
        assert_eq!(artifacts.corpus.success_count(), artifacts.corpus.len());
        assert_eq!(
            outcome.trace.completed_stages(),
            StageKind::ALL.to_vec()
        );
        let types = sink.event_types();
        assert_eq!(types.first().map(String::as_str), Some("run.started"));
        assert_eq!(types.last().map(String::as_str), Some("run.completed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_keeps_last_completed_output() {
        let mut adapters = stub_adapters();
        adapters.scraper = Arc::new(StubScraper::new().fail_all());
        let ctx = StageContext::new(Arc::new(adapters), Arc::new(ResearchConfig::default()));
        let request = ResearchRequest::new("topic", None, "topic");

        let outcome = executor().run(&request, PublishTargetKind::Pdf, &ctx).await;
        let failure = outcome.result.unwrap_err();

        assert_eq!(failure.stage(), StageKind::Scrape);
        assert_eq!(failure.last_output.as_ref().map(Checkpoint::stage), Some(StageKind::Map));
        assert_eq!(outcome.trace.attempt_count(StageKind::Scrape), 2);
        assert_eq!(outcome.trace.attempt_count(StageKind::Analyze), 0);
    }

    #[tokio::test]
    async fn test_cancelled_run_skips_remaining_stages() {
        let token = Arc::new(CancellationToken::new());
        token.cancel("shutdown");
        let (ctx, _) = context();
        let ctx = ctx.with_token(token);
        let request = ResearchRequest::new("topic", None, "topic");

        let outcome = executor().run(&request, PublishTargetKind::Pdf, &ctx).await;
        let failure = outcome.result.unwrap_err();

        assert!(failure.is_cancelled());
        assert_eq!(failure.stage(), StageKind::Search);
        assert!(outcome.trace.is_empty());
    }
}
