//! Analyze stage: corpus in, validated analysis report out.

use async_trait::async_trait;
use tracing::{debug, warn};

use super::Stage;
use crate::config::ResearchConfig;
use crate::context::StageContext;
use crate::core::{AnalysisReport, Corpus, Provenance, ScrapedDocument, StageKind};
use crate::errors::{GenerationError, StageError};
use crate::pipeline::StagePolicy;

/// What the Analyze stage consumes.
#[derive(Debug, Clone)]
pub struct AnalyzeInput {
    /// The research topic.
    pub topic: String,
    /// The scraped corpus, failed documents included.
    pub corpus: Corpus,
}

/// Synthesizes a report from the successfully fetched documents.
#[derive(Debug, Clone)]
pub struct AnalyzeStage {
    policy: StagePolicy,
}

impl AnalyzeStage {
    /// Creates an analyze stage.
    #[must_use]
    pub fn new(policy: StagePolicy) -> Self {
        Self { policy }
    }

    /// Creates an analyze stage from run configuration.
    #[must_use]
    pub fn from_config(config: &ResearchConfig) -> Self {
        Self::new(config.policy_for(StageKind::Analyze))
    }
}

fn translate(err: GenerationError) -> StageError {
    match err {
        GenerationError::Adapter(e) => StageError::from_adapter(StageKind::Analyze, &e),
        other @ (GenerationError::Malformed(_) | GenerationError::Empty) => {
            StageError::retryable(StageKind::Analyze, other.to_string())
        }
    }
}

#[async_trait]
impl Stage for AnalyzeStage {
    type Input = AnalyzeInput;
    type Output = AnalysisReport;

    fn kind(&self) -> StageKind {
        StageKind::Analyze
    }

    fn policy(&self) -> &StagePolicy {
        &self.policy
    }

    async fn execute(&self, input: &AnalyzeInput, ctx: &StageContext) -> Result<AnalysisReport, StageError> {
        let corpus = &input.corpus;
        let documents: Vec<ScrapedDocument> = corpus.successful().cloned().collect();
        if documents.is_empty() {
            return Err(StageError::fatal(
                StageKind::Analyze,
                "corpus has no successfully fetched documents",
            ));
        }

        let reasoner = &ctx.adapters().reasoner;
        debug!(documents = documents.len(), reasoner = reasoner.name(), "Synthesizing report");

        let mut report = ctx
            .call(
                reasoner.name(),
                ctx.config().reasoning_timeout(),
                reasoner.synthesize(&documents, &input.topic),
            )
            .await
            .map_err(translate)?;

        if let Err(reason) = report.validate() {
            warn!(reason = %reason, "Synthesis output failed validation");
            return Err(translate(GenerationError::Malformed(reason)));
        }

        if report.source_urls.is_empty() {
            report.source_urls = documents.iter().map(|d| d.url.clone()).collect();
        }
        report.provenance = Provenance {
            attempted: corpus.len(),
            fetched: documents.len(),
            failed_urls: corpus.failed_urls(),
        };
        Ok(report)
    }

    fn summarize(&self, output: &AnalysisReport) -> Option<String> {
        Some(format!("{} sections", output.sections.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ReportSection;
    use crate::errors::{AdapterError, StageErrorKind};
    use crate::testing::{stub_adapters, StubReasoner};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn context(reasoner: Arc<StubReasoner>) -> StageContext {
        let mut adapters = stub_adapters();
        adapters.reasoner = reasoner;
        StageContext::new(Arc::new(adapters), Arc::new(ResearchConfig::default()))
    }

    fn input(corpus: Corpus) -> AnalyzeInput {
        AnalyzeInput {
            topic: "history of the internet".to_string(),
            corpus,
        }
    }

    fn mixed_corpus() -> Corpus {
        Corpus::new(vec![
            ScrapedDocument::failed("https://a.example/", "status 404"),
            ScrapedDocument::fetched("https://b.example/", "ARPANET went live in 1969."),
            ScrapedDocument::failed("https://c.example/", "timed out"),
        ])
    }

    #[tokio::test]
    async fn test_only_successful_documents_reach_synthesis() {
        let reasoner = Arc::new(StubReasoner::new());
        let report = AnalyzeStage::new(StagePolicy::default())
            .execute(&input(mixed_corpus()), &context(reasoner.clone()))
            .await
            .unwrap();

        assert_eq!(reasoner.received(), vec![vec!["https://b.example/".to_string()]]);
        assert_eq!(reasoner.topics(), vec!["history of the internet".to_string()]);
        assert_eq!(report.source_urls, vec!["https://b.example/".to_string()]);
        assert_eq!(
            report.provenance,
            Provenance {
                attempted: 3,
                fetched: 1,
                failed_urls: vec!["https://a.example/".to_string(), "https://c.example/".to_string()],
            }
        );
    }

    #[tokio::test]
    async fn test_generator_sources_are_kept() {
        let reasoner = Arc::new(StubReasoner::with_responses(vec![Ok(AnalysisReport::new(
            "Report",
            vec![ReportSection::new("Summary", "text")],
            vec!["https://cited.example/".to_string()],
        ))]));
        let report = AnalyzeStage::new(StagePolicy::default())
            .execute(&input(mixed_corpus()), &context(reasoner))
            .await
            .unwrap();

        assert_eq!(report.source_urls, vec!["https://cited.example/".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_corpus_is_fatal() {
        let corpus = Corpus::new(vec![ScrapedDocument::failed("https://a.example/", "404")]);
        let reasoner = Arc::new(StubReasoner::new());
        let err = AnalyzeStage::new(StagePolicy::default())
            .execute(&input(corpus), &context(reasoner.clone()))
            .await
            .unwrap_err();

        assert_eq!(err.kind, StageErrorKind::Fatal);
        assert_eq!(reasoner.calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_output_is_retryable() {
        let untitled = AnalysisReport::new(" ", vec![ReportSection::new("A", "b")], Vec::new());
        let reasoner = Arc::new(StubReasoner::with_responses(vec![
            Ok(untitled),
            Err(GenerationError::Empty),
            Err(GenerationError::Malformed("missing sections".to_string())),
        ]));
        let stage = AnalyzeStage::new(StagePolicy::default());
        let ctx = context(reasoner);

        for expected in ["report title is empty", "empty synthesis output", "missing sections"] {
            let err = stage.execute(&input(mixed_corpus()), &ctx).await.unwrap_err();
            assert_eq!(err.kind, StageErrorKind::Retryable);
            assert!(err.message.contains(expected), "{}", err.message);
        }
    }

    #[tokio::test]
    async fn test_reasoner_transport_errors() {
        let reasoner = Arc::new(StubReasoner::with_responses(vec![
            Err(AdapterError::transport("stub-reasoner", "overloaded").into()),
            Err(AdapterError::unavailable("stub-reasoner", "no model").into()),
        ]));
        let stage = AnalyzeStage::new(StagePolicy::default());
        let ctx = context(reasoner);

        let first = stage.execute(&input(mixed_corpus()), &ctx).await.unwrap_err();
        assert_eq!(first.kind, StageErrorKind::Retryable);
        let second = stage.execute(&input(mixed_corpus()), &ctx).await.unwrap_err();
        assert_eq!(second.kind, StageErrorKind::Retryable);
        assert!(second.message.contains("no model"));
    }
}
