//! Scrape stage: candidate URLs in, ordered corpus out.

use async_trait::async_trait;
use tracing::{debug, info};

use super::Stage;
use crate::cancellation::WorkerPool;
use crate::config::ResearchConfig;
use crate::context::StageContext;
use crate::core::{Corpus, ScrapedDocument, StageKind, UrlSet};
use crate::errors::StageError;
use crate::pipeline::StagePolicy;

/// Fetches every URL through a bounded worker pool.
///
/// A failed fetch becomes a failed document in its slot; the stage itself only
/// fails when too few fetches succeed.
#[derive(Debug, Clone)]
pub struct ScrapeStage {
    policy: StagePolicy,
    concurrency: usize,
    min_successful: usize,
    min_ratio: f64,
}

impl ScrapeStage {
    /// Creates a scrape stage.
    #[must_use]
    pub fn new(policy: StagePolicy, concurrency: usize) -> Self {
        Self {
            policy,
            concurrency: concurrency.max(1),
            min_successful: 1,
            min_ratio: 0.0,
        }
    }

    /// Sets the success floor: at least `min_successful` fetches and at least
    /// `min_ratio` of all fetches must succeed.
    #[must_use]
    pub fn with_floor(mut self, min_successful: usize, min_ratio: f64) -> Self {
        self.min_successful = min_successful;
        self.min_ratio = min_ratio;
        self
    }

    /// Creates a scrape stage from run configuration.
    #[must_use]
    pub fn from_config(config: &ResearchConfig) -> Self {
        Self::new(config.policy_for(StageKind::Scrape), config.scrape_concurrency)
            .with_floor(config.min_successful_fetches, config.min_success_ratio)
    }

    fn meets_floor(&self, corpus: &Corpus) -> bool {
        corpus.success_count() >= self.min_successful && corpus.success_ratio() >= self.min_ratio
    }
}

/// Fetches one URL. `None` means the run was cancelled mid-fetch.
async fn fetch_one(ctx: &StageContext, url: String) -> Option<ScrapedDocument> {
    let scraper = &ctx.adapters().scraper;
    let result = ctx
        .call(scraper.name(), ctx.config().adapter_timeout(), scraper.fetch(&url))
        .await;

    let document = match result {
        Ok(content) if !content.is_success() => {
            ScrapedDocument::failed(url, format!("status {}", content.status_code))
        }
        Ok(content) if content.text.trim().is_empty() => ScrapedDocument::failed(url, "empty content"),
        Ok(content) => ScrapedDocument::fetched(url, content.text),
        Err(e) if e.is_cancelled() => return None,
        Err(e) => {
            debug!(url = %url, error = %e, "Fetch failed");
            ScrapedDocument::failed(url, e.to_string())
        }
    };
    Some(document)
}

#[async_trait]
impl Stage for ScrapeStage {
    type Input = UrlSet;
    type Output = Corpus;

    fn kind(&self) -> StageKind {
        StageKind::Scrape
    }

    fn policy(&self) -> &StagePolicy {
        &self.policy
    }

    async fn execute(&self, urls: &UrlSet, ctx: &StageContext) -> Result<Corpus, StageError> {
        let pool = WorkerPool::new(self.concurrency, ctx.token().clone());
        let worker_ctx = ctx.clone();
        let slots = pool
            .run(urls.as_slice().to_vec(), move |_, url| {
                let ctx = worker_ctx.clone();
                async move { fetch_one(&ctx, url).await }
            })
            .await;
        let slots: Vec<Option<ScrapedDocument>> = slots.into_iter().map(Option::flatten).collect();

        if ctx.is_cancelled() {
            // Finished fetches survive the cancel, in URL order.
            let partial = Corpus::new(slots.into_iter().flatten().collect());
            let reason = ctx.token().reason().unwrap_or_else(|| "cancelled".to_string());
            info!(
                finished = partial.len(),
                fetched = partial.success_count(),
                total = urls.len(),
                "Scrape cancelled"
            );
            return Err(StageError::cancelled(
                StageKind::Scrape,
                format!("{reason} ({} of {} fetches finished)", partial.len(), urls.len()),
            )
            .with_partial_corpus(partial));
        }

        let documents = slots
            .into_iter()
            .zip(urls.iter())
            .map(|(slot, url)| slot.unwrap_or_else(|| ScrapedDocument::failed(url, "fetch did not complete")))
            .collect();
        let corpus = Corpus::new(documents);

        info!(
            fetched = corpus.success_count(),
            failed = corpus.failure_count(),
            "Scrape finished"
        );

        if !self.meets_floor(&corpus) {
            return Err(StageError::retryable(
                StageKind::Scrape,
                format!(
                    "{}/{} fetches succeeded, below the floor of {} ({:.0}%)",
                    corpus.success_count(),
                    corpus.len(),
                    self.min_successful,
                    self.min_ratio * 100.0
                ),
            ));
        }
        Ok(corpus)
    }

    fn summarize(&self, output: &Corpus) -> Option<String> {
        Some(format!("{}/{} fetched", output.success_count(), output.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationToken;
    use crate::errors::{AdapterError, StageErrorKind};
    use crate::testing::{stub_adapters, StubScraper};
    use std::sync::Arc;
    use std::time::Duration;

    fn urls(n: usize) -> UrlSet {
        (0..n).map(|i| format!("https://site{i}.example/")).collect()
    }

    fn context(scraper: StubScraper, config: ResearchConfig) -> StageContext {
        let mut adapters = stub_adapters();
        adapters.scraper = Arc::new(scraper);
        StageContext::new(Arc::new(adapters), Arc::new(config))
    }

    fn stage() -> ScrapeStage {
        ScrapeStage::new(StagePolicy::default(), 3)
    }

    #[tokio::test]
    async fn test_order_follows_urls_not_completion() {
        let scraper = StubScraper::new()
            .with_delay("https://site0.example/", Duration::from_millis(60))
            .with_delay("https://site1.example/", Duration::from_millis(30));
        let input = urls(5);

        let corpus = stage()
            .execute(&input, &context(scraper, ResearchConfig::default()))
            .await
            .unwrap();

        let fetched: Vec<&str> = corpus.documents().iter().map(|d| d.url.as_str()).collect();
        let expected: Vec<&str> = input.iter().collect();
        assert_eq!(fetched, expected);
    }

    #[tokio::test]
    async fn test_one_success_meets_default_floor() {
        let scraper = StubScraper::new()
            .failing("https://site0.example/", AdapterError::status("stub-scrape", 404))
            .failing("https://site1.example/", AdapterError::transport("stub-scrape", "reset"))
            .with_status("https://site2.example/", 503)
            .with_page("https://site3.example/", "   ");

        let corpus = stage()
            .execute(&urls(5), &context(scraper, ResearchConfig::default()))
            .await
            .unwrap();

        assert_eq!(corpus.success_count(), 1);
        assert_eq!(corpus.failure_count(), 4);
        assert_eq!(corpus.documents()[2].failure_reason(), Some("status 503"));
        assert_eq!(corpus.documents()[3].failure_reason(), Some("empty content"));
        assert!(corpus.documents()[4].is_success());
    }

    #[tokio::test]
    async fn test_zero_successes_is_retryable_failure() {
        let err = stage()
            .execute(&urls(5), &context(StubScraper::new().fail_all(), ResearchConfig::default()))
            .await
            .unwrap_err();

        assert_eq!(err.kind, StageErrorKind::Retryable);
        assert!(err.message.starts_with("0/5"));
    }

    #[tokio::test]
    async fn test_ratio_floor() {
        let scraper = StubScraper::new()
            .failing("https://site0.example/", AdapterError::status("stub-scrape", 404))
            .failing("https://site1.example/", AdapterError::status("stub-scrape", 404));
        let stage = stage().with_floor(1, 0.75);

        let err = stage
            .execute(&urls(4), &context(scraper, ResearchConfig::default()))
            .await
            .unwrap_err();
        assert!(err.message.contains("2/4"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_times_out_as_failed_document() {
        let config = ResearchConfig {
            adapter_timeout_secs: 1,
            ..ResearchConfig::default()
        };
        let scraper = StubScraper::new().with_delay("https://site1.example/", Duration::from_secs(5));

        let corpus = stage().execute(&urls(3), &context(scraper, config)).await.unwrap();

        assert!(!corpus.documents()[1].is_success());
        assert!(corpus.documents()[1]
            .failure_reason()
            .is_some_and(|r| r.contains("timed out")));
        assert_eq!(corpus.success_count(), 2);
    }

    #[tokio::test]
    async fn test_cancellation_drains_pool() {
        let token = Arc::new(CancellationToken::new());
        let scraper = StubScraper::new().with_default_delay(Duration::from_millis(50));
        let ctx = context(scraper, ResearchConfig::default()).with_token(token.clone());

        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                token.cancel("user abort");
            })
        };

        let err = ScrapeStage::new(StagePolicy::default(), 1)
            .execute(&urls(5), &ctx)
            .await
            .unwrap_err();
        canceller.await.unwrap();

        assert!(err.is_cancelled());
        assert!(err.message.contains("user abort"));
        // The only running fetch was interrupted, so nothing finished.
        assert_eq!(err.partial_corpus.map(|c| c.len()), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_keeps_finished_fetches() {
        let token = Arc::new(CancellationToken::new());
        let scraper = StubScraper::new()
            .with_default_delay(Duration::from_secs(5))
            .with_delay("https://site0.example/", Duration::from_millis(1));
        let ctx = context(scraper, ResearchConfig::default()).with_token(token.clone());

        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                token.cancel("user abort");
            })
        };

        let err = stage().execute(&urls(3), &ctx).await.unwrap_err();
        canceller.await.unwrap();

        assert!(err.is_cancelled());
        assert!(err.message.contains("1 of 3 fetches finished"), "{}", err.message);
        let partial = err.partial_corpus.unwrap();
        assert_eq!(partial.len(), 1);
        assert_eq!(partial.documents()[0].url, "https://site0.example/");
        assert!(partial.documents()[0].is_success());
    }
}
