//! Map stage: search hits in, deduplicated candidate URLs out.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::{debug, warn};
use url::Url;

use super::Stage;
use crate::config::ResearchConfig;
use crate::context::StageContext;
use crate::core::{SearchResultSet, StageKind, UrlSet};
use crate::errors::{AdapterError, StageError};
use crate::pipeline::StagePolicy;

/// Normalizes a URL for deduplication.
///
/// Returns `None` for anything that is not an absolute http(s) URL. The
/// fragment is dropped and the host lowercased.
#[must_use]
pub fn normalize_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }
    url.set_fragment(None);
    Some(url.to_string())
}

/// Expands each search hit through the crawl mapper and merges the results.
#[derive(Debug, Clone)]
pub struct MapStage {
    policy: StagePolicy,
    max_urls: usize,
    concurrency: usize,
}

impl MapStage {
    /// Creates a map stage capped at `max_urls` URLs, running up to
    /// `concurrency` mapper calls at once.
    #[must_use]
    pub fn new(policy: StagePolicy, max_urls: usize, concurrency: usize) -> Self {
        Self {
            policy,
            max_urls: max_urls.max(1),
            concurrency: concurrency.max(1),
        }
    }

    /// Creates a map stage from run configuration.
    #[must_use]
    pub fn from_config(config: &ResearchConfig) -> Self {
        Self::new(
            config.policy_for(StageKind::Map),
            config.max_urls,
            config.scrape_concurrency,
        )
    }
}

#[async_trait]
impl Stage for MapStage {
    type Input = SearchResultSet;
    type Output = UrlSet;

    fn kind(&self) -> StageKind {
        StageKind::Map
    }

    fn policy(&self) -> &StagePolicy {
        &self.policy
    }

    async fn execute(&self, hits: &SearchResultSet, ctx: &StageContext) -> Result<UrlSet, StageError> {
        let mapper = &ctx.adapters().mapper;
        let timeout = ctx.config().adapter_timeout();

        let seeds: Vec<String> = hits.urls().filter_map(normalize_url).collect();

        // `buffered` yields in seed order, whatever order the calls finish in.
        let expansions: Vec<(String, Result<Vec<String>, AdapterError>)> = stream::iter(seeds)
            .map(|seed| async move {
                let result = ctx.call(mapper.name(), timeout, mapper.map(&seed)).await;
                (seed, result)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut urls = UrlSet::new();
        for (seed, result) in expansions {
            if urls.len() >= self.max_urls {
                break;
            }
            urls.insert(seed.clone());

            match result {
                Ok(found) => {
                    for url in found.iter().filter_map(|u| normalize_url(u)) {
                        if urls.len() >= self.max_urls {
                            break;
                        }
                        urls.insert(url);
                    }
                }
                Err(e) if e.is_cancelled() => {
                    return Err(StageError::cancelled(StageKind::Map, e.to_string()));
                }
                Err(e) => {
                    warn!(seed = %seed, error = %e, "URL mapping failed, keeping seed only");
                }
            }
        }

        debug!(urls = urls.len(), max_urls = self.max_urls, "Merged candidate URLs");

        if urls.is_empty() {
            return Err(StageError::retryable(StageKind::Map, "no candidate URLs"));
        }
        Ok(urls)
    }

    fn summarize(&self, output: &UrlSet) -> Option<String> {
        Some(format!("{} urls", output.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SearchHit;
    use crate::errors::StageErrorKind;
    use crate::testing::{stub_adapters, StubMapper};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn context(mapper: StubMapper) -> StageContext {
        let mut adapters = stub_adapters();
        adapters.mapper = Arc::new(mapper);
        StageContext::new(Arc::new(adapters), Arc::new(ResearchConfig::default()))
    }

    fn hits(urls: &[&str]) -> SearchResultSet {
        SearchResultSet::new(urls.iter().map(|u| SearchHit::new("", *u, "")).collect())
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url(" https://Example.COM/a#section ").as_deref(),
            Some("https://example.com/a")
        );
        assert_eq!(normalize_url("https://example.com").as_deref(), Some("https://example.com/"));
        assert_eq!(normalize_url("mailto:someone@example.com"), None);
        assert_eq!(normalize_url("/relative/path"), None);
        assert_eq!(normalize_url("ftp://example.com/file"), None);
    }

    #[tokio::test]
    async fn test_seed_precedes_expansions_and_dedups() {
        let mapper = StubMapper::new()
            .with_expansion("https://a.example/", &["https://a.example/x", "https://b.example/#top"])
            .with_expansion("https://b.example/", &["https://a.example/x", "https://b.example/y"]);
        let stage = MapStage::new(StagePolicy::default(), 10, 2);

        let urls = stage
            .execute(&hits(&["https://a.example", "https://b.example"]), &context(mapper))
            .await
            .unwrap();

        assert_eq!(
            urls.as_slice(),
            &[
                "https://a.example/".to_string(),
                "https://a.example/x".to_string(),
                "https://b.example/".to_string(),
                "https://b.example/y".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_ceiling_caps_url_count() {
        let mapper = StubMapper::new().with_expansion(
            "https://a.example/",
            &["https://a.example/1", "https://a.example/2", "https://a.example/3"],
        );
        let stage = MapStage::new(StagePolicy::default(), 3, 2);

        let urls = stage
            .execute(&hits(&["https://a.example", "https://b.example"]), &context(mapper))
            .await
            .unwrap();

        assert_eq!(urls.len(), 3);
        assert!(!urls.contains("https://b.example/"));
    }

    #[tokio::test]
    async fn test_failed_seed_is_skipped_not_fatal() {
        let mapper = StubMapper::new()
            .failing_for("https://a.example/")
            .with_expansion("https://b.example/", &["https://b.example/docs"]);
        let stage = MapStage::new(StagePolicy::default(), 10, 2);

        let urls = stage
            .execute(&hits(&["https://a.example", "https://b.example"]), &context(mapper))
            .await
            .unwrap();

        assert!(urls.contains("https://a.example/"));
        assert!(urls.contains("https://b.example/docs"));
    }

    #[tokio::test]
    async fn test_no_usable_urls_is_retryable() {
        let stage = MapStage::new(StagePolicy::default(), 10, 2);
        let err = stage
            .execute(&hits(&["not a url", "javascript:void(0)"]), &context(StubMapper::new()))
            .await
            .unwrap_err();

        assert_eq!(err.kind, StageErrorKind::Retryable);
    }
}
