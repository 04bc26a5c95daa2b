//! Protocol traits for the external capabilities a run depends on.
//!
//! Each trait is a narrow request/response wrapper around one third-party
//! service. Stages only see these traits, never a concrete client.

use async_trait::async_trait;

use crate::core::{AnalysisReport, ScrapedDocument, SearchHit};
use crate::errors::{AdapterError, GenerationError};

/// Result of fetching one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedContent {
    /// Extracted text content.
    pub text: String,
    /// Status code reported by the remote service.
    pub status_code: u16,
}

impl FetchedContent {
    /// Creates a fetched page with a 200 status.
    #[must_use]
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            status_code: 200,
        }
    }

    /// Whether the fetch was successful (2xx status).
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Acknowledgement returned by a publish backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    /// File path or URL of the artifact.
    pub location: String,
    /// Whether the backend confirmed the artifact exists.
    pub confirmed: bool,
}

impl PublishReceipt {
    /// Creates a confirmed receipt.
    #[must_use]
    pub fn confirmed(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            confirmed: true,
        }
    }

    /// Creates a receipt the backend could not confirm.
    #[must_use]
    pub fn unconfirmed(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            confirmed: false,
        }
    }
}

/// Protocol for web search.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchAdapter: Send + Sync {
    /// Adapter name used in logs and errors.
    fn name(&self) -> &str;

    /// Returns up to `limit` hits in relevance order.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, AdapterError>;
}

/// Protocol for crawl mapping (discovering related URLs from a seed).
#[async_trait]
pub trait UrlMapAdapter: Send + Sync {
    /// Adapter name used in logs and errors.
    fn name(&self) -> &str;

    /// Returns URLs related to `seed_url`.
    async fn map(&self, seed_url: &str) -> Result<Vec<String>, AdapterError>;
}

/// Protocol for content extraction.
#[async_trait]
pub trait ScrapeAdapter: Send + Sync {
    /// Adapter name used in logs and errors.
    fn name(&self) -> &str;

    /// Fetches one URL and extracts its text.
    async fn fetch(&self, url: &str) -> Result<FetchedContent, AdapterError>;
}

/// Protocol for the reasoning capability that turns a corpus into a report.
#[async_trait]
pub trait ReasoningAdapter: Send + Sync {
    /// Adapter name used in logs and errors.
    fn name(&self) -> &str;

    /// Synthesizes a report about `topic` from the given documents.
    async fn synthesize(
        &self,
        documents: &[ScrapedDocument],
        topic: &str,
    ) -> Result<AnalysisReport, GenerationError>;
}

/// Protocol for a publish backend.
#[async_trait]
pub trait PublishAdapter: Send + Sync {
    /// Adapter name used in logs and errors.
    fn name(&self) -> &str;

    /// Emits the report and returns where it landed.
    async fn publish(&self, report: &AnalysisReport) -> Result<PublishReceipt, AdapterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetched_content_is_success() {
        assert!(FetchedContent::ok("body").is_success());
        let not_found = FetchedContent {
            status_code: 404,
            ..FetchedContent::ok("")
        };
        assert!(!not_found.is_success());
    }

    #[tokio::test]
    async fn test_search_adapter_mock() {
        let mut mock = MockSearchAdapter::new();
        mock.expect_name().return_const("mock".to_string());
        mock.expect_search()
            .withf(|query, limit| query.to_string() == "rust" && *limit == 2)
            .returning(|_, _| Ok(vec![SearchHit::new("Rust", "https://rust-lang.org", "")]));

        let hits = mock.search("rust", 2).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(mock.name(), "mock");
    }
}
