//! Deterministic stub adapters for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use crate::adapters::{
    FetchedContent, PublishAdapter, PublishReceipt, ReasoningAdapter, ScrapeAdapter,
    SearchAdapter, UrlMapAdapter,
};
use crate::core::{AnalysisReport, ReportSection, ScrapedDocument, SearchHit};
use crate::errors::{AdapterError, GenerationError};

/// A search adapter that returns a fixed list of hits.
#[derive(Debug)]
pub struct StubSearchAdapter {
    hits: Vec<SearchHit>,
    failures: Mutex<VecDeque<AdapterError>>,
    calls: Mutex<usize>,
}

impl StubSearchAdapter {
    /// Creates an adapter returning `hits` on every call.
    #[must_use]
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self {
            hits,
            failures: Mutex::new(VecDeque::new()),
            calls: Mutex::new(0),
        }
    }

    /// Creates an adapter returning one untitled hit per URL.
    #[must_use]
    pub fn with_urls(urls: &[&str]) -> Self {
        Self::new(
            urls.iter()
                .enumerate()
                .map(|(i, url)| SearchHit::new(format!("Result {}", i + 1), *url, ""))
                .collect(),
        )
    }

    /// Fails the next `times` calls with `error` before returning hits.
    #[must_use]
    pub fn failing_times(self, times: usize, error: AdapterError) -> Self {
        self.failures.lock().extend(std::iter::repeat(error).take(times));
        self
    }

    /// Number of calls made.
    #[must_use]
    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl SearchAdapter for StubSearchAdapter {
    fn name(&self) -> &str {
        "stub-search"
    }

    async fn search(&self, _query: &str, limit: usize) -> Result<Vec<SearchHit>, AdapterError> {
        *self.calls.lock() += 1;
        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }
        Ok(self.hits.iter().take(limit).cloned().collect())
    }
}

/// A crawl mapper with scripted expansions per seed.
///
/// Seeds without an expansion map to nothing.
#[derive(Debug, Default)]
pub struct StubMapper {
    expansions: HashMap<String, Vec<String>>,
    failing: HashSet<String>,
}

impl StubMapper {
    /// Creates a mapper with no expansions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `seed` to `urls`.
    #[must_use]
    pub fn with_expansion(mut self, seed: &str, urls: &[&str]) -> Self {
        self.expansions
            .insert(seed.to_string(), urls.iter().map(ToString::to_string).collect());
        self
    }

    /// Fails every map call for `seed` with a transport error.
    #[must_use]
    pub fn failing_for(mut self, seed: &str) -> Self {
        self.failing.insert(seed.to_string());
        self
    }
}

#[async_trait]
impl UrlMapAdapter for StubMapper {
    fn name(&self) -> &str {
        "stub-mapper"
    }

    async fn map(&self, seed_url: &str) -> Result<Vec<String>, AdapterError> {
        if self.failing.contains(seed_url) {
            return Err(AdapterError::transport(self.name(), format!("cannot crawl {seed_url}")));
        }
        Ok(self.expansions.get(seed_url).cloned().unwrap_or_default())
    }
}

/// A scraper serving canned pages, failures and delays per URL.
///
/// Unknown URLs return `content of <url>` with status 200.
#[derive(Debug, Default)]
pub struct StubScraper {
    pages: HashMap<String, FetchedContent>,
    failures: HashMap<String, AdapterError>,
    delays: HashMap<String, Duration>,
    default_delay: Option<Duration>,
    fail_all: bool,
    requested: Mutex<Vec<String>>,
}

impl StubScraper {
    /// Creates a scraper where every fetch succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `text` for `url`.
    #[must_use]
    pub fn with_page(mut self, url: &str, text: &str) -> Self {
        self.pages.insert(url.to_string(), FetchedContent::ok(text));
        self
    }

    /// Answers `url` with `status_code`.
    #[must_use]
    pub fn with_status(mut self, url: &str, status_code: u16) -> Self {
        self.pages.insert(
            url.to_string(),
            FetchedContent {
                text: format!("content of {url}"),
                status_code,
            },
        );
        self
    }

    /// Fails fetches of `url` with `error`.
    #[must_use]
    pub fn failing(mut self, url: &str, error: AdapterError) -> Self {
        self.failures.insert(url.to_string(), error);
        self
    }

    /// Delays fetches of `url`.
    #[must_use]
    pub fn with_delay(mut self, url: &str, delay: Duration) -> Self {
        self.delays.insert(url.to_string(), delay);
        self
    }

    /// Delays every fetch without a specific delay.
    #[must_use]
    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = Some(delay);
        self
    }

    /// Fails every fetch.
    #[must_use]
    pub fn fail_all(mut self) -> Self {
        self.fail_all = true;
        self
    }

    /// URLs requested so far, in call order.
    #[must_use]
    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().clone()
    }
}

#[async_trait]
impl ScrapeAdapter for StubScraper {
    fn name(&self) -> &str {
        "stub-scrape"
    }

    async fn fetch(&self, url: &str) -> Result<FetchedContent, AdapterError> {
        self.requested.lock().push(url.to_string());
        if let Some(delay) = self.delays.get(url).copied().or(self.default_delay) {
            tokio::time::sleep(delay).await;
        }
        if self.fail_all {
            return Err(AdapterError::transport(self.name(), format!("{url} unreachable")));
        }
        if let Some(error) = self.failures.get(url) {
            return Err(error.clone());
        }
        Ok(self
            .pages
            .get(url)
            .cloned()
            .unwrap_or_else(|| FetchedContent::ok(format!("content of {url}"))))
    }
}

/// A reasoning adapter that replays scripted responses, then synthesizes a
/// two-section report titled after the topic.
#[derive(Debug, Default)]
pub struct StubReasoner {
    responses: Mutex<VecDeque<Result<AnalysisReport, GenerationError>>>,
    received: Mutex<Vec<Vec<String>>>,
    topics: Mutex<Vec<String>>,
}

impl StubReasoner {
    /// Creates a reasoner that always produces the default report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a reasoner that replays `responses` before the default report.
    #[must_use]
    pub fn with_responses(responses: Vec<Result<AnalysisReport, GenerationError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    /// The document URLs handed to each call.
    #[must_use]
    pub fn received(&self) -> Vec<Vec<String>> {
        self.received.lock().clone()
    }

    /// The topic handed to each call.
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        self.topics.lock().clone()
    }

    /// Number of calls made.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.received.lock().len()
    }
}

fn default_report(documents: &[ScrapedDocument], topic: &str) -> AnalysisReport {
    AnalysisReport::new(
        format!("Research report: {topic}"),
        vec![
            ReportSection::new("Overview", format!("A survey of {topic}.")),
            ReportSection::new(
                "Findings",
                format!("Drawn from {} fetched documents.", documents.len()),
            ),
        ],
        Vec::new(),
    )
}

#[async_trait]
impl ReasoningAdapter for StubReasoner {
    fn name(&self) -> &str {
        "stub-reasoner"
    }

    async fn synthesize(
        &self,
        documents: &[ScrapedDocument],
        topic: &str,
    ) -> Result<AnalysisReport, GenerationError> {
        self.received
            .lock()
            .push(documents.iter().map(|d| d.url.clone()).collect());
        self.topics.lock().push(topic.to_string());

        let scripted = self.responses.lock().pop_front();
        scripted.unwrap_or_else(|| Ok(default_report(documents, topic)))
    }
}

/// A publish backend that records the reports it receives.
#[derive(Debug)]
pub struct RecordingPublisher {
    name: String,
    error: Option<AdapterError>,
    confirm: bool,
    published: Mutex<Vec<String>>,
    calls: Mutex<usize>,
}

impl RecordingPublisher {
    fn build(name: impl Into<String>, error: Option<AdapterError>, confirm: bool) -> Self {
        Self {
            name: name.into(),
            error,
            confirm,
            published: Mutex::new(Vec::new()),
            calls: Mutex::new(0),
        }
    }

    /// Creates a publisher that confirms every report at `<name>://<title>`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(name, None, true)
    }

    /// Creates a publisher that fails every call with `error`.
    #[must_use]
    pub fn failing(name: impl Into<String>, error: AdapterError) -> Self {
        Self::build(name, Some(error), false)
    }

    /// Creates a publisher that accepts reports without confirming them.
    #[must_use]
    pub fn unconfirmed(name: impl Into<String>) -> Self {
        Self::build(name, None, false)
    }

    /// Titles of the reports published, in order.
    #[must_use]
    pub fn published(&self) -> Vec<String> {
        self.published.lock().clone()
    }

    /// Number of publish calls, failed ones included.
    #[must_use]
    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl PublishAdapter for RecordingPublisher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, report: &AnalysisReport) -> Result<PublishReceipt, AdapterError> {
        *self.calls.lock() += 1;
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        self.published.lock().push(report.title.clone());

        let location = format!("{}://{}", self.name, report.title);
        Ok(if self.confirm {
            PublishReceipt::confirmed(location)
        } else {
            PublishReceipt::unconfirmed(location)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_search_fails_then_recovers() {
        let search = StubSearchAdapter::with_urls(&["https://a.example", "https://b.example"])
            .failing_times(1, AdapterError::transport("stub-search", "reset"));

        assert!(search.search("topic", 10).await.is_err());
        let hits = search.search("topic", 1).await.unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://a.example");
        assert_eq!(search.calls(), 2);
    }

    #[tokio::test]
    async fn test_stub_scraper_defaults() {
        let scraper = StubScraper::new().with_status("https://b.example/", 404);

        let page = scraper.fetch("https://a.example/").await.unwrap();
        assert_eq!(page.text, "content of https://a.example/");
        assert!(!scraper.fetch("https://b.example/").await.unwrap().is_success());
        assert_eq!(scraper.requested().len(), 2);
    }

    #[tokio::test]
    async fn test_stub_reasoner_falls_back_to_default_report() {
        let reasoner = StubReasoner::with_responses(vec![Err(GenerationError::Empty)]);
        let docs = vec![ScrapedDocument::fetched("https://a.example/", "text")];

        assert!(reasoner.synthesize(&docs, "tides").await.is_err());
        let report = reasoner.synthesize(&docs, "tides").await.unwrap();

        assert_eq!(report.title, "Research report: tides");
        assert_eq!(report.sections.len(), 2);
        assert_eq!(reasoner.calls(), 2);
    }

    #[tokio::test]
    async fn test_recording_publisher() {
        let report = AnalysisReport::new("Tides", vec![ReportSection::new("A", "b")], Vec::new());

        let confirmed = RecordingPublisher::new("confluence");
        let receipt = confirmed.publish(&report).await.unwrap();
        assert_eq!(receipt, PublishReceipt::confirmed("confluence://Tides"));
        assert_eq!(confirmed.published(), vec!["Tides".to_string()]);

        let unconfirmed = RecordingPublisher::unconfirmed("sharepoint");
        assert!(!unconfirmed.publish(&report).await.unwrap().confirmed);

        let failing = RecordingPublisher::failing("pdf", AdapterError::unavailable("pdf", "disk full"));
        assert!(failing.publish(&report).await.is_err());
        assert!(failing.published().is_empty());
        assert_eq!(failing.calls(), 1);
    }
}
