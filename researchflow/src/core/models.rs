//! Data handed between pipeline stages.
//!
//! Every type here is produced by exactly one stage and consumed by the next.
//! Once handed over, values are only read; stages take their input by
//! reference so a retried attempt sees exactly the same input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// The publish backends a report can be delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PublishTargetKind {
    /// Local PDF file. Always available.
    #[serde(rename = "pdf")]
    Pdf,
    /// A new Google Docs document.
    #[serde(rename = "google_docs")]
    GoogleDocs,
    /// A file in a SharePoint drive.
    #[serde(rename = "sharepoint")]
    SharePoint,
    /// A Confluence page.
    #[serde(rename = "confluence")]
    Confluence,
}

impl PublishTargetKind {
    /// All publish target kinds.
    pub const ALL: [Self; 4] = [Self::Pdf, Self::GoogleDocs, Self::SharePoint, Self::Confluence];

    /// Returns the canonical name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::GoogleDocs => "google_docs",
            Self::SharePoint => "sharepoint",
            Self::Confluence => "confluence",
        }
    }

    /// Returns true for backends that write locally without network access.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(self, Self::Pdf)
    }
}

impl fmt::Display for PublishTargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PublishTargetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();

        match normalized.as_str() {
            "pdf" | "localpdf" => Ok(Self::Pdf),
            "googledocs" | "googledoc" | "gdocs" => Ok(Self::GoogleDocs),
            "sharepoint" => Ok(Self::SharePoint),
            "confluence" => Ok(Self::Confluence),
            _ => Err(format!("unknown publish target '{s}'")),
        }
    }
}

/// A research request parsed from free text.
///
/// Fields are private so the request cannot change after parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchRequest {
    topic: String,
    publish_target: Option<PublishTargetKind>,
    raw_prompt: String,
}

impl ResearchRequest {
    /// Creates a new request.
    #[must_use]
    pub fn new(
        topic: impl Into<String>,
        publish_target: Option<PublishTargetKind>,
        raw_prompt: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            publish_target,
            raw_prompt: raw_prompt.into(),
        }
    }

    /// The research topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The platform named in the prompt, if any.
    #[must_use]
    pub fn publish_target(&self) -> Option<PublishTargetKind> {
        self.publish_target
    }

    /// The prompt as received.
    #[must_use]
    pub fn raw_prompt(&self) -> &str {
        &self.raw_prompt
    }
}

/// A single search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Result title.
    pub title: String,
    /// Result URL.
    pub url: String,
    /// Snippet shown by the search engine.
    #[serde(default)]
    pub snippet: String,
}

impl SearchHit {
    /// Creates a new search hit.
    #[must_use]
    pub fn new(title: impl Into<String>, url: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: snippet.into(),
        }
    }
}

/// Search results in relevance order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResultSet {
    hits: Vec<SearchHit>,
}

impl SearchResultSet {
    /// Creates a result set, keeping the given order.
    #[must_use]
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self { hits }
    }

    /// The hits, most relevant first.
    #[must_use]
    pub fn hits(&self) -> &[SearchHit] {
        &self.hits
    }

    /// Iterates over the hit URLs in rank order.
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.hits.iter().map(|h| h.url.as_str())
    }

    /// Number of hits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// Returns true if there are no hits.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// A de-duplicated set of candidate URLs with stable insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct UrlSet {
    urls: Vec<String>,
    seen: HashSet<String>,
}

impl UrlSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a URL. Returns false if it was already present.
    pub fn insert(&mut self, url: impl Into<String>) -> bool {
        let url = url.into();
        if self.seen.contains(&url) {
            return false;
        }
        self.seen.insert(url.clone());
        self.urls.push(url);
        true
    }

    /// Returns true if the URL is present.
    #[must_use]
    pub fn contains(&self, url: &str) -> bool {
        self.seen.contains(url)
    }

    /// Iterates in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.urls.iter().map(String::as_str)
    }

    /// The URLs in insertion order.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.urls
    }

    /// Number of URLs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.urls.len()
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

impl From<Vec<String>> for UrlSet {
    fn from(urls: Vec<String>) -> Self {
        urls.into_iter().collect()
    }
}

impl From<UrlSet> for Vec<String> {
    fn from(set: UrlSet) -> Self {
        set.urls
    }
}

impl<S: Into<String>> FromIterator<S> for UrlSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        let mut set = Self::new();
        for url in iter {
            set.insert(url);
        }
        set
    }
}

/// Outcome of fetching one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchStatus {
    /// Content was retrieved.
    Fetched,
    /// The fetch failed; the document keeps its slot in the corpus.
    Failed {
        /// Why the fetch failed.
        reason: String,
    },
}

/// The content scraped from one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedDocument {
    /// The URL that was fetched.
    pub url: String,
    /// Extracted text (empty on failure).
    pub raw_text: String,
    /// When the fetch finished.
    pub fetched_at: DateTime<Utc>,
    /// Whether the fetch succeeded.
    pub fetch_status: FetchStatus,
    /// Hex SHA-256 of `raw_text` for successful fetches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_digest: Option<String>,
}

impl ScrapedDocument {
    /// Creates a successfully fetched document.
    #[must_use]
    pub fn fetched(url: impl Into<String>, raw_text: impl Into<String>) -> Self {
        let raw_text = raw_text.into();
        let digest = hex::encode(Sha256::digest(raw_text.as_bytes()));
        Self {
            url: url.into(),
            raw_text,
            fetched_at: Utc::now(),
            fetch_status: FetchStatus::Fetched,
            content_digest: Some(digest),
        }
    }

    /// Creates a failed document.
    #[must_use]
    pub fn failed(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            raw_text: String::new(),
            fetched_at: Utc::now(),
            fetch_status: FetchStatus::Failed {
                reason: reason.into(),
            },
            content_digest: None,
        }
    }

    /// Returns true if the content was retrieved.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.fetch_status, FetchStatus::Fetched)
    }

    /// The failure reason, if the fetch failed.
    #[must_use]
    pub fn failure_reason(&self) -> Option<&str> {
        match &self.fetch_status {
            FetchStatus::Fetched => None,
            FetchStatus::Failed { reason } => Some(reason),
        }
    }
}

/// The ordered output of the Scrape stage: one document per candidate URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Corpus {
    documents: Vec<ScrapedDocument>,
}

impl Corpus {
    /// Creates a corpus from documents in URL order.
    #[must_use]
    pub fn new(documents: Vec<ScrapedDocument>) -> Self {
        Self { documents }
    }

    /// All documents, failed ones included.
    #[must_use]
    pub fn documents(&self) -> &[ScrapedDocument] {
        &self.documents
    }

    /// Iterates over successfully fetched documents in order.
    pub fn successful(&self) -> impl Iterator<Item = &ScrapedDocument> {
        self.documents.iter().filter(|d| d.is_success())
    }

    /// Number of successful fetches.
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.successful().count()
    }

    /// Number of failed fetches.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.documents.len() - self.success_count()
    }

    /// URLs whose fetch failed, in order.
    #[must_use]
    pub fn failed_urls(&self) -> Vec<String> {
        self.documents
            .iter()
            .filter(|d| !d.is_success())
            .map(|d| d.url.clone())
            .collect()
    }

    /// Fraction of documents fetched successfully (0.0 when empty).
    #[must_use]
    pub fn success_ratio(&self) -> f64 {
        if self.documents.is_empty() {
            0.0
        } else {
            self.success_count() as f64 / self.documents.len() as f64
        }
    }

    /// Total number of documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Returns true if the corpus has no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// One section of an analysis report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSection {
    /// Section heading.
    pub heading: String,
    /// Section body.
    pub body: String,
}

impl ReportSection {
    /// Creates a new section.
    #[must_use]
    pub fn new(heading: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            heading: heading.into(),
            body: body.into(),
        }
    }
}

/// Which documents the report was built from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Documents in the corpus.
    pub attempted: usize,
    /// Documents that were fetched and handed to synthesis.
    pub fetched: usize,
    /// URLs that could not be fetched.
    #[serde(default)]
    pub failed_urls: Vec<String>,
}

/// The synthesized research report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Report title.
    pub title: String,
    /// Sections in reading order.
    pub sections: Vec<ReportSection>,
    /// URLs the report draws on.
    #[serde(default)]
    pub source_urls: Vec<String>,
    /// Corpus accounting, filled in by the Analyze stage.
    #[serde(default)]
    pub provenance: Provenance,
}

impl AnalysisReport {
    /// Creates a report without provenance.
    #[must_use]
    pub fn new(title: impl Into<String>, sections: Vec<ReportSection>, source_urls: Vec<String>) -> Self {
        Self {
            title: title.into(),
            sections,
            source_urls,
            provenance: Provenance::default(),
        }
    }

    /// Checks the structural requirements of a synthesized report.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("report title is empty".to_string());
        }
        if self.sections.is_empty() {
            return Err("report has no sections".to_string());
        }
        if let Some(index) = self.sections.iter().position(|s| s.heading.trim().is_empty()) {
            return Err(format!("section {index} has an empty heading"));
        }
        Ok(())
    }

    /// Renders the report as Markdown, the text handed to publishers.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut out = format!("# {}\n", self.title.trim());
        for section in &self.sections {
            out.push_str(&format!("\n## {}\n\n{}\n", section.heading.trim(), section.body.trim()));
        }
        if !self.source_urls.is_empty() {
            out.push_str("\n## Sources\n\n");
            for url in &self.source_urls {
                out.push_str(&format!("- {url}\n"));
            }
        }
        out
    }
}

/// The outcome of publishing a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishResult {
    /// The backend that produced the artifact.
    pub backend: PublishTargetKind,
    /// Where the artifact lives (file path or URL).
    pub location: String,
    /// Whether the backend confirmed the artifact exists.
    pub confirmed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_publish_target_from_str() {
        assert_eq!("pdf".parse::<PublishTargetKind>(), Ok(PublishTargetKind::Pdf));
        assert_eq!("Google Docs".parse::<PublishTargetKind>(), Ok(PublishTargetKind::GoogleDocs));
        assert_eq!("google_docs".parse::<PublishTargetKind>(), Ok(PublishTargetKind::GoogleDocs));
        assert_eq!("SharePoint".parse::<PublishTargetKind>(), Ok(PublishTargetKind::SharePoint));
        assert_eq!("CONFLUENCE".parse::<PublishTargetKind>(), Ok(PublishTargetKind::Confluence));
        assert!("dropbox".parse::<PublishTargetKind>().is_err());
    }

    #[test]
    fn test_publish_target_serialize() {
        let json = serde_json::to_string(&PublishTargetKind::SharePoint).unwrap();
        assert_eq!(json, r#""sharepoint""#);
        assert!(PublishTargetKind::Pdf.is_local());
        assert!(!PublishTargetKind::Confluence.is_local());
    }

    #[test]
    fn test_url_set_dedup_keeps_first_position() {
        let set: UrlSet = ["https://a.example", "https://b.example", "https://a.example"]
            .into_iter()
            .collect();

        assert_eq!(set.len(), 2);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["https://a.example", "https://b.example"]);
        assert!(set.contains("https://b.example"));
    }

    #[test]
    fn test_scraped_document_digest() {
        let a = ScrapedDocument::fetched("https://a.example", "same text");
        let b = ScrapedDocument::fetched("https://b.example", "same text");
        let failed = ScrapedDocument::failed("https://c.example", "404");

        assert_eq!(a.content_digest, b.content_digest);
        assert_eq!(a.content_digest.as_ref().map(String::len), Some(64));
        assert!(failed.content_digest.is_none());
        assert_eq!(failed.failure_reason(), Some("404"));
    }

    #[test]
    fn test_corpus_accounting() {
        let corpus = Corpus::new(vec![
            ScrapedDocument::fetched("https://a.example", "alpha"),
            ScrapedDocument::failed("https://b.example", "timeout"),
            ScrapedDocument::fetched("https://c.example", "gamma"),
            ScrapedDocument::failed("https://d.example", "404"),
        ]);

        assert_eq!(corpus.len(), 4);
        assert_eq!(corpus.success_count(), 2);
        assert_eq!(corpus.failure_count(), 2);
        assert_eq!(corpus.failed_urls(), vec!["https://b.example", "https://d.example"]);
        assert!((corpus.success_ratio() - 0.5).abs() < f64::EPSILON);
        assert_eq!(Corpus::default().success_ratio(), 0.0);
    }

    #[test]
    fn test_report_validate() {
        let ok = AnalysisReport::new("Title", vec![ReportSection::new("Intro", "body")], vec![]);
        assert!(ok.validate().is_ok());

        let no_title = AnalysisReport::new("  ", vec![ReportSection::new("Intro", "body")], vec![]);
        assert!(no_title.validate().is_err());

        let no_sections = AnalysisReport::new("Title", vec![], vec![]);
        assert!(no_sections.validate().is_err());

        let blank_heading = AnalysisReport::new("Title", vec![ReportSection::new("", "body")], vec![]);
        assert_eq!(blank_heading.validate(), Err("section 0 has an empty heading".to_string()));
    }

    #[test]
    fn test_report_to_markdown() {
        let report = AnalysisReport::new(
            "Internet History",
            vec![
                ReportSection::new("Origins", "ARPANET."),
                ReportSection::new("Growth", "The web."),
            ],
            vec!["https://a.example".to_string()],
        );

        let md = report.to_markdown();
        assert!(md.starts_with("# Internet History\n"));
        assert!(md.contains("## Origins\n\nARPANET.\n"));
        assert!(md.contains("## Sources\n\n- https://a.example\n"));
    }

    #[test]
    fn test_request_accessors() {
        let request = ResearchRequest::new("rust", Some(PublishTargetKind::Confluence), "research rust on confluence");
        assert_eq!(request.topic(), "rust");
        assert_eq!(request.publish_target(), Some(PublishTargetKind::Confluence));
        assert_eq!(request.raw_prompt(), "research rust on confluence");
    }
}
