//! Tool adapters: the narrow capability interfaces to external services.
//!
//! This module provides:
//! - The protocol traits for search, crawl mapping, scraping, reasoning and publishing
//! - [`PublisherSet`], the closed mapping from target kind to publish backend
//! - [`ToolAdapterSet`], everything a run needs bundled together
//! - [`LocalPdfPublisher`], the always-available local fallback backend
//! - HTTP-backed scraping and link mapping (feature `http`)

#[cfg(feature = "http")]
mod http;
mod pdf;
mod protocols;

#[cfg(feature = "http")]
pub use http::{extract_text, HttpScrapeAdapter, SameSiteLinkMapper};
pub use pdf::LocalPdfPublisher;
#[cfg(test)]
pub use protocols::MockSearchAdapter;
pub use protocols::{
    FetchedContent, PublishAdapter, PublishReceipt, ReasoningAdapter, ScrapeAdapter,
    SearchAdapter, UrlMapAdapter,
};

#[cfg(feature = "http")]
use crate::config::ResearchConfig;
use crate::core::PublishTargetKind;
#[cfg(feature = "http")]
use crate::errors::AdapterError;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// The publish backends configured for a run.
///
/// The PDF backend is mandatory; every other backend is optional and is
/// treated as unavailable when absent.
#[derive(Clone)]
pub struct PublisherSet {
    pdf: Arc<dyn PublishAdapter>,
    google_docs: Option<Arc<dyn PublishAdapter>>,
    sharepoint: Option<Arc<dyn PublishAdapter>>,
    confluence: Option<Arc<dyn PublishAdapter>>,
}

impl PublisherSet {
    /// Creates a set with only the PDF backend.
    #[must_use]
    pub fn new(pdf: Arc<dyn PublishAdapter>) -> Self {
        Self {
            pdf,
            google_docs: None,
            sharepoint: None,
            confluence: None,
        }
    }

    /// Registers a backend for `kind`, replacing any previous one.
    #[must_use]
    pub fn with(mut self, kind: PublishTargetKind, adapter: Arc<dyn PublishAdapter>) -> Self {
        match kind {
            PublishTargetKind::Pdf => self.pdf = adapter,
            PublishTargetKind::GoogleDocs => self.google_docs = Some(adapter),
            PublishTargetKind::SharePoint => self.sharepoint = Some(adapter),
            PublishTargetKind::Confluence => self.confluence = Some(adapter),
        }
        self
    }

    /// Returns the backend for `kind`, if configured.
    #[must_use]
    pub fn get(&self, kind: PublishTargetKind) -> Option<&Arc<dyn PublishAdapter>> {
        match kind {
            PublishTargetKind::Pdf => Some(&self.pdf),
            PublishTargetKind::GoogleDocs => self.google_docs.as_ref(),
            PublishTargetKind::SharePoint => self.sharepoint.as_ref(),
            PublishTargetKind::Confluence => self.confluence.as_ref(),
        }
    }

    /// Returns the PDF backend.
    #[must_use]
    pub fn pdf(&self) -> &Arc<dyn PublishAdapter> {
        &self.pdf
    }

    /// Returns true if a backend is configured for `kind`.
    #[must_use]
    pub fn is_available(&self, kind: PublishTargetKind) -> bool {
        self.get(kind).is_some()
    }

    /// The kinds with a configured backend. Always contains PDF.
    #[must_use]
    pub fn available(&self) -> BTreeSet<PublishTargetKind> {
        PublishTargetKind::ALL
            .into_iter()
            .filter(|kind| self.is_available(*kind))
            .collect()
    }
}

impl fmt::Debug for PublisherSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublisherSet")
            .field("available", &self.available())
            .finish()
    }
}

/// Every external capability a run uses.
#[derive(Clone)]
pub struct ToolAdapterSet {
    /// Web search.
    pub search: Arc<dyn SearchAdapter>,
    /// Crawl mapping.
    pub mapper: Arc<dyn UrlMapAdapter>,
    /// Content extraction.
    pub scraper: Arc<dyn ScrapeAdapter>,
    /// Report synthesis.
    pub reasoner: Arc<dyn ReasoningAdapter>,
    /// Publish backends.
    pub publishers: PublisherSet,
}

impl ToolAdapterSet {
    /// Creates a set with the given capabilities and PDF publisher.
    #[must_use]
    pub fn new(
        search: Arc<dyn SearchAdapter>,
        mapper: Arc<dyn UrlMapAdapter>,
        scraper: Arc<dyn ScrapeAdapter>,
        reasoner: Arc<dyn ReasoningAdapter>,
        pdf: Arc<dyn PublishAdapter>,
    ) -> Self {
        Self {
            search,
            mapper,
            scraper,
            reasoner,
            publishers: PublisherSet::new(pdf),
        }
    }

    /// Builds a set from configuration: HTTP scraping and same-site mapping,
    /// plus a local PDF publisher writing to `config.output_dir`.
    ///
    /// Search and reasoning have no generic implementation and are supplied
    /// by the caller.
    #[cfg(feature = "http")]
    pub fn from_config(
        config: &ResearchConfig,
        search: Arc<dyn SearchAdapter>,
        reasoner: Arc<dyn ReasoningAdapter>,
    ) -> Result<Self, AdapterError> {
        let timeout = config.adapter_timeout();
        let mapper = SameSiteLinkMapper::new(timeout, config.max_urls)?;
        let scraper = HttpScrapeAdapter::new(timeout)?;
        Ok(Self::new(
            search,
            Arc::new(mapper),
            Arc::new(scraper),
            reasoner,
            Arc::new(LocalPdfPublisher::new(config.output_dir.clone())),
        ))
    }

    /// Registers a publish backend.
    #[must_use]
    pub fn with_publisher(mut self, kind: PublishTargetKind, adapter: Arc<dyn PublishAdapter>) -> Self {
        self.publishers = self.publishers.with(kind, adapter);
        self
    }
}

impl fmt::Debug for ToolAdapterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolAdapterSet")
            .field("search", &self.search.name())
            .field("mapper", &self.mapper.name())
            .field("scraper", &self.scraper.name())
            .field("reasoner", &self.reasoner.name())
            .field("publishers", &self.publishers)
            .finish()
    }
}
