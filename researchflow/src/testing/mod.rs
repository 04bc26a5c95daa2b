//! Testing utilities for research pipelines.
//!
//! This module provides:
//! - Deterministic stub adapters for every capability
//! - A recording publish backend
//! - [`stub_adapters`], a healthy adapter set to start tests from

mod mocks;

pub use mocks::{RecordingPublisher, StubMapper, StubReasoner, StubScraper, StubSearchAdapter};

use crate::adapters::ToolAdapterSet;
use std::sync::Arc;

/// URLs returned by the search adapter in [`stub_adapters`].
pub const STUB_URLS: [&str; 3] = [
    "https://example.com/a",
    "https://example.com/b",
    "https://example.com/c",
];

/// A healthy adapter set: three search hits, no crawl expansions, every
/// fetch succeeding, a two-section report and a confirming PDF backend.
#[must_use]
pub fn stub_adapters() -> ToolAdapterSet {
    ToolAdapterSet::new(
        Arc::new(StubSearchAdapter::with_urls(&STUB_URLS)),
        Arc::new(StubMapper::new()),
        Arc::new(StubScraper::new()),
        Arc::new(StubReasoner::new()),
        Arc::new(RecordingPublisher::new("pdf")),
    )
}
