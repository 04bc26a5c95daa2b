//! HTTP-backed scraping and link mapping.
//!
//! Both adapters are generic: they work against any public web page and need
//! no credentials.

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::protocols::{FetchedContent, ScrapeAdapter, UrlMapAdapter};
use crate::errors::AdapterError;

const USER_AGENT: &str = concat!("researchflow/", env!("CARGO_PKG_VERSION"));
const SKIPPED_TAGS: [&str; 5] = ["script", "style", "noscript", "template", "svg"];

fn build_client(adapter: &str, timeout: Duration) -> Result<Client, AdapterError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(timeout)
        .build()
        .map_err(|e| AdapterError::unavailable(adapter, format!("failed to build HTTP client: {e}")))
}

fn map_reqwest_error(adapter: &str, timeout: Duration, err: &reqwest::Error) -> AdapterError {
    if err.is_timeout() {
        AdapterError::timeout(adapter, timeout)
    } else if let Some(status) = err.status() {
        AdapterError::status(adapter, status.as_u16())
    } else {
        AdapterError::transport(adapter, err.to_string())
    }
}

/// Extracts the visible text of an HTML document.
///
/// Text inside script, style and similar non-content elements is dropped and
/// whitespace is collapsed.
#[must_use]
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut words: Vec<&str> = Vec::new();

    for node in document.tree.root().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|e| SKIPPED_TAGS.contains(&e.name()))
        });
        if !hidden {
            words.extend(text.split_whitespace());
        }
    }

    words.join(" ")
}

/// Same-host, http(s) links on a page, resolved against `base` in document order.
fn same_site_links(html: &str, base: &Url) -> Vec<String> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if href.starts_with('#') || href.starts_with("javascript:") || href.starts_with("mailto:") {
            continue;
        }
        let Ok(mut resolved) = base.join(href) else {
            continue;
        };
        resolved.set_fragment(None);
        if !matches!(resolved.scheme(), "http" | "https") || resolved.host_str() != base.host_str() {
            continue;
        }
        let link = resolved.to_string();
        if seen.insert(link.clone()) {
            links.push(link);
        }
    }

    links
}

/// Fetches pages over HTTP and reduces them to their visible text.
#[derive(Debug, Clone)]
pub struct HttpScrapeAdapter {
    client: Client,
    timeout: Duration,
}

impl HttpScrapeAdapter {
    const NAME: &'static str = "http-scrape";

    /// Creates an adapter whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, AdapterError> {
        Ok(Self {
            client: build_client(Self::NAME, timeout)?,
            timeout,
        })
    }
}

#[async_trait]
impl ScrapeAdapter for HttpScrapeAdapter {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn fetch(&self, url: &str) -> Result<FetchedContent, AdapterError> {
        debug!(url, "Fetching page");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| map_reqwest_error(Self::NAME, self.timeout, &e))?;

        let status_code = response.status().as_u16();
        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("text/html") || ct.contains("application/xhtml"));
        let body = response
            .text()
            .await
            .map_err(|e| map_reqwest_error(Self::NAME, self.timeout, &e))?;

        let text = if is_html { extract_text(&body) } else { body };
        Ok(FetchedContent { text, status_code })
    }
}

/// Expands a seed URL into the same-site links found on its page.
#[derive(Debug, Clone)]
pub struct SameSiteLinkMapper {
    client: Client,
    timeout: Duration,
    max_links: usize,
}

impl SameSiteLinkMapper {
    const NAME: &'static str = "same-site-mapper";

    /// Creates a mapper returning at most `max_links` links per seed.
    pub fn new(timeout: Duration, max_links: usize) -> Result<Self, AdapterError> {
        Ok(Self {
            client: build_client(Self::NAME, timeout)?,
            timeout,
            max_links,
        })
    }
}

#[async_trait]
impl UrlMapAdapter for SameSiteLinkMapper {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn map(&self, seed_url: &str) -> Result<Vec<String>, AdapterError> {
        let base = Url::parse(seed_url)
            .map_err(|e| AdapterError::invalid_response(Self::NAME, format!("{seed_url}: {e}")))?;

        let response = self
            .client
            .get(base.as_str())
            .send()
            .await
            .map_err(|e| map_reqwest_error(Self::NAME, self.timeout, &e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::status(Self::NAME, status.as_u16()));
        }
        let body = response
            .text()
            .await
            .map_err(|e| map_reqwest_error(Self::NAME, self.timeout, &e))?;

        let mut links = same_site_links(&body, &base);
        links.truncate(self.max_links);
        Ok(links)
    }
}
