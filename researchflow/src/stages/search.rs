//! Search stage: topic in, ranked search hits out.

use async_trait::async_trait;
use std::collections::HashSet;
use tracing::debug;

use super::Stage;
use crate::config::ResearchConfig;
use crate::context::StageContext;
use crate::core::{SearchHit, SearchResultSet, StageKind};
use crate::errors::StageError;
use crate::pipeline::StagePolicy;

/// Queries the search adapter once per attempt and keeps the top hits.
#[derive(Debug, Clone)]
pub struct SearchStage {
    policy: StagePolicy,
    top_k: usize,
}

impl SearchStage {
    /// Creates a search stage keeping at most `top_k` hits.
    #[must_use]
    pub fn new(policy: StagePolicy, top_k: usize) -> Self {
        Self {
            policy,
            top_k: top_k.max(1),
        }
    }

    /// Creates a search stage from run configuration.
    #[must_use]
    pub fn from_config(config: &ResearchConfig) -> Self {
        Self::new(config.policy_for(StageKind::Search), config.search_top_k)
    }
}

/// Drops hits without a link and repeated links, keeping the adapter's rank order.
fn rank(hits: Vec<SearchHit>, top_k: usize) -> Vec<SearchHit> {
    let mut seen = HashSet::new();
    hits.into_iter()
        .filter(|hit| {
            let url = hit.url.trim();
            !url.is_empty() && seen.insert(url.to_string())
        })
        .take(top_k)
        .collect()
}

#[async_trait]
impl Stage for SearchStage {
    type Input = String;
    type Output = SearchResultSet;

    fn kind(&self) -> StageKind {
        StageKind::Search
    }

    fn policy(&self) -> &StagePolicy {
        &self.policy
    }

    async fn execute(&self, topic: &String, ctx: &StageContext) -> Result<SearchResultSet, StageError> {
        let adapter = &ctx.adapters().search;
        let hits = ctx
            .call(adapter.name(), ctx.config().adapter_timeout(), adapter.search(topic, self.top_k))
            .await
            .map_err(|e| StageError::from_adapter(StageKind::Search, &e))?;

        let returned = hits.len();
        let ranked = rank(hits, self.top_k);
        debug!(returned, kept = ranked.len(), "Ranked search hits");

        if ranked.is_empty() {
            return Err(StageError::retryable(
                StageKind::Search,
                format!("no search results for '{topic}'"),
            ));
        }
        Ok(SearchResultSet::new(ranked))
    }

    fn summarize(&self, output: &SearchResultSet) -> Option<String> {
        Some(format!("{} hits", output.len()))
    }
}
