//! Stage kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The five stages of the research pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Web search for the topic.
    Search,
    /// Expansion of search hits into candidate URLs.
    Map,
    /// Content extraction from each candidate URL.
    Scrape,
    /// Synthesis of the scraped corpus into a report.
    Analyze,
    /// Delivery of the report to a publish backend.
    Publish,
}

impl StageKind {
    /// All stages in pipeline order.
    pub const ALL: [Self; 5] = [
        Self::Search,
        Self::Map,
        Self::Scrape,
        Self::Analyze,
        Self::Publish,
    ];

    /// Returns the stage name used in logs, events and traces.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Map => "map",
            Self::Scrape => "scrape",
            Self::Analyze => "analyze",
            Self::Publish => "publish",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_kind_display() {
        assert_eq!(StageKind::Search.to_string(), "search");
        assert_eq!(StageKind::Map.to_string(), "map");
        assert_eq!(StageKind::Scrape.to_string(), "scrape");
        assert_eq!(StageKind::Analyze.to_string(), "analyze");
        assert_eq!(StageKind::Publish.to_string(), "publish");
    }

    #[test]
    fn test_stage_kind_order() {
        let mut shuffled = vec![StageKind::Publish, StageKind::Search, StageKind::Scrape];
        shuffled.sort();
        assert_eq!(shuffled, vec![StageKind::Search, StageKind::Scrape, StageKind::Publish]);
        assert_eq!(StageKind::ALL.first(), Some(&StageKind::Search));
    }

    #[test]
    fn test_stage_kind_serialize() {
        let json = serde_json::to_string(&StageKind::Analyze).unwrap();
        assert_eq!(json, r#""analyze""#);

        let deserialized: StageKind = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, StageKind::Analyze);
    }
}
