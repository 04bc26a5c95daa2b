//! Core domain model types for researchflow.
//!
//! This module contains the data handed from stage to stage:
//! - The parsed research request and publish target kinds
//! - Search results, URL sets, scraped documents and the analysis report
//! - Stage kinds and the append-only run trace

mod models;
mod status;
mod trace;

pub use models::{
    AnalysisReport, Corpus, FetchStatus, Provenance, PublishResult, PublishTargetKind,
    ReportSection, ResearchRequest, ScrapedDocument, SearchHit, SearchResultSet, UrlSet,
};
pub use status::StageKind;
pub use trace::{AttemptOutcome, RunTrace, TraceEntry};
