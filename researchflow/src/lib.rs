//! # Researchflow
//!
//! A staged research pipeline: a free-text prompt goes in, a published
//! report comes out.
//!
//! Researchflow runs a fixed five-stage pipeline with support for:
//!
//! - **Search → Map → Scrape → Analyze → Publish**: each stage behind a narrow
//!   adapter trait, so any search engine, crawler, model or publishing
//!   platform can be plugged in
//! - **Per-stage retry policy**: bounded attempts with backoff and jitter
//! - **Bounded fan-out**: scraping runs concurrently while keeping URL order
//! - **Graceful degradation**: unavailable or failing publish targets fall
//!   back to a local PDF, reported as a partial run
//! - **Full audit trail**: every stage attempt is recorded in a run trace
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use researchflow::prelude::*;
//!
//! let adapters = ToolAdapterSet::from_config(&config, search, reasoner)?;
//! let orchestrator = Orchestrator::new(config, adapters);
//!
//! let result = orchestrator
//!     .run("Research the history of the internet and publish it to Confluence")
//!     .await;
//! println!("{}: {:?}", result.status, result.publish);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod adapters;
pub mod cancellation;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod orchestrator;
pub mod pipeline;
pub mod resolver;
pub mod stages;
pub mod telemetry;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::adapters::{
        LocalPdfPublisher, PublishAdapter, PublisherSet, ReasoningAdapter, ScrapeAdapter,
        SearchAdapter, ToolAdapterSet, UrlMapAdapter,
    };
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::ResearchConfig;
    pub use crate::core::{
        AnalysisReport, Corpus, PublishResult, PublishTargetKind, ResearchRequest, RunTrace,
        StageKind,
    };
    pub use crate::errors::{
        AdapterError, GenerationError, ResearchflowError, StageError, StageErrorKind,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::orchestrator::{Orchestrator, RunResult, RunStatus};
    pub use crate::resolver::TargetResolver;
    pub use crate::telemetry::{init_tracing, LogFormat};
}
