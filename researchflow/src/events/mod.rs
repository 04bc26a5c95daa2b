//! Event sink system for observability.
//!
//! The executor publishes the run lifecycle through an [`EventSink`]. Every
//! payload is a JSON object carrying `run_id`; stage events add `stage` and
//! `attempt`.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// A run began.
pub const RUN_STARTED: &str = "run.started";
/// A run ended, successfully or not.
pub const RUN_COMPLETED: &str = "run.completed";
/// A stage attempt began.
pub const STAGE_STARTED: &str = "stage.started";
/// A stage attempt succeeded.
pub const STAGE_COMPLETED: &str = "stage.completed";
/// A stage attempt failed and will be retried after a delay.
pub const STAGE_RETRYING: &str = "stage.retrying";
/// A stage gave up; the run stops.
pub const STAGE_FAILED: &str = "stage.failed";
