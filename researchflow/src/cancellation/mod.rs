//! Cooperative cancellation and bounded fan-out.
//!
//! This module provides:
//! - CancellationToken, shared by every stage and adapter call of a run
//! - WorkerPool, the bounded-concurrency fan-out used by the Scrape stage

mod pool;
mod token;

pub use pool::WorkerPool;
pub use token::CancellationToken;
