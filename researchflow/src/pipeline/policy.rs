//! Per-stage execution policy.

use std::time::Duration;

use super::RetryConfig;

/// How the executor runs one stage: how many attempts, how far apart, and how
/// long each attempt may take.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StagePolicy {
    /// Attempt count and backoff.
    pub retry: RetryConfig,
    /// Budget for a whole attempt. Adapter calls carry their own budgets.
    pub attempt_timeout: Option<Duration>,
}

impl StagePolicy {
    /// Creates a policy without an attempt timeout.
    #[must_use]
    pub fn new(retry: RetryConfig) -> Self {
        Self {
            retry,
            attempt_timeout: None,
        }
    }

    /// Sets the attempt timeout.
    #[must_use]
    pub fn with_attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Maximum attempts, including the first.
    #[must_use]
    pub fn max_attempts(&self) -> usize {
        self.retry.max_attempts
    }
}
