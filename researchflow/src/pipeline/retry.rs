//! Retry policy with configurable backoff and jitter strategies.
//!
//! The executor consults a [`RetryState`] after every failed stage attempt to
//! decide whether to try again and how long to wait first.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the delay grows with each failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// base * 2^(failures - 1)
    #[default]
    Exponential,
    /// base * failures
    Linear,
    /// base
    Constant,
}

impl BackoffStrategy {
    /// Delay in milliseconds after `failures` failed attempts (at least 1),
    /// capped at `max`.
    #[must_use]
    pub fn delay_ms(self, base: u64, max: u64, failures: usize) -> u64 {
        let failures = failures.max(1);
        let delay = match self {
            Self::Exponential => {
                let exponent = u32::try_from(failures - 1).unwrap_or(u32::MAX);
                base.saturating_mul(2u64.saturating_pow(exponent))
            }
            Self::Linear => base.saturating_mul(u64::try_from(failures).unwrap_or(u64::MAX)),
            Self::Constant => base,
        };
        delay.min(max)
    }
}

/// Randomisation applied on top of the backoff delay, so concurrent runs
/// hitting the same service do not retry in lockstep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// The backoff delay as is.
    None,
    /// Uniform in [0, delay].
    #[default]
    Full,
    /// delay / 2 plus uniform in [0, delay / 2].
    Equal,
    /// Uniform in [base, min(max, previous * 3)].
    Decorrelated,
}

impl JitterStrategy {
    fn apply(self, delay: u64, previous: Option<u64>, base: u64, max: u64) -> u64 {
        let mut rng = rand::thread_rng();
        match self {
            Self::None => delay,
            Self::Full if delay == 0 => 0,
            Self::Full => rng.gen_range(0..=delay),
            Self::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rng.gen_range(0..=half)
                }
            }
            Self::Decorrelated => {
                let upper = previous.unwrap_or(base).saturating_mul(3).min(max);
                if upper <= base {
                    base.min(max)
                } else {
                    rng.gen_range(base..=upper)
                }
            }
        }
    }
}

/// Attempt budget and backoff for one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts, including the first.
    pub max_attempts: usize,
    /// Delay before the first retry in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound on any delay in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff strategy.
    pub backoff_strategy: BackoffStrategy,
    /// Jitter strategy.
    pub jitter_strategy: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_strategy: BackoffStrategy::Exponential,
            jitter_strategy: JitterStrategy::Full,
        }
    }
}

impl RetryConfig {
    /// Creates the default config: 3 attempts, exponential from 500ms, full jitter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts. Zero is treated as one.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter_strategy = strategy;
        self
    }
}

/// What the executor does after a retryable failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait, then start another attempt.
    Retry(Duration),
    /// The attempt budget is spent.
    GiveUp,
}

/// Attempt bookkeeping for one stage of one run.
#[derive(Debug, Default)]
pub struct RetryState {
    /// Attempts started so far.
    pub attempt: usize,
    previous_delay_ms: Option<u64>,
}

impl RetryState {
    /// Creates a state with no attempts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the start of an attempt and returns its 1-based number.
    pub fn begin_attempt(&mut self) -> usize {
        self.attempt += 1;
        self.attempt
    }

    /// Returns true if the attempt budget is spent.
    #[must_use]
    pub fn is_exhausted(&self, config: &RetryConfig) -> bool {
        self.attempt >= config.max_attempts
    }

    /// Decides what follows the current attempt's failure.
    pub fn after_failure(&mut self, config: &RetryConfig) -> RetryDecision {
        if self.is_exhausted(config) {
            RetryDecision::GiveUp
        } else {
            RetryDecision::Retry(self.next_delay(config))
        }
    }

    /// The delay before the next attempt, remembered for decorrelated jitter.
    pub fn next_delay(&mut self, config: &RetryConfig) -> Duration {
        let (base, max) = (config.base_delay_ms, config.max_delay_ms);
        let delay = config.backoff_strategy.delay_ms(base, max, self.attempt);
        let jittered = config
            .jitter_strategy
            .apply(delay, self.previous_delay_ms, base, max);

        self.previous_delay_ms = Some(jittered);
        Duration::from_millis(jittered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_strategies() {
        let exp = BackoffStrategy::Exponential;
        assert_eq!(exp.delay_ms(100, 5000, 1), 100);
        assert_eq!(exp.delay_ms(100, 5000, 2), 200);
        assert_eq!(exp.delay_ms(100, 5000, 3), 400);
        assert_eq!(exp.delay_ms(100, 5000, 20), 5000);
        assert_eq!(exp.delay_ms(100, 5000, 0), 100);

        assert_eq!(BackoffStrategy::Linear.delay_ms(100, 5000, 3), 300);
        assert_eq!(BackoffStrategy::Constant.delay_ms(100, 5000, 3), 100);
        assert_eq!(BackoffStrategy::Constant.delay_ms(100, 50, 1), 50);
    }

    #[test]
    fn test_jitter_bounds() {
        for _ in 0..20 {
            assert!(JitterStrategy::Full.apply(100, None, 100, 1000) <= 100);
            let equal = JitterStrategy::Equal.apply(100, None, 100, 1000);
            assert!((50..=100).contains(&equal));
            let decorrelated = JitterStrategy::Decorrelated.apply(100, Some(200), 100, 1000);
            assert!((100..=600).contains(&decorrelated));
        }
        assert_eq!(JitterStrategy::None.apply(123, None, 100, 1000), 123);
        assert_eq!(JitterStrategy::Full.apply(0, None, 0, 1000), 0);
    }

    #[test]
    fn test_retry_config_builder() {
        let config = RetryConfig::new()
            .with_max_attempts(5)
            .with_base_delay_ms(250)
            .with_backoff(BackoffStrategy::Linear)
            .with_jitter(JitterStrategy::Equal);

        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.base_delay_ms, 250);
        assert_eq!(config.backoff_strategy, BackoffStrategy::Linear);
        assert_eq!(config.jitter_strategy, JitterStrategy::Equal);
        assert_eq!(RetryConfig::new().with_max_attempts(0).max_attempts, 1);
    }

    #[test]
    fn test_after_failure_gives_up_when_exhausted() {
        let config = RetryConfig::new()
            .with_max_attempts(2)
            .with_base_delay_ms(100)
            .with_jitter(JitterStrategy::None);
        let mut state = RetryState::new();

        assert_eq!(state.begin_attempt(), 1);
        assert_eq!(
            state.after_failure(&config),
            RetryDecision::Retry(Duration::from_millis(100))
        );

        assert_eq!(state.begin_attempt(), 2);
        assert_eq!(state.after_failure(&config), RetryDecision::GiveUp);
        assert!(state.is_exhausted(&config));
    }

    #[test]
    fn test_single_attempt_never_retries() {
        let config = RetryConfig::new().with_max_attempts(1);
        let mut state = RetryState::new();

        state.begin_attempt();
        assert_eq!(state.after_failure(&config), RetryDecision::GiveUp);
    }
}
