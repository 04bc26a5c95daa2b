//! Run configuration.
//!
//! [`ResearchConfig`] is loaded from TOML, overridden from `RESEARCH_*`
//! environment variables, and validated before a run starts. Credentials for
//! external services are never part of it; adapters obtain those themselves.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::core::{PublishTargetKind, StageKind};
use crate::errors::ConfigError;
use crate::pipeline::{BackoffStrategy, JitterStrategy, RetryConfig, StagePolicy};

/// Analyze gets its first attempt plus at most one reattempt.
pub const MAX_ANALYZE_ATTEMPTS: usize = 2;

/// Attempts per stage, including the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageAttempts {
    /// Search attempts.
    #[serde(default = "default_search_attempts")]
    pub search: usize,
    /// Map attempts.
    #[serde(default = "default_map_attempts")]
    pub map: usize,
    /// Scrape attempts.
    #[serde(default = "default_scrape_attempts")]
    pub scrape: usize,
    /// Analyze attempts.
    #[serde(default = "default_analyze_attempts")]
    pub analyze: usize,
    /// Publish attempts.
    #[serde(default = "default_publish_attempts")]
    pub publish: usize,
}

fn default_search_attempts() -> usize {
    3
}

fn default_map_attempts() -> usize {
    2
}

fn default_scrape_attempts() -> usize {
    2
}

fn default_analyze_attempts() -> usize {
    2
}

fn default_publish_attempts() -> usize {
    1
}

impl Default for StageAttempts {
    fn default() -> Self {
        Self {
            search: default_search_attempts(),
            map: default_map_attempts(),
            scrape: default_scrape_attempts(),
            analyze: default_analyze_attempts(),
            publish: default_publish_attempts(),
        }
    }
}

impl StageAttempts {
    /// Attempts configured for `stage`.
    #[must_use]
    pub fn get(&self, stage: StageKind) -> usize {
        match stage {
            StageKind::Search => self.search,
            StageKind::Map => self.map,
            StageKind::Scrape => self.scrape,
            StageKind::Analyze => self.analyze,
            StageKind::Publish => self.publish,
        }
    }

    fn get_mut(&mut self, stage: StageKind) -> &mut usize {
        match stage {
            StageKind::Search => &mut self.search,
            StageKind::Map => &mut self.map,
            StageKind::Scrape => &mut self.scrape,
            StageKind::Analyze => &mut self.analyze,
            StageKind::Publish => &mut self.publish,
        }
    }
}

/// Delay between attempts of the same stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay before the first retry in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound on any delay in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// How delays grow between attempts.
    #[serde(default)]
    pub strategy: BackoffStrategy,
    /// Jitter applied to each delay.
    #[serde(default)]
    pub jitter: JitterStrategy,
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            strategy: BackoffStrategy::default(),
            jitter: JitterStrategy::default(),
        }
    }
}

/// Configuration for a research run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Backend used when the request names no platform.
    #[serde(default = "default_target")]
    pub default_target: PublishTargetKind,
    /// Search results kept after ranking.
    #[serde(default = "default_search_top_k")]
    pub search_top_k: usize,
    /// Ceiling on the number of URLs handed to Scrape.
    #[serde(default = "default_max_urls")]
    pub max_urls: usize,
    /// Scrape worker pool size.
    #[serde(default = "default_scrape_concurrency")]
    pub scrape_concurrency: usize,
    /// Scrape fails below this many successful fetches.
    #[serde(default = "default_min_successful_fetches")]
    pub min_successful_fetches: usize,
    /// Scrape fails below this fraction of successful fetches.
    #[serde(default)]
    pub min_success_ratio: f64,
    /// Budget for one search, map, scrape or publish call, in seconds.
    #[serde(default = "default_adapter_timeout_secs")]
    pub adapter_timeout_secs: u64,
    /// Budget for one synthesis call, in seconds.
    #[serde(default = "default_reasoning_timeout_secs")]
    pub reasoning_timeout_secs: u64,
    /// Optional budget for a whole stage attempt, in seconds.
    #[serde(default)]
    pub stage_timeout_secs: Option<u64>,
    /// Attempts per stage.
    #[serde(default)]
    pub retries: StageAttempts,
    /// Backoff between attempts.
    #[serde(default)]
    pub backoff: BackoffConfig,
    /// Directory the local PDF publisher writes to.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_target() -> PublishTargetKind {
    PublishTargetKind::Pdf
}

fn default_search_top_k() -> usize {
    10
}

fn default_max_urls() -> usize {
    25
}

fn default_scrape_concurrency() -> usize {
    5
}

fn default_min_successful_fetches() -> usize {
    1
}

fn default_adapter_timeout_secs() -> u64 {
    30
}

fn default_reasoning_timeout_secs() -> u64 {
    120
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./research-output")
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            default_target: default_target(),
            search_top_k: default_search_top_k(),
            max_urls: default_max_urls(),
            scrape_concurrency: default_scrape_concurrency(),
            min_successful_fetches: default_min_successful_fetches(),
            min_success_ratio: 0.0,
            adapter_timeout_secs: default_adapter_timeout_secs(),
            reasoning_timeout_secs: default_reasoning_timeout_secs(),
            stage_timeout_secs: None,
            retries: StageAttempts::default(),
            backoff: BackoffConfig::default(),
            output_dir: default_output_dir(),
        }
    }
}

impl ResearchConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a TOML document. Missing fields take their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Defaults overridden by `RESEARCH_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Overrides fields from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|var| std::env::var(var).ok())
    }

    /// Overrides fields from `lookup`, which maps a variable name to its value.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(target) = env_value::<PublishTargetKind, _>(&lookup, "RESEARCH_DEFAULT_TARGET")? {
            self.default_target = target;
        }
        if let Some(v) = env_value(&lookup, "RESEARCH_SEARCH_TOP_K")? {
            self.search_top_k = v;
        }
        if let Some(v) = env_value(&lookup, "RESEARCH_MAX_URLS")? {
            self.max_urls = v;
        }
        if let Some(v) = env_value(&lookup, "RESEARCH_SCRAPE_CONCURRENCY")? {
            self.scrape_concurrency = v;
        }
        if let Some(v) = env_value(&lookup, "RESEARCH_MIN_SUCCESSFUL_FETCHES")? {
            self.min_successful_fetches = v;
        }
        if let Some(v) = env_value(&lookup, "RESEARCH_MIN_SUCCESS_RATIO")? {
            self.min_success_ratio = v;
        }
        if let Some(v) = env_value(&lookup, "RESEARCH_ADAPTER_TIMEOUT_SECS")? {
            self.adapter_timeout_secs = v;
        }
        if let Some(v) = env_value(&lookup, "RESEARCH_REASONING_TIMEOUT_SECS")? {
            self.reasoning_timeout_secs = v;
        }
        if let Some(raw) = lookup("RESEARCH_STAGE_TIMEOUT_SECS") {
            let trimmed = raw.trim();
            self.stage_timeout_secs = if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
                None
            } else {
                Some(trimmed.parse().map_err(|_| ConfigError::Env {
                    var: "RESEARCH_STAGE_TIMEOUT_SECS".to_string(),
                    value: raw.clone(),
                })?)
            };
        }
        for stage in StageKind::ALL {
            let var = format!("RESEARCH_RETRIES_{}", stage.as_str().to_uppercase());
            if let Some(v) = env_value(&lookup, &var)? {
                *self.retries.get_mut(stage) = v;
            }
        }
        if let Some(v) = env_value(&lookup, "RESEARCH_BACKOFF_BASE_MS")? {
            self.backoff.base_delay_ms = v;
        }
        if let Some(v) = env_value(&lookup, "RESEARCH_BACKOFF_MAX_MS")? {
            self.backoff.max_delay_ms = v;
        }
        if let Some(raw) = lookup("RESEARCH_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(raw);
        }
        self.validate()
    }

    /// Rejects values no run could work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.search_top_k == 0 {
            return Err(ConfigError::invalid("search_top_k", "must be at least 1"));
        }
        if self.max_urls == 0 {
            return Err(ConfigError::invalid("max_urls", "must be at least 1"));
        }
        if self.scrape_concurrency == 0 {
            return Err(ConfigError::invalid("scrape_concurrency", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.min_success_ratio) {
            return Err(ConfigError::invalid(
                "min_success_ratio",
                format!("{} is outside [0, 1]", self.min_success_ratio),
            ));
        }
        if self.adapter_timeout_secs == 0 {
            return Err(ConfigError::invalid("adapter_timeout_secs", "must be at least 1"));
        }
        if self.reasoning_timeout_secs == 0 {
            return Err(ConfigError::invalid("reasoning_timeout_secs", "must be at least 1"));
        }
        if self.stage_timeout_secs == Some(0) {
            return Err(ConfigError::invalid("stage_timeout_secs", "must be at least 1"));
        }
        for stage in StageKind::ALL {
            if self.retries.get(stage) == 0 {
                return Err(ConfigError::invalid(
                    format!("retries.{stage}"),
                    "must allow at least one attempt",
                ));
            }
        }
        if self.retries.analyze > MAX_ANALYZE_ATTEMPTS {
            return Err(ConfigError::invalid(
                "retries.analyze",
                format!("at most {MAX_ANALYZE_ATTEMPTS} attempts (one reattempt)"),
            ));
        }
        if self.backoff.base_delay_ms > self.backoff.max_delay_ms {
            return Err(ConfigError::invalid(
                "backoff.base_delay_ms",
                "must not exceed backoff.max_delay_ms",
            ));
        }
        Ok(())
    }

    /// Budget for one tool adapter call.
    #[must_use]
    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_secs(self.adapter_timeout_secs)
    }

    /// Budget for one synthesis call.
    #[must_use]
    pub fn reasoning_timeout(&self) -> Duration {
        Duration::from_secs(self.reasoning_timeout_secs)
    }

    /// Budget for a whole stage attempt, if any.
    #[must_use]
    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_secs.map(Duration::from_secs)
    }

    /// Retry behavior for `stage`.
    #[must_use]
    pub fn retry_config(&self, stage: StageKind) -> RetryConfig {
        RetryConfig::new()
            .with_max_attempts(self.retries.get(stage))
            .with_base_delay_ms(self.backoff.base_delay_ms)
            .with_max_delay_ms(self.backoff.max_delay_ms)
            .with_backoff(self.backoff.strategy)
            .with_jitter(self.backoff.jitter)
    }

    /// Retry and timeout policy for `stage`.
    #[must_use]
    pub fn policy_for(&self, stage: StageKind) -> StagePolicy {
        StagePolicy::new(self.retry_config(stage)).with_attempt_timeout(self.stage_timeout())
    }
}

fn env_value<T, F>(lookup: &F, var: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| ConfigError::Env {
            var: var.to_string(),
            value: raw,
        }),
    }
}
