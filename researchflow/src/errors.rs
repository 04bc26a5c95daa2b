//! Error types for the research pipeline.
//!
//! The taxonomy is layered: adapters report [`AdapterError`], the reasoning
//! capability reports [`GenerationError`], and stages translate both into a
//! [`StageError`] that the executor uses to decide between retrying and
//! halting the run. Raw adapter errors never cross the stage boundary.

use crate::core::{Corpus, StageKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// The top-level error type for researchflow operations that are not part of a
/// pipeline run (configuration, prompt parsing, telemetry setup).
#[derive(Debug, Error)]
pub enum ResearchflowError {
    /// Configuration could not be loaded or is invalid.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// The research prompt could not be parsed.
    #[error("{0}")]
    Prompt(#[from] PromptError),

    /// A stage failed outside of a managed run.
    #[error("{0}")]
    Stage(#[from] StageError),

    /// The tracing subscriber could not be installed.
    #[error("failed to initialise tracing: {0}")]
    Telemetry(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reported by a Tool Adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    /// The request could not be delivered (network, DNS, TLS, auth).
    #[error("{adapter}: transport error: {message}")]
    Transport {
        /// The adapter name.
        adapter: String,
        /// Description of the failure.
        message: String,
    },

    /// The remote service answered with an unsuccessful status.
    #[error("{adapter}: unexpected status {status}")]
    Status {
        /// The adapter name.
        adapter: String,
        /// The status code returned.
        status: u16,
    },

    /// The call did not finish within its budget.
    #[error("{adapter}: timed out after {}ms", timeout.as_millis())]
    Timeout {
        /// The adapter name.
        adapter: String,
        /// The budget that was exceeded.
        timeout: Duration,
    },

    /// The run was cancelled while the call was in flight.
    #[error("{adapter}: cancelled")]
    Cancelled {
        /// The adapter name.
        adapter: String,
    },

    /// The adapter is not configured for this run.
    #[error("{adapter}: unavailable: {reason}")]
    Unavailable {
        /// The adapter name.
        adapter: String,
        /// Why the adapter cannot be used.
        reason: String,
    },

    /// The remote service answered with something the adapter cannot decode.
    #[error("{adapter}: invalid response: {message}")]
    InvalidResponse {
        /// The adapter name.
        adapter: String,
        /// Description of the decoding failure.
        message: String,
    },
}

impl AdapterError {
    /// Creates a transport error.
    #[must_use]
    pub fn transport(adapter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            adapter: adapter.into(),
            message: message.into(),
        }
    }

    /// Creates a status error.
    #[must_use]
    pub fn status(adapter: impl Into<String>, status: u16) -> Self {
        Self::Status {
            adapter: adapter.into(),
            status,
        }
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(adapter: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            adapter: adapter.into(),
            timeout,
        }
    }

    /// Creates a cancellation error.
    #[must_use]
    pub fn cancelled(adapter: impl Into<String>) -> Self {
        Self::Cancelled {
            adapter: adapter.into(),
        }
    }

    /// Creates an unavailable error.
    #[must_use]
    pub fn unavailable(adapter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            adapter: adapter.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid response error.
    #[must_use]
    pub fn invalid_response(adapter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            adapter: adapter.into(),
            message: message.into(),
        }
    }

    /// Returns true if the failure is transient and worth another attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Timeout { .. } | Self::InvalidResponse { .. } => true,
            Self::Status { status, .. } => matches!(status, 408 | 429 | 500..=599),
            Self::Cancelled { .. } | Self::Unavailable { .. } => false,
        }
    }

    /// Returns true if the failure was caused by run cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        let kind = match self {
            Self::Transport { .. } => "transport",
            Self::Status { .. } => "status",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled { .. } => "cancelled",
            Self::Unavailable { .. } => "unavailable",
            Self::InvalidResponse { .. } => "invalid_response",
        };
        map.insert("type".to_string(), serde_json::json!(kind));
        map.insert("retryable".to_string(), serde_json::json!(self.is_retryable()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

/// Errors reported by the reasoning (synthesis) capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// The generated output did not have the expected structure.
    #[error("malformed synthesis output: {0}")]
    Malformed(String),

    /// The generator returned nothing usable.
    #[error("empty synthesis output")]
    Empty,

    /// The underlying model call failed.
    #[error("{0}")]
    Adapter(#[from] AdapterError),
}

/// How a stage failure should be treated by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageErrorKind {
    /// Another attempt may succeed.
    Retryable,
    /// The run cannot continue.
    Fatal,
    /// The attempt exceeded its time budget.
    TimedOut,
    /// The run was cancelled.
    Cancelled,
}

/// A stage-level failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Stage {stage} failed ({kind:?}): {message}")]
pub struct StageError {
    /// Stage that failed.
    pub stage: StageKind,
    /// How the failure should be treated.
    pub kind: StageErrorKind,
    /// Description of the failure.
    pub message: String,
    /// Documents the stage finished before it stopped.
    pub partial_corpus: Option<Corpus>,
}

impl StageError {
    /// Creates a new stage error.
    #[must_use]
    pub fn new(stage: StageKind, kind: StageErrorKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
            partial_corpus: None,
        }
    }

    /// Attaches the documents collected before the failure.
    #[must_use]
    pub fn with_partial_corpus(mut self, corpus: Corpus) -> Self {
        self.partial_corpus = Some(corpus);
        self
    }

    /// Creates a retryable stage error.
    #[must_use]
    pub fn retryable(stage: StageKind, message: impl Into<String>) -> Self {
        Self::new(stage, StageErrorKind::Retryable, message)
    }

    /// Creates a fatal stage error.
    #[must_use]
    pub fn fatal(stage: StageKind, message: impl Into<String>) -> Self {
        Self::new(stage, StageErrorKind::Fatal, message)
    }

    /// Creates a timeout stage error.
    #[must_use]
    pub fn timed_out(stage: StageKind, after: Duration) -> Self {
        Self::new(
            stage,
            StageErrorKind::TimedOut,
            format!("attempt exceeded {}ms", after.as_millis()),
        )
    }

    /// Creates a cancellation stage error.
    #[must_use]
    pub fn cancelled(stage: StageKind, reason: impl Into<String>) -> Self {
        Self::new(stage, StageErrorKind::Cancelled, reason)
    }

    /// Translates an adapter error.
    ///
    /// Every adapter failure other than cancellation is retryable at the stage
    /// boundary; the stage policy's attempt budget bounds how often.
    #[must_use]
    pub fn from_adapter(stage: StageKind, err: &AdapterError) -> Self {
        if err.is_cancelled() {
            Self::cancelled(stage, err.to_string())
        } else {
            Self::retryable(stage, err.to_string())
        }
    }

    /// Returns true if the executor may attempt the stage again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, StageErrorKind::Retryable | StageErrorKind::TimedOut)
    }

    /// Returns true if the failure was caused by cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.kind == StageErrorKind::Cancelled
    }
}

/// Error raised when configuration cannot be loaded or validated.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value is out of range or inconsistent.
    #[error("invalid config value for '{field}': {reason}")]
    Invalid {
        /// The offending field.
        field: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An environment variable could not be parsed.
    #[error("invalid value '{value}' for environment variable {var}")]
    Env {
        /// The variable name.
        var: String,
        /// The raw value.
        value: String,
    },

    /// The TOML document could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Creates an invalid value error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Error raised when a prompt cannot be turned into a research request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromptError {
    /// The prompt was empty or whitespace.
    #[error("research prompt is empty")]
    Empty,

    /// Nothing was left after stripping instructions from the prompt.
    #[error("no research topic found in prompt '{0}'")]
    NoTopic(String),

    /// The built-in prompt patterns failed to compile.
    #[error("prompt patterns failed to compile: {0}")]
    Pattern(String),
}
