//! Tracing subscriber setup.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing_subscriber::{fmt, EnvFilter};

use crate::errors::ResearchflowError;

/// Default filter when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "researchflow=info";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` overrides [`DEFAULT_FILTER`]. Fails if a global subscriber is
/// already installed.
pub fn init_tracing(format: LogFormat) -> Result<(), ResearchflowError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let installed = match format {
        LogFormat::Text => fmt().with_env_filter(env_filter).with_target(false).try_init(),
        LogFormat::Json => fmt().json().with_env_filter(env_filter).try_init(),
    };
    installed.map_err(|e| ResearchflowError::Telemetry(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("text".parse::<LogFormat>(), Ok(LogFormat::Text));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_second_init_fails() {
        // Another test may have installed a subscriber first; either way the
        // second call must report an error rather than panic.
        let _ = init_tracing(LogFormat::Text);
        assert!(matches!(
            init_tracing(LogFormat::Json),
            Err(ResearchflowError::Telemetry(_))
        ));
    }
}
