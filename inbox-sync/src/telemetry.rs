//! Tracing subscriber initialization.
//!
//! The sync core only emits `tracing` events; installing a subscriber is the
//! embedding application's call. [`init_tracing`] is the stock setup: an
//! `EnvFilter` honoring `RUST_LOG`, plus a pretty or JSON formatter.

use inbox_core::ConfigError;
use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither `RUST_LOG` nor the config names one.
pub const DEFAULT_LOG_FILTER: &str = "inbox_sync=debug,info";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub log_format: LogFormat,
    /// `EnvFilter` directives; `RUST_LOG` takes precedence when set.
    pub log_filter: Option<String>,
}

impl TelemetryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(filter) = &self.log_filter {
            EnvFilter::try_new(filter)
                .map_err(|e| ConfigError::invalid("telemetry.log_filter", e.to_string()))?;
        }
        Ok(())
    }

    fn env_filter(&self) -> Result<EnvFilter, ConfigError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        let directives = self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER);
        EnvFilter::try_new(directives)
            .map_err(|e| ConfigError::invalid("telemetry.log_filter", e.to_string()))
    }
}

/// Install the global tracing subscriber.
///
/// Returns `Ok` without changes if a global subscriber is already set, so
/// tests and embedders may call this more than once.
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), ConfigError> {
    let filter = config.env_filter()?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.log_format {
        LogFormat::Pretty => registry.with(fmt::layer()).try_init().is_ok(),
        LogFormat::Json => registry.with(fmt::layer().json()).try_init().is_ok(),
    };

    if installed {
        tracing::info!(format = ?config.log_format, "Telemetry initialized");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_bad_filter() {
        let config = TelemetryConfig {
            log_filter: Some("inbox_sync=[".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "telemetry.log_filter"
        ));
    }

    #[test]
    fn test_validate_accepts_directives() {
        let config = TelemetryConfig {
            log_format: LogFormat::Json,
            log_filter: Some("inbox_sync=trace,warn".to_string()),
        };
        assert!(config.validate().is_ok());
        assert!(TelemetryConfig::default().validate().is_ok());
    }

    #[test]
    fn test_init_is_repeatable() {
        let config = TelemetryConfig::default();
        assert!(init_tracing(&config).is_ok());
        assert!(init_tracing(&config).is_ok());
    }
}
