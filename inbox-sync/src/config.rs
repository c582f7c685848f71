//! Configuration loading for the sync core.
//!
//! Every section and field is optional; omitted values take the stock
//! defaults. Unknown keys are rejected.

use std::path::Path;
use std::time::Duration;

use inbox_core::ConfigError;
use inbox_storage::CacheConfig;
use serde::{Deserialize, Serialize};

use crate::coalescer::CoalescerConfig;
use crate::telemetry::{LogFormat, TelemetryConfig};
use crate::tracker::{MutationOrdering, RevertPolicy, TrackerConfig};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    pub coalescer: CoalescerSection,
    pub cache: CacheSection,
    pub tracker: TrackerSection,
    pub telemetry: TelemetrySection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoalescerSection {
    pub min_interval_ms: u64,
    pub debounce_window_ms: u64,
}

impl Default for CoalescerSection {
    fn default() -> Self {
        let defaults = CoalescerConfig::default();
        Self {
            min_interval_ms: defaults.min_interval.as_millis() as u64,
            debounce_window_ms: defaults.debounce_window.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSection {
    pub ttl_ms: u64,
    pub max_entries: usize,
}

impl Default for CacheSection {
    fn default() -> Self {
        let defaults = CacheConfig::default();
        Self {
            ttl_ms: defaults.ttl.as_millis() as u64,
            max_entries: defaults.max_entries,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackerSection {
    pub revert_on_failure: bool,
    pub serialize_per_id: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetrySection {
    pub log_format: LogFormat,
    pub log_filter: Option<String>,
}

impl SyncConfig {
    /// Read, parse, and validate a TOML config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            reason: format!("{}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: SyncConfig = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.coalescer.min_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "coalescer.min_interval_ms",
                "must be > 0",
            ));
        }
        if self.coalescer.debounce_window_ms == 0 {
            return Err(ConfigError::invalid(
                "coalescer.debounce_window_ms",
                "must be > 0",
            ));
        }
        self.coalescer_config().validate()?;
        if self.cache.ttl_ms == 0 {
            return Err(ConfigError::invalid("cache.ttl_ms", "must be > 0"));
        }
        if self.cache.max_entries == 0 {
            return Err(ConfigError::invalid("cache.max_entries", "must be > 0"));
        }
        self.telemetry_config().validate()
    }

    pub fn coalescer_config(&self) -> CoalescerConfig {
        CoalescerConfig::new(
            Duration::from_millis(self.coalescer.min_interval_ms),
            Duration::from_millis(self.coalescer.debounce_window_ms),
        )
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .with_ttl(Duration::from_millis(self.cache.ttl_ms))
            .with_max_entries(self.cache.max_entries)
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        let revert = if self.tracker.revert_on_failure {
            RevertPolicy::Revert
        } else {
            RevertPolicy::Keep
        };
        let ordering = if self.tracker.serialize_per_id {
            MutationOrdering::SerializedPerId
        } else {
            MutationOrdering::Concurrent
        };
        TrackerConfig { revert, ordering }
    }

    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            log_format: self.telemetry.log_format,
            log_filter: self.telemetry.log_filter.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_component_defaults() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.coalescer_config(), CoalescerConfig::default());
        assert_eq!(config.cache_config(), CacheConfig::default());
        assert_eq!(config.tracker_config(), TrackerConfig::default());
        assert_eq!(config.telemetry_config(), TelemetryConfig::default());
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = SyncConfig::from_toml_str("").expect("empty config parses");
        assert_eq!(config, SyncConfig::default());
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config = SyncConfig::from_toml_str(
            r#"
            [coalescer]
            debounce_window_ms = 500

            [tracker]
            serialize_per_id = true

            [telemetry]
            log_format = "json"
            "#,
        )
        .expect("valid config");

        let coalescer = config.coalescer_config();
        assert_eq!(coalescer.min_interval, Duration::from_secs(8));
        assert_eq!(coalescer.debounce_window, Duration::from_millis(500));
        assert_eq!(
            config.tracker_config().ordering,
            MutationOrdering::SerializedPerId
        );
        assert_eq!(config.tracker_config().revert, RevertPolicy::Keep);
        assert_eq!(config.telemetry.log_format, LogFormat::Json);
    }

    #[test]
    fn test_unknown_key_is_parse_error() {
        let err = SyncConfig::from_toml_str("[cache]\nttl = 5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_zero_values_rejected() {
        let err = SyncConfig::from_toml_str("[coalescer]\nmin_interval_ms = 0\n").unwrap_err();
        assert_eq!(
            err,
            ConfigError::invalid("coalescer.min_interval_ms", "must be > 0")
        );

        let err = SyncConfig::from_toml_str("[cache]\nmax_entries = 0\n").unwrap_err();
        assert_eq!(err, ConfigError::invalid("cache.max_entries", "must be > 0"));
    }

    #[test]
    fn test_oversized_debounce_rejected() {
        let err = SyncConfig::from_toml_str(&format!(
            "[coalescer]\ndebounce_window_ms = {}\n",
            i64::MAX
        ))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref field, .. } if field == "coalescer.debounce_window"
        ));
    }

    #[test]
    fn test_from_path_reads_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[cache]\nttl_ms = 60000\nmax_entries = 10").expect("write config");

        let config = SyncConfig::from_path(file.path()).expect("config loads");
        assert_eq!(config.cache_config().ttl, Duration::from_secs(60));
        assert_eq!(config.cache_config().max_entries, 10);
    }

    #[test]
    fn test_from_path_missing_file_is_io_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = SyncConfig::from_path(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
