//! Error types for sync core operations

use crate::ItemId;
use thiserror::Error;
use uuid::Uuid;

/// Configuration errors. These are programmer errors surfaced at construction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Failed to read config file: {reason}")]
    Io { reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Event source errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EventSourceError {
    #[error("Event source is closed")]
    Closed,

    #[error("Unknown subscription: {token}")]
    UnknownSubscription { token: Uuid },

    #[error("Subscription rejected: {reason}")]
    Rejected { reason: String },
}

/// Optimistic mutation errors, reported through the tracker's error channel.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MutationError {
    #[error("Server operation for {id} failed: {reason}")]
    Server { id: ItemId, reason: String },

    #[error("Server operation for {id} was abandoned before it settled")]
    Cancelled { id: ItemId },
}

impl MutationError {
    pub fn id(&self) -> &ItemId {
        match self {
            Self::Server { id, .. } | Self::Cancelled { id } => id,
        }
    }
}

/// Master error type for the sync core.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Event source error: {0}")]
    EventSource(#[from] EventSourceError),

    #[error("Mutation error: {0}")]
    Mutation(#[from] MutationError),
}

/// Result type alias for sync core operations.
pub type SyncResult<T> = Result<T, SyncError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::invalid("cache.ttl_ms", "must be > 0");
        let msg = format!("{}", err);
        assert!(msg.contains("cache.ttl_ms"));
        assert!(msg.contains("must be > 0"));
    }

    #[test]
    fn test_event_source_error_display_unknown_subscription() {
        let err = EventSourceError::UnknownSubscription { token: Uuid::nil() };
        let msg = format!("{}", err);
        assert!(msg.contains("Unknown subscription"));
        assert!(msg.contains("00000000-0000-0000-0000-000000000000"));
    }

    #[test]
    fn test_mutation_error_display_and_id() {
        let err = MutationError::Server {
            id: ItemId::from("conv-1"),
            reason: "409 conflict".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("conv-1"));
        assert!(msg.contains("409 conflict"));
        assert_eq!(err.id().as_str(), "conv-1");

        let cancelled = MutationError::Cancelled {
            id: ItemId::from("conv-2"),
        };
        assert_eq!(cancelled.id().as_str(), "conv-2");
    }

    #[test]
    fn test_sync_error_from_variants() {
        let config = SyncError::from(ConfigError::invalid("x", "y"));
        assert!(matches!(config, SyncError::Config(_)));

        let source = SyncError::from(EventSourceError::Closed);
        assert!(matches!(source, SyncError::EventSource(_)));

        let mutation = SyncError::from(MutationError::Cancelled {
            id: ItemId::from("a"),
        });
        assert!(matches!(mutation, SyncError::Mutation(_)));
    }
}
