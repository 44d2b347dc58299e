//! Runtime Configuration
//!
//! Every tunable of the runtime lives in [`RuntimeConfig`]. The defaults
//! describe the production variant: equality short-circuit, batched
//! propagation, a ten-entry undo history and pooled elements.
//!
//! Configs can be loaded from JSON; missing fields fall back to defaults.
//!
//! ```rust,ignore
//! let config = RuntimeConfig::from_json(r#"{ "equality": "always_notify" }"#)?;
//! let rt = Runtime::with_config(config);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How a signal decides whether a write is a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EqualityPolicy {
    /// Writes equal to the current value are dropped without notifying.
    #[default]
    SkipIdentical,

    /// Every write notifies subscribers, even when the value is unchanged.
    AlwaysNotify,
}

/// When subscribers of a written signal are run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushMode {
    /// Writes open a batch; subscribers run in the next frame flush.
    #[default]
    Batched,

    /// Subscribers run inside the write call.
    Synchronous,
}

/// Tunables for a [`Runtime`](crate::reactive::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub equality: EqualityPolicy,
    pub flush_mode: FlushMode,

    /// Number of prior values a signal keeps for `undo`. Zero disables history.
    pub history_capacity: usize,

    /// Maximum pooled elements per tag name.
    pub pool_capacity: usize,

    /// Static children inserted per synchronous/idle chunk.
    pub child_chunk_size: usize,

    /// Upper bound on host loop rounds in `run_until_idle`.
    pub max_flush_rounds: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            equality: EqualityPolicy::SkipIdentical,
            flush_mode: FlushMode::Batched,
            history_capacity: 10,
            pool_capacity: 100,
            child_chunk_size: 10,
            max_flush_rounds: 10_000,
        }
    }
}

impl RuntimeConfig {
    /// Parse and validate a config from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the runtime cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.child_chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "child_chunk_size must be at least 1".into(),
            ));
        }
        if self.max_flush_rounds == 0 {
            return Err(ConfigError::Invalid(
                "max_flush_rounds must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// The minimal variant: synchronous propagation, notify on every write.
    pub fn minimal() -> Self {
        Self {
            equality: EqualityPolicy::AlwaysNotify,
            flush_mode: FlushMode::Synchronous,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_production_variant() {
        let config = RuntimeConfig::default();
        assert_eq!(config.equality, EqualityPolicy::SkipIdentical);
        assert_eq!(config.flush_mode, FlushMode::Batched);
        assert_eq!(config.history_capacity, 10);
        assert_eq!(config.child_chunk_size, 10);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config =
            RuntimeConfig::from_json(r#"{ "equality": "always_notify", "pool_capacity": 4 }"#)
                .unwrap();
        assert_eq!(config.equality, EqualityPolicy::AlwaysNotify);
        assert_eq!(config.pool_capacity, 4);
        assert_eq!(config.flush_mode, FlushMode::Batched);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let err = RuntimeConfig::from_json(r#"{ "child_chunk_size": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = RuntimeConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
