//! Engine configuration.

use crate::core::DEFAULT_HISTORY_LIMIT;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading a [`MachineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse machine configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Configuration for one engine.
///
/// Every field has a default, so partial documents are accepted:
///
/// ```rust
/// use waypoint::MachineConfig;
///
/// let config = MachineConfig::from_json(r#"{ "initial_state": "idle" }"#).unwrap();
/// assert_eq!(config.name, "machine");
/// assert_eq!(config.initial_state.as_deref(), Some("idle"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineConfig {
    /// Name used in logs and signals
    #[serde(default = "default_name")]
    pub name: String,

    /// State entered before the first dispatch, if any
    #[serde(default)]
    pub initial_state: Option<String>,

    /// Maximum number of transitions kept in history; 0 disables history
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_name() -> String {
    "machine".to_string()
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            initial_state: None,
            history_limit: default_history_limit(),
        }
    }
}

impl MachineConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = MachineConfig::from_json("{}").unwrap();

        assert_eq!(config, MachineConfig::default());
        assert_eq!(config.history_limit, DEFAULT_HISTORY_LIMIT);
    }

    #[test]
    fn full_document_round_trips() {
        let config = MachineConfig {
            name: "turnstile".to_string(),
            initial_state: Some("locked".to_string()),
            history_limit: 8,
        };

        let json = serde_json::to_string(&config).unwrap();

        assert_eq!(MachineConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn malformed_document_is_a_parse_error() {
        let err = MachineConfig::from_json("{ \"history_limit\": \"lots\" }").unwrap_err();

        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().starts_with("Failed to parse machine configuration"));
    }
}
