use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::{Result, SpoolError};

/// Per-queue tuning, deserializable from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// How long a message consumed with acknowledgement may stay in flight before it is
    /// redelivered.
    pub ack_timeout_ms: u64,
    /// Maximum number of entries a script writes with a single command.
    pub promotion_batch_size: usize,
    /// Period of the optional background sweep.
    pub sweep_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 30_000,
            promotion_batch_size: 100,
            sweep_interval_ms: 1_000,
        }
    }
}

impl QueueConfig {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.promotion_batch_size == 0 {
            return Err(SpoolError::InvalidConfig(
                "promotion_batch_size must be at least 1".to_string(),
            ));
        }
        if self.sweep_interval_ms == 0 {
            return Err(SpoolError::InvalidConfig(
                "sweep_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = QueueConfig::default();
        assert_eq!(config.ack_timeout(), Duration::from_secs(30));
        assert_eq!(config.promotion_batch_size, 100);
        assert_eq!(config.sweep_interval(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_parsing_with_overrides() {
        let config: QueueConfig = toml::from_str(
            r#"
            ack_timeout_ms = 5000
            promotion_batch_size = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.ack_timeout(), Duration::from_secs(5));
        assert_eq!(config.promotion_batch_size, 10);
        assert_eq!(config.sweep_interval_ms, 1_000);
    }

    #[test]
    fn toml_parsing_empty_uses_defaults() {
        let config: QueueConfig = toml::from_str("").unwrap();
        assert_eq!(config, QueueConfig::default());
    }

    #[test]
    fn zero_batch_size_is_invalid() {
        let config = QueueConfig {
            promotion_batch_size: 0,
            ..QueueConfig::default()
        };
        assert!(matches!(config.validate(), Err(SpoolError::InvalidConfig(_))));
    }
}
