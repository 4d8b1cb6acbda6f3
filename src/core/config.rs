use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::validation::ValidationResult;
use crate::error::MinerError;

const DEFAULT_MAX_FRAME_BYTES: usize = 128 * 1024;
const DEFAULT_MAX_MESSAGE_BYTES: usize = 256 * 1024 * 1024;
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Settings for the chunked transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransportConfig {
    /// Substrate ceiling for a single frame payload, in bytes.
    pub max_frame_bytes: usize,
    /// Largest logical message a receiver will reassemble, in bytes.
    pub max_message_bytes: usize,
    /// Discard partial messages older than this. `None` buffers forever.
    pub reassembly_timeout: Option<Duration>,
    /// How often receive loops look for stale partial messages.
    pub sweep_interval: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            reassembly_timeout: None,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl TransportConfig {
    pub fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }

    pub fn with_max_message_bytes(mut self, max_message_bytes: usize) -> Self {
        self.max_message_bytes = max_message_bytes;
        self
    }

    pub fn with_reassembly_timeout(mut self, timeout: Duration) -> Self {
        self.reassembly_timeout = Some(timeout);
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }
}

/// Top-level settings for a mining run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MinerConfig {
    pub transport: TransportConfig,
    /// Rows requested from an input source per batch.
    pub batch_size: usize,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl MinerConfig {
    pub fn new() -> Self {
        Self {
            transport: TransportConfig::default(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Parses a JSON config document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, MinerError> {
        serde_json::from_str(json).map_err(|e| MinerError::InvalidConfig(e.to_string()))
    }

    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        if self.transport.max_frame_bytes == 0 {
            result.add_error("transport.max_frame_bytes must be greater than 0");
        }
        if self.transport.max_message_bytes < self.transport.max_frame_bytes {
            result.add_error("transport.max_message_bytes must be at least transport.max_frame_bytes");
        }
        if self.batch_size == 0 {
            result.add_error("batch_size must be greater than 0");
        }
        match self.transport.reassembly_timeout {
            None => result.add_warning(
                "no reassembly timeout configured; a lost frame stalls its message forever",
            ),
            Some(timeout) if timeout.is_zero() => {
                result.add_error("transport.reassembly_timeout must be greater than 0")
            }
            Some(_) => {}
        }
        if self.transport.sweep_interval.is_zero() {
            result.add_error("transport.sweep_interval must be greater than 0");
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MinerConfig::new();
        assert_eq!(config.transport.max_frame_bytes, 128 * 1024);
        assert_eq!(config.transport.max_message_bytes, 256 * 1024 * 1024);
        assert_eq!(config.transport.reassembly_timeout, None);
        assert_eq!(config.batch_size, 10_000);
    }

    #[test]
    fn test_message_limit_below_frame_size_is_error() {
        let config = MinerConfig::new().with_transport(
            TransportConfig::default()
                .with_max_frame_bytes(1024)
                .with_max_message_bytes(512),
        );
        let result = config.validate();
        assert!(!result.is_safe());
        assert!(result.errors().iter().any(|e| e.contains("max_message_bytes")));
    }

    #[test]
    fn test_default_config_is_safe_with_warning() {
        let result = MinerConfig::new().validate();
        assert!(result.is_safe());
        assert!(result.has_warnings());
    }

    #[test]
    fn test_zero_sizes_are_errors() {
        let config = MinerConfig::new()
            .with_batch_size(0)
            .with_transport(TransportConfig::default().with_max_frame_bytes(0));
        let result = config.validate();
        assert!(!result.is_safe());
        assert_eq!(result.issues.len(), 3);
    }

    #[test]
    fn test_from_json_str_fills_defaults() {
        let config = MinerConfig::from_json_str(
            r#"{ "transport": { "max_frame_bytes": 512 }, "batch_size": 50 }"#,
        )
        .unwrap();
        assert_eq!(config.transport.max_frame_bytes, 512);
        assert_eq!(config.transport.sweep_interval, Duration::from_secs(1));
        assert_eq!(config.batch_size, 50);
    }

    #[test]
    fn test_from_json_str_rejects_garbage() {
        assert!(matches!(
            MinerConfig::from_json_str("not json"),
            Err(MinerError::InvalidConfig(_))
        ));
    }
}
