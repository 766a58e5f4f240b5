//! Source-side configuration
//!
//! Defaults match the constants the subsystem has always shipped with; a
//! TOML file may override any subset of them.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DAudioError, Result};
use crate::param::AudioParam;
use crate::ring_buffer::RING_BUFFER_CAPACITY;

/// Configuration shared by every source device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Bound of each device's task queue
    pub task_queue_len: usize,
    /// How long a task waits for the sink's acknowledgement
    pub rpc_wait_timeout_ms: u64,
    /// How long a session waits for its data channel to open
    pub channel_wait_timeout_ms: u64,
    /// Mic ring buffer capacity in bytes
    pub ring_buffer_capacity: usize,
    /// Frames kept for the HDF layer before the oldest is dropped
    pub data_queue_max: usize,
    /// Tick of the mmap transfer tasks
    pub mmap_period_ms: u64,
    /// Parameters used until the HDF layer sets its own
    pub default_param: AudioParam,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            task_queue_len: 20,
            rpc_wait_timeout_ms: 5000,
            channel_wait_timeout_ms: 5000,
            ring_buffer_capacity: RING_BUFFER_CAPACITY,
            data_queue_max: 10,
            mmap_period_ms: 5,
            default_param: AudioParam::default(),
        }
    }
}

impl SourceConfig {
    /// Parse from a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| DAudioError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| DAudioError::config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Reject values the runtime cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.task_queue_len == 0 {
            return Err(DAudioError::config("task_queue_len must be non-zero"));
        }
        if self.ring_buffer_capacity == 0 {
            return Err(DAudioError::config("ring_buffer_capacity must be non-zero"));
        }
        if self.data_queue_max == 0 {
            return Err(DAudioError::config("data_queue_max must be non-zero"));
        }
        if self.mmap_period_ms == 0 {
            return Err(DAudioError::config("mmap_period_ms must be non-zero"));
        }
        if self.default_param.frame_size() > self.ring_buffer_capacity {
            return Err(DAudioError::config(
                "default frame size does not fit in the ring buffer",
            ));
        }
        Ok(())
    }

    pub fn with_task_queue_len(mut self, len: usize) -> Self {
        self.task_queue_len = len;
        self
    }

    pub fn with_rpc_wait_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_wait_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_channel_wait_timeout(mut self, timeout: Duration) -> Self {
        self.channel_wait_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_ring_buffer_capacity(mut self, capacity: usize) -> Self {
        self.ring_buffer_capacity = capacity;
        self
    }

    pub fn with_data_queue_max(mut self, max: usize) -> Self {
        self.data_queue_max = max;
        self
    }

    pub fn with_mmap_period(mut self, period: Duration) -> Self {
        self.mmap_period_ms = period.as_millis() as u64;
        self
    }

    pub fn with_default_param(mut self, param: AudioParam) -> Self {
        self.default_param = param;
        self
    }

    pub fn rpc_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_wait_timeout_ms)
    }

    pub fn channel_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.channel_wait_timeout_ms)
    }

    pub fn mmap_period(&self) -> Duration {
        Duration::from_millis(self.mmap_period_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SourceConfig::default();
        assert_eq!(config.task_queue_len, 20);
        assert_eq!(config.ring_buffer_capacity, 40960);
        assert_eq!(config.rpc_wait_timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_override() {
        let config = SourceConfig::from_toml_str(
            r#"
            task_queue_len = 8
            rpc_wait_timeout_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.task_queue_len, 8);
        assert_eq!(config.rpc_wait_timeout_ms, 250);
        assert_eq!(config.data_queue_max, 10);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            SourceConfig::from_toml_str("task_queue_len = 0"),
            Err(DAudioError::Config { .. })
        ));
        assert!(SourceConfig::from_toml_str("task_queue_len = \"x\"").is_err());
    }

    #[test]
    fn test_builder() {
        let config = SourceConfig::default()
            .with_task_queue_len(4)
            .with_rpc_wait_timeout(Duration::from_millis(100));
        assert_eq!(config.task_queue_len, 4);
        assert_eq!(config.rpc_wait_timeout_ms, 100);
    }
}
