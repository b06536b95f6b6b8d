//! Monitor configuration
//!
//! Every field has a default, so an empty YAML document is a valid config:
//!
//! ```yaml
//! device: ESP32_ADC_Streamer
//! buffer_capacity: 500
//! publish_interval_ms: 50
//! disconnect_timeout_ms: 1000
//! connect_timeout_ms: 10000
//! event_capacity: 1024
//! reset_on_connect: false
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::buffer::DEFAULT_CAPACITY;
use crate::{MonitorError, Result};

/// Name the ESP32 streamer advertises.
pub const DEFAULT_DEVICE: &str = "ESP32_ADC_Streamer";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    /// Target used by `connect_default`
    pub device: String,
    /// Samples kept in the rolling window
    pub buffer_capacity: usize,
    /// Snapshot publication cadence
    pub publish_interval_ms: u64,
    /// Bounded wait for the read loop to exit on disconnect
    pub disconnect_timeout_ms: u64,
    /// Bounded wait for the transport to open
    pub connect_timeout_ms: u64,
    /// Depth of the log event channel
    pub event_capacity: usize,
    /// Start a fresh session each time a connection opens
    pub reset_on_connect: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
            buffer_capacity: DEFAULT_CAPACITY,
            publish_interval_ms: 50,
            disconnect_timeout_ms: 1000,
            connect_timeout_ms: 10_000,
            event_capacity: 1024,
            reset_on_connect: false,
        }
    }
}

impl MonitorConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)
            .map_err(|e| MonitorError::config(format!("YAML parse failed: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| MonitorError::config(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "Loaded monitor config");
        Self::from_yaml_str(&yaml)
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml_ng::to_string(self).map_err(|e| MonitorError::config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            return Err(MonitorError::config("buffer_capacity must be at least 1"));
        }
        if self.publish_interval_ms == 0 {
            return Err(MonitorError::config("publish_interval_ms must be at least 1"));
        }
        if self.event_capacity == 0 {
            return Err(MonitorError::config("event_capacity must be at least 1"));
        }
        if self.device.trim().is_empty() {
            return Err(MonitorError::config("device must not be empty"));
        }
        Ok(())
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.publish_interval_ms)
    }

    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.disconnect_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
