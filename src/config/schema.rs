//! Configuration schema.
//!
//! All sections have defaults; a missing file or empty TOML is valid.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial line defaults.
    pub serial: SerialSection,
    /// Engine tuning knobs.
    pub engine: EngineSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Serial line defaults applied when a tool call omits them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSection {
    /// Default baud rate for `configure_connection` calls without one.
    pub default_baud: u32,
    /// Blocking-read window for the reader's poll loop, in milliseconds.
    pub read_timeout_ms: u64,
    /// Largest single read the reader attempts.
    pub read_chunk_size: usize,
}

impl Default for SerialSection {
    fn default() -> Self {
        Self {
            default_baud: 115_200,
            read_timeout_ms: 20,
            read_chunk_size: 4096,
        }
    }
}

impl SerialSection {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Engine tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Inter-byte gap that closes an async packet, in milliseconds.
    pub idle_threshold_ms: u64,
    /// Bound on the reader-to-controller chunk queue.
    pub sync_channel_cap: usize,
    /// Bound on the async packet store; overflow drops oldest.
    pub async_store_cap: usize,
    /// Cap on a single synchronous response buffer.
    pub response_buffer_cap: usize,
    /// Default `timeout_ms` for send_data when the caller omits it.
    pub default_send_timeout_ms: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            idle_threshold_ms: 100,
            sync_channel_cap: 256,
            async_store_cap: 1000,
            response_buffer_cap: 4096,
            default_send_timeout_ms: 5000,
        }
    }
}

impl EngineSection {
    pub fn idle_threshold(&self) -> Duration {
        Duration::from_millis(self.idle_threshold_ms)
    }

    pub fn default_send_timeout(&self) -> Duration {
        Duration::from_millis(self.default_send_timeout_ms)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let config = Config::default();
        assert_eq!(config.serial.default_baud, 115_200);
        assert_eq!(config.serial.read_chunk_size, 4096);
        assert_eq!(config.engine.idle_threshold(), Duration::from_millis(100));
        assert_eq!(config.engine.sync_channel_cap, 256);
        assert_eq!(config.engine.async_store_cap, 1000);
        assert_eq!(config.engine.response_buffer_cap, 4096);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [engine]
            idle_threshold_ms = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.idle_threshold_ms, 50);
        assert_eq!(config.engine.async_store_cap, 1000);
        assert_eq!(config.serial.default_baud, 115_200);
    }

    #[test]
    fn empty_toml_is_valid() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.serial.read_timeout(), Duration::from_millis(20));
    }
}
