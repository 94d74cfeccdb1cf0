//! Manager settings
//!
//! Loads connection manager settings from a TOML file, falling back to
//! defaults when the file is absent.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use super::Endpoint;

/// Default file name looked up in the working directory
pub const CONFIG_FILE: &str = "ws-lifecycle.toml";

/// Deadline applied by `connect_and_wait` when the caller gives none
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Default buffer size of the event fan-out channel
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Errors that can occur during config operations
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid endpoint URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Unsupported endpoint scheme: {0} (expected ws or wss)")]
    UnsupportedScheme(String),
    #[error("Invalid setting: {0}")]
    Invalid(String),
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Connection manager settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManagerConfig {
    /// Where to connect
    #[serde(default)]
    pub endpoint: Endpoint,
    /// Default establishment deadline in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Number of events buffered per subscriber before it lags
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::new(Endpoint::default())
    }
}

impl ManagerConfig {
    /// Create settings for an endpoint with default timeouts
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Set the default establishment deadline
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the event channel capacity
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Default establishment deadline
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Load settings from a TOML file
    ///
    /// A missing file yields the defaults; a present but malformed file is an error.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: ManagerConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check settings that serde cannot express
    pub fn validate(&self) -> ConfigResult<()> {
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "connect_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_capacity must be greater than zero".to_string(),
            ));
        }
        self.endpoint.request_url()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = ManagerConfig::default();
        assert_eq!(config.connect_timeout(), Duration::from_millis(10_000));
        assert_eq!(config.event_capacity, DEFAULT_EVENT_CAPACITY);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_nonexistent_returns_default() {
        let dir = tempdir().unwrap();
        let config = ManagerConfig::load(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, ManagerConfig::default());
    }

    #[test]
    fn test_load_full_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            r#"
connect_timeout_ms = 2500
event_capacity = 32

[endpoint]
url = "wss://demo.example.com/v3/channel_123"

[endpoint.params]
api_key = "abc"
notify_self = "1"
"#,
        )
        .unwrap();

        let config = ManagerConfig::load(&path).unwrap();
        assert_eq!(config.connect_timeout(), Duration::from_millis(2500));
        assert_eq!(config.event_capacity, 32);
        assert_eq!(config.endpoint.url, "wss://demo.example.com/v3/channel_123");
        assert_eq!(config.endpoint.params.get("api_key").map(String::as_str), Some("abc"));
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[endpoint]\nurl = \"ws://10.0.0.1:7000/\"\n").unwrap();

        let config = ManagerConfig::load(&path).unwrap();
        assert_eq!(config.connect_timeout_ms, DEFAULT_CONNECT_TIMEOUT_MS);
        assert_eq!(config.endpoint.url, "ws://10.0.0.1:7000/");
        assert!(config.endpoint.params.is_empty());
    }

    #[test]
    fn test_load_malformed_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "connect_timeout_ms = \"soon\"").unwrap();

        assert!(matches!(ManagerConfig::load(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = ManagerConfig::default().with_connect_timeout(Duration::ZERO);
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("connect_timeout_ms"));
    }

    #[test]
    fn test_bad_scheme_rejected_on_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[endpoint]\nurl = \"https://example.com/\"\n").unwrap();

        assert!(matches!(
            ManagerConfig::load(&path),
            Err(ConfigError::UnsupportedScheme(_))
        ));
    }
}
