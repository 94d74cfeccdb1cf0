//! Connection endpoint
//!
//! The target a manager connects to: a WebSocket URL plus extra connection
//! parameters that travel as query-string pairs (an API key, flags, ...).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

use super::{ConfigError, ConfigResult};

/// Default endpoint used when neither the config file nor the CLI names one
pub const DEFAULT_URL: &str = "ws://127.0.0.1:9000/ws";

/// Query parameter name used for API keys
pub const API_KEY_PARAM: &str = "api_key";

/// Immutable connection target
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Endpoint {
    /// Base WebSocket URL (`ws://` or `wss://`)
    pub url: String,
    /// Extra connection parameters, appended as query pairs
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new(DEFAULT_URL)
    }
}

impl Endpoint {
    /// Create an endpoint with no extra parameters
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add a connection parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Set the API key parameter
    pub fn with_api_key(self, key: impl Into<String>) -> Self {
        self.with_param(API_KEY_PARAM, key)
    }

    /// Build the URL actually dialed by the transport
    ///
    /// Parameters already present in `url` are kept; configured parameters
    /// are appended after them in key order.
    pub fn request_url(&self) -> ConfigResult<Url> {
        let mut url = Url::parse(&self.url).map_err(|e| ConfigError::InvalidUrl {
            url: self.url.clone(),
            source: e,
        })?;

        match url.scheme() {
            "ws" | "wss" => {}
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        }

        if !self.params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.params {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }
}

impl fmt::Display for Endpoint {
    // Parameter values may carry secrets, so only the keys are shown
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)?;
        if !self.params.is_empty() {
            let keys: Vec<&str> = self.params.keys().map(String::as_str).collect();
            write!(f, " [{}]", keys.join(", "))?;
        }
        Ok(())
    }
}
