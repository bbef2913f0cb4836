//! Timeout configuration for the HTTP transport
//!
//! Speech synthesis responses can be large and slow to produce, so the request
//! timeout defaults well above typical API calls.

use std::time::Duration;
use serde::{Deserialize, Serialize};

/// Timeout configuration for HTTP requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time to establish a connection, in seconds
    pub connect_timeout_secs: u64,
    /// Total time for the entire request including the body, in seconds
    pub request_timeout_secs: u64,
    /// Keep idle pooled connections for this long, in seconds
    pub pool_idle_timeout_secs: Option<u64>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            request_timeout_secs: 120,
            pool_idle_timeout_secs: Some(90),
        }
    }
}

impl TimeoutConfig {
    /// Create a new timeout configuration
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            connect_timeout_secs: connect_timeout.as_secs(),
            request_timeout_secs: request_timeout.as_secs(),
            ..Default::default()
        }
    }

    /// Short timeouts for small requests and tests
    pub fn fast() -> Self {
        Self {
            connect_timeout_secs: 5,
            request_timeout_secs: 15,
            pool_idle_timeout_secs: Some(30),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Apply these timeouts to a reqwest client builder
    pub fn apply(&self, builder: reqwest::ClientBuilder) -> reqwest::ClientBuilder {
        let builder = builder
            .connect_timeout(self.connect_timeout())
            .timeout(self.request_timeout());
        match self.pool_idle_timeout_secs {
            Some(secs) => builder.pool_idle_timeout(Duration::from_secs(secs)),
            None => builder,
        }
    }

    /// Validate timeout configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.connect_timeout_secs == 0 {
            return Err("Connect timeout cannot be zero".to_string());
        }

        if self.request_timeout_secs == 0 {
            return Err("Request timeout cannot be zero".to_string());
        }

        if self.request_timeout_secs < self.connect_timeout_secs {
            return Err("Request timeout should be >= connect timeout".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_config_default() {
        let config = TimeoutConfig::default();
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.request_timeout(), Duration::from_secs(120));
        assert_eq!(config.pool_idle_timeout_secs, Some(90));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_timeout_config_validation() {
        let mut config = TimeoutConfig::default();

        config.connect_timeout_secs = 0;
        assert!(config.validate().is_err());

        config.connect_timeout_secs = 10;
        config.request_timeout_secs = 0;
        assert!(config.validate().is_err());

        config.request_timeout_secs = 5;
        assert!(config.validate().is_err());

        assert!(TimeoutConfig::fast().validate().is_ok());
    }

    #[test]
    fn test_timeout_config_deserializes_partial() {
        let config: TimeoutConfig = serde_json::from_str(r#"{"request_timeout_secs": 300}"#).unwrap();
        assert_eq!(config.request_timeout(), Duration::from_secs(300));
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_apply_builds_client() {
        let builder = TimeoutConfig::new(Duration::from_secs(2), Duration::from_secs(4))
            .apply(reqwest::Client::builder());
        assert!(builder.build().is_ok());
    }
}
