//! Configuration management for the CLI
//!
//! Configuration is loaded from, in order of precedence:
//! - Command-line arguments
//! - A file named by `--config` / `KEYVOX_CONFIG` (YAML, TOML or JSON)
//! - The first default location that exists
//! - Built-in defaults

use crate::error::{Error, Result};
use crate::logging::LoggingConfig;
use keyvox_core::{
    GatewayConfig, ProviderCatalog, RateLimitConfig, RetryPolicy, TimeoutConfig, VaultOptions,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Vault location and key derivation
    pub vault: VaultConfig,

    /// Retry policy for vendor calls
    pub retry: RetryPolicy,

    /// Per-vendor rate limits
    pub rate_limits: RateLimitConfig,

    /// HTTP timeouts
    pub timeouts: TimeoutConfig,

    /// Per-vendor endpoint, price and region overrides
    pub providers: ProviderCatalog,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// Vault configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Path of the vault file
    pub path: PathBuf,

    /// PBKDF2 iterations for a new vault or a password change; an existing
    /// vault keeps the count it was created with
    pub kdf_iterations: u32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            path: default_vault_path(),
            kdf_iterations: VaultOptions::default().kdf_iterations,
        }
    }
}

/// `<data dir>/keyvox/vault.json`, falling back to `~/.keyvox/vault.json`
pub fn default_vault_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("keyvox"))
        .or_else(|| dirs::home_dir().map(|home| home.join(".keyvox")))
        .unwrap_or_else(|| PathBuf::from(".keyvox"))
        .join("vault.json")
}

/// Supported file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    Yaml,
    Toml,
    Json,
}

impl FileFormat {
    fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("toml") => FileFormat::Toml,
            _ => FileFormat::Json,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, FileFormat::from_path(path))
    }

    fn parse(content: &str, format: FileFormat) -> Result<Self> {
        let config = match format {
            FileFormat::Yaml => serde_yaml::from_str(content)?,
            FileFormat::Toml => toml::from_str(content)?,
            FileFormat::Json => serde_json::from_str(content)?,
        };
        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        for path in Self::default_config_paths() {
            if path.exists() {
                match Self::from_file(&path) {
                    Ok(config) => {
                        tracing::debug!(path = %path.display(), "Loaded configuration");
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), "Failed to load config: {}", e);
                    }
                }
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file or default locations
    pub fn load_with_file(file: Option<&Path>) -> Result<Self> {
        match file {
            Some(path) => Self::from_file(path),
            None => Self::load(),
        }
    }

    /// Default configuration file paths to check
    fn default_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from(".keyvox.yaml"),
            PathBuf::from(".keyvox.toml"),
            PathBuf::from(".keyvox.json"),
        ];

        if let Some(config_dir) = dirs::config_dir() {
            let keyvox_dir = config_dir.join("keyvox");
            paths.push(keyvox_dir.join("config.yaml"));
            paths.push(keyvox_dir.join("config.toml"));
            paths.push(keyvox_dir.join("config.json"));
        }

        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(".keyvox.yaml"));
            paths.push(home_dir.join(".keyvox.toml"));
        }

        paths
    }

    /// Apply command-line overrides
    pub fn with_vault_path(mut self, path: Option<PathBuf>) -> Self {
        if let Some(path) = path {
            self.vault.path = path;
        }
        self
    }

    /// Gateway configuration for the core library
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            retry: self.retry.clone(),
            rate_limits: self.rate_limits.clone(),
            timeouts: self.timeouts.clone(),
            providers: self.providers.clone(),
            vault: VaultOptions {
                kdf_iterations: self.vault.kdf_iterations,
            },
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.gateway_config()
            .validate()
            .map_err(|e| Error::config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyvox_core::Provider;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.vault.path.ends_with("vault.json"));
        assert_eq!(config.vault.kdf_iterations, 100_000);
    }

    #[test]
    fn test_yaml_config() {
        let yaml = r#"
vault:
  path: /tmp/keyvox-test/vault.json
retry:
  max_retries: 5
  initial_delay_ms: 250
rate_limits:
  default_limit:
    capacity: 20
    window_ms: 60000
  provider_limits:
    elevenlabs:
      capacity: 2
      window_ms: 1000
providers:
  openai:
    base_url: http://localhost:8080
logging:
  format: json
"#;
        let config = Config::parse(yaml, FileFormat::Yaml).unwrap();

        assert_eq!(config.vault.path, PathBuf::from("/tmp/keyvox-test/vault.json"));
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.initial_delay_ms, 250);
        assert_eq!(config.retry.backoff_multiplier, 2.0);
        assert_eq!(config.rate_limits.limit_for("elevenlabs").capacity, 2);
        assert_eq!(config.rate_limits.limit_for("openai").capacity, 20);
        assert_eq!(
            config.providers.settings(Provider::OpenAi).base_url.as_deref(),
            Some("http://localhost:8080")
        );
        assert_eq!(config.logging.format, crate::logging::LogFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_config() {
        let toml = r#"
[vault]
kdf_iterations = 200000

[retry]
max_retries = 2
use_jitter = false

[timeouts]
request_timeout_secs = 30
"#;
        let config = Config::parse(toml, FileFormat::Toml).unwrap();

        assert_eq!(config.vault.kdf_iterations, 200_000);
        assert_eq!(config.retry.max_retries, 2);
        assert!(!config.retry.use_jitter);
        assert_eq!(config.timeouts.request_timeout_secs, 30);

        let gateway = config.gateway_config();
        assert_eq!(gateway.vault.kdf_iterations, 200_000);
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let json = r#"{"rate_limits": {"default_limit": {"capacity": 0, "window_ms": 60000}}}"#;
        let config = Config::parse(json, FileFormat::Json).unwrap();
        let error = config.validate().unwrap_err();
        assert!(error.to_string().contains("rate_limits"));
    }

    #[test]
    fn test_from_file_by_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keyvox.toml");
        std::fs::write(&path, "[retry]\nmax_retries = 4\n").unwrap();

        let config = Config::load_with_file(Some(&path)).unwrap();
        assert_eq!(config.retry.max_retries, 4);

        let missing = Config::from_file(&dir.path().join("absent.yaml"));
        assert!(matches!(missing, Err(Error::FileNotFound { .. })));
    }

    #[test]
    fn test_vault_path_override() {
        let config = Config::default().with_vault_path(Some(PathBuf::from("/tmp/other.json")));
        assert_eq!(config.vault.path, PathBuf::from("/tmp/other.json"));

        let unchanged = config.clone().with_vault_path(None);
        assert_eq!(unchanged.vault.path, PathBuf::from("/tmp/other.json"));
    }
}
