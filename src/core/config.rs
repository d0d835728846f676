use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, time::Duration};
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_retries")]
    pub retries: usize,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_retries() -> usize {
    2
}

fn default_retry_delay_ms() -> u64 {
    500
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: None,
            retries: default_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Where the net worth series comes from.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NetWorthSource {
    /// Use the pre-aggregated `/networth` endpoint
    #[default]
    Remote,
    /// Derive it from every account's value series
    Local,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct NetWorthConfig {
    #[serde(default)]
    pub source: NetWorthSource,
    /// Bucket width for local derivation. Unset means exact timestamps.
    #[serde(default)]
    pub bucket_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub net_worth: NetWorthConfig,
    /// Permit re-fetching an account whose history is already loaded
    #[serde(default)]
    pub allow_refresh: bool,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            api: ApiConfig::default(),
            net_worth: NetWorthConfig::default(),
            allow_refresh: false,
            currency: default_currency(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("dev", "findash", "findash")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let yaml_str = r#"
api:
  base_url: "http://example.com/api"
  timeout_secs: 10
  retries: 0
net_worth:
  source: local
  bucket_secs: 5
allow_refresh: true
currency: "EUR"
"#;

        let config: AppConfig = serde_yaml::from_str(yaml_str).expect("Failed to deserialize");
        assert_eq!(config.api.base_url, "http://example.com/api");
        assert_eq!(config.api.timeout(), Some(Duration::from_secs(10)));
        assert_eq!(config.api.retries, 0);
        assert_eq!(config.api.retry_delay_ms, 500);
        assert_eq!(config.net_worth.source, NetWorthSource::Local);
        assert_eq!(config.net_worth.bucket_secs, Some(5));
        assert!(config.allow_refresh);
        assert_eq!(config.currency, "EUR");
    }

    #[test]
    fn test_config_defaults() {
        let config: AppConfig = serde_yaml::from_str("currency: \"INR\"").unwrap();
        assert_eq!(config.api, ApiConfig::default());
        assert_eq!(config.api.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.net_worth.source, NetWorthSource::Remote);
        assert!(config.net_worth.bucket_secs.is_none());
        assert!(!config.allow_refresh);
        assert_eq!(config.currency, "INR");
    }

    #[test]
    fn test_invalid_net_worth_source() {
        let result: Result<AppConfig, _> = serde_yaml::from_str("net_worth:\n  source: cloud\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_missing_path() {
        let err = AppConfig::load_from_path("/definitely/not/here.yaml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
