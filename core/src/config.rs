//! Connector configuration loading.
//!
//! The asset configuration is a JSON object with the appliance URL, the API
//! key and secret, and whether to verify the server certificate. Values from
//! the environment override the file, which lets secrets stay out of it.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_SERVER_URL: &str = "CISCOTA_SERVER_URL";
pub const ENV_API_KEY: &str = "CISCOTA_API_KEY";
pub const ENV_API_SECRET: &str = "CISCOTA_API_SECRET";
pub const ENV_VERIFY_SERVER_CERT: &str = "CISCOTA_VERIFY_SERVER_CERT";

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Process-wide connection settings, read-only once loaded.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorConfig {
    pub server_url: String,
    pub api_key: String,
    pub api_secret: String,
    /// Off unless configured; production deployments should turn it on.
    #[serde(default)]
    pub verify_server_cert: bool,
}

impl fmt::Debug for ConnectorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorConfig")
            .field("server_url", &self.server_url)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("verify_server_cert", &self.verify_server_cert)
            .finish()
    }
}

impl ConnectorConfig {
    pub fn new(
        server_url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            verify_server_cert: false,
        }
    }

    pub fn with_verify_server_cert(mut self, verify: bool) -> Self {
        self.verify_server_cert = verify;
        self
    }

    /// Base URL without trailing slashes.
    pub fn base_url(&self) -> &str {
        self.server_url.trim().trim_end_matches('/')
    }

    /// Overlay values returned by `lookup` (an environment accessor).
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_SERVER_URL) {
            self.server_url = url;
        }
        if let Some(key) = lookup(ENV_API_KEY) {
            self.api_key = key;
        }
        if let Some(secret) = lookup(ENV_API_SECRET) {
            self.api_secret = secret;
        }
        if let Some(verify) = lookup(ENV_VERIFY_SERVER_CERT) {
            self.verify_server_cert = parse_flag(&verify).ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "{ENV_VERIFY_SERVER_CERT} must be true or false, got '{verify}'"
                ))
            })?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url().is_empty() {
            return Err(ConfigError::Invalid("server_url must not be empty".to_string()));
        }
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::Invalid("api_key must not be empty".to_string()));
        }
        if self.api_secret.is_empty() {
            return Err(ConfigError::Invalid("api_secret must not be empty".to_string()));
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Load the configuration file, then apply environment overrides.
pub fn load_config(path: &Path) -> Result<ConnectorConfig, ConfigError> {
    load_config_with(path, |name| std::env::var(name).ok())
}

/// Load the configuration file with overrides from `lookup`.
pub fn load_config_with<F>(path: &Path, lookup: F) -> Result<ConnectorConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let content = fs::read_to_string(path)?;
    let config: ConnectorConfig = serde_json::from_str(&content)?;
    let config = config.apply_overrides(lookup)?;
    config.validate()?;
    Ok(config)
}

/// Build the configuration from the environment alone.
pub fn load_from_env() -> Result<ConnectorConfig, ConfigError> {
    let config = ConnectorConfig::default().apply_overrides(|name| std::env::var(name).ok())?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn verify_flag_defaults_to_false() {
        let config: ConnectorConfig = serde_json::from_str(
            r#"{"server_url":"https://ta.example.com/","api_key":"k","api_secret":"s"}"#,
        )
        .unwrap();
        assert!(!config.verify_server_cert);
        assert_eq!(config.base_url(), "https://ta.example.com");
    }

    #[test]
    fn overrides_replace_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_API_SECRET, "from-env"),
            (ENV_VERIFY_SERVER_CERT, "yes"),
        ]);
        let config = ConnectorConfig::new("https://ta", "k", "s")
            .apply_overrides(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.api_secret, "from-env");
        assert_eq!(config.api_key, "k");
        assert!(config.verify_server_cert);
    }

    #[test]
    fn bad_verify_flag_is_rejected() {
        let err = ConnectorConfig::default()
            .apply_overrides(|name| (name == ENV_VERIFY_SERVER_CERT).then(|| "maybe".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn validate_requires_credentials() {
        assert!(ConnectorConfig::new("https://ta", "", "s").validate().is_err());
        assert!(ConnectorConfig::new("https://ta", "k", "").validate().is_err());
        assert!(ConnectorConfig::new("/", "k", "s").validate().is_err());
        assert!(ConnectorConfig::new("https://ta", "k", "s").validate().is_ok());
    }

    #[test]
    fn load_config_reads_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"server_url":"https://ta.example.com","api_key":"k","api_secret":"s","verify_server_cert":true}}"#
        )
        .unwrap();
        let config = load_config_with(file.path(), |_| None).unwrap();
        assert_eq!(config.server_url, "https://ta.example.com");
        assert!(config.verify_server_cert);
    }

    #[test]
    fn load_config_applies_overrides_over_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"server_url":"https://ta.example.com","api_key":"k","api_secret":"s","verify_server_cert":true}}"#
        )
        .unwrap();
        let config = load_config_with(file.path(), |name| {
            (name == ENV_VERIFY_SERVER_CERT).then(|| "false".to_string())
        })
        .unwrap();
        assert!(!config.verify_server_cert);
        assert_eq!(config.api_key, "k");
    }

    #[test]
    fn load_config_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(load_config(file.path()), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn debug_redacts_secret() {
        let rendered = format!("{:?}", ConnectorConfig::new("https://ta", "k", "topsecret"));
        assert!(!rendered.contains("topsecret"));
    }
}
