//! Harness configuration.
//!
//! Values come from an optional TOML file named by `THREESCALE_CONFIG`,
//! overridden by individual `THREESCALE_*` environment variables.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use threescale_api::ClientConfig;
use threescale_telemetry::{LogFormat, TelemetryConfig};

use crate::backoff::Backoff;

/// Environment variable naming the TOML config file.
pub const CONFIG_ENV: &str = "THREESCALE_CONFIG";
/// Environment variable overriding the tenant URL.
pub const URL_ENV: &str = "THREESCALE_URL";
/// Environment variable overriding the access token.
pub const TOKEN_ENV: &str = "THREESCALE_TOKEN";
/// Environment variable overriding TLS verification.
pub const SSL_VERIFY_ENV: &str = "THREESCALE_SSL_VERIFY";
/// Environment variable overriding the log level.
pub const LOG_LEVEL_ENV: &str = "THREESCALE_LOG_LEVEL";
/// Environment variable overriding the service backend URL.
pub const API_BACKEND_ENV: &str = "THREESCALE_API_BACKEND";

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required configuration key was missing
    #[error("missing key: {0}")]
    Missing(&'static str),
    /// A configuration value was invalid
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    /// The config file could not be read
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The config file is not valid TOML for this schema
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Backoff settings as written in the config file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackoffConfig {
    pub max_tries: u32,
    pub base_ms: u64,
    pub factor: u32,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        let backoff = Backoff::default();
        Self {
            max_tries: backoff.max_tries,
            base_ms: backoff.base.as_millis() as u64,
            factor: backoff.factor,
            max_delay_ms: backoff.max_delay.as_millis() as u64,
            jitter: backoff.jitter,
        }
    }
}

impl From<&BackoffConfig> for Backoff {
    fn from(config: &BackoffConfig) -> Self {
        Backoff {
            max_tries: config.max_tries,
            base: Duration::from_millis(config.base_ms),
            factor: config.factor,
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
        }
    }
}

/// Top-level harness configuration.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Tenant admin portal URL.
    pub url: String,
    /// Provider access token.
    pub token: String,
    /// Verify TLS certificates of the tenant and the gateway.
    pub ssl_verify: bool,
    /// Backend the fixture services proxy to.
    pub api_backend: Option<String>,
    /// Log level filter.
    pub log_level: String,
    /// `pretty` or `json`.
    pub log_format: String,
    /// Request budget of the quota-exhaustion loop.
    pub max_requests: u32,
    /// Backoff for probes waiting on configuration propagation.
    pub backoff: BackoffConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            ssl_verify: true,
            api_backend: Some("https://echo-api.3scale.net:443".to_string()),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            max_requests: 50,
            backoff: BackoffConfig::default(),
        }
    }
}

impl fmt::Debug for HarnessConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HarnessConfig")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("ssl_verify", &self.ssl_verify)
            .field("api_backend", &self.api_backend)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .field("max_requests", &self.max_requests)
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl HarnessConfig {
    /// Config for a tenant, everything else at defaults.
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            ..Self::default()
        }
    }

    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Load from the process environment and validate.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` for environment variables and validate.
    pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base = match lookup(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        let config = base.apply_env(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `THREESCALE_*` variables.
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(url) = lookup(URL_ENV) {
            self.url = url;
        }
        if let Some(token) = lookup(TOKEN_ENV) {
            self.token = token;
        }
        if let Some(raw) = lookup(SSL_VERIFY_ENV) {
            self.ssl_verify = parse_bool(&raw).ok_or_else(|| ConfigError::Invalid {
                key: SSL_VERIFY_ENV,
                reason: format!("expected a boolean, got {:?}", raw),
            })?;
        }
        if let Some(level) = lookup(LOG_LEVEL_ENV) {
            self.log_level = level;
        }
        if let Some(backend) = lookup(API_BACKEND_ENV) {
            self.api_backend = if backend.is_empty() {
                None
            } else {
                Some(backend)
            };
        }
        Ok(self)
    }

    /// Check presence and basic constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::Missing("url"));
        }
        if self.token.is_empty() {
            return Err(ConfigError::Missing("token"));
        }
        if let Err(e) = reqwest::Url::parse(&self.url) {
            return Err(ConfigError::Invalid {
                key: "url",
                reason: e.to_string(),
            });
        }
        if LogFormat::parse(&self.log_format).is_none() {
            return Err(ConfigError::Invalid {
                key: "log_format",
                reason: format!("expected `pretty` or `json`, got {:?}", self.log_format),
            });
        }
        if self.backoff.max_tries == 0 {
            return Err(ConfigError::Invalid {
                key: "backoff.max_tries",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_requests == 0 {
            return Err(ConfigError::Invalid {
                key: "max_requests",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Settings for the management API client.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(&self.url, &self.token).with_ssl_verify(self.ssl_verify)
    }

    /// Settings for the logging subscriber.
    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig::new()
            .with_log_level(&self.log_level)
            .with_log_format(LogFormat::parse(&self.log_format).unwrap_or_default())
            .with_test_writer(true)
    }

    /// Backoff policy for propagation probes.
    pub fn backoff(&self) -> Backoff {
        Backoff::from(&self.backoff)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
