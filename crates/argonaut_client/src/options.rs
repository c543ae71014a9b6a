//! Client configuration.
//!
//! Settings come from defaults, then an optional TOML file, then the
//! environment (`ARGO_SERVER`, `ARGO_NAMESPACE`, `ARGO_TOKEN`,
//! `ARGO_INSECURE_SKIP_VERIFY`). Command-line flags are applied last by the
//! caller through the `with_*` builders.

use std::fs;
use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::ConfigError;

/// Default server address
pub const DEFAULT_SERVER: &str = "https://localhost:2746";

/// Default namespace
pub const DEFAULT_NAMESPACE: &str = "argo";

/// Default polling interval while waiting for a workflow
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(1);

/// Connection and polling settings
#[derive(Debug)]
pub struct ArgoOptions {
    /// Server base URL
    pub server: String,
    /// Namespace used when a call does not name one
    pub namespace: String,
    /// Bearer token
    pub token: Option<SecretString>,
    /// Verify the server's TLS certificate
    pub client_side_validation: bool,
    /// Delay between status polls
    pub polling_interval: Duration,
    /// Retries for idempotent reads
    pub max_retries: u32,
    /// First retry delay
    pub initial_backoff: Duration,
    /// Longest retry delay
    pub max_backoff: Duration,
    /// Give up waiting after this long
    pub wait_timeout: Option<Duration>,
}

impl Default for ArgoOptions {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            token: None,
            client_side_validation: true,
            polling_interval: DEFAULT_POLLING_INTERVAL,
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            wait_timeout: None,
        }
    }
}

/// On-disk form
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileOptions {
    server: Option<String>,
    namespace: Option<String>,
    token: Option<String>,
    client_side_validation: Option<bool>,
    polling_interval_secs: Option<f64>,
    max_retries: Option<u32>,
    initial_backoff_ms: Option<u64>,
    max_backoff_ms: Option<u64>,
    wait_timeout_secs: Option<u64>,
}

impl ArgoOptions {
    /// Parse a TOML document on top of the defaults
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let file: FileOptions = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let mut options = Self::default();
        if let Some(server) = file.server {
            options.server = server;
        }
        if let Some(namespace) = file.namespace {
            options.namespace = namespace;
        }
        if let Some(token) = file.token {
            options.token = Some(SecretString::from(token));
        }
        if let Some(validate) = file.client_side_validation {
            options.client_side_validation = validate;
        }
        if let Some(secs) = file.polling_interval_secs {
            options.polling_interval = Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::InvalidValue {
                key: "polling_interval_secs".to_string(),
                reason: e.to_string(),
            })?;
        }
        if let Some(retries) = file.max_retries {
            options.max_retries = retries;
        }
        if let Some(ms) = file.initial_backoff_ms {
            options.initial_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = file.max_backoff_ms {
            options.max_backoff = Duration::from_millis(ms);
        }
        options.wait_timeout = file.wait_timeout_secs.map(Duration::from_secs);
        options.validate()?;
        Ok(options)
    }

    /// Load a TOML file
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read, otherwise
    /// see [`ArgoOptions::from_toml_str`]
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply overrides from the process environment
    ///
    /// # Errors
    ///
    /// See [`ArgoOptions::with_env_overrides`]
    pub fn with_process_env(self) -> Result<Self, ConfigError> {
        self.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides read through `lookup`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for an unparsable
    /// `ARGO_INSECURE_SKIP_VERIFY`
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(server) = lookup("ARGO_SERVER") {
            self.server = server;
        }
        if let Some(namespace) = lookup("ARGO_NAMESPACE") {
            self.namespace = namespace;
        }
        if let Some(token) = lookup("ARGO_TOKEN") {
            self.token = Some(SecretString::from(token));
        }
        if let Some(raw) = lookup("ARGO_INSECURE_SKIP_VERIFY") {
            let skip = match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" | "" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "ARGO_INSECURE_SKIP_VERIFY".to_string(),
                        reason: format!("'{}' is not a boolean", raw),
                    });
                }
            };
            self.client_side_validation = !skip;
        }
        self.validate()?;
        Ok(self)
    }

    /// Set the server URL
    #[must_use]
    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self
    }

    /// Set the default namespace
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the bearer token
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(SecretString::from(token.into()));
        self
    }

    /// Set the polling interval
    #[must_use]
    pub fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval;
        self
    }

    /// Set the wait timeout
    #[must_use]
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = Some(timeout);
        self
    }

    /// Set retry count and initial backoff for reads
    #[must_use]
    pub fn with_retries(mut self, max_retries: u32, initial_backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.initial_backoff = initial_backoff;
        self
    }

    /// Check the settings are usable
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the bad setting
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.server.starts_with("http://") || self.server.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                key: "server".to_string(),
                reason: format!("'{}' is not an http(s) URL", self.server),
            });
        }
        if self.namespace.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "namespace".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.polling_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "polling_interval".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}
