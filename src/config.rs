//! Configuration management for Turnstile.
//!
//! Configuration is read from an optional YAML file and then overlaid with
//! environment variables of the form `TURNSTILE__SECTION__FIELD`.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, TurnstileError};
use crate::ratelimit::WindowPolicy;

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "TURNSTILE";

/// Main configuration for the Turnstile service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Maximum admitted requests per key within the window
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Length of the sliding window in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// How often idle keys are swept, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Header consulted for the client address before the peer address
    #[serde(default = "default_forwarded_header")]
    pub forwarded_header: String,

    /// HTTP methods subject to rate limiting
    #[serde(default = "default_limited_methods")]
    pub limited_methods: Vec<String>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
            sweep_interval_secs: default_sweep_interval(),
            forwarded_header: default_forwarded_header(),
            limited_methods: default_limited_methods(),
        }
    }
}

fn default_max_requests() -> u32 {
    5
}

fn default_window_secs() -> u64 {
    60
}

fn default_sweep_interval() -> u64 {
    30
}

fn default_forwarded_header() -> String {
    "x-forwarded-for".to_string()
}

fn default_limited_methods() -> Vec<String> {
    vec!["POST".to_string()]
}

impl RateLimitingConfig {
    /// Build the window policy described by this configuration.
    pub fn policy(&self) -> Result<WindowPolicy> {
        WindowPolicy::new(self.max_requests, Duration::from_secs(self.window_secs))
    }

    /// Interval between sweeps of idle keys.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl TurnstileConfig {
    /// Load configuration from an optional YAML file, overlaid with
    /// `TURNSTILE__*` environment variables.
    ///
    /// The result is not validated, so callers can apply their own overrides
    /// first and then call [`validate`](Self::validate).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(true),
            );
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("rate_limiting.limited_methods"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TurnstileConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Configuration(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would silently admit or reject everything.
    pub fn validate(&self) -> Result<()> {
        let limits = &self.rate_limiting;
        limits.policy()?;

        if limits.sweep_interval_secs == 0 {
            return Err(TurnstileError::Configuration(
                "sweep_interval_secs must be greater than zero".to_string(),
            ));
        }
        if limits.forwarded_header.trim().is_empty() {
            return Err(TurnstileError::Configuration(
                "forwarded_header must not be empty".to_string(),
            ));
        }
        if limits.limited_methods.iter().any(|m| m.trim().is_empty()) {
            return Err(TurnstileError::Configuration(
                "limited_methods must not contain empty entries".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::io::Write;
    use tokio_test::{assert_err, assert_ok};

    // Serializes tests that read or write TURNSTILE__* variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const MAX_REQUESTS_VAR: &str = "TURNSTILE__RATE_LIMITING__MAX_REQUESTS";
    const METHODS_VAR: &str = "TURNSTILE__RATE_LIMITING__LIMITED_METHODS";

    fn yaml_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = TurnstileConfig::default();
        assert_eq!(config.server.listen_addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.rate_limiting.max_requests, 5);
        assert_eq!(config.rate_limiting.window_secs, 60);
        assert_eq!(config.rate_limiting.limited_methods, vec!["POST".to_string()]);
        assert_ok!(config.validate());
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
rate_limiting:
  max_requests: 100
  window_secs: 10
"#;
        let config = TurnstileConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.rate_limiting.max_requests, 100);
        assert_eq!(config.rate_limiting.window_secs, 10);
        assert_eq!(config.rate_limiting.sweep_interval_secs, 30);
        assert_eq!(config.rate_limiting.forwarded_header, "x-forwarded-for");
    }

    #[test]
    fn test_parse_full_yaml() {
        let yaml = r#"
server:
  listen_addr: "0.0.0.0:9000"
rate_limiting:
  max_requests: 3
  window_secs: 1
  sweep_interval_secs: 5
  forwarded_header: x-real-ip
  limited_methods: [POST, PUT]
"#;
        let config = TurnstileConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.listen_addr.port(), 9000);
        assert_eq!(config.rate_limiting.forwarded_header, "x-real-ip");
        assert_eq!(config.rate_limiting.limited_methods.len(), 2);

        let policy = config.rate_limiting.policy().unwrap();
        assert_eq!(policy.max_requests(), 3);
        assert_eq!(policy.window(), Duration::from_secs(1));
    }

    #[test]
    fn test_zero_max_requests_rejected() {
        let yaml = r#"
rate_limiting:
  max_requests: 0
"#;
        let err = TurnstileConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, TurnstileError::Configuration(_)));
    }

    #[test]
    fn test_zero_window_rejected() {
        let yaml = r#"
rate_limiting:
  window_secs: 0
"#;
        assert_err!(TurnstileConfig::from_yaml(yaml));
    }

    #[test]
    fn test_zero_sweep_interval_rejected() {
        let mut config = TurnstileConfig::default();
        config.rate_limiting.sweep_interval_secs = 0;
        assert_err!(config.validate());
    }

    #[test]
    fn test_malformed_yaml_rejected() {
        let err = TurnstileConfig::from_yaml("rate_limiting: [1, 2").unwrap_err();
        assert!(matches!(err, TurnstileError::Configuration(_)));
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let _guard = ENV_LOCK.lock();
        let config = TurnstileConfig::load(None).unwrap();
        assert!(config.rate_limiting.max_requests > 0);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let _guard = ENV_LOCK.lock();
        let result = TurnstileConfig::load(Some(Path::new("/nonexistent/turnstile.yaml")));
        assert!(matches!(result, Err(TurnstileError::Configuration(_))));
    }

    #[test]
    fn test_env_overrides_defaults() {
        let _guard = ENV_LOCK.lock();
        std::env::set_var(MAX_REQUESTS_VAR, "9");
        std::env::set_var(METHODS_VAR, "POST,PUT");

        let result = TurnstileConfig::load(None);

        std::env::remove_var(MAX_REQUESTS_VAR);
        std::env::remove_var(METHODS_VAR);

        let config = result.unwrap();
        assert_eq!(config.rate_limiting.max_requests, 9);
        assert_eq!(
            config.rate_limiting.limited_methods,
            vec!["POST".to_string(), "PUT".to_string()]
        );
        assert_eq!(config.rate_limiting.window_secs, 60);
    }

    #[test]
    fn test_env_layers_over_file() {
        let _guard = ENV_LOCK.lock();
        let file = yaml_file(
            r#"
rate_limiting:
  max_requests: 3
  window_secs: 10
"#,
        );
        std::env::set_var(MAX_REQUESTS_VAR, "7");

        let result = TurnstileConfig::load(Some(file.path()));

        std::env::remove_var(MAX_REQUESTS_VAR);

        let config = result.unwrap();
        // Environment wins over the file; untouched file values survive
        assert_eq!(config.rate_limiting.max_requests, 7);
        assert_eq!(config.rate_limiting.window_secs, 10);
    }

    #[test]
    fn test_degenerate_file_can_be_overridden_before_validation() {
        let _guard = ENV_LOCK.lock();
        let file = yaml_file(
            r#"
rate_limiting:
  max_requests: 0
"#,
        );

        let mut config = TurnstileConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.rate_limiting.max_requests, 0);
        assert_err!(config.validate());

        config.rate_limiting.max_requests = 5;
        assert_ok!(config.validate());
    }
}
