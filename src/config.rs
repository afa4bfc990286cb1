//! Configuration management for Gatekeeper.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

use crate::error::{GatekeeperError, Result};
use crate::ratelimit::{KeyStrategy, LimiterOptions, DEFAULT_MESSAGE};

/// Prefix for environment variable overrides, e.g. `GATEKEEPER__RATE_LIMITING__MAX`.
const ENV_PREFIX: &str = "GATEKEEPER";

/// Main configuration for the Gatekeeper service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatekeeperConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Window size in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Admitted requests per key per window
    #[serde(default = "default_max")]
    pub max: u64,

    /// Message returned with 429 responses
    #[serde(default = "default_message")]
    pub message: String,

    /// How callers are identified
    #[serde(default)]
    pub key_strategy: KeyStrategy,

    /// Only paths under this prefix are limited; `None` limits everything
    #[serde(default = "default_path_prefix")]
    pub path_prefix: Option<String>,

    /// Period of the expired-record sweep in milliseconds
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            max: default_max(),
            message: default_message(),
            key_strategy: KeyStrategy::default(),
            path_prefix: default_path_prefix(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

fn default_window_ms() -> u64 {
    15 * 60 * 1000
}

fn default_max() -> u64 {
    100
}

fn default_message() -> String {
    DEFAULT_MESSAGE.to_string()
}

fn default_path_prefix() -> Option<String> {
    Some("/api".to_string())
}

fn default_sweep_interval_ms() -> u64 {
    5 * 60 * 1000
}

impl RateLimitingConfig {
    /// Build validated limiter options from this configuration.
    pub fn limiter_options(&self) -> Result<LimiterOptions> {
        let options = LimiterOptions::new(self.window_ms, self.max)
            .with_message(self.message.clone())
            .with_key_strategy(self.key_strategy);
        options.validate()?;
        Ok(options)
    }

    /// The sweep period.
    pub fn sweep_interval(&self) -> Result<Duration> {
        if self.sweep_interval_ms == 0 {
            return Err(GatekeeperError::InvalidConfiguration(
                "sweep_interval_ms must be a positive integer".to_string(),
            ));
        }
        Ok(Duration::from_millis(self.sweep_interval_ms))
    }
}

impl GatekeeperConfig {
    /// Load configuration from a YAML file path.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| GatekeeperError::Config(e.to_string()))
    }

    /// Load configuration from an optional YAML file overlaid with
    /// `GATEKEEPER__`-prefixed environment variables.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path, "Loading configuration file");
            builder = builder.add_source(
                config::File::new(path, config::FileFormat::Yaml).required(true),
            );
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
