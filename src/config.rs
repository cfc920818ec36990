//! Configuration management for Ratewindow.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::num::NonZeroU64;
use std::path::Path;
use std::time::Duration;

use ::config::{Config, Environment, File, FileFormat};
use tracing::info;

use crate::error::{RateWindowError, Result};

/// Prefix for environment variable overrides, e.g. `RATEWINDOW__WINDOW__MAX_REQUESTS`.
const ENV_PREFIX: &str = "RATEWINDOW";

/// Main configuration for the Ratewindow service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Sliding window configuration
    #[serde(default)]
    pub window: WindowConfig,

    /// Shared store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// HTTP interception configuration
    #[serde(default)]
    pub http: HttpConfig,
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

/// Immutable per-process window configuration.
///
/// Both values must be positive; zero is rejected while deserializing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Length of the trailing window in seconds
    #[serde(default = "default_window_seconds")]
    pub window_seconds: NonZeroU64,

    /// Maximum requests admitted per key within one window
    #[serde(default = "default_max_requests")]
    pub max_requests: NonZeroU64,
}

impl WindowConfig {
    /// Create a window configuration.
    pub fn new(window_seconds: NonZeroU64, max_requests: NonZeroU64) -> Self {
        Self {
            window_seconds,
            max_requests,
        }
    }

    /// The window length as a duration.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds.get())
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self::new(default_window_seconds(), default_max_requests())
    }
}

fn default_window_seconds() -> NonZeroU64 {
    NonZeroU64::MIN.saturating_add(59)
}

fn default_max_requests() -> NonZeroU64 {
    NonZeroU64::MIN.saturating_add(99)
}

/// Which store holds the request history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    /// Process-local store. Only correct for a single instance.
    #[default]
    Memory,
    /// Redis sorted sets shared by all instances.
    Redis(RedisConfig),
}

/// Redis connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Connection URL, e.g. `redis://127.0.0.1:6379`
    pub url: String,

    /// Prefix applied to every rate limit key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Upper bound for one window transaction, in milliseconds
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,

    /// Connection pool settings
    #[serde(default)]
    pub pool: RedisPoolConfig,
}

impl RedisConfig {
    /// Create a Redis configuration with default prefix, timeout and pool.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key_prefix: default_key_prefix(),
            response_timeout_ms: default_response_timeout_ms(),
            pool: RedisPoolConfig::default(),
        }
    }

    /// The response timeout as a duration.
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

fn default_key_prefix() -> String {
    "ratewindow:".to_string()
}

fn default_response_timeout_ms() -> u64 {
    1000
}

/// Redis connection pool settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedisPoolConfig {
    /// Maximum number of pooled connections
    #[serde(default)]
    pub max_size: Option<usize>,

    /// How long to wait for a free connection, in milliseconds
    #[serde(default)]
    pub timeout_wait_ms: Option<u64>,

    /// How long to wait for a new connection to be established, in milliseconds
    #[serde(default)]
    pub timeout_create_ms: Option<u64>,

    /// How long a pooled connection may take to answer its health check, in milliseconds
    #[serde(default)]
    pub timeout_recycle_ms: Option<u64>,
}

/// HTTP interception configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Header carrying the client identifier
    #[serde(default = "default_key_header")]
    pub key_header: String,

    /// What to do with a request when the store is unavailable
    #[serde(default)]
    pub on_store_failure: StoreFailurePolicy,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            key_header: default_key_header(),
            on_store_failure: StoreFailurePolicy::default(),
        }
    }
}

fn default_key_header() -> String {
    "x-forwarded-for".to_string()
}

/// Policy applied by the HTTP layer when the store cannot be reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreFailurePolicy {
    /// Respond with a server error.
    #[default]
    Error,
    /// Fail open: run the handler without limiting.
    Allow,
    /// Fail closed: reject as if the limit was exceeded.
    Deny,
}

impl AppConfig {
    /// Load configuration from an optional YAML file layered under
    /// `RATEWINDOW__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| RateWindowError::Config(format!("Failed to parse configuration: {e}")))
    }
}
