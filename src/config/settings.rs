//! Configuration settings for the HMAC authenticator.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::warn;

use crate::error::HmacError;
use crate::nonce::{EvictPolicy, MemoryStoreConfig};
use crate::secret::validate_key_id;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub authenticator: AuthenticatorConfig,
    #[serde(default)]
    pub nonce: NonceConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub keys: Vec<KeyConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Signing and verification limits.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthenticatorConfig {
    /// Allowed timestamp deviation in either direction, in seconds.
    #[serde(default = "default_key_interval")]
    pub key_interval_seconds: u64,
    /// Maximum body size in bytes.
    #[serde(default = "default_max_input_size")]
    pub max_input_size: usize,
}

/// Nonce store backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NonceBackend {
    /// In-process map with TTL and bounded capacity.
    #[default]
    Memory,
    /// Shared store with atomic SET NX.
    Redis,
    /// Generic key-value store (best-effort, single writer).
    Kv,
}

/// Nonce store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NonceConfig {
    #[serde(default)]
    pub backend: NonceBackend,
    /// Nonce time-to-live in seconds.
    #[serde(default = "default_nonce_ttl")]
    pub ttl_seconds: u64,
    /// Background sweep period in seconds (memory backend).
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
    /// Capacity of the memory backend.
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// Behaviour when the memory backend is full.
    #[serde(default)]
    pub evict_policy: EvictPolicy,
    /// Per-operation deadline in milliseconds (redis backend).
    #[serde(default = "default_timeout_millis")]
    pub timeout_millis: u64,
    /// Key prefix for nonce records (redis and kv backends).
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL.
    #[serde(default = "default_redis_url")]
    pub url: String,
}

/// A signing key and the place its secret comes from.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyConfig {
    /// Key id; empty for single-key deployments.
    #[serde(default)]
    pub key_id: String,
    /// Inline secret.
    pub secret: Option<String>,
    /// Environment variable holding the secret.
    pub secret_env: Option<String>,
    /// File holding the secret (mode 0600 or stricter).
    pub secret_file: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format ("pretty" or "json").
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_key_interval() -> u64 {
    300
}

fn default_max_input_size() -> usize {
    33_554_432 // 32 MiB
}

fn default_nonce_ttl() -> u64 {
    14_400
}

fn default_cleanup_interval() -> u64 {
    900
}

fn default_max_size() -> usize {
    2_000_000
}

fn default_timeout_millis() -> u64 {
    5_000
}

fn default_prefix() -> String {
    "nonce:".to_string()
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for AuthenticatorConfig {
    fn default() -> Self {
        Self {
            key_interval_seconds: default_key_interval(),
            max_input_size: default_max_input_size(),
        }
    }
}

impl Default for NonceConfig {
    fn default() -> Self {
        Self {
            backend: NonceBackend::default(),
            ttl_seconds: default_nonce_ttl(),
            cleanup_interval_seconds: default_cleanup_interval(),
            max_size: default_max_size(),
            evict_policy: EvictPolicy::default(),
            timeout_millis: default_timeout_millis(),
            prefix: default_prefix(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl AuthenticatorConfig {
    pub fn key_interval(&self) -> Duration {
        Duration::from_secs(self.key_interval_seconds)
    }
}

impl NonceConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_millis)
    }

    /// Settings for the memory backend.
    pub fn memory_store_config(&self) -> MemoryStoreConfig {
        MemoryStoreConfig {
            ttl: self.ttl(),
            cleanup_interval: Duration::from_secs(self.cleanup_interval_seconds),
            max_size: self.max_size,
            evict_policy: self.evict_policy,
        }
    }
}

impl Settings {
    /// Load settings from a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, HmacError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| HmacError::Config {
            message: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;

        Self::from_toml_str(&content).map_err(|e| match e {
            HmacError::Config { message } => HmacError::Config {
                message: format!("{} ({})", message, path.display()),
            },
            other => other,
        })
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, HmacError> {
        let settings: Settings = toml::from_str(content).map_err(|e| HmacError::Config {
            message: format!("Failed to parse config: {}", e),
        })?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<(), HmacError> {
        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(config_error(format!(
                "Invalid log level '{}'. Valid levels: {:?}",
                self.logging.level, valid_levels
            )));
        }

        // Validate log format
        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(config_error(format!(
                "Invalid log format '{}'. Valid formats: {:?}",
                self.logging.format, valid_formats
            )));
        }

        let positive = [
            ("authenticator.key_interval_seconds", self.authenticator.key_interval_seconds),
            ("authenticator.max_input_size", self.authenticator.max_input_size as u64),
            ("nonce.ttl_seconds", self.nonce.ttl_seconds),
            ("nonce.cleanup_interval_seconds", self.nonce.cleanup_interval_seconds),
            ("nonce.max_size", self.nonce.max_size as u64),
            ("nonce.timeout_millis", self.nonce.timeout_millis),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(config_error(format!("'{}' must be greater than zero", name)));
            }
        }

        if self.keys.is_empty() {
            return Err(config_error("At least one [[keys]] entry is required".to_string()));
        }

        let mut seen = HashSet::new();
        for key in &self.keys {
            validate_key_id(&key.key_id)?;
            if !seen.insert(key.key_id.as_str()) {
                return Err(config_error(format!("Duplicate key id '{}'", key.key_id)));
            }

            let sources = [
                key.secret.is_some(),
                key.secret_env.is_some(),
                key.secret_file.is_some(),
            ];
            if sources.iter().filter(|set| **set).count() != 1 {
                return Err(config_error(format!(
                    "Key '{}' must define exactly one of secret, secret_env, secret_file",
                    key.key_id
                )));
            }
        }

        if self.nonce.backend == NonceBackend::Memory
            && self.nonce.evict_policy == EvictPolicy::All
        {
            warn!(
                "Nonce evict_policy 'all' drops every stored nonce when the store is full; \
                 replays are possible until the store refills"
            );
        }

        Ok(())
    }
}

fn config_error(message: String) -> HmacError {
    HmacError::Config { message }
}
