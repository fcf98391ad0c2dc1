//! Environment configuration.
//!
//! Settings are read from environment variables (with `.env` support wired
//! up by the binary). Required values fail loading with a [`ConfigError`];
//! optional values fall back to defaults, including when they fail to parse,
//! matching the forgiving behavior operators expect from env tweaking.

use std::env;
use std::str::FromStr;

use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is unset or empty
    #[error("{0} must be provided in the environment or .env file")]
    MissingVar(&'static str),
}

/// Runtime configuration for the key service and its cache.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the key-management API
    pub api_base_url: String,
    /// API key attached to every request
    pub api_key: String,
    /// Log filter seed (overridable with RUST_LOG)
    pub log_level: String,
    /// Webhook for admin notifications, if configured
    pub admin_webhook_url: Option<String>,
    /// Webhook for general notifications, if configured
    pub notification_webhook_url: Option<String>,
    /// Whether query results are cached at all
    pub cache_enabled: bool,
    /// Override for the cache database path; platform default when unset
    pub cache_path: Option<String>,
    /// Per-read cache expiry window, in minutes
    pub cache_expiry_minutes: i64,
    /// Spacing between key requests per user, in seconds
    pub request_cooldown_secs: u64,
    /// Unauthorized attempts tolerated before a lockout
    pub max_failed_attempts: u32,
    /// Lockout duration after too many failed attempts, in seconds
    pub lockout_period_secs: u64,
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    ///
    /// The binary passes `env::var`; tests pass a map.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_base_url = require(&get, "API_BASE_URL")?;
        let api_key = require(&get, "API_KEY")?;

        Ok(Self {
            api_base_url,
            api_key,
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            admin_webhook_url: get("ADMIN_WEBHOOK_URL").filter(|v| !v.is_empty()),
            notification_webhook_url: get("NOTIFICATION_WEBHOOK_URL").filter(|v| !v.is_empty()),
            cache_enabled: get("CACHE_ENABLED")
                .map(|v| parse_bool(&v))
                .unwrap_or(true),
            cache_path: get("CACHE_PATH").filter(|v| !v.is_empty()),
            cache_expiry_minutes: parse_or(&get, "CACHE_EXPIRY_MINUTES", 5),
            request_cooldown_secs: parse_or(&get, "REQUEST_COOLDOWN_SECONDS", 60),
            max_failed_attempts: parse_or(&get, "MAX_FAILED_ATTEMPTS", 5),
            lockout_period_secs: parse_or(&get, "COOLDOWN_PERIOD", 300),
        })
    }
}

/// Fetches a required variable, treating empty values as missing.
fn require(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    get(name)
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingVar(name))
}

/// Accepts the usual truthy spellings: true/yes/1/t/y.
fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "yes" | "1" | "t" | "y"
    )
}

/// Parses a variable, falling back to `default` when unset or invalid.
fn parse_or<T: FromStr>(get: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> T {
    get(name)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
