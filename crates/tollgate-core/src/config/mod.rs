//! Application configuration with layered loading.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: set on the builder in [`AppConfig::from_file`]
//! 2. **Config file**: TOML file named by the `TOLLGATE_CONFIG` env var
//! 3. **Environment variables**: `TOLLGATE__SECTION__FIELD` overrides a single field
//!
//! # Configuration Sections
//!
//! - [`ServerConfig`]: HTTP listener settings
//! - [`AuthConfig`]: credential store, token lifetimes, encryption key, key quota, cookies
//! - [`LoggingConfig`]: log level and format
//!
//! # Example
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0"
//! bind_port = 8080
//!
//! [auth]
//! database_url = "sqlite://db/tollgate.db"
//! jwt_secret = "change-me"
//! refresh_token_max_age_days = 14
//! ```

use chrono::Duration as ChronoDuration;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

const MAX_REFRESH_TOKEN_AGE_DAYS: i64 = 90;

/// HTTP server configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// IP address to bind the server to. Defaults to `127.0.0.1`.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port number to listen on. Must be greater than 0. Defaults to `8080`.
    pub bind_port: u16,

    /// Request timeout in seconds. Defaults to `30`.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_request_timeout_seconds() -> u64 {
    30
}

/// Credential lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// `SQLite` database URL. Defaults to `sqlite://db/tollgate.db`.
    pub database_url: String,

    /// HS256 signing secret for access tokens. Required.
    pub jwt_secret: String,

    /// Access token lifetime. Defaults to `15`.
    pub access_token_ttl_minutes: i64,

    /// Refresh token lifetime, 1 to 90 days. Defaults to `30`.
    pub refresh_token_max_age_days: i64,

    /// How long expired refresh tokens are kept before purging. Defaults to `7`.
    pub refresh_token_retention_days: i64,

    /// Interval between purge passes. Defaults to `3600`.
    pub purge_interval_seconds: u64,

    /// Secret for provider-secret encryption. When unset, secrets are stored in plaintext.
    #[serde(default)]
    pub encryption_key: Option<String>,

    /// Active API keys allowed per user. Defaults to `10`.
    pub max_api_keys_per_user: u32,

    /// Defaults to `access_token`.
    pub access_cookie_name: String,

    /// Defaults to `refresh_token`.
    pub refresh_cookie_name: String,

    /// Set the `Secure` attribute on auth cookies. Defaults to `true`.
    pub secure_cookies: bool,
}

/// Application logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "trace", "debug", "info", "warn", "error"). Defaults to `"info"`.
    pub level: String,

    /// Output format: `"json"` or `"pretty"`. Defaults to `"pretty"`.
    pub format: String,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            bind_port: 8080,
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://db/tollgate.db".to_string(),
            jwt_secret: String::new(),
            access_token_ttl_minutes: 15,
            refresh_token_max_age_days: 30,
            refresh_token_retention_days: 7,
            purge_interval_seconds: 3600,
            encryption_key: None,
            max_api_keys_per_user: 10,
            access_cookie_name: "access_token".to_string(),
            refresh_cookie_name: "refresh_token".to_string(),
            secure_cookies: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file with environment variable overrides.
    ///
    /// Use `__` as a separator for nested fields (e.g., `TOLLGATE__AUTH__JWT_SECRET=...`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or deserialized.
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let config_builder = Config::builder()
            .set_default("server.bind_address", "127.0.0.1")?
            .set_default("server.bind_port", 8080)?
            .set_default("server.request_timeout_seconds", 30)?
            .set_default("auth.database_url", "sqlite://db/tollgate.db")?
            .set_default("auth.jwt_secret", "")?
            .set_default("auth.access_token_ttl_minutes", 15)?
            .set_default("auth.refresh_token_max_age_days", 30)?
            .set_default("auth.refresh_token_retention_days", 7)?
            .set_default("auth.purge_interval_seconds", 3600)?
            .set_default("auth.max_api_keys_per_user", 10)?
            .set_default("auth.access_cookie_name", "access_token")?
            .set_default("auth.refresh_cookie_name", "refresh_token")?
            .set_default("auth.secure_cookies", true)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name(&config_path.as_ref().to_string_lossy()).required(false))
            .add_source(Environment::with_prefix("TOLLGATE").separator("__"))
            .build()?;

        config_builder.try_deserialize()
    }

    /// Loads configuration from `config/config.toml` with fallback to defaults.
    ///
    /// The config file path can be overridden using the `TOLLGATE_CONFIG` environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration cannot be loaded or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("TOLLGATE_CONFIG").unwrap_or_else(|_| "config/config.toml".to_string());
        Self::from_file(&config_path)
    }

    /// # Errors
    ///
    /// Returns an error string if the address cannot be parsed into a valid [`SocketAddr`].
    ///
    /// [`SocketAddr`]: std::net::SocketAddr
    pub fn socket_addr(&self) -> Result<std::net::SocketAddr, String> {
        format!("{}:{}", self.server.bind_address, self.server.bind_port)
            .parse()
            .map_err(|_| {
                format!(
                    "Invalid socket address: {}:{}",
                    self.server.bind_address, self.server.bind_port
                )
            })
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_seconds)
    }

    #[must_use]
    pub fn access_token_ttl(&self) -> ChronoDuration {
        ChronoDuration::minutes(self.auth.access_token_ttl_minutes)
    }

    #[must_use]
    pub fn refresh_token_max_age(&self) -> ChronoDuration {
        ChronoDuration::days(self.auth.refresh_token_max_age_days)
    }

    #[must_use]
    pub fn refresh_token_retention(&self) -> ChronoDuration {
        ChronoDuration::days(self.auth.refresh_token_retention_days)
    }

    #[must_use]
    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.auth.purge_interval_seconds)
    }

    /// Validates the configuration for correctness and consistency.
    ///
    /// # Errors
    ///
    /// Returns a descriptive error string if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.auth.jwt_secret.trim().is_empty() {
            return Err("auth.jwt_secret must be set".to_string());
        }

        if !(1..=MAX_REFRESH_TOKEN_AGE_DAYS).contains(&self.auth.refresh_token_max_age_days) {
            return Err(format!(
                "auth.refresh_token_max_age_days must be between 1 and {MAX_REFRESH_TOKEN_AGE_DAYS}"
            ));
        }

        if self.auth.access_token_ttl_minutes <= 0 {
            return Err("auth.access_token_ttl_minutes must be greater than 0".to_string());
        }

        if self.auth.refresh_token_retention_days < 0 {
            return Err("auth.refresh_token_retention_days cannot be negative".to_string());
        }

        if self.auth.purge_interval_seconds == 0 {
            return Err("auth.purge_interval_seconds must be greater than 0".to_string());
        }

        if self.auth.max_api_keys_per_user == 0 {
            return Err("auth.max_api_keys_per_user must be greater than 0".to_string());
        }

        if self.auth.database_url.is_empty() {
            return Err("auth.database_url must be set".to_string());
        }

        if self.auth.access_cookie_name.is_empty() || self.auth.refresh_cookie_name.is_empty() {
            return Err("Cookie names cannot be empty".to_string());
        }

        if self.server.bind_port == 0 {
            return Err("Bind port must be greater than 0".to_string());
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err("Logging format must be 'json' or 'pretty'".to_string());
        }

        Ok(())
    }
}
