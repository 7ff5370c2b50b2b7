//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the server,
//! loaded via the `config` crate from environment variables. Nested keys use
//! a double underscore, e.g. `OIDC__CLIENT_ID` or `SESSION__SECURE_COOKIES`.
//!
//! See [`ProviderConfig`](oidc_gate_access::ProviderConfig) for the identity
//! provider settings.

use axum_extra::extract::cookie::Key;
use oidc_gate_access::{ConfigError, ProviderConfig};
use rootcause::Report;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use url::Url;

/// Minimum length of `APP_SECRET_KEY`, in bytes.
pub const MIN_SECRET_KEY_LEN: usize = 64;

/// Server configuration composed from library configs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Public base URL of this application, used to build the post-logout
    /// return URL.
    #[serde(default = "default_app_base_url")]
    pub app_base_url: String,

    /// Key material for encrypting cookies.
    app_secret_key: SecretKey,

    /// Timeout for calls to the identity provider, in seconds.
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,

    /// Session configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// Downstream API configuration.
    #[serde(default)]
    pub downstream: DownstreamConfig,

    /// OIDC provider configuration.
    pub oidc: ProviderConfig,
}

/// Cookie key material, redacted in `Debug` output.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
struct SecretKey(String);

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey([redacted])")
    }
}

/// Session-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Idle time after which a session must log in again, in minutes.
    #[serde(default = "default_idle_timeout_minutes")]
    pub idle_timeout_minutes: i64,

    /// Interval between idle session cleanup runs, in seconds.
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,

    /// Whether to set the Secure flag on cookies (requires HTTPS).
    /// Defaults to true for production safety; set to false for local HTTP development.
    #[serde(default = "default_secure_cookies")]
    pub secure_cookies: bool,

    /// Upper bound on stored sessions. Unbounded when unset.
    #[serde(default)]
    pub max_sessions: Option<usize>,
}

/// Downstream API configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DownstreamConfig {
    /// Base URL of the downstream API.
    #[serde(default = "default_downstream_base_url")]
    pub base_url: String,

    /// Timeout for downstream calls, in seconds.
    #[serde(default = "default_http_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_app_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_http_timeout_seconds() -> u64 {
    10
}

fn default_idle_timeout_minutes() -> i64 {
    30
}

fn default_cleanup_interval_seconds() -> u64 {
    300
}

fn default_secure_cookies() -> bool {
    true
}

fn default_downstream_base_url() -> String {
    "http://localhost:3000".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_minutes: default_idle_timeout_minutes(),
            cleanup_interval_seconds: default_cleanup_interval_seconds(),
            secure_cookies: default_secure_cookies(),
            max_sessions: None,
        }
    }
}

impl SessionConfig {
    /// Returns the idle timeout, saturating for values too large to represent.
    #[must_use]
    pub fn idle_timeout(&self) -> chrono::Duration {
        chrono::Duration::try_minutes(self.idle_timeout_minutes).unwrap_or(chrono::Duration::MAX)
    }
}

impl Default for DownstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_downstream_base_url(),
            timeout_seconds: default_http_timeout_seconds(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, Report<ConfigError>> {
        let source = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::Invalid {
                field: "environment",
                reason: e.to_string(),
            })?;
        Self::from_config(source)
    }

    /// Deserializes and validates configuration from a loaded source.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_config(source: config::Config) -> Result<Self, Report<ConfigError>> {
        let config: Self = source
            .try_deserialize()
            .map_err(|e| ConfigError::Invalid {
                field: "environment",
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` naming the first missing or invalid field.
    pub fn validate(&self) -> Result<(), Report<ConfigError>> {
        self.oidc.validate()?;
        for (field, value) in [
            ("app_base_url", &self.app_base_url),
            ("downstream.base_url", &self.downstream.base_url),
        ] {
            Url::parse(value).map_err(|e| ConfigError::Invalid {
                field,
                reason: e.to_string(),
            })?;
        }
        match chrono::Duration::try_minutes(self.session.idle_timeout_minutes) {
            Some(timeout) if timeout > chrono::Duration::zero() => {}
            Some(_) => {
                return Err(ConfigError::Invalid {
                    field: "session.idle_timeout_minutes",
                    reason: "must be positive".to_string(),
                }
                .into());
            }
            None => {
                return Err(ConfigError::Invalid {
                    field: "session.idle_timeout_minutes",
                    reason: "out of range".to_string(),
                }
                .into());
            }
        }
        if self.session.max_sessions == Some(0) {
            return Err(ConfigError::Invalid {
                field: "session.max_sessions",
                reason: "must be positive".to_string(),
            }
            .into());
        }
        self.cookie_key()?;
        Ok(())
    }

    /// Returns the cookie encryption key.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if `APP_SECRET_KEY` is shorter than
    /// [`MIN_SECRET_KEY_LEN`] bytes.
    pub fn cookie_key(&self) -> Result<Key, Report<ConfigError>> {
        let secret = self.app_secret_key.0.as_bytes();
        if secret.is_empty() {
            return Err(ConfigError::Missing {
                field: "app_secret_key",
            }
            .into());
        }
        Key::try_from(secret).map_err(|_| {
            ConfigError::Invalid {
                field: "app_secret_key",
                reason: format!("must be at least {MIN_SECRET_KEY_LEN} bytes"),
            }
            .into()
        })
    }

    /// Returns the URL the provider sends the browser back to after logout.
    #[must_use]
    pub fn logout_return_url(&self) -> String {
        format!("{}/", self.app_base_url.trim_end_matches('/'))
    }

    /// Returns the provider HTTP timeout.
    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }
}
