//! Authority configuration.
//!
//! Built once at startup and shared read-only (`Arc<AuthConfig>`) with every
//! component that talks to the authority.

use std::time::Duration;

use thiserror::Error;

/// Timeout applied to every authority request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between background key refreshes.
pub const DEFAULT_KEY_REFRESH_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration value: {0}")]
    Missing(&'static str),

    #[error("Invalid configuration value for {0}: {1}")]
    Invalid(&'static str, String),
}

/// Where the authority lives and how this service identifies itself to it.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// Origin serving `/keys` and `/token` (e.g. "https://auth.example.com").
    pub auth_origin: String,
    /// Origin serving user and token records.
    pub user_origin: String,
    /// OAuth2 client id of this service.
    pub client_id: String,
    /// OAuth2 client secret of this service.
    pub client_secret: String,
    /// Per-request timeout for authority calls.
    pub request_timeout: Duration,
    /// Background key refresh interval.
    pub key_refresh_interval: Duration,
}

impl AuthConfig {
    /// Build a config with default timings.
    pub fn new(
        auth_origin: impl Into<String>,
        user_origin: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            auth_origin: trim_origin(auth_origin.into()),
            user_origin: trim_origin(user_origin.into()),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            key_refresh_interval: DEFAULT_KEY_REFRESH_INTERVAL,
        }
    }

    /// Reads configuration from environment variables.
    ///
    /// | Variable        | Default |
    /// |-----------------|---------|
    /// | `AUTH_ORIGIN`   | none    |
    /// | `USER_ORIGIN`   | none    |
    /// | `CLIENT_ID`     | `""`    |
    /// | `CLIENT_SECRET` | `""`    |
    pub fn from_env() -> Result<Self, ConfigError> {
        let auth_origin =
            std::env::var("AUTH_ORIGIN").map_err(|_| ConfigError::Missing("AUTH_ORIGIN"))?;
        let user_origin =
            std::env::var("USER_ORIGIN").map_err(|_| ConfigError::Missing("USER_ORIGIN"))?;
        let config = Self::new(
            auth_origin,
            user_origin,
            std::env::var("CLIENT_ID").unwrap_or_default(),
            std::env::var("CLIENT_SECRET").unwrap_or_default(),
        );
        config.validate()?;
        Ok(config)
    }

    /// Check that both origins are usable absolute URLs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_origin("auth_origin", &self.auth_origin)?;
        check_origin("user_origin", &self.user_origin)?;
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "request_timeout",
                "must be greater than zero".into(),
            ));
        }
        if self.key_refresh_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "key_refresh_interval",
                "must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn trim_origin(origin: String) -> String {
    origin.trim().trim_end_matches('/').to_string()
}

fn check_origin(name: &'static str, origin: &str) -> Result<(), ConfigError> {
    if origin.is_empty() {
        return Err(ConfigError::Missing(name));
    }
    let parsed = url::Url::parse(origin).map_err(|e| ConfigError::Invalid(name, e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::Invalid(name, format!("unsupported scheme {other}"))),
    }
}
