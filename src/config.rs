//! Service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STORE_API_URL` - Base URL of the store REST API
//!
//! ## Optional
//! - `HOST` - Bind address (default: 0.0.0.0)
//! - `PORT` - Listen port (default: 8083)
//! - `STORE_API_TIMEOUT_SECS` - Store API request timeout (default: 10)
//! - `STORE_API_TOKEN` - Service token used when no customer token is present
//! - `STORE_CURRENCY` - ISO currency code stamped on orders (default: USD)
//! - `NATS_URL` - Publish domain events to NATS instead of in-process only

use std::net::{IpAddr, SocketAddr};

use secrecy::SecretString;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    pub host: IpAddr,
    pub port: u16,
    pub backend: BackendConfig,
    pub currency: String,
    pub nats_url: Option<String>,
}

/// Store API connection settings.
///
/// Implements `Debug` manually to redact the service token.
#[derive(Clone)]
pub struct BackendConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub service_token: Option<SecretString>,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("service_token", &self.service_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl CheckoutConfig {
    /// Load configuration from environment variables, reading `.env` first if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or a value does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(lookup);

        let host = env.parsed::<IpAddr>("HOST", "0.0.0.0")?;
        let port = env.parsed::<u16>("PORT", "8083")?;
        let base_url = env.required("STORE_API_URL")?;
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::InvalidEnvVar("STORE_API_URL".to_string(), "must be an http(s) URL".to_string()));
        }
        let timeout_secs = env.parsed::<u64>("STORE_API_TIMEOUT_SECS", "10")?;
        let service_token = env.optional("STORE_API_TOKEN").map(SecretString::from);
        let currency = env.or_default("STORE_CURRENCY", "USD").to_uppercase();
        let nats_url = env.optional("NATS_URL");

        Ok(Self {
            host,
            port,
            backend: BackendConfig { base_url, timeout_secs, service_token },
            currency,
            nats_url,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    /// Unset and blank are the same thing.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T>(&self, key: &str, default: &str) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.or_default(key, default)
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    }
}
