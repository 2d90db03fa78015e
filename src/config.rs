//! Configuration for the HTTP transport.
//!
//! Defaults point at the public Cloud KMS endpoint. Override through the
//! environment or by building [`RestConfig`] directly for tests.

use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://cloudkms.googleapis.com/";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Custom `Debug` redacts the access token.
#[derive(Clone)]
pub struct RestConfig {
    /// Service root; request paths are `v1/{name}:{verb}` below it.
    pub base_url: Url,
    /// OAuth2 bearer token sent on every request.
    pub access_token: String,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for RestConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestConfig")
            .field("base_url", &self.base_url)
            .field("access_token", &"[REDACTED]")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl RestConfig {
    pub fn new(access_token: impl Into<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: parse_url("base_url", DEFAULT_BASE_URL)?,
            access_token: access_token.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        })
    }

    /// Load configuration from environment variables.
    ///
    /// - `KMS_ACCESS_TOKEN` (required)
    /// - `KMS_BASE_URL` (default: `https://cloudkms.googleapis.com/`)
    /// - `KMS_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        let access_token =
            std::env::var("KMS_ACCESS_TOKEN").map_err(|_| ConfigError::MissingToken)?;
        let base_url = std::env::var("KMS_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        let timeout_secs = match std::env::var("KMS_TIMEOUT_SECS") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidTimeout(raw.clone()))?,
            Err(_) => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            base_url: parse_url("KMS_BASE_URL", &base_url)?,
            access_token,
            timeout_secs,
        })
    }
}

fn parse_url(var: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|source| ConfigError::InvalidUrl { var, source })
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("KMS_ACCESS_TOKEN is not set")]
    MissingToken,

    #[error("the access token is not a valid header value")]
    InvalidToken,

    #[error("invalid URL in {var}")]
    InvalidUrl {
        var: &'static str,
        #[source]
        source: url::ParseError,
    },

    #[error("KMS_TIMEOUT_SECS must be a whole number of seconds, got {0:?}")]
    InvalidTimeout(String),

    #[error("failed to build the HTTP client")]
    Client(#[source] reqwest::Error),
}
