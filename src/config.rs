//! Session and auth configuration, with environment overrides.

use anyhow::{Context, Result, bail};
use log::debug;
use std::env::VarError;
use std::time::Duration;

use crate::auth::Credentials;
use crate::http::{DEFAULT_RETRIES, RETRY_DELAY_MS};
use crate::runtime::Runtime;

/// Default wall-clock budget for one call, retries included.
pub const DEFAULT_TIMEOUT_MS: u64 = 100_000;

/// Default base URL of the auth endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api-sandbox.pitneybowes.com";

pub const ENV_RETRIES: &str = "SHIPPING_API_RETRIES";
pub const ENV_TIMEOUT_MS: &str = "SHIPPING_API_TIMEOUT_MS";
pub const ENV_RETRY_DELAY_MS: &str = "SHIPPING_API_RETRY_DELAY_MS";
pub const ENV_THROW_ON_FAILURE: &str = "SHIPPING_API_THROW_ON_FAILURE";
pub const ENV_BASE_URL: &str = "SHIPPING_API_URL";
pub const ENV_API_KEY: &str = "SHIPPING_API_KEY";
pub const ENV_API_SECRET: &str = "SHIPPING_API_SECRET";

/// Retry, timeout and failure policy of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Attempts per call, at least 1.
    pub retries: u32,
    /// Wall-clock budget per call; no new attempt starts once it is exceeded.
    pub timeout: Duration,
    /// Pause before the next attempt.
    pub retry_delay: Duration,
    /// Raise `ApiError` instead of returning failed responses.
    pub throw_on_failure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
            throw_on_failure: false,
        }
    }
}

impl SessionConfig {
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_throw_on_failure(mut self, throw_on_failure: bool) -> Self {
        self.throw_on_failure = throw_on_failure;
        self
    }

    /// Defaults overridden by `SHIPPING_API_*` variables.
    pub fn from_runtime<R: Runtime + ?Sized>(runtime: &R) -> Result<Self> {
        let mut config = Self::default();

        if let Some(retries) = read_var(runtime, ENV_RETRIES)? {
            let retries: u32 = retries
                .parse()
                .with_context(|| format!("Invalid {}: '{}'", ENV_RETRIES, retries))?;
            if retries == 0 {
                bail!("Invalid {}: must be a positive integer", ENV_RETRIES);
            }
            config.retries = retries;
        }

        if let Some(ms) = read_var(runtime, ENV_TIMEOUT_MS)? {
            let ms: u64 = ms
                .parse()
                .with_context(|| format!("Invalid {}: '{}'", ENV_TIMEOUT_MS, ms))?;
            config.timeout = Duration::from_millis(ms);
        }

        if let Some(ms) = read_var(runtime, ENV_RETRY_DELAY_MS)? {
            let ms: u64 = ms
                .parse()
                .with_context(|| format!("Invalid {}: '{}'", ENV_RETRY_DELAY_MS, ms))?;
            config.retry_delay = Duration::from_millis(ms);
        }

        if let Some(flag) = read_var(runtime, ENV_THROW_ON_FAILURE)? {
            config.throw_on_failure = parse_bool(&flag)
                .with_context(|| format!("Invalid {}: '{}'", ENV_THROW_ON_FAILURE, flag))?;
        }

        debug!("Session config: {:?}", config);
        Ok(config)
    }
}

/// Where and how to obtain bearer tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    pub base_url: String,
    pub credentials: Credentials,
}

impl AuthConfig {
    pub fn from_runtime<R: Runtime + ?Sized>(runtime: &R) -> Result<Self> {
        let api_key = read_var(runtime, ENV_API_KEY)?
            .with_context(|| format!("{} is not set", ENV_API_KEY))?;
        let api_secret = read_var(runtime, ENV_API_SECRET)?
            .with_context(|| format!("{} is not set", ENV_API_SECRET))?;
        let base_url =
            read_var(runtime, ENV_BASE_URL)?.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        debug!(
            "Using API key {} against {}",
            crate::auth::mask(&api_key),
            base_url
        );

        Ok(Self {
            base_url,
            credentials: Credentials::new(api_key, api_secret),
        })
    }
}

/// Reads a variable, treating unset and blank the same.
fn read_var<R: Runtime + ?Sized>(runtime: &R, key: &str) -> Result<Option<String>> {
    match runtime.env_var(key) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value.trim().to_string())),
        Err(VarError::NotPresent) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", key)),
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("expected true or false"),
    }
}
