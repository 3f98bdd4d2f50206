// Startup configuration: account credentials and pacing

use crate::forwarder::client::RetryPolicy;
use crate::forwarder::error::ConfigError;
use crate::forwarder::pager::MAX_BATCH_SIZE;
use std::fmt;
use std::time::Duration;

/// Environment variable holding the application id
pub const ENV_API_ID: &str = "appid";
/// Environment variable holding the application secret
pub const ENV_API_HASH: &str = "hashid";
/// Environment variable holding the account phone number
pub const ENV_PHONE: &str = "number";

/// Account credentials used to sign in to Telegram
#[derive(Clone)]
pub struct Credentials {
    pub api_id: i32,
    pub api_hash: String,
    pub phone: String,
}

impl Credentials {
    /// Load credentials from the process environment (and `.env`, if present)
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load credentials through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| -> Result<String, ConfigError> {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::MissingEnv(name))
        };

        let api_id = required(ENV_API_ID)?
            .parse::<i32>()
            .map_err(|e| ConfigError::InvalidEnv {
                name: ENV_API_ID,
                reason: e.to_string(),
            })?;
        if api_id <= 0 {
            return Err(ConfigError::InvalidEnv {
                name: ENV_API_ID,
                reason: "must be a positive integer".to_string(),
            });
        }

        Ok(Self {
            api_id,
            api_hash: required(ENV_API_HASH)?,
            phone: required(ENV_PHONE)?,
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_id", &self.api_id)
            .field("api_hash", &"<redacted>")
            .field("phone", &"<redacted>")
            .finish()
    }
}

/// How fast a flow walks through batches
#[derive(Debug, Clone)]
pub struct Pacing {
    /// Messages per batch
    pub batch_size: usize,
    /// Fixed pause after every batch
    pub delay: Duration,
    /// Retry for transient transport failures
    pub retry: RetryPolicy,
}

impl Pacing {
    pub fn new(batch_size: usize, delay: Duration) -> Result<Self, ConfigError> {
        if batch_size == 0 || batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::Invalid {
                field: "batch size",
                reason: format!("must be between 1 and {}", MAX_BATCH_SIZE),
            });
        }

        Ok(Self {
            batch_size,
            delay,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            batch_size: MAX_BATCH_SIZE,
            delay: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}
