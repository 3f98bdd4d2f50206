// Error types for the messaging client, batch storage and configuration

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a messaging client
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server asked us to back off for `wait`
    #[error("rate limited, retry after {}s", wait.as_secs())]
    RateLimited { wait: Duration },

    /// The server rejected the call
    #[error("{code}: {message}")]
    Rpc { code: String, message: String },

    /// The connection to Telegram failed or timed out
    #[error("transport error: {0}")]
    Transport(String),

    /// Telegram answered with something we did not expect
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("client is not connected")]
    NotConnected,
}

impl ClientError {
    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ClientError::RateLimited { .. })
    }
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        ClientError::Transport(e.to_string())
    }
}

/// Errors raised by batch and checkpoint storage
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A batch file exists but does not hold a valid page
    #[error("malformed batch {key}: {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid batch key: {0}")]
    InvalidKey(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Anything that stops a flow
#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Startup configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),

    #[error("environment variable {name} is invalid: {reason}")]
    InvalidEnv { name: &'static str, reason: String },

    #[error("a target chat is required (use --target or TGFORWARD_TARGET)")]
    MissingTarget,

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
