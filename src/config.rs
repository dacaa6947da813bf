use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::DEFAULT_COMMAND_TIMEOUT_SECS;
use crate::error::DbHelperError;
use crate::types::IsolationLevel;

fn default_command_timeout() -> u32 {
    DEFAULT_COMMAND_TIMEOUT_SECS
}

fn default_retry_interval_ms() -> u64 {
    1000
}

/// Client configuration.
///
/// ```rust
/// use sql_dbhelper::prelude::*;
///
/// let opts = ClientOptions::from_json(r#"{ "connection_string": "Data Source=app.db" }"#)?;
/// assert_eq!(opts.command_timeout_secs, 30);
/// assert_eq!(opts.retry_count, 0);
/// # Ok::<(), DbHelperError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientOptions {
    /// Used by every call that does not bring its own connection.
    #[serde(default)]
    pub connection_string: String,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u32,
    /// Overrides the provider's binder symbol when set.
    #[serde(default)]
    pub variable_binder: Option<String>,
    /// Extra attempts when opening an engine-owned connection fails. Statements are never
    /// retried.
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    /// Isolation level for the transacted helpers.
    #[serde(default)]
    pub isolation_level: IsolationLevel,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl ClientOptions {
    #[must_use]
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            variable_binder: None,
            retry_count: 0,
            retry_interval_ms: default_retry_interval_ms(),
            isolation_level: IsolationLevel::Unspecified,
        }
    }

    #[must_use]
    pub fn builder(connection_string: impl Into<String>) -> ClientOptionsBuilder {
        ClientOptionsBuilder::new(connection_string)
    }

    /// # Errors
    /// Returns `ConfigError` if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self, DbHelperError> {
        serde_json::from_str(json)
            .map_err(|e| DbHelperError::ConfigError(format!("invalid client options: {e}")))
    }

    #[must_use]
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

/// Fluent builder for `ClientOptions`.
#[derive(Debug, Clone)]
pub struct ClientOptionsBuilder {
    opts: ClientOptions,
}

impl ClientOptionsBuilder {
    #[must_use]
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            opts: ClientOptions::new(connection_string),
        }
    }

    #[must_use]
    pub fn command_timeout(mut self, secs: u32) -> Self {
        self.opts.command_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn variable_binder(mut self, binder: impl Into<String>) -> Self {
        self.opts.variable_binder = Some(binder.into());
        self
    }

    #[must_use]
    pub fn retries(mut self, count: u32, interval: Duration) -> Self {
        self.opts.retry_count = count;
        self.opts.retry_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.opts.isolation_level = level;
        self
    }

    #[must_use]
    pub fn finish(self) -> ClientOptions {
        self.opts
    }
}
