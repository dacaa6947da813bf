use thiserror::Error;

#[cfg(feature = "sqlite")]
use rusqlite;

/// Errors surfaced by the helper.
///
/// Driver failures keep their original type (`SqliteError`, `DriverError`) so callers can tell
/// "the database rejected this" apart from configuration and mapping mistakes.
#[derive(Debug, Error)]
pub enum DbHelperError {
    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    /// Error raised by a third-party provider, passed through untouched.
    #[error(transparent)]
    DriverError(Box<dyn std::error::Error + Send + Sync>),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Parameter error: {0}")]
    ParameterError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Mapping error on `{property}`: {message}")]
    MappingError { property: String, message: String },

    #[error("Type conversion error: {0}")]
    ConversionError(String),

    #[error("Operation cancelled")]
    Cancelled,

    /// Rollback after a failed statement failed too. The rollback error is the top-level
    /// error; the failure that triggered the rollback is kept in `original`.
    #[error("Rollback failed: {source} (rollback was triggered by: {original})")]
    RollbackFailed {
        source: Box<DbHelperError>,
        original: Box<DbHelperError>,
    },

    #[error("Unimplemented feature: {0}")]
    Unimplemented(String),

    #[error("Other database error: {0}")]
    Other(String),
}

impl DbHelperError {
    /// Wrap an arbitrary driver error without translating it.
    pub fn driver<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        DbHelperError::DriverError(Box::new(err))
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DbHelperError::Cancelled)
    }

    /// True for errors caused by caller setup (bad config, bad parameters) rather than the
    /// database itself.
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            DbHelperError::ConfigError(_) | DbHelperError::ParameterError(_)
        )
    }

    #[must_use]
    pub fn is_mapping(&self) -> bool {
        matches!(
            self,
            DbHelperError::MappingError { .. } | DbHelperError::ConversionError(_)
        )
    }

    pub(crate) fn join(err: &tokio::task::JoinError) -> Self {
        DbHelperError::ExecutionError(format!("spawn_blocking join error: {err}"))
    }
}
