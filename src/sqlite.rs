//! `SQLite` provider backed by rusqlite.
//!
//! - config: connection-string options and their builder
//! - params: parameter conversion and binding
//! - query: value extraction, result buffering and the reader
//! - schema: metadata collections
//! - connection: the `DbConnection` implementation

pub mod config;
pub mod connection;
pub mod params;
pub mod query;
mod schema;

use std::sync::Arc;

use crate::connection_string::ConnectionStringBuilder;
use crate::error::DbHelperError;
use crate::provider::{DbConnection, ProviderFactory};

pub use config::{OpenMode, SqliteOptions, SqliteOptionsBuilder};
pub use connection::SqliteConnection;
pub use query::{SqliteReader, build_result_set};

/// Provider factory for `SQLite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteProvider;

impl SqliteProvider {
    #[must_use]
    pub fn shared() -> Arc<dyn ProviderFactory> {
        Arc::new(SqliteProvider)
    }
}

impl ProviderFactory for SqliteProvider {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn create_connection(&self) -> Result<Box<dyn DbConnection>, DbHelperError> {
        Ok(Box::new(SqliteConnection::new(String::new())))
    }

    fn create_connection_string_builder(&self) -> ConnectionStringBuilder {
        let mut builder = ConnectionStringBuilder::new();
        builder.set("Data Source", "");
        builder
    }
}
