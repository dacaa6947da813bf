//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::command::{Command, DEFAULT_COMMAND_TIMEOUT_SECS};
pub use crate::config::{ClientOptions, ClientOptionsBuilder};
pub use crate::connection::{Connection, Transaction};
pub use crate::connection_string::ConnectionStringBuilder;
pub use crate::error::DbHelperError;
pub use crate::executor::{DbClient, ExecTarget};
pub use crate::factory::ObjectFactory;
pub use crate::mapping::{DataObject, FieldMap, FromRowValue, map_row};
pub use crate::parameters::{Parameter, ParameterStore, SqlQuery};
pub use crate::provider::{CancelHandle, DbConnection, DbReader, ProviderFactory};
pub use crate::reader::{DataObjectIter, DataReader, MultiResultReader};
pub use crate::results::{DataRow, ResultSet};
pub use crate::types::{
    CommandBehavior, CommandKind, ConnectionState, DatabaseType, DbType, IsolationLevel,
    ParameterDirection, RowValues,
};

#[cfg(feature = "sqlite")]
pub use crate::sqlite::{SqliteOptions, SqliteOptionsBuilder, SqliteProvider};

pub use futures_util::{StreamExt, TryStreamExt};
pub use tokio_util::sync::CancellationToken;
