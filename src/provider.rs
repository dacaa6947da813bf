//! Driver boundary.
//!
//! A provider supplies connections for one dialect. Drivers are blocking; the async half of
//! the engine moves each driver call onto tokio's blocking pool.

use std::sync::Arc;

use crate::command::Command;
use crate::connection_string::ConnectionStringBuilder;
use crate::error::DbHelperError;
use crate::parameters::Parameter;
use crate::results::ResultSet;
use crate::types::{CommandBehavior, ConnectionState, DbType, IsolationLevel, RowValues};

/// Abstract factory for one database dialect.
pub trait ProviderFactory: Send + Sync {
    /// Short provider identifier, used in logs.
    fn name(&self) -> &str;

    /// Create an unopened connection.
    ///
    /// # Errors
    /// Returns a driver error if the connection object cannot be created.
    fn create_connection(&self) -> Result<Box<dyn DbConnection>, DbHelperError>;

    fn create_command(&self) -> Command {
        Command::default()
    }

    fn create_parameter(&self) -> Parameter {
        Parameter::default()
    }

    fn create_connection_string_builder(&self) -> ConnectionStringBuilder {
        ConnectionStringBuilder::new()
    }

    /// Symbol prefixed to parameter names in this dialect.
    fn default_variable_binder(&self) -> &str {
        "@"
    }

    /// Data kind for a value when the caller did not give one.
    fn infer_db_type(&self, value: &RowValues) -> DbType {
        DbType::for_value(value)
    }
}

/// Lets a driver abort a statement that is already running on another thread.
pub trait CancelHandle: Send + Sync {
    fn cancel(&self);
}

/// One driver connection.
///
/// Commands run against the connection; an explicit transaction is connection state opened
/// with `begin_transaction` and ended with `commit` or `rollback`.
pub trait DbConnection: Send {
    fn connection_string(&self) -> &str;

    fn set_connection_string(&mut self, value: &str);

    /// Name of the current database, empty when unknown.
    fn database(&self) -> String;

    fn state(&self) -> ConnectionState;

    /// # Errors
    /// Returns a driver error if the data source cannot be reached.
    fn open(&mut self) -> Result<(), DbHelperError>;

    /// Closing an already closed connection is a no-op.
    ///
    /// # Errors
    /// Returns a driver error if the close fails.
    fn close(&mut self) -> Result<(), DbHelperError>;

    /// # Errors
    /// Returns `Unimplemented` unless the driver supports switching databases.
    fn change_database(&mut self, name: &str) -> Result<(), DbHelperError> {
        Err(DbHelperError::Unimplemented(format!(
            "change database to {name} is not supported by this provider"
        )))
    }

    /// # Errors
    /// Returns `Unimplemented` unless the driver supports distributed transactions.
    fn enlist_transaction(&mut self, transaction_id: &str) -> Result<(), DbHelperError> {
        Err(DbHelperError::Unimplemented(format!(
            "enlisting in distributed transaction {transaction_id} is not supported by this provider"
        )))
    }

    /// # Errors
    /// Returns a driver error if the transaction cannot start.
    fn begin_transaction(&mut self, isolation: IsolationLevel) -> Result<(), DbHelperError>;

    /// # Errors
    /// Returns a driver error if the commit fails.
    fn commit(&mut self) -> Result<(), DbHelperError>;

    /// # Errors
    /// Returns a driver error if the rollback fails.
    fn rollback(&mut self) -> Result<(), DbHelperError>;

    /// Schema metadata for `collection`; `None` lists the available collections.
    ///
    /// # Errors
    /// Returns `Unimplemented` unless the driver exposes schema metadata.
    fn get_schema(
        &mut self,
        collection: Option<&str>,
        restrictions: &[Option<String>],
    ) -> Result<ResultSet, DbHelperError> {
        let _ = restrictions;
        Err(DbHelperError::Unimplemented(format!(
            "schema collection {collection:?} is not supported by this provider"
        )))
    }

    /// # Errors
    /// Returns the driver error unchanged.
    fn execute_non_query(&mut self, command: &mut Command) -> Result<usize, DbHelperError>;

    /// First column of the first row, or `RowValues::Null` when there are no rows.
    ///
    /// # Errors
    /// Returns the driver error unchanged.
    fn execute_scalar(&mut self, command: &mut Command) -> Result<RowValues, DbHelperError>;

    /// # Errors
    /// Returns the driver error unchanged.
    fn execute_reader(
        &mut self,
        command: &mut Command,
        behavior: CommandBehavior,
    ) -> Result<Box<dyn DbReader>, DbHelperError>;

    /// Handle that can interrupt a running statement, when the driver supports it.
    fn cancel_handle(&self) -> Option<Arc<dyn CancelHandle>> {
        None
    }
}

/// Forward-only cursor over one or more result sets.
pub trait DbReader: Send {
    /// Column names of the current result set.
    fn column_names(&self) -> Arc<Vec<String>>;

    fn field_count(&self) -> usize {
        self.column_names().len()
    }

    /// Advance to the next row of the current result set.
    ///
    /// # Errors
    /// Returns the driver error unchanged.
    fn read(&mut self) -> Result<bool, DbHelperError>;

    /// # Errors
    /// Returns an error when no row is current or `ordinal` is out of range.
    fn get_value(&self, ordinal: usize) -> Result<RowValues, DbHelperError>;

    /// # Errors
    /// Same conditions as `get_value`.
    fn is_null(&self, ordinal: usize) -> Result<bool, DbHelperError> {
        Ok(self.get_value(ordinal)?.is_null())
    }

    /// Advance to the next result set; `false` when there are no more.
    ///
    /// # Errors
    /// Returns the driver error unchanged.
    fn next_result(&mut self) -> Result<bool, DbHelperError>;

    fn records_affected(&self) -> usize;

    /// # Errors
    /// Returns the driver error unchanged.
    fn close(&mut self) -> Result<(), DbHelperError>;

    fn is_closed(&self) -> bool;
}
