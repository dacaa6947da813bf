use crate::command::Command;
use crate::connection::{Connection, Transaction};
use crate::error::DbHelperError;
use crate::mapping::{DataObject, descriptor};
use crate::parameters::SqlQuery;
use crate::provider::DbConnection;
use crate::reader::{DataObjectIter, DataReader, MultiResultReader};
use crate::results::ResultSet;
use crate::types::{CommandBehavior, CommandKind, IsolationLevel, RowValues};

use super::{ConnectionScope, DbClient, ExecTarget, after_rollback, finish, run_batch};

impl DbClient {
    fn acquire(&self, target: ExecTarget<'_>) -> Result<ConnectionScope, DbHelperError> {
        match target {
            ExecTarget::Default => Ok(ConnectionScope::owned(self.open_connection(None)?)),
            ExecTarget::ConnectionString(cs) => {
                Ok(ConnectionScope::owned(self.open_connection(Some(cs))?))
            }
            ExecTarget::Connection(conn) => {
                if conn.ensure_open()? {
                    tracing::debug!(provider = %conn.provider_name(), "opened caller connection");
                }
                Ok(ConnectionScope::borrowed(conn.clone()))
            }
            ExecTarget::Transaction(tx) => Ok(ConnectionScope::borrowed(tx.connection().clone())),
        }
    }

    /// Execute one command built from the parameter store and capture its parameters.
    fn run_command<R, F>(
        &mut self,
        kind: CommandKind,
        text: &str,
        target: ExecTarget<'_>,
        func: F,
    ) -> Result<R, DbHelperError>
    where
        F: FnOnce(&mut dyn DbConnection, &mut Command) -> Result<R, DbHelperError>,
    {
        let mut command = self.build_command(kind, text, target.transaction())?;
        let scope = self.acquire(target)?;
        let result = scope
            .connection()
            .with_connection(|conn| func(conn, &mut command));
        self.parameters.capture(command.parameters);
        finish(result, scope.release())
    }

    /// Execute inside a transaction the client begins and ends itself.
    fn run_transacted<R, F>(
        &mut self,
        mut command: Command,
        target: ExecTarget<'_>,
        isolation: Option<IsolationLevel>,
        capture: bool,
        func: F,
    ) -> Result<R, DbHelperError>
    where
        F: FnOnce(&mut dyn DbConnection, &mut Command) -> Result<R, DbHelperError>,
    {
        Self::reject_transaction_target(&target)?;
        let isolation = self.isolation(isolation);
        let scope = self.acquire(target)?;
        let tx = match Transaction::begin(scope.connection(), isolation) {
            Ok(tx) => tx,
            Err(err) => return finish(Err(err), scope.release()),
        };
        command.in_transaction = true;

        let result = scope
            .connection()
            .with_connection(|conn| func(conn, &mut command));
        if capture {
            self.parameters.capture(command.parameters);
        }
        let result = match result {
            Ok(value) => tx.commit().map(|()| value),
            Err(err) => Err(after_rollback(err, tx.rollback())),
        };
        finish(result, scope.release())
    }

    /// Run a statement and return the number of rows affected.
    ///
    /// # Errors
    /// Returns parameter errors before any I/O, otherwise the driver error unchanged.
    pub fn execute_non_query<'a>(
        &mut self,
        kind: CommandKind,
        text: &str,
        target: impl Into<ExecTarget<'a>>,
    ) -> Result<usize, DbHelperError> {
        self.run_command(kind, text, target.into(), |conn, cmd| {
            conn.execute_non_query(cmd)
        })
    }

    /// First column of the first row, `RowValues::Null` when there are no rows.
    ///
    /// # Errors
    /// Returns parameter errors before any I/O, otherwise the driver error unchanged.
    pub fn execute_scalar<'a>(
        &mut self,
        kind: CommandKind,
        text: &str,
        target: impl Into<ExecTarget<'a>>,
    ) -> Result<RowValues, DbHelperError> {
        self.run_command(kind, text, target.into(), |conn, cmd| {
            conn.execute_scalar(cmd)
        })
    }

    /// Run a query and hand back a live cursor.
    ///
    /// A connection the client opened is closed with the reader; a caller connection is closed
    /// with the reader only when `behavior` contains `CLOSE_CONNECTION`.
    ///
    /// # Errors
    /// Returns parameter errors before any I/O, otherwise the driver error unchanged.
    pub fn get_reader<'a>(
        &mut self,
        kind: CommandKind,
        text: &str,
        behavior: CommandBehavior,
        target: impl Into<ExecTarget<'a>>,
    ) -> Result<DataReader, DbHelperError> {
        let target = target.into();
        let mut command = self.build_command(kind, text, target.transaction())?;
        let scope = self.acquire(target)?;
        let result = scope
            .connection()
            .with_connection(|conn| conn.execute_reader(&mut command, behavior));
        self.parameters.capture(command.parameters);
        match result {
            Ok(inner) => {
                let owner =
                    scope.into_reader_owner(behavior.contains(CommandBehavior::CLOSE_CONNECTION));
                Ok(DataReader::new(inner, owner))
            }
            Err(err) => finish(Err(err), scope.release()),
        }
    }

    /// Map the first row onto `T`; `T::default()` when the query returns no rows.
    ///
    /// # Errors
    /// Returns driver errors unchanged and mapping errors for unconvertible values.
    pub fn get_data_object<'a, T: DataObject>(
        &mut self,
        kind: CommandKind,
        text: &str,
        target: impl Into<ExecTarget<'a>>,
    ) -> Result<T, DbHelperError> {
        let mut reader = self.get_reader(kind, text, CommandBehavior::SINGLE_ROW, target)?;
        let item = reader.next_object(&descriptor::<T>());
        let closed = reader.close();
        finish(item, closed).map(Option::unwrap_or_default)
    }

    /// Map every row of the first result set.
    ///
    /// # Errors
    /// Returns driver errors unchanged and mapping errors for unconvertible values.
    pub fn get_data_object_list<'a, T: DataObject>(
        &mut self,
        kind: CommandKind,
        text: &str,
        target: impl Into<ExecTarget<'a>>,
    ) -> Result<Vec<T>, DbHelperError> {
        self.get_data_object_iter(kind, text, target)?.collect()
    }

    /// Lazily map the rows of the first result set. Each call runs the query again and owns
    /// its own cursor.
    ///
    /// # Errors
    /// Returns driver errors from running the query; row errors come from the iterator.
    pub fn get_data_object_iter<'a, T: DataObject>(
        &mut self,
        kind: CommandKind,
        text: &str,
        target: impl Into<ExecTarget<'a>>,
    ) -> Result<DataObjectIter<T>, DbHelperError> {
        let reader = self.get_reader(kind, text, CommandBehavior::SINGLE_RESULT, target)?;
        Ok(reader.into_objects())
    }

    /// Reader over every result set the command produces.
    ///
    /// # Errors
    /// Returns parameter errors before any I/O, otherwise the driver error unchanged.
    pub fn get_multi_result_reader<'a>(
        &mut self,
        kind: CommandKind,
        text: &str,
        target: impl Into<ExecTarget<'a>>,
    ) -> Result<MultiResultReader, DbHelperError> {
        let reader = self.get_reader(kind, text, CommandBehavior::DEFAULT, target)?;
        Ok(MultiResultReader::new(reader))
    }

    /// Run a statement in its own transaction; commit on success, roll back on failure.
    ///
    /// # Errors
    /// Returns the statement error after rollback, `RollbackFailed` when the rollback fails too,
    /// or `ConfigError` for a transaction target.
    pub fn execute_transacted_non_query<'a>(
        &mut self,
        kind: CommandKind,
        text: &str,
        isolation: Option<IsolationLevel>,
        target: impl Into<ExecTarget<'a>>,
    ) -> Result<usize, DbHelperError> {
        let command = self.build_command(kind, text, None)?;
        self.run_transacted(command, target.into(), isolation, true, |conn, cmd| {
            conn.execute_non_query(cmd)
        })
    }

    /// Run each query in order on one connection with one reused command. Stops at the first
    /// failure; earlier statements stay applied. Returns the total rows affected.
    ///
    /// # Errors
    /// Returns parameter errors before any I/O, otherwise the first driver error.
    pub fn execute_batched_non_query<'a>(
        &mut self,
        queries: &[SqlQuery],
        target: impl Into<ExecTarget<'a>>,
    ) -> Result<usize, DbHelperError> {
        let target = target.into();
        let units = self.prepare_batch(queries)?;
        let mut command = self.batch_command(target.transaction().is_some());
        let scope = self.acquire(target)?;
        let result = scope
            .connection()
            .with_connection(|conn| run_batch(conn, &mut command, &units));
        finish(result, scope.release())
    }

    /// Run every query in one transaction: all of them apply, or none do.
    ///
    /// # Errors
    /// Returns the failing statement's error after rollback, `RollbackFailed` when the rollback
    /// fails too, or `ConfigError` for a transaction target.
    pub fn execute_transacted_batched_non_query<'a>(
        &mut self,
        queries: &[SqlQuery],
        isolation: Option<IsolationLevel>,
        target: impl Into<ExecTarget<'a>>,
    ) -> Result<usize, DbHelperError> {
        let units = self.prepare_batch(queries)?;
        let command = self.batch_command(true);
        self.run_transacted(command, target.into(), isolation, false, |conn, cmd| {
            run_batch(conn, cmd, &units)
        })
    }

    /// Begin a transaction on `connection`, opening it first if it is closed.
    ///
    /// # Errors
    /// Returns the driver error.
    pub fn begin_transaction(
        &self,
        connection: &Connection,
        isolation: Option<IsolationLevel>,
    ) -> Result<Transaction, DbHelperError> {
        connection.ensure_open()?;
        self.factory
            .get_transaction(connection, self.isolation(isolation))
    }

    /// # Errors
    /// Returns `Unimplemented` when the provider cannot switch databases.
    pub fn change_database(&self, connection: &Connection, name: &str) -> Result<(), DbHelperError> {
        connection.ensure_open()?;
        connection.change_database(name)
    }

    /// Schema metadata; `None` lists the available collections.
    ///
    /// # Errors
    /// Returns `Unimplemented` for collections the provider does not know.
    pub fn get_schema<'a>(
        &self,
        collection: Option<&str>,
        restrictions: &[Option<String>],
        target: impl Into<ExecTarget<'a>>,
    ) -> Result<ResultSet, DbHelperError> {
        let scope = self.acquire(target.into())?;
        let result = scope.connection().get_schema(collection, restrictions);
        finish(result, scope.release())
    }
}
