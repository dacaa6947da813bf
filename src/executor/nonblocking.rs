use futures_util::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::command::Command;
use crate::connection::{Connection, Transaction, check_cancelled};
use crate::error::DbHelperError;
use crate::mapping::{DataObject, descriptor};
use crate::parameters::SqlQuery;
use crate::provider::DbConnection;
use crate::reader::{DataReader, MultiResultReader};
use crate::results::ResultSet;
use crate::types::{CommandBehavior, CommandKind, IsolationLevel, RowValues};

use super::{ConnectionScope, DbClient, ExecTarget, after_rollback, finish, run_batch};

impl DbClient {
    async fn acquire_async(
        &self,
        target: ExecTarget<'_>,
        token: &CancellationToken,
    ) -> Result<ConnectionScope, DbHelperError> {
        match target {
            ExecTarget::Default => Ok(ConnectionScope::owned(
                self.open_connection_async(None, token).await?,
            )),
            ExecTarget::ConnectionString(cs) => Ok(ConnectionScope::owned(
                self.open_connection_async(Some(cs), token).await?,
            )),
            ExecTarget::Connection(conn) => {
                if conn.ensure_open_async(token).await? {
                    tracing::debug!(provider = %conn.provider_name(), "opened caller connection");
                }
                Ok(ConnectionScope::borrowed(conn.clone()))
            }
            ExecTarget::Transaction(tx) => Ok(ConnectionScope::borrowed(tx.connection().clone())),
        }
    }

    /// Run `func` with the command on the blocking pool and get the command back for capture.
    async fn dispatch<R, F>(
        scope: &ConnectionScope,
        command: Command,
        token: &CancellationToken,
        func: F,
    ) -> (Option<Command>, Result<R, DbHelperError>)
    where
        F: FnOnce(&mut dyn DbConnection, &mut Command) -> Result<R, DbHelperError>
            + Send
            + 'static,
        R: Send + 'static,
    {
        if let Err(err) = check_cancelled(token) {
            return (Some(command), Err(err));
        }
        let outcome = scope
            .connection()
            .run_blocking(Some(token), move |conn| {
                let mut command = command;
                let result = func(conn, &mut command);
                (command, result)
            })
            .await;
        match outcome {
            Ok((command, result)) => (Some(command), result),
            Err(err) => (None, Err(err)),
        }
    }

    async fn run_command_async<R, F>(
        &mut self,
        kind: CommandKind,
        text: &str,
        target: ExecTarget<'_>,
        token: &CancellationToken,
        func: F,
    ) -> Result<R, DbHelperError>
    where
        F: FnOnce(&mut dyn DbConnection, &mut Command) -> Result<R, DbHelperError>
            + Send
            + 'static,
        R: Send + 'static,
    {
        check_cancelled(token)?;
        let command = self.build_command(kind, text, target.transaction())?;
        let scope = self.acquire_async(target, token).await?;
        let (command, result) = Self::dispatch(&scope, command, token, func).await;
        if let Some(command) = command {
            self.parameters.capture(command.parameters);
        }
        finish(result, scope.release_async().await)
    }

    async fn run_transacted_async<R, F>(
        &mut self,
        mut command: Command,
        target: ExecTarget<'_>,
        isolation: Option<IsolationLevel>,
        capture: bool,
        token: &CancellationToken,
        func: F,
    ) -> Result<R, DbHelperError>
    where
        F: FnOnce(&mut dyn DbConnection, &mut Command) -> Result<R, DbHelperError>
            + Send
            + 'static,
        R: Send + 'static,
    {
        Self::reject_transaction_target(&target)?;
        check_cancelled(token)?;
        let isolation = self.isolation(isolation);
        let scope = self.acquire_async(target, token).await?;
        let tx = match Transaction::begin_async(scope.connection(), isolation, token).await {
            Ok(tx) => tx,
            Err(err) => return finish(Err(err), scope.release_async().await),
        };
        command.in_transaction = true;

        let (command, result) = Self::dispatch(&scope, command, token, func).await;
        if capture && let Some(command) = command {
            self.parameters.capture(command.parameters);
        }
        let result = match result {
            Ok(value) => tx.commit_async(token).await.map(|()| value),
            Err(err) => Err(after_rollback(err, tx.rollback_after_failure().await)),
        };
        finish(result, scope.release_async().await)
    }

    /// # Errors
    /// Returns `Cancelled` if `token` fires, parameter errors before any I/O, otherwise the
    /// driver error unchanged.
    pub async fn execute_non_query_async<'a>(
        &mut self,
        kind: CommandKind,
        text: &str,
        target: impl Into<ExecTarget<'a>>,
        token: &CancellationToken,
    ) -> Result<usize, DbHelperError> {
        self.run_command_async(kind, text, target.into(), token, |conn, cmd| {
            conn.execute_non_query(cmd)
        })
        .await
    }

    /// # Errors
    /// Returns `Cancelled` if `token` fires, parameter errors before any I/O, otherwise the
    /// driver error unchanged.
    pub async fn execute_scalar_async<'a>(
        &mut self,
        kind: CommandKind,
        text: &str,
        target: impl Into<ExecTarget<'a>>,
        token: &CancellationToken,
    ) -> Result<RowValues, DbHelperError> {
        self.run_command_async(kind, text, target.into(), token, |conn, cmd| {
            conn.execute_scalar(cmd)
        })
        .await
    }

    /// # Errors
    /// Returns `Cancelled` if `token` fires, parameter errors before any I/O, otherwise the
    /// driver error unchanged.
    pub async fn get_reader_async<'a>(
        &mut self,
        kind: CommandKind,
        text: &str,
        behavior: CommandBehavior,
        target: impl Into<ExecTarget<'a>>,
        token: &CancellationToken,
    ) -> Result<DataReader, DbHelperError> {
        let target = target.into();
        check_cancelled(token)?;
        let command = self.build_command(kind, text, target.transaction())?;
        let scope = self.acquire_async(target, token).await?;
        let (command, result) = Self::dispatch(&scope, command, token, move |conn, cmd| {
            conn.execute_reader(cmd, behavior)
        })
        .await;
        if let Some(command) = command {
            self.parameters.capture(command.parameters);
        }
        match result {
            Ok(inner) => {
                let owner =
                    scope.into_reader_owner(behavior.contains(CommandBehavior::CLOSE_CONNECTION));
                Ok(DataReader::new(inner, owner))
            }
            Err(err) => finish(Err(err), scope.release_async().await),
        }
    }

    /// # Errors
    /// Returns `Cancelled`, driver errors unchanged and mapping errors.
    pub async fn get_data_object_async<'a, T: DataObject>(
        &mut self,
        kind: CommandKind,
        text: &str,
        target: impl Into<ExecTarget<'a>>,
        token: &CancellationToken,
    ) -> Result<T, DbHelperError> {
        let mut reader = self
            .get_reader_async(kind, text, CommandBehavior::SINGLE_ROW, target, token)
            .await?;
        let item = reader.next_object_async(&descriptor::<T>(), token).await;
        let closed = reader.close_async().await;
        finish(item, closed).map(Option::unwrap_or_default)
    }

    /// # Errors
    /// Returns `Cancelled`, driver errors unchanged and mapping errors.
    pub async fn get_data_object_list_async<'a, T: DataObject>(
        &mut self,
        kind: CommandKind,
        text: &str,
        target: impl Into<ExecTarget<'a>>,
        token: &CancellationToken,
    ) -> Result<Vec<T>, DbHelperError> {
        let mut reader = self
            .get_reader_async(kind, text, CommandBehavior::SINGLE_RESULT, target, token)
            .await?;
        let map = descriptor::<T>();
        let mut items = Vec::new();
        let result = loop {
            match reader.next_object_async(&map, token).await {
                Ok(Some(item)) => items.push(item),
                Ok(None) => break Ok(()),
                Err(err) => break Err(err),
            }
        };
        let closed = reader.close_async().await;
        finish(result, closed).map(|()| items)
    }

    /// Lazy, single-pass stream of mapped rows from the first result set.
    ///
    /// Cancelling `token` ends the stream with one `Cancelled` error. The reader and any
    /// connection the call opened are released when the stream ends, fails or is dropped.
    ///
    /// # Errors
    /// Returns `Cancelled` or driver errors from running the query.
    pub async fn get_data_object_enumerable_async<'a, T: DataObject>(
        &mut self,
        kind: CommandKind,
        text: &str,
        target: impl Into<ExecTarget<'a>>,
        token: &CancellationToken,
    ) -> Result<BoxStream<'static, Result<T, DbHelperError>>, DbHelperError> {
        let reader = self
            .get_reader_async(kind, text, CommandBehavior::SINGLE_RESULT, target, token)
            .await?;
        Ok(reader.into_object_stream(token.clone()))
    }

    /// # Errors
    /// Returns `Cancelled`, parameter errors before any I/O, otherwise the driver error.
    pub async fn get_multi_result_reader_async<'a>(
        &mut self,
        kind: CommandKind,
        text: &str,
        target: impl Into<ExecTarget<'a>>,
        token: &CancellationToken,
    ) -> Result<MultiResultReader, DbHelperError> {
        let reader = self
            .get_reader_async(kind, text, CommandBehavior::DEFAULT, target, token)
            .await?;
        Ok(MultiResultReader::new(reader))
    }

    /// # Errors
    /// Returns `Cancelled`, the statement error after rollback, `RollbackFailed` when the
    /// rollback fails too, or `ConfigError` for a transaction target.
    pub async fn execute_transacted_non_query_async<'a>(
        &mut self,
        kind: CommandKind,
        text: &str,
        isolation: Option<IsolationLevel>,
        target: impl Into<ExecTarget<'a>>,
        token: &CancellationToken,
    ) -> Result<usize, DbHelperError> {
        check_cancelled(token)?;
        let command = self.build_command(kind, text, None)?;
        self.run_transacted_async(command, target.into(), isolation, true, token, |conn, cmd| {
            conn.execute_non_query(cmd)
        })
        .await
    }

    /// # Errors
    /// Returns `Cancelled`, parameter errors before any I/O, otherwise the first driver error.
    pub async fn execute_batched_non_query_async<'a>(
        &mut self,
        queries: &[SqlQuery],
        target: impl Into<ExecTarget<'a>>,
        token: &CancellationToken,
    ) -> Result<usize, DbHelperError> {
        let target = target.into();
        check_cancelled(token)?;
        let units = self.prepare_batch(queries)?;
        let command = self.batch_command(target.transaction().is_some());
        let scope = self.acquire_async(target, token).await?;
        let (_, result) = Self::dispatch(&scope, command, token, move |conn, cmd| {
            run_batch(conn, cmd, &units)
        })
        .await;
        finish(result, scope.release_async().await)
    }

    /// # Errors
    /// Returns `Cancelled`, the failing statement's error after rollback, `RollbackFailed` when
    /// the rollback fails too, or `ConfigError` for a transaction target.
    pub async fn execute_transacted_batched_non_query_async<'a>(
        &mut self,
        queries: &[SqlQuery],
        isolation: Option<IsolationLevel>,
        target: impl Into<ExecTarget<'a>>,
        token: &CancellationToken,
    ) -> Result<usize, DbHelperError> {
        check_cancelled(token)?;
        let units = self.prepare_batch(queries)?;
        let command = self.batch_command(true);
        self.run_transacted_async(
            command,
            target.into(),
            isolation,
            false,
            token,
            move |conn, cmd| run_batch(conn, cmd, &units),
        )
        .await
    }

    /// # Errors
    /// Returns `Cancelled` or the driver error.
    pub async fn begin_transaction_async(
        &self,
        connection: &Connection,
        isolation: Option<IsolationLevel>,
        token: &CancellationToken,
    ) -> Result<Transaction, DbHelperError> {
        connection.ensure_open_async(token).await?;
        self.factory
            .get_transaction_async(connection, self.isolation(isolation), token)
            .await
    }

    /// # Errors
    /// Returns `Cancelled`, or `Unimplemented` when the provider cannot switch databases.
    pub async fn change_database_async(
        &self,
        connection: &Connection,
        name: &str,
        token: &CancellationToken,
    ) -> Result<(), DbHelperError> {
        connection.ensure_open_async(token).await?;
        connection.change_database_async(name, token).await
    }

    /// # Errors
    /// Returns `Cancelled`, or `Unimplemented` for collections the provider does not know.
    pub async fn get_schema_async<'a>(
        &self,
        collection: Option<&str>,
        restrictions: &[Option<String>],
        target: impl Into<ExecTarget<'a>>,
        token: &CancellationToken,
    ) -> Result<ResultSet, DbHelperError> {
        check_cancelled(token)?;
        let scope = self.acquire_async(target.into(), token).await?;
        let result = scope
            .connection()
            .get_schema_async(collection, restrictions, token)
            .await;
        finish(result, scope.release_async().await)
    }
}
