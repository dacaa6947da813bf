//! The client: parameter store plus the blocking and async execution operations.
//!
//! Every call follows the same steps: format the stored parameters into a command, open the
//! target connection if needed, execute, copy the executed parameter list (with any output
//! values) back into the store, then release whatever the call opened.
//!
//! The blocking operations lock connections on the calling thread and must not be called from
//! inside a tokio runtime; use the `_async` operations there.

mod blocking;
mod nonblocking;
mod targets;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::command::Command;
use crate::config::ClientOptions;
use crate::connection::{Connection, Transaction, check_cancelled};
use crate::error::DbHelperError;
use crate::factory::ObjectFactory;
use crate::parameters::{Parameter, ParameterStore, SqlQuery};
use crate::provider::{DbConnection, ProviderFactory};
use crate::types::{CommandKind, DatabaseType, DbType, IsolationLevel, ParameterDirection, RowValues};

pub use targets::ExecTarget;
pub(crate) use targets::ConnectionScope;

/// Database client bound to one provider.
///
/// Calls that touch the parameter store take `&mut self`; use one client per concurrent
/// caller.
#[derive(Debug, Clone)]
pub struct DbClient {
    factory: ObjectFactory,
    options: ClientOptions,
    parameters: ParameterStore,
}

impl DbClient {
    /// Client for an explicit provider. A binder set in `options` overrides the provider's.
    #[must_use]
    pub fn new(provider: Arc<dyn ProviderFactory>, options: ClientOptions) -> Self {
        Self::with_factory(ObjectFactory::new(provider), options)
    }

    /// # Errors
    /// Returns `ConfigError` when the provider is not compiled in.
    pub fn for_database(db_type: DatabaseType, options: ClientOptions) -> Result<Self, DbHelperError> {
        Ok(Self::with_factory(ObjectFactory::for_database(db_type)?, options))
    }

    /// SQLite client for `connection_string` with default options.
    #[cfg(feature = "sqlite")]
    #[must_use]
    pub fn sqlite(connection_string: impl Into<String>) -> Self {
        Self::new(
            Arc::new(crate::sqlite::SqliteProvider),
            ClientOptions::new(connection_string),
        )
    }

    fn with_factory(mut factory: ObjectFactory, options: ClientOptions) -> Self {
        if let Some(binder) = &options.variable_binder {
            factory.set_variable_binder(binder.clone());
        }
        Self {
            factory,
            options,
            parameters: ParameterStore::new(),
        }
    }

    #[must_use]
    pub fn factory(&self) -> &ObjectFactory {
        &self.factory
    }

    #[must_use]
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    #[must_use]
    pub fn connection_string(&self) -> &str {
        &self.options.connection_string
    }

    pub fn set_connection_string(&mut self, connection_string: impl Into<String>) {
        self.options.connection_string = connection_string.into();
    }

    pub fn set_command_timeout(&mut self, secs: u32) {
        self.options.command_timeout_secs = secs;
    }

    #[must_use]
    pub fn variable_binder(&self) -> &str {
        self.factory.variable_binder()
    }

    pub fn set_variable_binder(&mut self, binder: impl Into<String>) {
        let binder = binder.into();
        self.options.variable_binder = Some(binder.clone());
        self.factory.set_variable_binder(binder);
    }

    // ---- parameters ----

    /// Parameters for the next call. After each call this is the executed command's list,
    /// including output values.
    #[must_use]
    pub fn parameters(&self) -> &ParameterStore {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut ParameterStore {
        &mut self.parameters
    }

    /// Add an input parameter with an inferred data kind.
    ///
    /// # Errors
    /// Returns `ParameterError` if the parameter fails formatting.
    pub fn add_parameter(
        &mut self,
        name: &str,
        value: impl Into<RowValues>,
    ) -> Result<(), DbHelperError> {
        let param = self.factory.get_parameter(name, value)?;
        self.parameters.add(param);
        Ok(())
    }

    /// Add a parameter with an explicit kind, size and direction.
    ///
    /// # Errors
    /// Returns `ParameterError` for a variable-length output parameter without a size.
    pub fn add_typed_parameter(
        &mut self,
        name: &str,
        value: impl Into<RowValues>,
        db_type: DbType,
        size: Option<usize>,
        direction: ParameterDirection,
    ) -> Result<(), DbHelperError> {
        let param = self
            .factory
            .get_typed_parameter(name, value, db_type, size, direction)?;
        self.parameters.add(param);
        Ok(())
    }

    /// Add prebuilt parameters in order.
    ///
    /// # Errors
    /// Returns `ParameterError` for the first parameter that fails formatting; nothing is added
    /// in that case.
    pub fn add_parameters<I>(&mut self, parameters: I) -> Result<(), DbHelperError>
    where
        I: IntoIterator<Item = Parameter>,
    {
        let formatted = parameters
            .into_iter()
            .map(|mut p| self.factory.format_parameter(&mut p).map(|()| p))
            .collect::<Result<Vec<_>, _>>()?;
        self.parameters.add_range(formatted);
        Ok(())
    }

    /// Replace the value of an existing parameter, keeping its direction and size.
    ///
    /// # Errors
    /// Returns `ParameterError` when no parameter has that name or the new value fails
    /// formatting.
    pub fn replace_parameter_value(
        &mut self,
        name: &str,
        value: impl Into<RowValues>,
    ) -> Result<(), DbHelperError> {
        let Some(existing) = self.parameters.get(name) else {
            return Err(DbHelperError::ParameterError(format!(
                "no parameter named {name}"
            )));
        };
        let mut updated = existing.clone();
        updated.value = value.into();
        if updated.direction == ParameterDirection::Input {
            updated.size = None;
        }
        self.factory.format_parameter(&mut updated)?;
        self.parameters.replace(name, updated);
        Ok(())
    }

    pub fn remove_parameter(&mut self, name: &str) -> Option<Parameter> {
        self.parameters.remove(name)
    }

    pub fn remove_parameter_at(&mut self, index: usize) -> Option<Parameter> {
        self.parameters.remove_at(index)
    }

    /// Returns the number of parameters removed.
    pub fn remove_parameters(&mut self, names: &[&str]) -> usize {
        self.parameters.remove_range(names)
    }

    pub fn clear_parameters(&mut self) {
        self.parameters.clear();
    }

    #[must_use]
    pub fn get_parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.get(name)
    }

    #[must_use]
    pub fn get_parameter_at(&self, index: usize) -> Option<&Parameter> {
        self.parameters.get_at(index)
    }

    /// Value of a parameter, typically an output value after a call.
    #[must_use]
    pub fn get_parameter_value(&self, name: &str) -> Option<&RowValues> {
        self.parameters.value(name)
    }

    #[must_use]
    pub fn contains_parameter(&self, name: &str) -> bool {
        self.parameters.contains(name)
    }

    // ---- connections ----

    /// Unopened connection for `connection_string`, or the client's own.
    ///
    /// # Errors
    /// Returns the provider error if the connection object cannot be created.
    pub fn get_connection(&self, connection_string: Option<&str>) -> Result<Connection, DbHelperError> {
        self.factory
            .get_connection(Some(connection_string.unwrap_or(&self.options.connection_string)))
    }

    /// Open a new connection, retrying per the client options.
    ///
    /// # Errors
    /// Returns the last open error once the retries are used up.
    pub fn open_connection(&self, connection_string: Option<&str>) -> Result<Connection, DbHelperError> {
        let conn = self.get_connection(connection_string)?;
        let mut attempt = 0;
        loop {
            match conn.open() {
                Ok(()) => return Ok(conn),
                Err(err) if self.should_retry_open(&err, attempt) => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %err, "opening connection failed, retrying");
                    std::thread::sleep(self.options.retry_interval());
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// # Errors
    /// Returns `Cancelled` if `token` fires, otherwise the last open error.
    pub async fn open_connection_async(
        &self,
        connection_string: Option<&str>,
        token: &CancellationToken,
    ) -> Result<Connection, DbHelperError> {
        check_cancelled(token)?;
        let conn = self.get_connection(connection_string)?;
        let mut attempt = 0;
        loop {
            match conn.open_async(token).await {
                Ok(()) => return Ok(conn),
                Err(err) if self.should_retry_open(&err, attempt) => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %err, "opening connection failed, retrying");
                    tokio::select! {
                        () = tokio::time::sleep(self.options.retry_interval()) => {}
                        () = token.cancelled() => return Err(DbHelperError::Cancelled),
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn should_retry_open(&self, err: &DbHelperError, attempt: u32) -> bool {
        attempt < self.options.retry_count && !err.is_config() && !err.is_cancelled()
    }

    fn isolation(&self, isolation: Option<IsolationLevel>) -> IsolationLevel {
        isolation.unwrap_or(self.options.isolation_level)
    }

    // ---- shared command plumbing ----

    /// Format the stored parameters into a new command. Runs before any I/O so parameter
    /// mistakes never reach the driver.
    fn build_command(
        &self,
        kind: CommandKind,
        text: &str,
        transaction: Option<&Transaction>,
    ) -> Result<Command, DbHelperError> {
        let command = self.factory.get_command(
            kind,
            text,
            &self.parameters,
            self.options.command_timeout_secs,
            transaction,
        )?;
        tracing::debug!(
            provider = %self.factory.provider().name(),
            ?kind,
            text,
            parameters = command.parameters.len(),
            "prepared command"
        );
        Ok(command)
    }

    /// Format every unit's parameters up front.
    fn prepare_batch(&self, queries: &[SqlQuery]) -> Result<Vec<SqlQuery>, DbHelperError> {
        queries
            .iter()
            .map(|query| {
                let mut prepared = query.clone();
                for param in &mut prepared.parameters {
                    self.factory.format_parameter(param)?;
                }
                Ok(prepared)
            })
            .collect()
    }

    fn batch_command(&self, transacted: bool) -> Command {
        let mut command = self.factory.provider().create_command();
        command.timeout_secs = self.options.command_timeout_secs;
        command.in_transaction = transacted;
        command
    }

    fn reject_transaction_target(target: &ExecTarget<'_>) -> Result<(), DbHelperError> {
        if target.transaction().is_some() {
            return Err(DbHelperError::ConfigError(
                "transacted operations manage their own transaction; pass a connection instead"
                    .into(),
            ));
        }
        Ok(())
    }
}

/// Run prepared units one after another on a single reused command.
fn run_batch(
    conn: &mut dyn DbConnection,
    command: &mut Command,
    units: &[SqlQuery],
) -> Result<usize, DbHelperError> {
    let mut total = 0;
    for (index, unit) in units.iter().enumerate() {
        command.kind = unit.kind;
        command.text.clone_from(&unit.text);
        command.parameters.clone_from(&unit.parameters);
        tracing::debug!(index, text = %unit.text, "executing batch statement");
        total += conn.execute_non_query(command)?;
    }
    Ok(total)
}

/// Combine a failed statement with the outcome of the rollback it triggered.
fn after_rollback(original: DbHelperError, rollback: Result<(), DbHelperError>) -> DbHelperError {
    match rollback {
        Ok(()) => {
            tracing::warn!(error = %original, "transaction rolled back");
            original
        }
        Err(rollback_err) => {
            tracing::warn!(error = %original, rollback_error = %rollback_err, "rollback failed");
            DbHelperError::RollbackFailed {
                source: Box::new(rollback_err),
                original: Box::new(original),
            }
        }
    }
}

/// Release the scope, keeping the call's error ahead of a release error.
fn finish<T>(
    result: Result<T, DbHelperError>,
    released: Result<(), DbHelperError>,
) -> Result<T, DbHelperError> {
    let value = result?;
    released?;
    Ok(value)
}
