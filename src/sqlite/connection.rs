use std::sync::Arc;
use std::time::Duration;

use rusqlite::fallible_iterator::FallibleIterator;
use rusqlite::{Batch, ErrorCode, InterruptHandle, Statement};

use super::config::SqliteOptions;
use super::params::bind_parameters;
use super::query::{SqliteReader, collect_rows, sqlite_extract_value_sync};
use super::schema;
use crate::command::{Command, DEFAULT_COMMAND_TIMEOUT_SECS};
use crate::error::DbHelperError;
use crate::provider::{CancelHandle, DbConnection, DbReader};
use crate::results::ResultSet;
use crate::types::{
    CommandBehavior, CommandKind, ConnectionState, IsolationLevel, RowValues,
};

/// Interrupt surfaces as `Cancelled`; everything else passes through unchanged.
fn map_sqlite_error(err: rusqlite::Error) -> DbHelperError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::OperationInterrupted => {
            DbHelperError::Cancelled
        }
        _ => DbHelperError::SqliteError(err),
    }
}

fn map_error(err: DbHelperError) -> DbHelperError {
    match err {
        DbHelperError::SqliteError(inner) => map_sqlite_error(inner),
        other => other,
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// SQL to run for a command.
fn command_sql(command: &Command) -> Result<String, DbHelperError> {
    match command.kind {
        CommandKind::Text => Ok(command.text.clone()),
        CommandKind::TableDirect => Ok(format!(
            "SELECT * FROM {}",
            quote_identifier(command.text.trim())
        )),
        CommandKind::StoredProcedure => Err(DbHelperError::Unimplemented(
            "SQLite does not support stored procedures".into(),
        )),
    }
}

struct SqliteInterrupt(InterruptHandle);

impl CancelHandle for SqliteInterrupt {
    fn cancel(&self) {
        self.0.interrupt();
    }
}

/// `SQLite` connection driven through rusqlite.
pub struct SqliteConnection {
    connection_string: String,
    conn: Option<rusqlite::Connection>,
    read_uncommitted: bool,
    default_timeout_secs: Option<u32>,
}

impl SqliteConnection {
    #[must_use]
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            conn: None,
            read_uncommitted: false,
            default_timeout_secs: None,
        }
    }

    fn conn(&self) -> Result<&rusqlite::Connection, DbHelperError> {
        self.conn.as_ref().ok_or_else(|| {
            DbHelperError::ConnectionError("SQLite connection is not open".into())
        })
    }

    /// Run `func` on every statement of the command text in order; `func` returns `false`
    /// to stop early.
    fn for_each_statement<F>(&self, command: &Command, mut func: F) -> Result<(), DbHelperError>
    where
        F: FnMut(&mut Statement<'_>) -> Result<bool, DbHelperError>,
    {
        let conn = self.conn()?;
        let secs = busy_timeout_secs(command.timeout_secs, self.default_timeout_secs);
        conn.busy_timeout(Duration::from_secs(u64::from(secs)))?;
        let sql = command_sql(command)?;
        tracing::debug!(sql = %sql, parameters = command.parameters.len(), "sqlite execute");
        run_statements(conn, &sql, command, &mut func).map_err(map_error)
    }
}

/// A command left at the stock timeout defers to the connection string's `Default Timeout`.
fn busy_timeout_secs(command_secs: u32, connection_default: Option<u32>) -> u32 {
    match connection_default {
        Some(secs) if command_secs == DEFAULT_COMMAND_TIMEOUT_SECS => secs,
        _ => command_secs,
    }
}

/// Statements are prepared one at a time so later ones can see objects created by earlier
/// ones.
fn run_statements<F>(
    conn: &rusqlite::Connection,
    sql: &str,
    command: &Command,
    func: &mut F,
) -> Result<(), DbHelperError>
where
    F: FnMut(&mut Statement<'_>) -> Result<bool, DbHelperError>,
{
    let mut batch = Batch::new(conn, sql);
    while let Some(mut stmt) = batch.next()? {
        bind_parameters(&mut stmt, &command.parameters)?;
        if !func(&mut stmt)? {
            break;
        }
    }
    Ok(())
}

/// Step a statement to completion; returns rows changed.
fn execute_statement(stmt: &mut Statement<'_>) -> Result<usize, DbHelperError> {
    if stmt.column_count() == 0 {
        return Ok(stmt.raw_execute()?);
    }
    let readonly = stmt.readonly();
    let mut rows = stmt.raw_query();
    let mut returned = 0;
    while rows.next()?.is_some() {
        returned += 1;
    }
    // rows from INSERT/UPDATE/DELETE ... RETURNING each stand for one changed row
    Ok(if readonly { 0 } else { returned })
}

impl DbConnection for SqliteConnection {
    fn connection_string(&self) -> &str {
        &self.connection_string
    }

    fn set_connection_string(&mut self, value: &str) {
        self.connection_string = value.to_string();
    }

    fn database(&self) -> String {
        if self.conn.is_some() {
            "main".to_string()
        } else {
            String::new()
        }
    }

    fn state(&self) -> ConnectionState {
        if self.conn.is_some() {
            ConnectionState::Open
        } else {
            ConnectionState::Closed
        }
    }

    fn open(&mut self) -> Result<(), DbHelperError> {
        if self.conn.is_some() {
            return Err(DbHelperError::ConnectionError(
                "SQLite connection is already open".into(),
            ));
        }
        let opts = SqliteOptions::from_connection_string(&self.connection_string)?;
        let conn = rusqlite::Connection::open_with_flags(opts.path(), opts.open_flags())?;
        if let Some(enabled) = opts.foreign_keys {
            conn.execute_batch(if enabled {
                "PRAGMA foreign_keys = ON"
            } else {
                "PRAGMA foreign_keys = OFF"
            })?;
        }
        if let Some(secs) = opts.default_timeout_secs {
            conn.busy_timeout(Duration::from_secs(u64::from(secs)))?;
        }
        tracing::debug!(path = %opts.path(), "sqlite connection opened");
        self.conn = Some(conn);
        self.read_uncommitted = false;
        self.default_timeout_secs = opts.default_timeout_secs;
        Ok(())
    }

    fn close(&mut self) -> Result<(), DbHelperError> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        conn.close().map_err(|(_, err)| DbHelperError::SqliteError(err))?;
        tracing::debug!("sqlite connection closed");
        Ok(())
    }

    fn begin_transaction(&mut self, isolation: IsolationLevel) -> Result<(), DbHelperError> {
        let conn = self.conn()?;
        if !conn.is_autocommit() {
            return Err(DbHelperError::ExecutionError(
                "SQLite does not support nested transactions".into(),
            ));
        }
        let begin = match isolation {
            IsolationLevel::Serializable => "BEGIN IMMEDIATE",
            _ => "BEGIN DEFERRED",
        };
        let read_uncommitted = isolation == IsolationLevel::ReadUncommitted;
        if read_uncommitted {
            conn.execute_batch("PRAGMA read_uncommitted = 1")?;
        }
        conn.execute_batch(begin).map_err(map_sqlite_error)?;
        self.read_uncommitted = read_uncommitted;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DbHelperError> {
        let conn = self.conn()?;
        conn.execute_batch("COMMIT").map_err(map_sqlite_error)?;
        if std::mem::take(&mut self.read_uncommitted) {
            self.conn()?.execute_batch("PRAGMA read_uncommitted = 0")?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DbHelperError> {
        let conn = self.conn()?;
        // some errors already end the transaction inside SQLite
        if !conn.is_autocommit() {
            conn.execute_batch("ROLLBACK").map_err(map_sqlite_error)?;
        }
        if std::mem::take(&mut self.read_uncommitted) {
            self.conn()?.execute_batch("PRAGMA read_uncommitted = 0")?;
        }
        Ok(())
    }

    fn get_schema(
        &mut self,
        collection: Option<&str>,
        restrictions: &[Option<String>],
    ) -> Result<ResultSet, DbHelperError> {
        schema::get_schema(self.conn()?, collection, restrictions)
    }

    fn execute_non_query(&mut self, command: &mut Command) -> Result<usize, DbHelperError> {
        let mut affected = 0;
        self.for_each_statement(command, |stmt| {
            affected += execute_statement(stmt)?;
            Ok(true)
        })?;
        Ok(affected)
    }

    fn execute_scalar(&mut self, command: &mut Command) -> Result<RowValues, DbHelperError> {
        let mut scalar: Option<RowValues> = None;
        self.for_each_statement(command, |stmt| {
            if scalar.is_none() && stmt.column_count() > 0 {
                let mut rows = stmt.raw_query();
                scalar = Some(match rows.next()? {
                    Some(row) => sqlite_extract_value_sync(row, 0)?,
                    None => RowValues::Null,
                });
                while rows.next()?.is_some() {}
            } else {
                execute_statement(stmt)?;
            }
            Ok(true)
        })?;
        Ok(scalar.unwrap_or(RowValues::Null))
    }

    fn execute_reader(
        &mut self,
        command: &mut Command,
        behavior: CommandBehavior,
    ) -> Result<Box<dyn DbReader>, DbHelperError> {
        let single_row = behavior.contains(CommandBehavior::SINGLE_ROW);
        let single_result = single_row || behavior.contains(CommandBehavior::SINGLE_RESULT);
        let schema_only = behavior.contains(CommandBehavior::SCHEMA_ONLY);

        let mut sets = Vec::new();
        let mut affected = 0;
        self.for_each_statement(command, |stmt| {
            if stmt.column_count() == 0 {
                affected += stmt.raw_execute()?;
                return Ok(true);
            }
            let max_rows = if schema_only {
                Some(0)
            } else if single_row {
                Some(1)
            } else {
                None
            };
            sets.push(collect_rows(stmt, max_rows)?);
            Ok(!single_result)
        })?;
        Ok(Box::new(SqliteReader::new(sets, affected)))
    }

    fn cancel_handle(&self) -> Option<Arc<dyn CancelHandle>> {
        self.conn
            .as_ref()
            .map(|c| Arc::new(SqliteInterrupt(c.get_interrupt_handle())) as Arc<dyn CancelHandle>)
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take()
            && let Err((_, err)) = conn.close()
        {
            tracing::warn!(error = %err, "failed to close SQLite connection during drop");
        }
    }
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("connection_string", &self.connection_string)
            .field("open", &self.conn.is_some())
            .finish_non_exhaustive()
    }
}
