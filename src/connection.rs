use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::DbHelperError;
use crate::provider::DbConnection;
use crate::results::ResultSet;
use crate::types::{ConnectionState, IsolationLevel};

pub(crate) type SharedDbConnection = Arc<Mutex<Box<dyn DbConnection>>>;

/// Fail fast when cancellation was requested before any work started.
pub(crate) fn check_cancelled(token: &CancellationToken) -> Result<(), DbHelperError> {
    if token.is_cancelled() {
        Err(DbHelperError::Cancelled)
    } else {
        Ok(())
    }
}

/// Shared handle to a driver connection.
///
/// Clones refer to the same connection. The blocking methods lock the connection on the
/// calling thread and must not be used from inside an async task; use the `_async` variants
/// there.
#[derive(Clone)]
pub struct Connection {
    inner: SharedDbConnection,
    provider: Arc<str>,
}

impl Connection {
    pub fn new(conn: Box<dyn DbConnection>, provider: &str) -> Self {
        Self {
            inner: Arc::new(Mutex::new(conn)),
            provider: Arc::from(provider),
        }
    }

    #[must_use]
    pub fn provider_name(&self) -> &str {
        &self.provider
    }

    /// Run `func` against the driver connection on the current thread.
    ///
    /// # Errors
    /// Returns whatever `func` returns.
    pub fn with_connection<F, R>(&self, func: F) -> Result<R, DbHelperError>
    where
        F: FnOnce(&mut dyn DbConnection) -> Result<R, DbHelperError>,
    {
        let mut guard = self.inner.blocking_lock();
        func(&mut **guard)
    }

    /// Run `func` on tokio's blocking pool.
    ///
    /// When `token` fires while the driver is busy, the driver's cancel handle is invoked;
    /// the call still waits for the driver to return so the connection is never released
    /// mid-statement.
    pub(crate) async fn run_blocking<F, R>(
        &self,
        token: Option<&CancellationToken>,
        func: F,
    ) -> Result<R, DbHelperError>
    where
        F: FnOnce(&mut dyn DbConnection) -> R + Send + 'static,
        R: Send + 'static,
    {
        let mut guard = Arc::clone(&self.inner).lock_owned().await;
        let cancel = guard.cancel_handle();
        let task = tokio::task::spawn_blocking(move || func(&mut **guard));
        tokio::pin!(task);

        let joined = match token {
            Some(token) => {
                tokio::select! {
                    biased;
                    res = &mut task => res,
                    () = token.cancelled() => {
                        if let Some(handle) = cancel {
                            handle.cancel();
                        }
                        task.await
                    }
                }
            }
            None => task.await,
        };
        joined.map_err(|e| DbHelperError::join(&e))
    }

    /// # Errors
    /// Propagates driver errors.
    pub async fn with_connection_async<F, R>(
        &self,
        token: &CancellationToken,
        func: F,
    ) -> Result<R, DbHelperError>
    where
        F: FnOnce(&mut dyn DbConnection) -> Result<R, DbHelperError> + Send + 'static,
        R: Send + 'static,
    {
        check_cancelled(token)?;
        self.run_blocking(Some(token), func).await?
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.blocking_lock().state()
    }

    pub async fn state_async(&self) -> ConnectionState {
        self.inner.lock().await.state()
    }

    #[must_use]
    pub fn connection_string(&self) -> String {
        self.inner.blocking_lock().connection_string().to_string()
    }

    #[must_use]
    pub fn database(&self) -> String {
        self.inner.blocking_lock().database()
    }

    /// # Errors
    /// Returns the driver error if the connection cannot be opened.
    pub fn open(&self) -> Result<(), DbHelperError> {
        self.with_connection(|conn| {
            tracing::debug!(provider = %self.provider, "opening connection");
            conn.open()
        })
    }

    /// # Errors
    /// Returns `Cancelled` if `token` already fired, otherwise the driver error.
    pub async fn open_async(&self, token: &CancellationToken) -> Result<(), DbHelperError> {
        tracing::debug!(provider = %self.provider, "opening connection");
        self.with_connection_async(token, |conn| conn.open()).await
    }

    /// # Errors
    /// Returns the driver error if closing fails.
    pub fn close(&self) -> Result<(), DbHelperError> {
        self.with_connection(|conn| conn.close())
    }

    /// # Errors
    /// Returns the driver error if closing fails.
    pub async fn close_async(&self) -> Result<(), DbHelperError> {
        self.run_blocking(None, |conn| conn.close()).await?
    }

    /// Open the connection if it is closed; an open connection is left untouched.
    /// Returns `true` when this call opened it.
    ///
    /// # Errors
    /// Returns the driver error if opening fails.
    pub fn ensure_open(&self) -> Result<bool, DbHelperError> {
        self.with_connection(|conn| {
            if conn.state() == ConnectionState::Closed {
                conn.open()?;
                Ok(true)
            } else {
                Ok(false)
            }
        })
    }

    /// # Errors
    /// Returns `Cancelled` if `token` already fired, otherwise the driver error.
    pub async fn ensure_open_async(&self, token: &CancellationToken) -> Result<bool, DbHelperError> {
        self.with_connection_async(token, |conn| {
            if conn.state() == ConnectionState::Closed {
                conn.open()?;
                Ok(true)
            } else {
                Ok(false)
            }
        })
        .await
    }

    /// # Errors
    /// Returns `Unimplemented` when the provider cannot switch databases.
    pub fn change_database(&self, name: &str) -> Result<(), DbHelperError> {
        self.with_connection(|conn| conn.change_database(name))
    }

    /// # Errors
    /// Returns `Unimplemented` when the provider cannot switch databases.
    pub async fn change_database_async(
        &self,
        name: &str,
        token: &CancellationToken,
    ) -> Result<(), DbHelperError> {
        let name = name.to_string();
        self.with_connection_async(token, move |conn| conn.change_database(&name))
            .await
    }

    /// # Errors
    /// Returns `Unimplemented` when the provider has no distributed transactions.
    pub fn enlist_transaction(&self, transaction_id: &str) -> Result<(), DbHelperError> {
        self.with_connection(|conn| conn.enlist_transaction(transaction_id))
    }

    /// # Errors
    /// Returns `Unimplemented` when the provider has no schema metadata.
    pub fn get_schema(
        &self,
        collection: Option<&str>,
        restrictions: &[Option<String>],
    ) -> Result<ResultSet, DbHelperError> {
        self.with_connection(|conn| conn.get_schema(collection, restrictions))
    }

    /// # Errors
    /// Returns `Unimplemented` when the provider has no schema metadata.
    pub async fn get_schema_async(
        &self,
        collection: Option<&str>,
        restrictions: &[Option<String>],
        token: &CancellationToken,
    ) -> Result<ResultSet, DbHelperError> {
        let collection = collection.map(str::to_string);
        let restrictions = restrictions.to_vec();
        self.with_connection_async(token, move |conn| {
            conn.get_schema(collection.as_deref(), &restrictions)
        })
        .await
    }

    /// Close from a context that cannot block or await (destructors). Errors are logged.
    pub(crate) fn close_detached(&self) {
        let inner = Arc::clone(&self.inner);
        let provider = Arc::clone(&self.provider);
        let close = move || {
            if let Err(err) = inner.blocking_lock().close() {
                tracing::warn!(%provider, error = %err, "failed to close connection during cleanup");
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(close);
            }
            Err(_) => close(),
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

/// Explicit transaction scoped to one connection.
///
/// Dropping a transaction that was neither committed nor rolled back rolls it back.
pub struct Transaction {
    conn: Connection,
    isolation: IsolationLevel,
    completed: bool,
}

impl Transaction {
    /// Begin a transaction on an open connection.
    ///
    /// # Errors
    /// Returns `ConnectionError` if the connection is not open, otherwise the driver error.
    pub fn begin(conn: &Connection, isolation: IsolationLevel) -> Result<Self, DbHelperError> {
        conn.with_connection(|c| {
            ensure_open_state(c.state())?;
            c.begin_transaction(isolation)
        })?;
        tracing::debug!(provider = %conn.provider, ?isolation, "transaction started");
        Ok(Self {
            conn: conn.clone(),
            isolation,
            completed: false,
        })
    }

    /// # Errors
    /// Returns `Cancelled` if `token` already fired, `ConnectionError` if the connection is
    /// not open, otherwise the driver error.
    pub async fn begin_async(
        conn: &Connection,
        isolation: IsolationLevel,
        token: &CancellationToken,
    ) -> Result<Self, DbHelperError> {
        conn.with_connection_async(token, move |c| {
            ensure_open_state(c.state())?;
            c.begin_transaction(isolation)
        })
        .await?;
        tracing::debug!(provider = %conn.provider, ?isolation, "transaction started");
        Ok(Self {
            conn: conn.clone(),
            isolation,
            completed: false,
        })
    }

    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    #[must_use]
    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation
    }

    /// # Errors
    /// Returns the driver error; the transaction is then rolled back on drop.
    pub fn commit(mut self) -> Result<(), DbHelperError> {
        self.conn.with_connection(|c| c.commit())?;
        self.completed = true;
        tracing::debug!(provider = %self.conn.provider, "transaction committed");
        Ok(())
    }

    /// # Errors
    /// Returns the driver error.
    pub fn rollback(mut self) -> Result<(), DbHelperError> {
        self.completed = true;
        self.conn.with_connection(|c| c.rollback())
    }

    /// # Errors
    /// Returns `Cancelled` if `token` already fired (the transaction is then rolled back on
    /// drop), otherwise the driver error.
    pub async fn commit_async(mut self, token: &CancellationToken) -> Result<(), DbHelperError> {
        self.conn
            .with_connection_async(token, |c| c.commit())
            .await?;
        self.completed = true;
        tracing::debug!(provider = %self.conn.provider, "transaction committed");
        Ok(())
    }

    /// # Errors
    /// Returns `Cancelled` if `token` already fired (the transaction is then rolled back on
    /// drop), otherwise the driver error.
    pub async fn rollback_async(mut self, token: &CancellationToken) -> Result<(), DbHelperError> {
        check_cancelled(token)?;
        self.completed = true;
        self.conn.run_blocking(Some(token), |c| c.rollback()).await?
    }

    /// Rollback used on failure paths; never short-circuits on cancellation.
    pub(crate) async fn rollback_after_failure(mut self) -> Result<(), DbHelperError> {
        self.completed = true;
        self.conn.run_blocking(None, |c| c.rollback()).await?
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("provider", &self.conn.provider)
            .field("isolation", &self.isolation)
            .field("completed", &self.completed)
            .finish()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        let inner = Arc::clone(&self.conn.inner);
        let provider = Arc::clone(&self.conn.provider);
        let rollback = move || {
            if let Err(err) = inner.blocking_lock().rollback() {
                tracing::warn!(%provider, error = %err, "rollback of abandoned transaction failed");
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(rollback);
            }
            Err(_) => rollback(),
        }
    }
}

fn ensure_open_state(state: ConnectionState) -> Result<(), DbHelperError> {
    if state == ConnectionState::Open {
        Ok(())
    } else {
        Err(DbHelperError::ConnectionError(format!(
            "connection must be open to begin a transaction (state: {state:?})"
        )))
    }
}
