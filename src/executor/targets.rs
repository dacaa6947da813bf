use crate::connection::{Connection, Transaction};
use crate::error::DbHelperError;

/// Where a client call runs.
#[derive(Debug, Clone, Copy, Default)]
pub enum ExecTarget<'a> {
    /// A new connection built from the client's connection string, closed when the call ends.
    #[default]
    Default,
    /// A new connection built from this connection string, closed when the call ends.
    ConnectionString(&'a str),
    /// A caller-owned connection. Opened if it is closed, never closed by the client.
    Connection(&'a Connection),
    /// A caller-owned transaction and its connection.
    Transaction(&'a Transaction),
}

impl<'a> ExecTarget<'a> {
    #[must_use]
    pub fn transaction(&self) -> Option<&'a Transaction> {
        match self {
            ExecTarget::Transaction(tx) => Some(tx),
            _ => None,
        }
    }
}

impl<'a> From<&'a Connection> for ExecTarget<'a> {
    fn from(conn: &'a Connection) -> Self {
        ExecTarget::Connection(conn)
    }
}

impl<'a> From<&'a Transaction> for ExecTarget<'a> {
    fn from(tx: &'a Transaction) -> Self {
        ExecTarget::Transaction(tx)
    }
}

impl<'a> From<&'a str> for ExecTarget<'a> {
    fn from(connection_string: &'a str) -> Self {
        ExecTarget::ConnectionString(connection_string)
    }
}

impl From<()> for ExecTarget<'_> {
    fn from((): ()) -> Self {
        ExecTarget::Default
    }
}

/// Connection used by one client call. Connections the client opened itself are closed on
/// release, or in `Drop` if the call unwinds early.
pub(crate) struct ConnectionScope {
    conn: Connection,
    owned: bool,
}

impl ConnectionScope {
    pub(crate) fn owned(conn: Connection) -> Self {
        Self { conn, owned: true }
    }

    pub(crate) fn borrowed(conn: Connection) -> Self {
        Self { conn, owned: false }
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn release(mut self) -> Result<(), DbHelperError> {
        if std::mem::take(&mut self.owned) {
            tracing::debug!(provider = %self.conn.provider_name(), "closing connection");
            self.conn.close()
        } else {
            Ok(())
        }
    }

    pub(crate) async fn release_async(mut self) -> Result<(), DbHelperError> {
        if std::mem::take(&mut self.owned) {
            tracing::debug!(provider = %self.conn.provider_name(), "closing connection");
            self.conn.close_async().await
        } else {
            Ok(())
        }
    }

    /// Hand the connection to a reader. Returns it only when the reader must close it.
    pub(crate) fn into_reader_owner(mut self, close_connection: bool) -> Option<Connection> {
        let owned = std::mem::take(&mut self.owned);
        (owned || close_connection).then(|| self.conn.clone())
    }
}

impl Drop for ConnectionScope {
    fn drop(&mut self) {
        if self.owned {
            self.owned = false;
            self.conn.close_detached();
        }
    }
}
