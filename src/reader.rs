use std::marker::PhantomData;
use std::sync::Arc;

use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::connection::{Connection, check_cancelled};
use crate::error::DbHelperError;
use crate::mapping::{DataObject, FieldMap, descriptor, map_row_with};
use crate::provider::DbReader;
use crate::results::{ColumnIndex, DataRow};
use crate::types::RowValues;

/// Caller-owned cursor over the rows a command produced.
///
/// When the reader owns its connection (engine-opened, or opened with
/// `CommandBehavior::CLOSE_CONNECTION`) closing the reader closes the connection too.
/// Dropping an open reader closes it.
pub struct DataReader {
    inner: Option<Box<dyn DbReader>>,
    columns: Arc<ColumnIndex>,
    owned_connection: Option<Connection>,
    closed: bool,
}

impl DataReader {
    pub(crate) fn new(inner: Box<dyn DbReader>, owned_connection: Option<Connection>) -> Self {
        let columns = Arc::new(ColumnIndex::new(inner.column_names()));
        Self {
            inner: Some(inner),
            columns,
            owned_connection,
            closed: false,
        }
    }

    fn reader(&self) -> Result<&dyn DbReader, DbHelperError> {
        match (&self.inner, self.closed) {
            (Some(inner), false) => Ok(inner.as_ref()),
            _ => Err(DbHelperError::ExecutionError("reader is closed".into())),
        }
    }

    fn reader_mut(&mut self) -> Result<&mut Box<dyn DbReader>, DbHelperError> {
        match (&mut self.inner, self.closed) {
            (Some(inner), false) => Ok(inner),
            _ => Err(DbHelperError::ExecutionError("reader is closed".into())),
        }
    }

    fn refresh_columns(&mut self) {
        if let Some(inner) = &self.inner {
            let names = inner.column_names();
            if !Arc::ptr_eq(&names, self.columns.names()) {
                self.columns = Arc::new(ColumnIndex::new(names));
            }
        }
    }

    /// Column names of the current result set.
    #[must_use]
    pub fn column_names(&self) -> &Arc<Vec<String>> {
        self.columns.names()
    }

    #[must_use]
    pub fn field_count(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn get_ordinal(&self, column_name: &str) -> Option<usize> {
        self.columns.position(column_name)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Advance to the next row.
    ///
    /// # Errors
    /// Returns the driver error, or `ExecutionError` if the reader is closed.
    pub fn read(&mut self) -> Result<bool, DbHelperError> {
        self.reader_mut()?.read()
    }

    /// # Errors
    /// Returns `Cancelled` if `token` already fired, otherwise as `read`.
    pub async fn read_async(&mut self, token: &CancellationToken) -> Result<bool, DbHelperError> {
        check_cancelled(token)?;
        self.on_blocking_pool(|r| r.read()).await
    }

    /// # Errors
    /// Returns an error if no row is current or `ordinal` is out of range.
    pub fn get_value(&self, ordinal: usize) -> Result<RowValues, DbHelperError> {
        self.reader()?.get_value(ordinal)
    }

    /// # Errors
    /// Returns `ExecutionError` for an unknown column name.
    pub fn get_value_by_name(&self, column_name: &str) -> Result<RowValues, DbHelperError> {
        let ordinal = self.get_ordinal(column_name).ok_or_else(|| {
            DbHelperError::ExecutionError(format!("no column named {column_name}"))
        })?;
        self.get_value(ordinal)
    }

    /// # Errors
    /// Same conditions as `get_value`.
    pub fn is_null(&self, ordinal: usize) -> Result<bool, DbHelperError> {
        self.reader()?.is_null(ordinal)
    }

    /// Snapshot of the current row.
    ///
    /// # Errors
    /// Same conditions as `get_value`.
    pub fn current_row(&self) -> Result<DataRow, DbHelperError> {
        let reader = self.reader()?;
        let values = (0..self.columns.len())
            .map(|i| reader.get_value(i))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DataRow::with_index(Arc::clone(&self.columns), values))
    }

    /// Move to the next result set; `false` when there are none left.
    ///
    /// # Errors
    /// Returns the driver error, or `ExecutionError` if the reader is closed.
    pub fn next_result(&mut self) -> Result<bool, DbHelperError> {
        let more = self.reader_mut()?.next_result()?;
        self.refresh_columns();
        Ok(more)
    }

    /// # Errors
    /// Returns `Cancelled` if `token` already fired, otherwise as `next_result`.
    pub async fn next_result_async(
        &mut self,
        token: &CancellationToken,
    ) -> Result<bool, DbHelperError> {
        check_cancelled(token)?;
        let more = self.on_blocking_pool(|r| r.next_result()).await?;
        self.refresh_columns();
        Ok(more)
    }

    #[must_use]
    pub fn records_affected(&self) -> usize {
        self.inner.as_ref().map_or(0, |r| r.records_affected())
    }

    /// Release the driver reader and any owned connection. Later calls do nothing.
    ///
    /// # Errors
    /// Returns the first driver error hit while closing.
    pub fn close(&mut self) -> Result<(), DbHelperError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let reader_result = match self.inner.as_mut() {
            Some(inner) => inner.close(),
            None => Ok(()),
        };
        let conn_result = match self.owned_connection.take() {
            Some(conn) => conn.close(),
            None => Ok(()),
        };
        reader_result.and(conn_result)
    }

    /// # Errors
    /// Returns the first driver error hit while closing.
    pub async fn close_async(&mut self) -> Result<(), DbHelperError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let reader_result = match self.inner.as_mut() {
            Some(inner) => inner.close(),
            None => Ok(()),
        };
        let conn_result = match self.owned_connection.take() {
            Some(conn) => conn.close_async().await,
            None => Ok(()),
        };
        reader_result.and(conn_result)
    }

    /// Move the driver reader onto the blocking pool for one call and take it back.
    async fn on_blocking_pool<F, R>(&mut self, func: F) -> Result<R, DbHelperError>
    where
        F: FnOnce(&mut dyn DbReader) -> Result<R, DbHelperError> + Send + 'static,
        R: Send + 'static,
    {
        self.reader_mut()?;
        let Some(mut inner) = self.inner.take() else {
            return Err(DbHelperError::ExecutionError("reader is closed".into()));
        };
        let (inner, result) = tokio::task::spawn_blocking(move || {
            let result = func(inner.as_mut());
            (inner, result)
        })
        .await
        .map_err(|e| DbHelperError::join(&e))?;
        self.inner = Some(inner);
        result
    }

    /// Pull the next row mapped onto `T`, or `None` at the end of the result set.
    pub(crate) fn next_object<T: DataObject>(
        &mut self,
        map: &FieldMap<T>,
    ) -> Result<Option<T>, DbHelperError> {
        if self.read()? {
            map_row_with(map, &self.current_row()?).map(Some)
        } else {
            Ok(None)
        }
    }

    pub(crate) async fn next_object_async<T: DataObject>(
        &mut self,
        map: &FieldMap<T>,
        token: &CancellationToken,
    ) -> Result<Option<T>, DbHelperError> {
        if self.read_async(token).await? {
            map_row_with(map, &self.current_row()?).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Lazily map the remaining rows of the current result set. The reader (and any owned
    /// connection) is closed once the iterator is exhausted, fails, or is dropped.
    #[must_use]
    pub fn into_objects<T: DataObject>(self) -> DataObjectIter<T> {
        DataObjectIter {
            reader: self,
            map: descriptor::<T>(),
            done: false,
            _marker: PhantomData,
        }
    }

    /// Async counterpart of `into_objects`. Cancelling `token` ends the stream with a single
    /// `Cancelled` error; the reader is released either way.
    pub fn into_object_stream<T: DataObject>(
        self,
        token: CancellationToken,
    ) -> BoxStream<'static, Result<T, DbHelperError>> {
        let map = descriptor::<T>();
        stream::try_unfold(
            (self, map, token),
            |(mut reader, map, token)| async move {
                match reader.next_object_async(&map, &token).await {
                    Ok(Some(item)) => Ok(Some((item, (reader, map, token)))),
                    Ok(None) => {
                        reader.close_async().await?;
                        Ok(None)
                    }
                    Err(err) => {
                        if let Err(close_err) = reader.close_async().await {
                            tracing::warn!(error = %close_err, "failed to close reader after error");
                        }
                        Err(err)
                    }
                }
            },
        )
        .boxed()
    }
}

impl Drop for DataReader {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(inner) = self.inner.as_mut()
            && let Err(err) = inner.close()
        {
            tracing::warn!(error = %err, "failed to close reader during drop");
        }
        if let Some(conn) = self.owned_connection.take() {
            conn.close_detached();
        }
    }
}

impl std::fmt::Debug for DataReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataReader")
            .field("columns", self.columns.names())
            .field("closed", &self.closed)
            .field("owns_connection", &self.owned_connection.is_some())
            .finish()
    }
}

/// Lazy, single-pass iterator of mapped objects.
pub struct DataObjectIter<T: DataObject> {
    reader: DataReader,
    map: Arc<FieldMap<T>>,
    done: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DataObject> DataObjectIter<T> {
    fn finish(&mut self) -> Result<(), DbHelperError> {
        self.done = true;
        self.reader.close()
    }
}

impl<T: DataObject> Iterator for DataObjectIter<T> {
    type Item = Result<T, DbHelperError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_object(&self.map) {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => self.finish().err().map(Err),
            Err(err) => {
                if let Err(close_err) = self.finish() {
                    tracing::warn!(error = %close_err, "failed to close reader after error");
                }
                Some(Err(err))
            }
        }
    }
}

/// Sequential access to a command that returns several result sets.
///
/// Reading never moves to the next result set on its own; call `move_to_next_result`.
#[derive(Debug)]
pub struct MultiResultReader {
    reader: DataReader,
}

impl MultiResultReader {
    #[must_use]
    pub fn new(reader: DataReader) -> Self {
        Self { reader }
    }

    /// Map the current record onto `T` and advance past it; `None` when the current result
    /// set is exhausted.
    ///
    /// # Errors
    /// Returns driver or mapping errors.
    pub fn read_object<T: DataObject>(&mut self) -> Result<Option<T>, DbHelperError> {
        self.reader.next_object(&descriptor::<T>())
    }

    /// # Errors
    /// Returns `Cancelled`, driver or mapping errors.
    pub async fn read_object_async<T: DataObject>(
        &mut self,
        token: &CancellationToken,
    ) -> Result<Option<T>, DbHelperError> {
        self.reader
            .next_object_async(&descriptor::<T>(), token)
            .await
    }

    /// Map every remaining record of the current result set.
    ///
    /// # Errors
    /// Returns driver or mapping errors.
    pub fn read_object_list<T: DataObject>(&mut self) -> Result<Vec<T>, DbHelperError> {
        self.read_object_iter().collect()
    }

    /// # Errors
    /// Returns `Cancelled`, driver or mapping errors.
    pub async fn read_object_list_async<T: DataObject>(
        &mut self,
        token: &CancellationToken,
    ) -> Result<Vec<T>, DbHelperError> {
        let map = descriptor::<T>();
        let mut items = Vec::new();
        while let Some(item) = self.reader.next_object_async(&map, token).await? {
            items.push(item);
        }
        Ok(items)
    }

    /// Lazily map the remaining records of the current result set.
    pub fn read_object_iter<T: DataObject>(
        &mut self,
    ) -> impl Iterator<Item = Result<T, DbHelperError>> + '_ {
        let map = descriptor::<T>();
        let mut done = false;
        std::iter::from_fn(move || {
            if done {
                return None;
            }
            match self.reader.next_object(&map) {
                Ok(Some(item)) => Some(Ok(item)),
                Ok(None) => {
                    done = true;
                    None
                }
                Err(err) => {
                    done = true;
                    Some(Err(err))
                }
            }
        })
    }

    /// Async lazy sequence over the current result set.
    pub fn read_object_stream<'a, T: DataObject>(
        &'a mut self,
        token: &'a CancellationToken,
    ) -> impl Stream<Item = Result<T, DbHelperError>> + 'a {
        let map = descriptor::<T>();
        stream::try_unfold(self, move |this| {
            let map = Arc::clone(&map);
            async move {
                Ok(this
                    .reader
                    .next_object_async(&map, token)
                    .await?
                    .map(|item| (item, this)))
            }
        })
    }

    /// # Errors
    /// Returns the driver error.
    pub fn move_to_next_result(&mut self) -> Result<bool, DbHelperError> {
        self.reader.next_result()
    }

    /// # Errors
    /// Returns `Cancelled` or the driver error.
    pub async fn move_to_next_result_async(
        &mut self,
        token: &CancellationToken,
    ) -> Result<bool, DbHelperError> {
        self.reader.next_result_async(token).await
    }

    #[must_use]
    pub fn column_names(&self) -> &Arc<Vec<String>> {
        self.reader.column_names()
    }

    /// Release the reader; repeated calls are no-ops.
    ///
    /// # Errors
    /// Returns the first driver error hit while closing.
    pub fn close(&mut self) -> Result<(), DbHelperError> {
        self.reader.close()
    }

    /// # Errors
    /// Returns the first driver error hit while closing.
    pub async fn close_async(&mut self) -> Result<(), DbHelperError> {
        self.reader.close_async().await
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.reader.is_closed()
    }
}
