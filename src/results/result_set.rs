use std::sync::Arc;

use super::row::{ColumnIndex, DataRow};
use crate::types::RowValues;

/// A fully buffered result set.
///
/// Drivers use it for schema queries and for buffering reader output; callers get one
/// back from `DbClient::get_schema`.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    /// The rows returned by the query
    pub results: Vec<DataRow>,
    /// The number of rows affected (for DML statements)
    pub rows_affected: usize,
    columns: Arc<ColumnIndex>,
}

impl ResultSet {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> ResultSet {
        ResultSet {
            results: Vec::with_capacity(capacity),
            rows_affected: 0,
            columns: Arc::default(),
        }
    }

    /// Set the column names for this result set (shared by all rows added afterwards)
    pub fn set_column_names(&mut self, column_names: Arc<Vec<String>>) {
        self.columns = Arc::new(ColumnIndex::new(column_names));
    }

    #[must_use]
    pub fn get_column_names(&self) -> &Arc<Vec<String>> {
        self.columns.names()
    }

    /// Add a row built from values in column order.
    pub fn add_row_values(&mut self, row_values: Vec<RowValues>) {
        self.results
            .push(DataRow::with_index(Arc::clone(&self.columns), row_values));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
