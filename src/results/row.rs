use std::collections::HashMap;
use std::sync::Arc;

use crate::types::RowValues;

/// Case-insensitive column-name to ordinal lookup shared by every row of a result set.
#[derive(Debug, Clone, Default)]
pub struct ColumnIndex {
    names: Arc<Vec<String>>,
    by_name: HashMap<String, usize>,
}

impl ColumnIndex {
    #[must_use]
    pub fn new(names: Arc<Vec<String>>) -> Self {
        let mut by_name = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            // first occurrence wins for duplicate column names
            by_name.entry(name.to_lowercase()).or_insert(i);
        }
        Self { names, by_name }
    }

    #[must_use]
    pub fn names(&self) -> &Arc<Vec<String>> {
        &self.names
    }

    #[must_use]
    pub fn position(&self, column_name: &str) -> Option<usize> {
        self.by_name.get(&column_name.to_lowercase()).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A row from a database query result
///
/// Ordered values plus shared column metadata. Column names compare case-insensitively.
#[derive(Debug, Clone)]
pub struct DataRow {
    pub(crate) columns: Arc<ColumnIndex>,
    /// The values for this row, in column order
    pub values: Vec<RowValues>,
}

impl DataRow {
    /// Create a row that owns its own column index.
    #[must_use]
    pub fn new(column_names: Vec<String>, values: Vec<RowValues>) -> Self {
        Self::with_index(Arc::new(ColumnIndex::new(Arc::new(column_names))), values)
    }

    /// Create a row sharing an existing column index.
    #[must_use]
    pub fn with_index(columns: Arc<ColumnIndex>, values: Vec<RowValues>) -> Self {
        Self { columns, values }
    }

    /// Build a row from `(name, value)` pairs, keeping their order.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<RowValues>,
    {
        let (names, values): (Vec<String>, Vec<RowValues>) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Self::new(names, values)
    }

    #[must_use]
    pub fn column_names(&self) -> &Arc<Vec<String>> {
        self.columns.names()
    }

    /// Get the index of a column by name (case-insensitive)
    #[must_use]
    pub fn get_column_index(&self, column_name: &str) -> Option<usize> {
        self.columns.position(column_name)
    }

    /// Get a value from the row by column name
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&RowValues> {
        self.get_column_index(column_name)
            .and_then(|idx| self.values.get(idx))
    }

    /// Get a value from the row by column index
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&RowValues> {
        self.values.get(index)
    }

    #[must_use]
    pub fn contains(&self, column_name: &str) -> bool {
        self.get_column_index(column_name).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate `(column name, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RowValues)> {
        self.columns
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}
