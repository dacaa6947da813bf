use std::sync::Arc;

use rusqlite::Statement;
use rusqlite::types::Value;

use super::params::sqlite_value_to_row_value;
use crate::error::DbHelperError;
use crate::provider::DbReader;
use crate::results::ResultSet;
use crate::types::RowValues;

/// Extract a `RowValues` from a `SQLite` row.
///
/// # Errors
/// Returns `DbHelperError` if the value cannot be read.
pub fn sqlite_extract_value_sync(
    row: &rusqlite::Row,
    idx: usize,
) -> Result<RowValues, DbHelperError> {
    let value: Value = row.get(idx)?;
    Ok(sqlite_value_to_row_value(value))
}

pub(crate) fn column_names(stmt: &Statement<'_>) -> Arc<Vec<String>> {
    Arc::new(
        stmt.column_names()
            .iter()
            .map(std::string::ToString::to_string)
            .collect(),
    )
}

/// Step a statement whose parameters are already bound and buffer up to `max_rows` rows.
///
/// # Errors
/// Returns the driver error if stepping fails.
pub(crate) fn collect_rows(
    stmt: &mut Statement<'_>,
    max_rows: Option<usize>,
) -> Result<ResultSet, DbHelperError> {
    let column_names = column_names(stmt);
    let col_count = column_names.len();
    let mut result_set = ResultSet::with_capacity(max_rows.unwrap_or(10).min(64));
    result_set.set_column_names(column_names);

    let mut rows_iter = stmt.raw_query();
    while max_rows.is_none_or(|max| result_set.len() < max) {
        let Some(row) = rows_iter.next()? else {
            break;
        };
        let mut row_values = Vec::with_capacity(col_count);
        for i in 0..col_count {
            row_values.push(sqlite_extract_value_sync(row, i)?);
        }
        result_set.add_row_values(row_values);
    }
    Ok(result_set)
}

/// Build a result set from a `SQLite` query.
///
/// # Errors
/// Returns the driver error if binding or stepping fails.
pub fn build_result_set(
    stmt: &mut Statement<'_>,
    params: &[Value],
) -> Result<ResultSet, DbHelperError> {
    for (i, value) in params.iter().enumerate() {
        stmt.raw_bind_parameter(i + 1, value)?;
    }
    collect_rows(stmt, None)
}

/// Reader over buffered `SQLite` result sets.
///
/// `SQLite` statements borrow their connection, so every row is read while the command runs
/// and the reader only walks the buffer.
#[derive(Debug, Default)]
pub struct SqliteReader {
    sets: Vec<ResultSet>,
    current: usize,
    row: Option<usize>,
    records_affected: usize,
    closed: bool,
}

impl SqliteReader {
    #[must_use]
    pub fn new(sets: Vec<ResultSet>, records_affected: usize) -> Self {
        Self {
            sets,
            current: 0,
            row: None,
            records_affected,
            closed: false,
        }
    }

    fn current_set(&self) -> Option<&ResultSet> {
        if self.closed {
            None
        } else {
            self.sets.get(self.current)
        }
    }
}

impl DbReader for SqliteReader {
    fn column_names(&self) -> Arc<Vec<String>> {
        self.current_set()
            .map(|set| Arc::clone(set.get_column_names()))
            .unwrap_or_default()
    }

    fn read(&mut self) -> Result<bool, DbHelperError> {
        if self.closed {
            return Err(DbHelperError::ExecutionError("reader is closed".into()));
        }
        let Some(len) = self.current_set().map(ResultSet::len) else {
            return Ok(false);
        };
        let next = self.row.map_or(0, |r| r + 1);
        if next < len {
            self.row = Some(next);
            Ok(true)
        } else {
            self.row = Some(len);
            Ok(false)
        }
    }

    fn get_value(&self, ordinal: usize) -> Result<RowValues, DbHelperError> {
        let row = self
            .current_set()
            .zip(self.row)
            .and_then(|(set, idx)| set.results.get(idx))
            .ok_or_else(|| DbHelperError::ExecutionError("no current row".into()))?;
        row.get_by_index(ordinal).cloned().ok_or_else(|| {
            DbHelperError::ExecutionError(format!(
                "column ordinal {ordinal} out of range ({} columns)",
                row.len()
            ))
        })
    }

    fn next_result(&mut self) -> Result<bool, DbHelperError> {
        if self.closed {
            return Err(DbHelperError::ExecutionError("reader is closed".into()));
        }
        self.row = None;
        if self.current < self.sets.len() {
            self.current += 1;
        }
        Ok(self.current < self.sets.len())
    }

    fn records_affected(&self) -> usize {
        self.records_affected
    }

    fn close(&mut self) -> Result<(), DbHelperError> {
        self.closed = true;
        self.sets.clear();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
