use rusqlite::Statement;
use rusqlite::types::Value;

use crate::error::DbHelperError;
use crate::parameters::{Parameter, strip_binder};
use crate::types::RowValues;

/// Prefixes `SQLite` accepts for named parameters.
const SQLITE_BINDERS: [&str; 3] = [":", "@", "$"];

/// Convert a single `RowValues` to a rusqlite `Value`.
#[must_use]
pub fn row_value_to_sqlite_value(value: &RowValues) -> Value {
    match value {
        RowValues::Int(i) => Value::Integer(*i),
        RowValues::Float(f) => Value::Real(*f),
        RowValues::Text(s) => Value::Text(s.clone()),
        RowValues::Bool(b) => Value::Integer(i64::from(*b)),
        RowValues::Timestamp(dt) => Value::Text(dt.format("%F %T%.f").to_string()),
        RowValues::Guid(id) => Value::Text(id.hyphenated().to_string()),
        RowValues::Null => Value::Null,
        RowValues::JSON(jval) => Value::Text(jval.to_string()),
        RowValues::Blob(bytes) => Value::Blob(bytes.clone()),
    }
}

/// Convert a rusqlite `Value` read from a row.
#[must_use]
pub fn sqlite_value_to_row_value(value: Value) -> RowValues {
    match value {
        Value::Null => RowValues::Null,
        Value::Integer(i) => RowValues::Int(i),
        Value::Real(f) => RowValues::Float(f),
        Value::Text(s) => RowValues::Text(s),
        Value::Blob(b) => RowValues::Blob(b),
    }
}

/// Statement index of a named parameter, trying every prefix `SQLite` accepts.
fn named_index(stmt: &Statement<'_>, name: &str) -> Result<Option<usize>, DbHelperError> {
    if let Some(idx) = stmt.parameter_index(name)? {
        return Ok(Some(idx));
    }
    let base = strip_binder(name);
    for binder in SQLITE_BINDERS {
        if let Some(idx) = stmt.parameter_index(&format!("{binder}{base}"))? {
            return Ok(Some(idx));
        }
    }
    Ok(None)
}

/// Bind a command's parameters to one statement.
///
/// Named parameters bind by name (any `SQLite` prefix matches); unnamed parameters bind in
/// order to the positions left over. Parameters that only receive values are left unbound.
/// Parameters that do not occur in this statement are skipped so a multi-statement command
/// can share one parameter list.
///
/// # Errors
/// Returns `ParameterError` when the statement uses a parameter the command does not supply.
pub fn bind_parameters(stmt: &mut Statement<'_>, params: &[Parameter]) -> Result<(), DbHelperError> {
    let count = stmt.parameter_count();
    let mut bound = vec![false; count + 1];
    let mut positional = Vec::new();

    for param in params {
        if param.name.is_empty() {
            if param.direction.sends_value() {
                positional.push(param);
            }
            continue;
        }
        let Some(idx) = named_index(stmt, &param.name)? else {
            continue;
        };
        bound[idx] = true;
        if param.direction.sends_value() {
            stmt.raw_bind_parameter(idx, row_value_to_sqlite_value(&param.value))?;
        }
    }

    let mut free = (1..=count)
        .filter(|i| !bound[*i] && stmt.parameter_name(*i).is_none_or(|n| n.starts_with('?')))
        .collect::<Vec<_>>()
        .into_iter();
    for param in positional {
        let Some(idx) = free.next() else {
            return Err(DbHelperError::ParameterError(format!(
                "statement has no free positional parameter for value {}",
                param.value
            )));
        };
        stmt.raw_bind_parameter(idx, row_value_to_sqlite_value(&param.value))?;
        bound[idx] = true;
    }

    if let Some(missing) = (1..=count).find(|i| !bound[*i]) {
        let name = stmt
            .parameter_name(missing)
            .map_or_else(|| format!("?{missing}"), str::to_string);
        return Err(DbHelperError::ParameterError(format!(
            "no value supplied for parameter {name}"
        )));
    }
    Ok(())
}
