//! Row-to-object mapping.
//!
//! A target type describes its fields once in a [`FieldMap`]; the map is cached per type and
//! reused for every row.
//!
//! ```rust
//! use sql_dbhelper::prelude::*;
//!
//! #[derive(Debug, Default, PartialEq)]
//! struct Person {
//!     id: i64,
//!     name: String,
//!     score: i32,
//!     scratch: String,
//! }
//!
//! impl DataObject for Person {
//!     fn describe(map: &mut FieldMap<Self>) {
//!         map.field("Id", |p: &mut Person, v: i64| p.id = v);
//!         map.field("Name", |p: &mut Person, v: String| p.name = v);
//!         map.field("Score", |p: &mut Person, v: i32| p.score = v)
//!             .column("total_score")
//!             .default_if_null(0);
//!         map.field("Scratch", |p: &mut Person, v: String| p.scratch = v).ignore();
//!     }
//! }
//!
//! let row = DataRow::from_pairs([
//!     ("id", RowValues::Int(5)),
//!     ("NAME", RowValues::Text("Bob".into())),
//!     ("total_score", RowValues::Null),
//!     ("scratch", RowValues::Text("ignored".into())),
//! ]);
//! let person: Person = map_row(&row)?;
//! assert_eq!(person, Person { id: 5, name: "Bob".into(), score: 0, scratch: String::new() });
//! # Ok::<(), DbHelperError>(())
//! ```

mod convert;
mod descriptor;

pub use convert::FromRowValue;
pub use descriptor::{DataObject, FieldConfig, FieldMap, FieldMapping, descriptor};

use crate::error::DbHelperError;
use crate::results::DataRow;
use crate::types::RowValues;

/// Map one row onto a new `T`.
///
/// Columns without a matching field are ignored; fields without a matching column keep
/// their default value.
///
/// # Errors
/// Returns `MappingError` naming the field whose value could not be converted.
pub fn map_row<T: DataObject>(row: &DataRow) -> Result<T, DbHelperError> {
    let map = descriptor::<T>();
    map_row_with(&map, row)
}

pub(crate) fn map_row_with<T: DataObject>(
    map: &FieldMap<T>,
    row: &DataRow,
) -> Result<T, DbHelperError> {
    let mut target = T::default();
    for field in map.fields().iter().filter(|f| !f.ignored) {
        let Some(value) = row.get(&field.column) else {
            continue;
        };
        let value = match (&field.default_if_null, value) {
            (Some(default), RowValues::Null) => default.clone(),
            _ => value.clone(),
        };
        (field.assign)(&mut target, value).map_err(|err| DbHelperError::MappingError {
            property: field.property.to_string(),
            message: err.to_string(),
        })?;
    }
    Ok(target)
}
