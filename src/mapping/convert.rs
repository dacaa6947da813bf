use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::DbHelperError;
use crate::types::RowValues;

/// Conversion from a database value to a field type.
///
/// NULL converts only into `Option<_>`, `RowValues` and `serde_json::Value`; every other
/// target reports a `ConversionError` unless the field declares a default for NULL.
pub trait FromRowValue: Sized {
    /// # Errors
    /// Returns `ConversionError` when the value cannot represent `Self`.
    fn from_row_value(value: RowValues) -> Result<Self, DbHelperError>;
}

fn mismatch(value: &RowValues, target: &str) -> DbHelperError {
    DbHelperError::ConversionError(format!(
        "cannot convert {} value `{value}` to {target}",
        value.kind_name()
    ))
}

impl FromRowValue for RowValues {
    fn from_row_value(value: RowValues) -> Result<Self, DbHelperError> {
        Ok(value)
    }
}

impl<T: FromRowValue> FromRowValue for Option<T> {
    fn from_row_value(value: RowValues) -> Result<Self, DbHelperError> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_row_value(value).map(Some)
        }
    }
}

impl FromRowValue for i64 {
    fn from_row_value(value: RowValues) -> Result<Self, DbHelperError> {
        match &value {
            RowValues::Int(i) => Ok(*i),
            RowValues::Bool(b) => Ok(i64::from(*b)),
            #[allow(clippy::cast_possible_truncation)]
            RowValues::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e18 => Ok(*f as i64),
            RowValues::Text(s) => s.trim().parse().map_err(|_| mismatch(&value, "i64")),
            _ => Err(mismatch(&value, "i64")),
        }
    }
}

macro_rules! impl_from_row_value_int {
    ($($ty:ty),*) => {
        $(
            impl FromRowValue for $ty {
                fn from_row_value(value: RowValues) -> Result<Self, DbHelperError> {
                    let wide = i64::from_row_value(value.clone())?;
                    <$ty>::try_from(wide).map_err(|_| mismatch(&value, stringify!($ty)))
                }
            }
        )*
    };
}

impl_from_row_value_int!(i8, i16, i32, u8, u16, u32, u64, usize);

impl FromRowValue for f64 {
    fn from_row_value(value: RowValues) -> Result<Self, DbHelperError> {
        match &value {
            RowValues::Float(f) => Ok(*f),
            #[allow(clippy::cast_precision_loss)]
            RowValues::Int(i) => Ok(*i as f64),
            RowValues::Text(s) => s.trim().parse().map_err(|_| mismatch(&value, "f64")),
            _ => Err(mismatch(&value, "f64")),
        }
    }
}

impl FromRowValue for f32 {
    #[allow(clippy::cast_possible_truncation)]
    fn from_row_value(value: RowValues) -> Result<Self, DbHelperError> {
        f64::from_row_value(value).map(|f| f as f32)
    }
}

impl FromRowValue for bool {
    fn from_row_value(value: RowValues) -> Result<Self, DbHelperError> {
        if let Some(b) = value.as_bool() {
            return Ok(*b);
        }
        match &value {
            RowValues::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(true),
                "false" | "0" => Ok(false),
                _ => Err(mismatch(&value, "bool")),
            },
            _ => Err(mismatch(&value, "bool")),
        }
    }
}

impl FromRowValue for String {
    fn from_row_value(value: RowValues) -> Result<Self, DbHelperError> {
        match value {
            RowValues::Text(s) => Ok(s),
            other @ (RowValues::Null | RowValues::Blob(_)) => Err(mismatch(&other, "String")),
            other => Ok(other.to_string()),
        }
    }
}

impl FromRowValue for Vec<u8> {
    fn from_row_value(value: RowValues) -> Result<Self, DbHelperError> {
        match value {
            RowValues::Blob(b) => Ok(b),
            RowValues::Text(s) => Ok(s.into_bytes()),
            RowValues::Guid(id) => Ok(id.as_bytes().to_vec()),
            other => Err(mismatch(&other, "Vec<u8>")),
        }
    }
}

impl FromRowValue for NaiveDateTime {
    fn from_row_value(value: RowValues) -> Result<Self, DbHelperError> {
        value
            .as_timestamp()
            .ok_or_else(|| mismatch(&value, "NaiveDateTime"))
    }
}

impl FromRowValue for NaiveDate {
    fn from_row_value(value: RowValues) -> Result<Self, DbHelperError> {
        if let Some(ts) = value.as_timestamp() {
            return Ok(ts.date());
        }
        value
            .as_text()
            .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
            .ok_or_else(|| mismatch(&value, "NaiveDate"))
    }
}

impl FromRowValue for Uuid {
    fn from_row_value(value: RowValues) -> Result<Self, DbHelperError> {
        value.as_guid().ok_or_else(|| mismatch(&value, "Uuid"))
    }
}

impl FromRowValue for JsonValue {
    fn from_row_value(value: RowValues) -> Result<Self, DbHelperError> {
        match value {
            RowValues::JSON(j) => Ok(j),
            RowValues::Null => Ok(JsonValue::Null),
            RowValues::Text(s) => serde_json::from_str(&s)
                .map_err(|e| DbHelperError::ConversionError(format!("invalid JSON text: {e}"))),
            RowValues::Int(i) => Ok(JsonValue::from(i)),
            RowValues::Float(f) => Ok(JsonValue::from(f)),
            RowValues::Bool(b) => Ok(JsonValue::from(b)),
            other => Err(mismatch(&other, "serde_json::Value")),
        }
    }
}
