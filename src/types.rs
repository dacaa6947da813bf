use std::fmt;
use std::ops::BitOr;

use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Values that can be stored in a database row or used as query parameters.
///
/// The same enum is used by every provider so helper code never branches on driver types:
/// ```rust
/// use sql_dbhelper::prelude::*;
///
/// let params = vec![
///     RowValues::Int(1),
///     RowValues::Text("alice".into()),
///     RowValues::Bool(true),
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// GUID / UUID value
    Guid(Uuid),
    /// Database NULL. This is the only null marker; an absent value is never stored.
    #[default]
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<&bool> {
        if let RowValues::Bool(value) = self {
            return Some(value);
        } else if let Some(i) = self.as_int() {
            if *i == 1 {
                return Some(&true);
            } else if *i == 0 {
                return Some(&false);
            }
        }
        None
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        if let RowValues::Timestamp(value) = self {
            return Some(*value);
        } else if let Some(s) = self.as_text() {
            for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
                if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                    return Some(dt);
                }
            }
        }
        None
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let RowValues::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_guid(&self) -> Option<Uuid> {
        match self {
            RowValues::Guid(id) => Some(*id),
            RowValues::Text(s) => Uuid::parse_str(s).ok(),
            RowValues::Blob(b) => Uuid::from_slice(b).ok(),
            _ => None,
        }
    }

    /// Length used to size variable-length parameters: characters for text, bytes for blobs.
    #[must_use]
    pub fn variable_length(&self) -> Option<usize> {
        match self {
            RowValues::Text(s) => Some(s.chars().count()),
            RowValues::Blob(b) => Some(b.len()),
            RowValues::JSON(j) => Some(j.to_string().chars().count()),
            _ => None,
        }
    }

    /// Short tag naming the variant, used in conversion error messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            RowValues::Int(_) => "int",
            RowValues::Float(_) => "float",
            RowValues::Text(_) => "text",
            RowValues::Bool(_) => "bool",
            RowValues::Timestamp(_) => "timestamp",
            RowValues::Guid(_) => "guid",
            RowValues::Null => "null",
            RowValues::JSON(_) => "json",
            RowValues::Blob(_) => "blob",
        }
    }
}

/// Textual representation of a value, as used by date-sentinel detection and enum parsing.
impl fmt::Display for RowValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowValues::Int(i) => write!(f, "{i}"),
            RowValues::Float(v) => write!(f, "{v}"),
            RowValues::Text(s) => f.write_str(s),
            RowValues::Bool(b) => write!(f, "{b}"),
            RowValues::Timestamp(dt) => write!(f, "{dt}"),
            RowValues::Guid(id) => write!(f, "{id}"),
            RowValues::Null => Ok(()),
            RowValues::JSON(j) => write!(f, "{j}"),
            RowValues::Blob(b) => {
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

macro_rules! impl_from_for_row_values {
    ($($ty:ty => $variant:ident $(as $cast:ty)?),* $(,)?) => {
        $(
            impl From<$ty> for RowValues {
                fn from(value: $ty) -> Self {
                    RowValues::$variant(value $(as $cast)?)
                }
            }
        )*
    };
}

impl_from_for_row_values! {
    i64 => Int,
    i32 => Int as i64,
    i16 => Int as i64,
    u8 => Int as i64,
    u32 => Int as i64,
    f64 => Float,
    f32 => Float as f64,
    bool => Bool,
    String => Text,
    NaiveDateTime => Timestamp,
    Uuid => Guid,
    JsonValue => JSON,
    Vec<u8> => Blob,
}

impl From<&str> for RowValues {
    fn from(value: &str) -> Self {
        RowValues::Text(value.to_owned())
    }
}

impl From<&[u8]> for RowValues {
    fn from(value: &[u8]) -> Self {
        RowValues::Blob(value.to_vec())
    }
}

/// `None` becomes the database NULL marker.
impl<T: Into<RowValues>> From<Option<T>> for RowValues {
    fn from(value: Option<T>) -> Self {
        value.map_or(RowValues::Null, Into::into)
    }
}

/// Built-in providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum DatabaseType {
    /// `SQLite` via rusqlite
    Sqlite,
}

/// Dialect-neutral data kind of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DbType {
    Integer,
    Real,
    Text,
    Boolean,
    DateTime,
    Guid,
    Binary,
    Json,
    #[default]
    Unknown,
}

impl DbType {
    /// Infer the data kind from a value's runtime type.
    #[must_use]
    pub fn for_value(value: &RowValues) -> Self {
        match value {
            RowValues::Int(_) => DbType::Integer,
            RowValues::Float(_) => DbType::Real,
            // serialized documents travel as text
            RowValues::Text(_) | RowValues::JSON(_) => DbType::Text,
            RowValues::Bool(_) => DbType::Boolean,
            RowValues::Timestamp(_) => DbType::DateTime,
            RowValues::Guid(_) => DbType::Guid,
            RowValues::Blob(_) => DbType::Binary,
            RowValues::Null => DbType::Unknown,
        }
    }

    /// Text and byte kinds need a size when used for output.
    #[must_use]
    pub fn is_variable_length(self) -> bool {
        matches!(self, DbType::Text | DbType::Binary | DbType::Json)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ParameterDirection {
    #[default]
    Input,
    Output,
    InputOutput,
    ReturnValue,
}

impl ParameterDirection {
    /// Whether the driver writes a value back after execution.
    #[must_use]
    pub fn receives_value(self) -> bool {
        !matches!(self, ParameterDirection::Input)
    }

    /// Whether the parameter value is sent to the driver.
    #[must_use]
    pub fn sends_value(self) -> bool {
        matches!(
            self,
            ParameterDirection::Input | ParameterDirection::InputOutput
        )
    }
}

/// How command text is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CommandKind {
    /// Raw SQL text
    #[default]
    Text,
    /// Stored procedure name
    StoredProcedure,
    /// Table name; every row of the table is read
    TableDirect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Closed,
    Open,
    Connecting,
    Broken,
    Fetching,
    Executing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IsolationLevel {
    #[default]
    Unspecified,
    Chaos,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
    Snapshot,
}

/// Result-shape hints and side effects for reader-producing commands.
///
/// Flags combine with `|`:
/// ```rust
/// use sql_dbhelper::prelude::*;
///
/// let behavior = CommandBehavior::SINGLE_ROW | CommandBehavior::CLOSE_CONNECTION;
/// assert!(behavior.contains(CommandBehavior::SINGLE_ROW));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CommandBehavior(u8);

impl CommandBehavior {
    pub const DEFAULT: Self = Self(0);
    pub const SINGLE_RESULT: Self = Self(1);
    pub const SCHEMA_ONLY: Self = Self(1 << 1);
    pub const KEY_INFO: Self = Self(1 << 2);
    pub const SINGLE_ROW: Self = Self(1 << 3);
    pub const SEQUENTIAL_ACCESS: Self = Self(1 << 4);
    pub const CLOSE_CONNECTION: Self = Self(1 << 5);

    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for CommandBehavior {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}
