use lazy_static::lazy_static;
use regex::Regex;

use crate::types::{CommandKind, DbType, ParameterDirection, RowValues};

lazy_static! {
    static ref BINDER_PREFIX: Regex = Regex::new(r"^[@:?$]+").expect("static binder regex");
}

/// Remove any leading variable-binder symbols (`@`, `:`, `?`, `$`) from a parameter name.
#[must_use]
pub fn strip_binder(name: &str) -> &str {
    match BINDER_PREFIX.find(name) {
        Some(m) => &name[m.end()..],
        None => name,
    }
}

/// A single query parameter.
///
/// Parameters are normally built through `ObjectFactory::get_parameter`, which applies the
/// binder, null and size rules; a struct literal skips those rules until the parameter is
/// attached to a command.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Parameter {
    pub name: String,
    pub value: RowValues,
    pub direction: ParameterDirection,
    pub size: Option<usize>,
    pub db_type: DbType,
    pub is_nullable: bool,
}

impl Parameter {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<RowValues>) -> Self {
        let value = value.into();
        Self {
            name: name.into(),
            db_type: DbType::for_value(&value),
            is_nullable: value.is_null(),
            value,
            ..Self::default()
        }
    }

    /// Unnamed parameter, bound by position.
    #[must_use]
    pub fn positional(value: impl Into<RowValues>) -> Self {
        Self::new(String::new(), value)
    }

    #[must_use]
    pub fn with_direction(mut self, direction: ParameterDirection) -> Self {
        self.direction = direction;
        self
    }

    #[must_use]
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    #[must_use]
    pub fn with_db_type(mut self, db_type: DbType) -> Self {
        self.db_type = db_type;
        self
    }

    /// Name without its binder prefix.
    #[must_use]
    pub fn base_name(&self) -> &str {
        strip_binder(&self.name)
    }

    /// Binder-insensitive, ASCII case-insensitive name comparison.
    #[must_use]
    pub fn name_matches(&self, name: &str) -> bool {
        self.base_name().eq_ignore_ascii_case(strip_binder(name))
    }
}

/// A query and its parameters bundled together, used as one unit of a batch.
#[derive(Debug, Clone)]
pub struct SqlQuery {
    pub kind: CommandKind,
    /// The SQL query string
    pub text: String,
    /// The parameters to be bound to the query
    pub parameters: Vec<Parameter>,
}

impl SqlQuery {
    pub fn new(text: impl Into<String>, parameters: Vec<Parameter>) -> Self {
        Self {
            kind: CommandKind::Text,
            text: text.into(),
            parameters,
        }
    }

    pub fn new_without_params(text: impl Into<String>) -> Self {
        Self::new(text, Vec::new())
    }

    #[must_use]
    pub fn with_kind(mut self, kind: CommandKind) -> Self {
        self.kind = kind;
        self
    }
}
