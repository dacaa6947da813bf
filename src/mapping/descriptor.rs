use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, LazyLock, Mutex};

use super::convert::FromRowValue;
use crate::error::DbHelperError;
use crate::types::RowValues;

type Assign<T> = Box<dyn Fn(&mut T, RowValues) -> Result<(), DbHelperError> + Send + Sync>;

type DescriptorCache = LazyLock<Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>>;

static DESCRIPTORS: DescriptorCache = LazyLock::new(|| Mutex::new(HashMap::new()));

/// A type that rows can be mapped onto.
pub trait DataObject: Default + Send + 'static {
    /// Register the mappable fields. Called once per type; the result is cached.
    fn describe(map: &mut FieldMap<Self>);
}

/// One mapped field.
pub struct FieldMapping<T> {
    pub property: &'static str,
    /// Source column, compared case-insensitively. Defaults to the property name.
    pub column: String,
    /// Substituted when the column holds NULL.
    pub default_if_null: Option<RowValues>,
    pub ignored: bool,
    pub(crate) assign: Assign<T>,
}

impl<T> std::fmt::Debug for FieldMapping<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldMapping")
            .field("property", &self.property)
            .field("column", &self.column)
            .field("default_if_null", &self.default_if_null)
            .field("ignored", &self.ignored)
            .finish_non_exhaustive()
    }
}

/// Field table for a target type.
pub struct FieldMap<T> {
    fields: Vec<FieldMapping<T>>,
}

impl<T> Default for FieldMap<T> {
    fn default() -> Self {
        Self { fields: Vec::new() }
    }
}

impl<T: 'static> FieldMap<T> {
    /// Map a field whose type converts with [`FromRowValue`]. `Option<_>` fields receive
    /// `None` for NULL.
    pub fn field<V, F>(&mut self, property: &'static str, setter: F) -> FieldConfig<'_, T>
    where
        V: FromRowValue,
        F: Fn(&mut T, V) + Send + Sync + 'static,
    {
        self.push(
            property,
            Box::new(move |target: &mut T, value: RowValues| {
                setter(target, V::from_row_value(value)?);
                Ok(())
            }),
        )
    }

    /// Map an enum field parsed from the value's textual form.
    pub fn enum_field<V, F>(&mut self, property: &'static str, setter: F) -> FieldConfig<'_, T>
    where
        V: FromStr,
        V::Err: std::fmt::Display,
        F: Fn(&mut T, V) + Send + Sync + 'static,
    {
        self.push(
            property,
            Box::new(move |target: &mut T, value: RowValues| {
                setter(target, parse_enum(&value)?);
                Ok(())
            }),
        )
    }

    /// Map a nullable enum field; NULL becomes `None`.
    pub fn nullable_enum_field<V, F>(
        &mut self,
        property: &'static str,
        setter: F,
    ) -> FieldConfig<'_, T>
    where
        V: FromStr,
        V::Err: std::fmt::Display,
        F: Fn(&mut T, Option<V>) + Send + Sync + 'static,
    {
        self.push(
            property,
            Box::new(move |target: &mut T, value: RowValues| {
                let parsed = if value.is_null() {
                    None
                } else {
                    Some(parse_enum(&value)?)
                };
                setter(target, parsed);
                Ok(())
            }),
        )
    }

    fn push(&mut self, property: &'static str, assign: Assign<T>) -> FieldConfig<'_, T> {
        self.fields.push(FieldMapping {
            property,
            column: property.to_string(),
            default_if_null: None,
            ignored: false,
            assign,
        });
        let last = self.fields.len() - 1;
        FieldConfig {
            mapping: &mut self.fields[last],
        }
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldMapping<T>] {
        &self.fields
    }

    #[must_use]
    pub fn get(&self, property: &str) -> Option<&FieldMapping<T>> {
        self.fields.iter().find(|f| f.property == property)
    }
}

/// Per-field options returned by the `FieldMap` registration calls.
pub struct FieldConfig<'a, T> {
    mapping: &'a mut FieldMapping<T>,
}

impl<T> FieldConfig<'_, T> {
    /// Read from `column` instead of the property name.
    pub fn column(self, column: impl Into<String>) -> Self {
        self.mapping.column = column.into();
        self
    }

    /// Value used when the column is NULL.
    pub fn default_if_null(self, value: impl Into<RowValues>) -> Self {
        self.mapping.default_if_null = Some(value.into());
        self
    }

    /// Never map this field.
    pub fn ignore(self) -> Self {
        self.mapping.ignored = true;
        self
    }
}

fn parse_enum<V>(value: &RowValues) -> Result<V, DbHelperError>
where
    V: FromStr,
    V::Err: std::fmt::Display,
{
    if value.is_null() {
        return Err(DbHelperError::ConversionError(
            "cannot convert NULL to an enum value".into(),
        ));
    }
    let text = value.to_string();
    text.parse::<V>().map_err(|e| {
        DbHelperError::ConversionError(format!("`{text}` is not a valid enum value: {e}"))
    })
}

/// Cached field map for `T`, built on first use.
pub fn descriptor<T: DataObject>() -> Arc<FieldMap<T>> {
    let key = TypeId::of::<T>();
    let cached = {
        let cache = match DESCRIPTORS.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        cache.get(&key).cloned()
    };
    if let Some(map) = cached.and_then(|any| any.downcast::<FieldMap<T>>().ok()) {
        return map;
    }

    // built outside the lock so `describe` may look up other descriptors
    let mut map = FieldMap::default();
    T::describe(&mut map);
    let map = Arc::new(map);

    let mut cache = match DESCRIPTORS.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    let entry = cache
        .entry(key)
        .or_insert_with(|| Arc::clone(&map) as Arc<dyn Any + Send + Sync>);
    Arc::clone(entry).downcast::<FieldMap<T>>().unwrap_or(map)
}
