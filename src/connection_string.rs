use std::fmt;

use crate::error::DbHelperError;

/// Ordered `key=value;` connection-string builder with case-insensitive keys.
///
/// ```rust
/// use sql_dbhelper::prelude::*;
///
/// let mut builder = ConnectionStringBuilder::parse("Data Source=app.db;Mode=ReadOnly")?;
/// assert_eq!(builder.get("data source"), Some("app.db"));
/// builder.set("Cache", "Shared");
/// assert_eq!(builder.to_string(), "Data Source=app.db;Mode=ReadOnly;Cache=Shared");
/// # Ok::<(), DbHelperError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStringBuilder {
    entries: Vec<(String, String)>,
}

impl ConnectionStringBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a connection string. Values may be wrapped in single or double quotes so they
    /// can contain `;`.
    ///
    /// # Errors
    /// Returns `DbHelperError::ConfigError` for a segment without `=` or an unterminated quote.
    pub fn parse(input: &str) -> Result<Self, DbHelperError> {
        let mut builder = Self::new();
        let mut rest = input.trim();
        while !rest.is_empty() {
            let eq = rest.find('=').ok_or_else(|| {
                DbHelperError::ConfigError(format!("connection string segment without '=': {rest}"))
            })?;
            let key = rest[..eq].trim();
            if key.is_empty() {
                return Err(DbHelperError::ConfigError(
                    "connection string contains an empty key".into(),
                ));
            }
            let after = rest[eq + 1..].trim_start();
            let (value, remaining) = match after.chars().next() {
                Some(quote @ ('"' | '\'')) => {
                    let body = &after[1..];
                    let end = body.find(quote).ok_or_else(|| {
                        DbHelperError::ConfigError(format!("unterminated quote for key {key}"))
                    })?;
                    let tail = body[end + 1..].trim_start();
                    let tail = tail.strip_prefix(';').unwrap_or(tail);
                    (body[..end].to_string(), tail)
                }
                _ => match after.find(';') {
                    Some(semi) => (after[..semi].trim().to_string(), &after[semi + 1..]),
                    None => (after.trim().to_string(), ""),
                },
            };
            builder.set(key, value);
            rest = remaining.trim_start();
            while let Some(stripped) = rest.strip_prefix(';') {
                rest = stripped.trim_start();
            }
        }
        Ok(builder)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.position(key).map(|i| self.entries[i].1.as_str())
    }

    /// First value present among `keys`, for providers accepting synonyms.
    #[must_use]
    pub fn get_any(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.get(k))
    }

    /// Insert or overwrite a key; an existing key keeps its position and original casing.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.position(&key) {
            Some(i) => self.entries[i].1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.position(key).map(|i| self.entries.remove(i).1)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(key.trim()))
    }
}

impl fmt::Display for ConnectionStringBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            if value.contains(';') && !value.contains('"') {
                write!(f, "{key}=\"{value}\"")?;
            } else if value.contains(';') {
                write!(f, "{key}='{value}'")?;
            } else {
                write!(f, "{key}={value}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_values_keep_semicolons() {
        let b = ConnectionStringBuilder::parse("Data Source=\"a;b.db\"; Pooling = false;").unwrap();
        assert_eq!(b.get("DATA SOURCE"), Some("a;b.db"));
        assert_eq!(b.get("pooling"), Some("false"));
        assert_eq!(b.to_string(), "Data Source=\"a;b.db\";Pooling=false");
    }

    #[test]
    fn missing_equals_is_config_error() {
        let err = ConnectionStringBuilder::parse("just-a-path.db").unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn set_overwrites_in_place() {
        let mut b = ConnectionStringBuilder::new();
        b.set("Data Source", "one.db");
        b.set("Timeout", "5");
        b.set("data source", "two.db");
        assert_eq!(b.to_string(), "Data Source=two.db;Timeout=5");
        assert_eq!(b.remove("TIMEOUT").as_deref(), Some("5"));
        assert!(!b.contains_key("timeout"));
    }
}
