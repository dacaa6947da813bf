use crate::connection_string::ConnectionStringBuilder;
use crate::error::DbHelperError;

const DATA_SOURCE_KEYS: [&str; 3] = ["Data Source", "DataSource", "Filename"];

/// How the database file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    #[default]
    ReadWriteCreate,
    ReadWrite,
    ReadOnly,
    Memory,
}

impl OpenMode {
    fn parse(value: &str) -> Result<Self, DbHelperError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "readwritecreate" => Ok(OpenMode::ReadWriteCreate),
            "readwrite" => Ok(OpenMode::ReadWrite),
            "readonly" => Ok(OpenMode::ReadOnly),
            "memory" => Ok(OpenMode::Memory),
            other => Err(DbHelperError::ConfigError(format!(
                "unknown SQLite mode: {other}"
            ))),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            OpenMode::ReadWriteCreate => "ReadWriteCreate",
            OpenMode::ReadWrite => "ReadWrite",
            OpenMode::ReadOnly => "ReadOnly",
            OpenMode::Memory => "Memory",
        }
    }
}

/// Options for opening a `SQLite` connection.
///
/// Parsed from a connection string such as
/// `Data Source=app.db;Mode=ReadWrite;Foreign Keys=True`, or from a bare file path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteOptions {
    pub data_source: String,
    pub mode: OpenMode,
    /// `Some` sets `PRAGMA foreign_keys` on open.
    pub foreign_keys: Option<bool>,
    /// Busy timeout used until a command supplies its own.
    pub default_timeout_secs: Option<u32>,
}

impl SqliteOptions {
    #[must_use]
    pub fn new(data_source: impl Into<String>) -> Self {
        Self {
            data_source: data_source.into(),
            mode: OpenMode::ReadWriteCreate,
            foreign_keys: None,
            default_timeout_secs: None,
        }
    }

    /// # Errors
    /// Returns `ConfigError` when no data source is given or a value is malformed.
    pub fn from_connection_string(connection_string: &str) -> Result<Self, DbHelperError> {
        let trimmed = connection_string.trim();
        if trimmed.is_empty() {
            return Err(DbHelperError::ConfigError(
                "SQLite connection string has no data source".into(),
            ));
        }
        if !trimmed.contains('=') {
            return Ok(Self::new(trimmed));
        }

        let builder = ConnectionStringBuilder::parse(trimmed)?;
        let mode = builder
            .get("Mode")
            .map(OpenMode::parse)
            .transpose()?
            .unwrap_or_default();
        let data_source = match builder.get_any(&DATA_SOURCE_KEYS) {
            Some(ds) if !ds.trim().is_empty() => ds.trim().to_string(),
            _ if mode == OpenMode::Memory => ":memory:".to_string(),
            _ => {
                return Err(DbHelperError::ConfigError(
                    "SQLite connection string has no data source".into(),
                ));
            }
        };
        let foreign_keys = builder
            .get_any(&["Foreign Keys", "ForeignKeys"])
            .map(|v| parse_bool("Foreign Keys", v))
            .transpose()?;
        let default_timeout_secs = builder
            .get_any(&["Default Timeout", "Command Timeout"])
            .map(|v| {
                v.trim().parse::<u32>().map_err(|_| {
                    DbHelperError::ConfigError(format!("invalid SQLite timeout: {v}"))
                })
            })
            .transpose()?;

        Ok(Self {
            data_source,
            mode,
            foreign_keys,
            default_timeout_secs,
        })
    }

    /// Render back to a connection string.
    #[must_use]
    pub fn to_connection_string(&self) -> String {
        let mut builder = ConnectionStringBuilder::new();
        builder.set("Data Source", self.data_source.as_str());
        if self.mode != OpenMode::ReadWriteCreate {
            builder.set("Mode", self.mode.as_str());
        }
        if let Some(fk) = self.foreign_keys {
            builder.set("Foreign Keys", if fk { "True" } else { "False" });
        }
        if let Some(secs) = self.default_timeout_secs {
            builder.set("Default Timeout", secs.to_string());
        }
        builder.to_string()
    }

    pub(crate) fn open_flags(&self) -> rusqlite::OpenFlags {
        use rusqlite::OpenFlags;
        let base = OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        match self.mode {
            OpenMode::ReadWriteCreate | OpenMode::Memory => {
                base | OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
            }
            OpenMode::ReadWrite => base | OpenFlags::SQLITE_OPEN_READ_WRITE,
            OpenMode::ReadOnly => base | OpenFlags::SQLITE_OPEN_READ_ONLY,
        }
    }

    pub(crate) fn path(&self) -> &str {
        if self.mode == OpenMode::Memory {
            ":memory:"
        } else {
            &self.data_source
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, DbHelperError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(DbHelperError::ConfigError(format!(
            "invalid boolean for {key}: {value}"
        ))),
    }
}

/// Fluent builder for `SqliteOptions`.
#[derive(Debug, Clone)]
pub struct SqliteOptionsBuilder {
    opts: SqliteOptions,
}

impl SqliteOptionsBuilder {
    #[must_use]
    pub fn new(data_source: impl Into<String>) -> Self {
        Self {
            opts: SqliteOptions::new(data_source),
        }
    }

    #[must_use]
    pub fn mode(mut self, mode: OpenMode) -> Self {
        self.opts.mode = mode;
        self
    }

    #[must_use]
    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.opts.foreign_keys = Some(enabled);
        self
    }

    #[must_use]
    pub fn default_timeout(mut self, secs: u32) -> Self {
        self.opts.default_timeout_secs = Some(secs);
        self
    }

    #[must_use]
    pub fn finish(self) -> SqliteOptions {
        self.opts
    }

    /// Finish and render as a connection string.
    #[must_use]
    pub fn connection_string(self) -> String {
        self.opts.to_connection_string()
    }
}
