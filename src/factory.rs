use std::sync::Arc;

use chrono::NaiveDateTime;
use clap::ValueEnum;
use lazy_static::lazy_static;
use tokio_util::sync::CancellationToken;

use crate::command::Command;
use crate::connection::{Connection, Transaction};
use crate::connection_string::ConnectionStringBuilder;
use crate::error::DbHelperError;
use crate::parameters::{Parameter, strip_binder};
use crate::provider::ProviderFactory;
use crate::types::{CommandKind, DatabaseType, DbType, IsolationLevel, ParameterDirection, RowValues};

lazy_static! {
    /// Textual forms of the date/time extremes that drivers commonly reject.
    static ref DATETIME_SENTINELS: [String; 2] = [
        RowValues::Timestamp(NaiveDateTime::MIN).to_string(),
        RowValues::Timestamp(NaiveDateTime::MAX).to_string(),
    ];
}

/// Builds connections, commands, parameters and transactions for one provider and applies
/// the parameter formatting rules.
#[derive(Clone)]
pub struct ObjectFactory {
    provider: Arc<dyn ProviderFactory>,
    variable_binder: String,
}

impl ObjectFactory {
    /// Bind a factory to an explicit provider. The binder starts as the provider default.
    pub fn new(provider: Arc<dyn ProviderFactory>) -> Self {
        let variable_binder = provider.default_variable_binder().to_string();
        Self {
            provider,
            variable_binder,
        }
    }

    /// Factory for one of the built-in providers.
    ///
    /// # Errors
    /// Returns `ConfigError` when the provider's feature is not compiled in.
    pub fn for_database(db_type: DatabaseType) -> Result<Self, DbHelperError> {
        match db_type {
            #[cfg(feature = "sqlite")]
            DatabaseType::Sqlite => Ok(Self::new(Arc::new(crate::sqlite::SqliteProvider))),
            #[allow(unreachable_patterns)]
            other => Err(DbHelperError::ConfigError(format!(
                "provider {other:?} is not enabled in the current build"
            ))),
        }
    }

    /// Resolve a provider identifier such as `"sqlite"`.
    ///
    /// # Errors
    /// Returns `ConfigError` for an unknown identifier or a provider that is not compiled in.
    pub fn from_name(name: &str) -> Result<Self, DbHelperError> {
        let db_type = DatabaseType::from_str(name.trim(), true).map_err(|_| {
            DbHelperError::ConfigError(format!("unknown database provider: {name}"))
        })?;
        Self::for_database(db_type)
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<dyn ProviderFactory> {
        &self.provider
    }

    #[must_use]
    pub fn variable_binder(&self) -> &str {
        &self.variable_binder
    }

    /// Change the binder used by every subsequent formatting call. An empty binder leaves
    /// parameter names untouched.
    pub fn set_variable_binder(&mut self, binder: impl Into<String>) {
        self.variable_binder = binder.into();
    }

    /// Create a connection, assigning `connection_string` when given.
    ///
    /// # Errors
    /// Returns the provider error if the connection object cannot be created.
    pub fn get_connection(&self, connection_string: Option<&str>) -> Result<Connection, DbHelperError> {
        let mut conn = self.provider.create_connection()?;
        if let Some(cs) = connection_string {
            conn.set_connection_string(cs);
        }
        Ok(Connection::new(conn, self.provider.name()))
    }

    #[must_use]
    pub fn get_connection_string_builder(&self) -> ConnectionStringBuilder {
        self.provider.create_connection_string_builder()
    }

    /// Build a command, formatting and appending every parameter in order.
    ///
    /// # Errors
    /// Returns `ParameterError` if a parameter violates the formatting rules.
    pub fn get_command<'p, I>(
        &self,
        kind: CommandKind,
        text: &str,
        parameters: I,
        timeout_secs: u32,
        transaction: Option<&Transaction>,
    ) -> Result<Command, DbHelperError>
    where
        I: IntoIterator<Item = &'p Parameter>,
    {
        let mut command = self.provider.create_command();
        command.kind = kind;
        command.text = text.to_string();
        command.timeout_secs = timeout_secs;
        command.in_transaction = transaction.is_some();
        self.fill_parameters(&mut command, parameters)?;
        Ok(command)
    }

    /// Replace a command's parameter list with formatted copies of `parameters`.
    pub(crate) fn fill_parameters<'p, I>(
        &self,
        command: &mut Command,
        parameters: I,
    ) -> Result<(), DbHelperError>
    where
        I: IntoIterator<Item = &'p Parameter>,
    {
        command.parameters.clear();
        for param in parameters {
            let mut param = param.clone();
            self.format_parameter(&mut param)?;
            command.parameters.push(param);
        }
        Ok(())
    }

    /// Parameter with a data kind inferred from `value`.
    ///
    /// # Errors
    /// Returns `ParameterError` if the formatting rules reject it.
    pub fn get_parameter(
        &self,
        name: &str,
        value: impl Into<RowValues>,
    ) -> Result<Parameter, DbHelperError> {
        let value = value.into();
        let db_type = self.provider.infer_db_type(&value);
        self.build_parameter(name, value, db_type, None, ParameterDirection::Input)
    }

    /// Parameter with an explicit data kind, size and direction.
    ///
    /// # Errors
    /// Returns `ParameterError` if the formatting rules reject it, notably a variable-length
    /// output parameter without a size.
    pub fn get_typed_parameter(
        &self,
        name: &str,
        value: impl Into<RowValues>,
        db_type: DbType,
        size: Option<usize>,
        direction: ParameterDirection,
    ) -> Result<Parameter, DbHelperError> {
        self.build_parameter(name, value.into(), db_type, size, direction)
    }

    fn build_parameter(
        &self,
        name: &str,
        value: RowValues,
        db_type: DbType,
        size: Option<usize>,
        direction: ParameterDirection,
    ) -> Result<Parameter, DbHelperError> {
        let mut param = self.provider.create_parameter();
        param.name = name.to_string();
        // documents are sent in their serialized text form
        param.value = match value {
            RowValues::JSON(doc) => RowValues::Text(doc.to_string()),
            other => other,
        };
        param.db_type = db_type;
        param.size = size;
        param.direction = direction;
        self.format_parameter(&mut param)?;
        Ok(param)
    }

    /// Begin a transaction on an open connection.
    ///
    /// # Errors
    /// Returns `ConnectionError` if the connection is not open, otherwise the driver error.
    pub fn get_transaction(
        &self,
        connection: &Connection,
        isolation: IsolationLevel,
    ) -> Result<Transaction, DbHelperError> {
        Transaction::begin(connection, isolation)
    }

    /// # Errors
    /// Returns `Cancelled` if `token` already fired, otherwise as `get_transaction`.
    pub async fn get_transaction_async(
        &self,
        connection: &Connection,
        isolation: IsolationLevel,
        token: &CancellationToken,
    ) -> Result<Transaction, DbHelperError> {
        Transaction::begin_async(connection, isolation, token).await
    }

    /// Apply the formatting rules, in order:
    /// 1. re-prefix the name with the current binder (dropping any previous binder),
    /// 2. date/time extremes become NULL,
    /// 3. `is_nullable` mirrors whether the value is NULL,
    /// 4. variable-length values get a size: required for output, derived otherwise.
    ///
    /// # Errors
    /// Returns `ParameterError` when a variable-length output parameter has no size.
    pub fn format_parameter(&self, param: &mut Parameter) -> Result<(), DbHelperError> {
        if !self.variable_binder.is_empty() && !param.name.is_empty() {
            let base = strip_binder(&param.name);
            param.name = format!("{}{}", self.variable_binder, base);
        }

        if !param.value.is_null() {
            let text = param.value.to_string();
            if DATETIME_SENTINELS.iter().any(|s| *s == text) {
                param.value = RowValues::Null;
            }
        }

        param.is_nullable = param.value.is_null();

        let variable = param.db_type.is_variable_length()
            || (param.db_type == DbType::Unknown && param.value.variable_length().is_some());
        if variable && param.size.is_none() {
            match (param.direction, param.value.variable_length()) {
                (ParameterDirection::Output, _) | (_, None)
                    if param.direction.receives_value() =>
                {
                    return Err(DbHelperError::ParameterError(format!(
                        "parameter {} is a variable-length {:?} parameter and must have an explicit size",
                        param.name, param.direction
                    )));
                }
                (_, Some(len)) => param.size = Some(len),
                (_, None) => {}
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ObjectFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectFactory")
            .field("provider", &self.provider.name())
            .field("variable_binder", &self.variable_binder)
            .finish()
    }
}
