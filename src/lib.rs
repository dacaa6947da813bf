//! Provider-agnostic data access: parameterized execution, transactions, batches and typed
//! row mapping over any driver that implements the traits in [`provider`].
//!
//! ```rust,no_run
//! use sql_dbhelper::prelude::*;
//!
//! #[derive(Debug, Default)]
//! struct Person {
//!     id: i64,
//!     name: String,
//! }
//!
//! impl DataObject for Person {
//!     fn describe(map: &mut FieldMap<Self>) {
//!         map.field("Id", |p: &mut Person, v: i64| p.id = v);
//!         map.field("Name", |p: &mut Person, v: String| p.name = v);
//!     }
//! }
//!
//! let mut client = DbClient::sqlite("Data Source=app.db");
//! client.add_parameter("id", 5)?;
//! let person: Person = client.get_data_object(
//!     CommandKind::Text,
//!     "SELECT id, name FROM people WHERE id = @id",
//!     ExecTarget::Default,
//! )?;
//! # let _ = person;
//! # Ok::<(), DbHelperError>(())
//! ```

pub mod command;
pub mod config;
pub mod connection;
pub mod connection_string;
pub mod error;
pub mod executor;
pub mod factory;
pub mod mapping;
pub mod parameters;
pub mod prelude;
pub mod provider;
pub mod reader;
pub mod results;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod types;

pub use error::DbHelperError;
pub use executor::{DbClient, ExecTarget};
pub use factory::ObjectFactory;
pub use types::{DatabaseType, RowValues};
