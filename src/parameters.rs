mod parameter;
mod store;

pub use parameter::{Parameter, SqlQuery, strip_binder};
pub use store::ParameterStore;
