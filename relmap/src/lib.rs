pub mod field;
pub mod schema;
pub mod driver;
pub mod executor;
pub mod record;
pub mod error;

pub use error::{RelmapError, Result};
pub use field::FieldDescriptor;
pub use schema::Schema;
pub use driver::{Connection, Driver, Pool};
pub use executor::Executor;
pub use record::{Limit, Model, Query, Record};
