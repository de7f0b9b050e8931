//! MySQL execution of compiled dynq queries

pub mod connection;
pub mod error;
pub mod executor;
pub mod rows;

pub use connection::MySqlConnectionManager;
pub use error::{DynqError, Result};
pub use executor::{compile_options, Executor, QueryRunner};
