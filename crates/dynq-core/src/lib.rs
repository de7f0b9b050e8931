//! Schema catalog, request compiler and result shaping for dynq

pub mod catalog;
pub mod collapse;
pub mod compile;
pub mod error;
pub mod helper;
pub mod hydrate;
pub mod request;
pub mod sql;

pub use catalog::*;
pub use collapse::Collapser;
pub use compile::{compile, CompileOptions, CompiledQuery};
pub use error::*;
pub use hydrate::{hydrate, Row};
pub use request::*;
pub use sql::{ParamMap, Statement};
