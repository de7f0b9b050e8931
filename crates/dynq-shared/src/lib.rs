//! Shared configuration and observability for dynq

pub mod config;
pub mod observability;

pub use config::*;
pub use observability::*;
