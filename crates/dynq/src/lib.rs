//! `dynq`: convenience façade over `dynq-core`, `dynq-mysql` and `dynq-shared`.

#![deny(missing_docs)]

/// Re-export **everything** from dynq-core at the crate root, so users can `use dynq::*;`.
#[doc(inline)]
pub use dynq_core::*;

/// Also expose dynq-core as a nested module for `dynq::core::...` paths.
pub use dynq_core as core;

pub use dynq_mysql::{compile_options, DynqError, Executor, MySqlConnectionManager, QueryRunner};

pub use dynq_shared::{DynqConfig, ObservabilitySystem};
