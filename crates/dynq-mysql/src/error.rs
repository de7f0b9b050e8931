//! Error types for dynq execution

use dynq_core::{CatalogError, CompileError};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DynqError {
    /// The request was rejected before reaching the database
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("statement failed: {0:#}")]
    Execution(#[from] anyhow::Error),

    #[error("statement timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection error: {0}")]
    Connection(#[from] sqlx::Error),
}

impl DynqError {
    /// Short, stable name used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            DynqError::Compile(e) => e.kind(),
            DynqError::Catalog(_) => "catalog",
            DynqError::Execution(_) => "execution",
            DynqError::Timeout(_) => "timeout",
            DynqError::Connection(_) => "connection",
        }
    }
}

pub type Result<T> = std::result::Result<T, DynqError>;
