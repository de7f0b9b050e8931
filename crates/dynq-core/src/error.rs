//! Error types for dynq core

use thiserror::Error;

/// Errors raised while compiling a request into statements.
///
/// Every variant is produced synchronously before any statement reaches the
/// database, so a failed compilation has no side effects.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("unknown table `{0}`")]
    UnknownTable(String),

    #[error("unknown relation `{property}` on table `{table}`")]
    UnknownRelation { table: String, property: String },

    #[error("unknown field `{field}` on table `{table}`")]
    UnknownField { table: String, field: String },

    #[error("relation `{table}.{property}` has no inverse join key")]
    MissingInverseRelation { table: String, property: String },

    #[error("relation `{table}.{property}` has no join key")]
    MissingJoinKey { table: String, property: String },

    #[error("cannot apply `{function}` to `{field}` of type `{column_type}`")]
    InvalidAggregateType {
        function: String,
        field: String,
        column_type: String,
    },

    #[error("invalid aggregate: {0}")]
    InvalidAggregate(String),

    #[error("invalid pagination: {0}")]
    InvalidPagination(String),

    #[error("invalid filter at `{path}`: {reason}")]
    InvalidFilter { path: String, reason: String },

    #[error("unknown operator `{operator}` at `{path}`")]
    UnknownOperator { path: String, operator: String },

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
}

impl CompileError {
    /// Short, stable name used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            CompileError::UnknownTable(_) => "unknown_table",
            CompileError::UnknownRelation { .. } => "unknown_relation",
            CompileError::UnknownField { .. } => "unknown_field",
            CompileError::MissingInverseRelation { .. } => "missing_inverse_relation",
            CompileError::MissingJoinKey { .. } => "missing_join_key",
            CompileError::InvalidAggregateType { .. } => "invalid_aggregate_type",
            CompileError::InvalidAggregate(_) => "invalid_aggregate",
            CompileError::InvalidPagination(_) => "invalid_pagination",
            CompileError::InvalidFilter { .. } => "invalid_filter",
            CompileError::UnknownOperator { .. } => "unknown_operator",
            CompileError::InvalidIdentifier(_) => "invalid_identifier",
        }
    }

    pub(crate) fn invalid_filter(path: &str, reason: impl Into<String>) -> Self {
        CompileError::InvalidFilter {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while loading or validating a schema catalog.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid schema: {0}")]
    InvalidSchema(String),
}

pub type Result<T> = std::result::Result<T, CompileError>;
