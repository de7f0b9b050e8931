//! Runtime-defined schema graph consumed by the compiler.

#[allow(clippy::module_inception)]
mod catalog;
mod table;

#[cfg(test)]
pub(crate) mod fixtures;

pub use catalog::{CatalogHandle, Link, SchemaCatalog};
pub use table::{Cardinality, ColumnMeta, ColumnType, JunctionMeta, RelationMeta, TableMeta};
