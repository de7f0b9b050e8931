//! Request compiler: turns a [`FindRequest`] into a [`CompiledQuery`].
//!
//! Compilation is synchronous and side-effect free. Every validation error
//! surfaces here, before any statement is sent to the database.

pub mod aggregate;
mod assembler;
pub mod filter;
pub mod operators;
pub mod projection;
pub mod resolver;
pub mod sort;

use indexmap::IndexSet;
use serde_json::Value;
use tracing::debug;

use crate::catalog::{SchemaCatalog, TableMeta};
use crate::error::Result;
use crate::request::{FindRequest, MetaRequest, RequestedFields};
use crate::sql::helpers::ROOT_ALIAS;
use crate::sql::{ParamMap, Predicate};

pub use aggregate::{shape_aggregates, AggregateProjection};
pub use assembler::COUNT_LABEL;
pub use resolver::{JoinEntry, JoinSet, Purpose};
pub use sort::{OrderTerm, Pagination};

/// Knobs of a compilation, usually taken from the `query` config section.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileOptions {
    pub default_limit: u64,
    pub max_limit: u64,
    /// How many relation levels a `rel.*` wildcard may expand into.
    pub max_expansion_depth: usize,
    /// Collation applied on both sides of pattern operators.
    pub accent_collation: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 1000,
            max_expansion_depth: 3,
            accent_collation: "utf8mb4_0900_ai_ci".to_string(),
        }
    }
}

/// Mutable state threaded through one compilation.
pub struct CompilationState<'c> {
    pub(crate) catalog: &'c SchemaCatalog,
    pub(crate) root: &'c TableMeta,
    pub(crate) options: &'c CompileOptions,
    pub joins: JoinSet,
    pub params: ParamMap,
    /// `(alias, column)` pairs of the data statement, in selection order.
    pub select: IndexSet<(String, String)>,
    subqueries: usize,
}

impl<'c> CompilationState<'c> {
    pub fn new(catalog: &'c SchemaCatalog, root: &'c TableMeta, options: &'c CompileOptions) -> Self {
        let mut state = Self {
            catalog,
            root,
            options,
            joins: JoinSet::default(),
            params: ParamMap::new(),
            select: IndexSet::new(),
            subqueries: 0,
        };
        state.select_column(ROOT_ALIAS, &root.primary_key);
        state
    }

    pub fn select_column(&mut self, alias: &str, column: &str) {
        self.select.insert((alias.to_string(), column.to_string()));
    }

    /// Fresh alias for a correlated or uncorrelated subquery.
    pub(crate) fn subquery_alias(&mut self) -> String {
        let alias = format!("sq{}", self.subqueries);
        self.subqueries += 1;
        alias
    }
}

/// Everything needed to build the statements of one find call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub table: String,
    pub primary_key: String,
    pub joins: JoinSet,
    pub select: Vec<(String, String)>,
    pub predicate: Option<Predicate>,
    pub params: ParamMap,
    pub order_by: Vec<OrderTerm>,
    pub pagination: Pagination,
    pub aggregates: Vec<AggregateProjection>,
    pub meta: MetaRequest,
    pub requested: RequestedFields,
}

impl CompiledQuery {
    /// Relation paths mapped to the primary-key column of their target.
    pub fn relation_keys(&self) -> impl Iterator<Item = (&str, &str)> {
        self.joins
            .iter()
            .map(|j| (j.path.as_str(), j.target_key.as_str()))
    }
}

/// Compile `request` against `catalog`.
pub fn compile(
    catalog: &SchemaCatalog,
    request: &FindRequest,
    options: &CompileOptions,
) -> Result<CompiledQuery> {
    let root = catalog.table(&request.table_name)?;
    let pagination = sort::compile_pagination(request.page.as_ref(), request.limit.as_ref(), options)?;

    let mut state = CompilationState::new(catalog, root, options);
    let requested = RequestedFields::new(request.fields.items());
    projection::select_fields(&mut state, &requested)?;

    let predicate = match &request.filter {
        Some(filter) => filter::compile_filter(&mut state, filter)?,
        None => None,
    };
    let order_by = sort::compile_sort(&mut state, &request.sort.items())?;
    let aggregates = match &request.aggregate {
        Some(section) => aggregate::compile_aggregates(&mut state, section)?,
        None => Vec::new(),
    };
    let meta = MetaRequest::parse(&request.meta.items());

    debug!(
        table = %root.name,
        joins = state.joins.len(),
        params = state.params.len(),
        two_phase = state.joins.has_to_many(),
        "Compiled find request"
    );

    Ok(CompiledQuery {
        table: root.name.clone(),
        primary_key: root.primary_key.clone(),
        joins: state.joins,
        select: state.select.into_iter().collect(),
        predicate,
        params: state.params,
        order_by,
        pagination,
        aggregates,
        meta,
        requested,
    })
}

/// Scalar values usable as bound parameters.
pub(crate) fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::blog_catalog;
    use crate::error::CompileError;
    use serde_json::json;

    fn request(value: Value) -> FindRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_unknown_table() {
        let catalog = blog_catalog();
        let err = compile(
            &catalog,
            &request(json!({"tableName": "nope"})),
            &CompileOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err, CompileError::UnknownTable("nope".into()));
    }

    #[test]
    fn test_defaults() -> Result<()> {
        let catalog = blog_catalog();
        let compiled = compile(
            &catalog,
            &request(json!({"tableName": "posts", "fields": ["title"]})),
            &CompileOptions::default(),
        )?;
        assert_eq!(compiled.pagination, Pagination { page: 1, limit: 10 });
        assert_eq!(
            compiled.select,
            vec![
                ("self".to_string(), "id".to_string()),
                ("self".to_string(), "title".to_string())
            ]
        );
        assert!(compiled.predicate.is_none());
        assert!(compiled.joins.is_empty());
        assert_eq!(compiled.meta, MetaRequest::default());
        Ok(())
    }

    #[test]
    fn test_pagination_checked_before_anything_else() {
        let catalog = blog_catalog();
        let err = compile(
            &catalog,
            &request(json!({"tableName": "posts", "limit": 0, "fields": ["nope"]})),
            &CompileOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::InvalidPagination(_)));
    }

    #[test]
    fn test_relation_keys() -> Result<()> {
        let catalog = blog_catalog();
        let compiled = compile(
            &catalog,
            &request(json!({"tableName": "posts", "fields": ["author.name", "tags.label"]})),
            &CompileOptions::default(),
        )?;
        let keys: Vec<_> = compiled.relation_keys().collect();
        assert_eq!(keys, vec![("author", "id"), ("tags", "id")]);
        Ok(())
    }

    #[test]
    fn test_compiling_twice_is_identical() -> Result<()> {
        let catalog = blog_catalog();
        let request = request(json!({
            "tableName": "posts",
            "fields": ["title", "author.name", "comments.body"],
            "filter": {
                "or": [{"views": {"_gt": 10}}, {"comments": {"approved": true}}],
                "tags": {"label": {"_like": "ru"}},
            },
            "sort": ["-author.name", "views"],
            "aggregate": {"sum": "views", "count": {"condition": {"rating": {"_gte": 4}}}},
            "meta": "*",
        }));
        let options = CompileOptions::default();
        let first = compile(&catalog, &request, &options)?;
        let second = compile(&catalog, &request, &options)?;

        assert_eq!(first.joins, second.joins);
        assert_eq!(first.select, second.select);
        assert_eq!(
            first.params.keys().collect::<Vec<_>>(),
            second.params.keys().collect::<Vec<_>>()
        );
        assert_eq!(first.statements()?, second.statements()?);
        assert_eq!(first, second);
        Ok(())
    }
}
