use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::error::{CatalogError, CompileError, Result};
use crate::sql::helpers::validate_name;

use super::table::{Cardinality, RelationMeta, TableMeta};

/// Where the rows of a relation live when it is queried as a set of ids,
/// independently of the outer query's joins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Table scanned by the subquery.
    pub table: String,
    /// Column holding the owning row's primary key.
    pub owner_key: String,
    /// Column holding the related row's primary key.
    pub related_key: String,
}

#[derive(Deserialize)]
struct CatalogFile {
    tables: Vec<TableMeta>,
}

/// Read-only table/column/relation graph.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchemaCatalog {
    tables: IndexMap<String, TableMeta>,
}

impl SchemaCatalog {
    /// Build and validate a catalog.
    pub fn new(tables: impl IntoIterator<Item = TableMeta>) -> std::result::Result<Self, CatalogError> {
        let mut map = IndexMap::new();
        for table in tables {
            if map.contains_key(&table.name) {
                return Err(CatalogError::InvalidSchema(format!(
                    "table `{}` declared twice",
                    table.name
                )));
            }
            map.insert(table.name.clone(), table);
        }
        let catalog = Self { tables: map };
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn from_json_str(input: &str) -> std::result::Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(input)?;
        Self::new(file.tables)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> std::result::Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let catalog = Self::from_json_str(&raw)?;
        info!(
            path = %path.as_ref().display(),
            tables = catalog.tables.len(),
            "Schema catalog loaded"
        );
        Ok(catalog)
    }

    pub fn table(&self, name: &str) -> Result<&TableMeta> {
        self.tables
            .get(name)
            .ok_or_else(|| CompileError::UnknownTable(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Target table of a relation.
    pub fn target(&self, relation: &RelationMeta) -> Result<&TableMeta> {
        self.table(&relation.target_table)
    }

    /// Foreign-key column used to join `relation` from `table`.
    ///
    /// For `belongs_to` the column lives on `table`; for `has_*` it lives on
    /// the target and may be taken from the target's inverse relation.
    pub fn join_key(&self, table: &TableMeta, relation: &RelationMeta) -> Result<String> {
        let missing = || CompileError::MissingJoinKey {
            table: table.name.clone(),
            property: relation.property.clone(),
        };
        match relation.cardinality {
            Cardinality::BelongsTo => relation.join_key.clone().ok_or_else(missing),
            Cardinality::HasOne | Cardinality::HasMany => self
                .inverse_join_key(relation)?
                .ok_or_else(missing),
            Cardinality::ManyToMany => Err(missing()),
        }
    }

    /// Describe where the related ids of `relation` can be read from.
    pub fn link(&self, table: &TableMeta, relation: &RelationMeta) -> Result<Link> {
        let missing_inverse = || CompileError::MissingInverseRelation {
            table: table.name.clone(),
            property: relation.property.clone(),
        };
        match relation.cardinality {
            Cardinality::BelongsTo => {
                let fk = self.join_key(table, relation)?;
                Ok(Link {
                    table: table.name.clone(),
                    owner_key: table.primary_key.clone(),
                    related_key: fk,
                })
            }
            Cardinality::HasOne | Cardinality::HasMany => {
                let target = self.target(relation)?;
                let fk = self.inverse_join_key(relation)?.ok_or_else(missing_inverse)?;
                Ok(Link {
                    table: target.name.clone(),
                    owner_key: fk,
                    related_key: target.primary_key.clone(),
                })
            }
            Cardinality::ManyToMany => {
                let junction = relation.junction.as_ref().ok_or_else(missing_inverse)?;
                Ok(Link {
                    table: junction.table.clone(),
                    owner_key: junction.source_key.clone(),
                    related_key: junction.target_key.clone(),
                })
            }
        }
    }

    fn inverse_join_key(&self, relation: &RelationMeta) -> Result<Option<String>> {
        if let Some(key) = &relation.join_key {
            return Ok(Some(key.clone()));
        }
        let Some(inverse) = &relation.inverse_property else {
            return Ok(None);
        };
        let target = self.target(relation)?;
        Ok(target
            .find_relation(inverse)
            .filter(|r| r.cardinality == Cardinality::BelongsTo)
            .and_then(|r| r.join_key.clone()))
    }

    fn validate(&self) -> std::result::Result<(), CatalogError> {
        let invalid = |msg: String| CatalogError::InvalidSchema(msg);
        for table in self.tables.values() {
            check_name(&table.name)?;
            if table.find_column(&table.primary_key).is_none() {
                return Err(invalid(format!(
                    "primary key `{}` is not a column of `{}`",
                    table.primary_key, table.name
                )));
            }

            let mut seen = HashSet::new();
            for column in &table.columns {
                check_name(&column.name)?;
                if !seen.insert(column.name.as_str()) {
                    return Err(invalid(format!(
                        "`{}.{}` declared twice",
                        table.name, column.name
                    )));
                }
            }
            for relation in &table.relations {
                check_name(&relation.property)?;
                if !seen.insert(relation.property.as_str()) {
                    return Err(invalid(format!(
                        "`{}.{}` is declared as both column and relation, or twice",
                        table.name, relation.property
                    )));
                }
                if !self.tables.contains_key(&relation.target_table) {
                    return Err(invalid(format!(
                        "relation `{}.{}` targets unknown table `{}`",
                        table.name, relation.property, relation.target_table
                    )));
                }
                if let Some(key) = &relation.join_key {
                    check_name(key)?;
                }
                match (&relation.cardinality, &relation.junction) {
                    (Cardinality::ManyToMany, None) => {
                        return Err(invalid(format!(
                            "many-to-many relation `{}.{}` needs a junction",
                            table.name, relation.property
                        )));
                    }
                    (_, Some(junction)) => {
                        check_name(&junction.table)?;
                        check_name(&junction.source_key)?;
                        check_name(&junction.target_key)?;
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

fn check_name(name: &str) -> std::result::Result<(), CatalogError> {
    validate_name(name).map_err(|e| CatalogError::InvalidSchema(e.to_string()))
}

/// Shared handle to the current catalog.
///
/// Readers take an `Arc` snapshot that stays valid for the whole request;
/// a refresh swaps the catalog as a whole.
#[derive(Debug, Clone)]
pub struct CatalogHandle {
    current: Arc<RwLock<Arc<SchemaCatalog>>>,
}

impl CatalogHandle {
    pub fn new(catalog: SchemaCatalog) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(catalog))),
        }
    }

    pub fn snapshot(&self) -> Arc<SchemaCatalog> {
        self.current.read().clone()
    }

    pub fn replace(&self, catalog: SchemaCatalog) {
        let tables = catalog.len();
        *self.current.write() = Arc::new(catalog);
        info!(tables, "Schema catalog replaced");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::blog_catalog;
    use crate::catalog::{ColumnType, JunctionMeta};

    #[test]
    fn test_unknown_table() {
        let catalog = blog_catalog();
        assert_eq!(
            catalog.table("nope").unwrap_err(),
            CompileError::UnknownTable("nope".into())
        );
    }

    #[test]
    fn test_join_key_from_inverse() {
        let catalog = blog_catalog();
        let posts = catalog.table("posts").unwrap();
        let comments = posts.find_relation("comments").unwrap();
        assert_eq!(catalog.join_key(posts, comments).unwrap(), "post_id");
    }

    #[test]
    fn test_links_per_cardinality() {
        let catalog = blog_catalog();
        let posts = catalog.table("posts").unwrap();

        let author = posts.find_relation("author").unwrap();
        assert_eq!(
            catalog.link(posts, author).unwrap(),
            Link {
                table: "posts".into(),
                owner_key: "id".into(),
                related_key: "author_id".into(),
            }
        );

        let comments = posts.find_relation("comments").unwrap();
        assert_eq!(
            catalog.link(posts, comments).unwrap(),
            Link {
                table: "comments".into(),
                owner_key: "post_id".into(),
                related_key: "id".into(),
            }
        );

        let tags = posts.find_relation("tags").unwrap();
        assert_eq!(
            catalog.link(posts, tags).unwrap(),
            Link {
                table: "post_tags".into(),
                owner_key: "post_id".into(),
                related_key: "tag_id".into(),
            }
        );
    }

    #[test]
    fn test_missing_inverse() {
        let catalog = blog_catalog();
        let users = catalog.table("users").unwrap();
        let drafts = users.find_relation("drafts").unwrap();
        assert!(matches!(
            catalog.link(users, drafts),
            Err(CompileError::MissingInverseRelation { .. })
        ));
        assert!(matches!(
            catalog.join_key(users, drafts),
            Err(CompileError::MissingJoinKey { .. })
        ));
    }

    #[test]
    fn test_rejects_invalid_schema() {
        let bad_pk = TableMeta::new("a", "id").column("name", ColumnType::String);
        assert!(SchemaCatalog::new([bad_pk]).is_err());

        let bad_target = TableMeta::new("a", "id")
            .column("id", ColumnType::Integer)
            .relation(RelationMeta::belongs_to("b", "missing", "b_id"));
        assert!(SchemaCatalog::new([bad_target]).is_err());

        let clash = TableMeta::new("a", "id")
            .column("id", ColumnType::Integer)
            .column("parent", ColumnType::Integer)
            .relation(RelationMeta::belongs_to("parent", "a", "parent"));
        assert!(SchemaCatalog::new([clash]).is_err());

        let injected = TableMeta::new("a`; DROP", "id").column("id", ColumnType::Integer);
        assert!(SchemaCatalog::new([injected]).is_err());

        let junction = JunctionMeta {
            table: "a_a".into(),
            source_key: "a$id".into(),
            target_key: "other".into(),
        };
        let bad_junction = TableMeta::new("a", "id")
            .column("id", ColumnType::Integer)
            .relation(RelationMeta::many_to_many("links", "a", junction));
        assert!(SchemaCatalog::new([bad_junction]).is_err());
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "tables": [
                {"name": "users", "primaryKey": "id",
                 "columns": [{"name": "id", "type": "int"}, {"name": "email", "type": "varchar"}],
                 "relations": [{"property": "posts", "cardinality": "hasMany",
                                "targetTable": "posts", "inverseProperty": "author"}]},
                {"name": "posts", "primary_key": "id",
                 "columns": [{"name": "id", "type": "bigint"}, {"name": "author_id", "type": "bigint"}],
                 "relations": [{"property": "author", "cardinality": "belongs_to",
                                "target_table": "users", "join_key": "author_id"}]}
            ]
        }"#;
        let catalog = SchemaCatalog::from_json_str(json).unwrap();
        let users = catalog.table("users").unwrap();
        assert_eq!(users.find_column("id").unwrap().column_type, ColumnType::Integer);
        let posts = users.find_relation("posts").unwrap();
        assert_eq!(catalog.join_key(users, posts).unwrap(), "author_id");
    }

    #[test]
    fn test_handle_swaps_whole_catalog() {
        let handle = CatalogHandle::new(blog_catalog());
        let before = handle.snapshot();
        handle.replace(SchemaCatalog::default());
        assert!(handle.snapshot().is_empty());
        // earlier snapshots are unaffected by the swap
        assert!(before.table("posts").is_ok());
    }
}
