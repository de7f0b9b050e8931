//! Relation path resolution: one join per distinct path, reused on every
//! later reference.

use indexmap::IndexMap;

use crate::catalog::{Cardinality, JunctionMeta, TableMeta};
use crate::error::{CompileError, Result};
use crate::sql::helpers::{numbered_alias, path_alias, MAX_ALIAS_LEN, ROOT_ALIAS};
use crate::sql::{Expr, Predicate};

use super::CompilationState;

/// Why a join was registered. A join can serve several purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Select,
    Filter,
    Sort,
    Aggregate,
}

impl Purpose {
    fn bit(self) -> u8 {
        match self {
            Purpose::Select => 1,
            Purpose::Filter => 1 << 1,
            Purpose::Sort => 1 << 2,
            Purpose::Aggregate => 1 << 3,
        }
    }
}

/// One registered `LEFT JOIN`.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinEntry {
    /// Dotted relation path from the root.
    pub path: String,
    pub alias: String,
    pub parent_alias: String,
    pub property: String,
    pub cardinality: Cardinality,
    pub target_table: String,
    pub target_key: String,
    /// Primary key of the parent table.
    pub parent_key: String,
    /// Foreign key column; on the parent for `belongs_to`, on the target for `has_*`.
    pub join_key: Option<String>,
    pub junction: Option<JunctionMeta>,
    purposes: u8,
}

impl JoinEntry {
    pub fn is_to_many(&self) -> bool {
        matches!(self.cardinality, Cardinality::HasMany | Cardinality::ManyToMany)
    }

    pub fn serves(&self, purpose: Purpose) -> bool {
        self.purposes & purpose.bit() != 0
    }

    /// Alias of the junction table for many-to-many joins.
    pub fn junction_alias(&self) -> String {
        format!("j{}", self.alias)
    }

    /// `(table, alias, ON)` for every physical join this entry needs, in order.
    pub(crate) fn clauses(&self) -> Vec<(String, String, Predicate)> {
        let parent = |column: &str| Expr::column(&self.parent_alias, column);
        let target = |column: &str| Expr::column(&self.alias, column);
        let fk = self.join_key.as_deref().unwrap_or_default();
        match self.cardinality {
            Cardinality::BelongsTo => vec![(
                self.target_table.clone(),
                self.alias.clone(),
                Predicate::columns_eq(target(&self.target_key), parent(fk)),
            )],
            Cardinality::HasOne | Cardinality::HasMany => vec![(
                self.target_table.clone(),
                self.alias.clone(),
                Predicate::columns_eq(target(fk), parent(&self.parent_key)),
            )],
            Cardinality::ManyToMany => {
                let Some(junction) = &self.junction else {
                    return Vec::new();
                };
                let jalias = self.junction_alias();
                vec![
                    (
                        junction.table.clone(),
                        jalias.clone(),
                        Predicate::columns_eq(
                            Expr::column(&jalias, &junction.source_key),
                            parent(&self.parent_key),
                        ),
                    ),
                    (
                        self.target_table.clone(),
                        self.alias.clone(),
                        Predicate::columns_eq(
                            target(&self.target_key),
                            Expr::column(&jalias, &junction.target_key),
                        ),
                    ),
                ]
            }
        }
    }
}

/// Registered joins in registration order, keyed by dotted path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinSet {
    entries: IndexMap<String, JoinEntry>,
}

impl JoinSet {
    pub fn get(&self, path: &str) -> Option<&JoinEntry> {
        self.entries.get(path)
    }

    pub fn by_alias(&self, alias: &str) -> Option<&JoinEntry> {
        self.entries.values().find(|j| j.alias == alias)
    }

    pub fn iter(&self) -> impl Iterator<Item = &JoinEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Alias for a new join on `path`. Paths too long for MySQL, or whose
    /// alias is already taken, get a numbered alias instead.
    fn fresh_alias(&self, path: &str) -> String {
        let alias = path_alias(&path.split('.').collect::<Vec<_>>());
        if alias.len() <= MAX_ALIAS_LEN && self.by_alias(&alias).is_none() {
            return alias;
        }
        let mut n = self.entries.len();
        loop {
            let candidate = numbered_alias(n);
            if self.by_alias(&candidate).is_none() {
                return candidate;
            }
            n += 1;
        }
    }

    /// Any join that can multiply root rows.
    pub fn has_to_many(&self) -> bool {
        self.entries.values().any(JoinEntry::is_to_many)
    }

    /// Joins that serve any of `purposes`. Parents are registered before
    /// children and inherit their purposes, so the result is closed under
    /// ancestry.
    pub fn serving<'a>(&'a self, purposes: &'a [Purpose]) -> impl Iterator<Item = &'a JoinEntry> {
        self.entries
            .values()
            .filter(move |j| purposes.iter().any(|p| j.serves(*p)))
    }
}

impl<'c> CompilationState<'c> {
    /// Resolve a relation path from the root, registering missing joins.
    ///
    /// Returns the alias and metadata of the last table on the path. The
    /// empty path resolves to the root.
    pub fn resolve<S: AsRef<str>>(
        &mut self,
        path: &[S],
        purpose: Purpose,
    ) -> Result<(String, &'c TableMeta)> {
        let catalog = self.catalog;
        let mut meta = self.root;
        let mut alias = ROOT_ALIAS.to_string();
        let mut dotted = String::new();

        for segment in path {
            let property = segment.as_ref();
            let relation = meta
                .find_relation(property)
                .ok_or_else(|| CompileError::UnknownRelation {
                    table: meta.name.clone(),
                    property: property.to_string(),
                })?;
            let target = catalog.target(relation)?;

            if !dotted.is_empty() {
                dotted.push('.');
            }
            dotted.push_str(property);

            if let Some(entry) = self.joins.entries.get_mut(&dotted) {
                entry.purposes |= purpose.bit();
                alias = entry.alias.clone();
                meta = target;
                continue;
            }

            let join_key = match relation.cardinality {
                Cardinality::ManyToMany => None,
                _ => Some(catalog.join_key(meta, relation)?),
            };
            let child_alias = self.joins.fresh_alias(&dotted);
            let entry = JoinEntry {
                path: dotted.clone(),
                alias: child_alias.clone(),
                parent_alias: alias,
                property: property.to_string(),
                cardinality: relation.cardinality,
                target_table: target.name.clone(),
                target_key: target.primary_key.clone(),
                parent_key: meta.primary_key.clone(),
                join_key,
                junction: relation.junction.clone(),
                purposes: purpose.bit(),
            };
            tracing::trace!(path = %dotted, alias = %child_alias, ?purpose, "Registered join");
            self.joins.entries.insert(dotted.clone(), entry);
            self.select_column(&child_alias, &target.primary_key);

            alias = child_alias;
            meta = target;
        }
        Ok((alias, meta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::blog_catalog;
    use crate::compile::CompileOptions;

    #[test]
    fn test_resolve_reuses_joins() -> Result<()> {
        let catalog = blog_catalog();
        let options = CompileOptions::default();
        let mut state = CompilationState::new(&catalog, catalog.table("posts")?, &options);

        let (alias, meta) = state.resolve(&["author", "profile"], Purpose::Select)?;
        assert_eq!(alias, "self$author$profile");
        assert_eq!(meta.name, "profiles");

        let (again, _) = state.resolve(&["author"], Purpose::Filter)?;
        assert_eq!(again, "self$author");
        assert_eq!(state.joins.len(), 2);

        let author = state.joins.get("author").unwrap();
        assert!(author.serves(Purpose::Select));
        assert!(author.serves(Purpose::Filter));
        assert!(!author.serves(Purpose::Sort));
        assert_eq!(author.join_key.as_deref(), Some("author_id"));

        let profile = state.joins.get("author.profile").unwrap();
        assert_eq!(profile.parent_alias, "self$author");
        assert_eq!(profile.join_key.as_deref(), Some("user_id"));
        assert!(!profile.serves(Purpose::Filter));
        Ok(())
    }

    #[test]
    fn test_resolving_same_path_twice_adds_nothing() -> Result<()> {
        let catalog = blog_catalog();
        let options = CompileOptions::default();
        let mut state = CompilationState::new(&catalog, catalog.table("comments")?, &options);

        let (first, _) = state.resolve(&["post", "author"], Purpose::Select)?;
        let joins = state.joins.clone();
        let selected = state.select.len();

        let (second, meta) = state.resolve(&["post", "author"], Purpose::Select)?;
        assert_eq!(first, second);
        assert_eq!(meta.name, "users");
        assert_eq!(state.joins, joins);
        assert_eq!(state.joins.len(), 2);
        assert_eq!(state.select.len(), selected);

        state.resolve(&["post", "author"], Purpose::Sort)?;
        assert_eq!(state.joins.len(), 2);
        assert!(state.joins.get("post.author").unwrap().serves(Purpose::Sort));
        Ok(())
    }

    #[test]
    fn test_long_paths_fall_back_to_numbered_aliases() -> Result<()> {
        let catalog = blog_catalog();
        let options = CompileOptions::default();
        let mut state = CompilationState::new(&catalog, catalog.table("posts")?, &options);
        let path = [
            "author", "posts", "author", "posts", "author", "posts", "author", "posts", "author",
            "posts",
        ];

        let (alias, meta) = state.resolve(&path, Purpose::Select)?;
        assert_eq!(meta.name, "posts");
        assert_eq!(alias, "self$j9");
        assert!(state.joins.iter().all(|j| j.junction_alias().len() <= 64));
        assert_eq!(
            state.joins.get(&path[..9].join(".")).unwrap().alias,
            "self$author$posts$author$posts$author$posts$author$posts$author"
        );

        let (again, _) = state.resolve(&path, Purpose::Filter)?;
        assert_eq!(again, "self$j9");
        assert_eq!(state.joins.len(), 10);

        let mut deeper = path.to_vec();
        deeper.push("tags");
        let (child, _) = state.resolve(&deeper, Purpose::Select)?;
        assert_eq!(child, "self$j10");
        assert_eq!(state.joins.get(&deeper.join(".")).unwrap().parent_alias, "self$j9");
        Ok(())
    }

    #[test]
    fn test_resolve_selects_primary_keys() -> Result<()> {
        let catalog = blog_catalog();
        let options = CompileOptions::default();
        let mut state = CompilationState::new(&catalog, catalog.table("posts")?, &options);
        state.resolve(&["comments"], Purpose::Filter)?;
        assert!(state
            .select
            .contains(&("self$comments".to_string(), "id".to_string())));
        assert!(state.joins.has_to_many());
        Ok(())
    }

    #[test]
    fn test_resolve_errors() -> Result<()> {
        let catalog = blog_catalog();
        let options = CompileOptions::default();
        let mut state = CompilationState::new(&catalog, catalog.table("posts")?, &options);
        assert_eq!(
            state.resolve(&["writer"], Purpose::Select).unwrap_err(),
            CompileError::UnknownRelation {
                table: "posts".into(),
                property: "writer".into()
            }
        );

        let mut state = CompilationState::new(&catalog, catalog.table("users")?, &options);
        assert!(matches!(
            state.resolve(&["drafts"], Purpose::Select),
            Err(CompileError::MissingJoinKey { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_many_to_many_clauses() -> Result<()> {
        let catalog = blog_catalog();
        let options = CompileOptions::default();
        let mut state = CompilationState::new(&catalog, catalog.table("posts")?, &options);
        state.resolve(&["tags"], Purpose::Select)?;
        let clauses = state.joins.get("tags").unwrap().clauses();
        assert_eq!(clauses.len(), 2);
        assert_eq!(clauses[0].0, "post_tags");
        assert_eq!(clauses[0].1, "jself$tags");
        assert_eq!(clauses[1].0, "tags");
        assert_eq!(clauses[1].1, "self$tags");
        Ok(())
    }
}
