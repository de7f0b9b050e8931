//! Requested field paths to select columns.

use tracing::debug;

use crate::catalog::TableMeta;
use crate::error::{CompileError, Result};
use crate::request::RequestedFields;
use crate::sql::helpers::ROOT_ALIAS;

use super::resolver::Purpose;
use super::CompilationState;

/// Add every requested field to the select list, registering joins for
/// relation paths on the way.
pub fn select_fields(state: &mut CompilationState<'_>, fields: &RequestedFields) -> Result<()> {
    for field in fields.iter() {
        select_field(state, field)?;
    }
    Ok(())
}

fn select_field(state: &mut CompilationState<'_>, field: &str) -> Result<()> {
    if field == "*" {
        let root = state.root;
        select_all_columns(state, ROOT_ALIAS, root);
        for relation in &root.relations {
            match state.resolve(&[relation.property.as_str()], Purpose::Select) {
                Ok(_) => {}
                Err(CompileError::MissingJoinKey { table, property }) => {
                    debug!(%table, %property, "Skipping unjoinable relation in wildcard");
                }
                Err(e) => return Err(e),
            }
        }
        return Ok(());
    }

    let segments: Vec<&str> = field.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(CompileError::UnknownField {
            table: state.root.name.clone(),
            field: field.to_string(),
        });
    }
    let (last, relation_path) = match segments.split_last() {
        Some(split) => split,
        None => return Ok(()),
    };

    let (alias, meta) = state.resolve(relation_path, Purpose::Select)?;
    if *last == "*" {
        let mut chain: Vec<String> = Vec::with_capacity(relation_path.len() + 1);
        chain.push(state.root.name.clone());
        let mut walk = state.root;
        for property in relation_path {
            if let Some(relation) = walk.find_relation(property) {
                walk = state.catalog.target(relation)?;
                chain.push(walk.name.clone());
            }
        }
        let path: Vec<String> = relation_path.iter().map(|s| s.to_string()).collect();
        return expand(state, &path, &alias, meta, &mut chain, 0);
    }

    if meta.find_column(last).is_some() {
        state.select_column(&alias, last);
    } else if meta.find_relation(last).is_some() {
        // a bare relation selects its primary key only
        state.resolve(&segments, Purpose::Select)?;
    } else {
        return Err(CompileError::UnknownField {
            table: meta.name.clone(),
            field: last.to_string(),
        });
    }
    Ok(())
}

fn select_all_columns(state: &mut CompilationState<'_>, alias: &str, meta: &TableMeta) {
    for column in &meta.columns {
        state.select_column(alias, &column.name);
    }
}

/// `rel.*`: every column of the target, then the same for each of its
/// relations, stopping at tables already on the chain and at the
/// configured depth.
fn expand<'c>(
    state: &mut CompilationState<'c>,
    path: &[String],
    alias: &str,
    meta: &'c TableMeta,
    chain: &mut Vec<String>,
    depth: usize,
) -> Result<()> {
    let catalog = state.catalog;
    select_all_columns(state, alias, meta);
    if depth >= state.options.max_expansion_depth {
        return Ok(());
    }
    for relation in &meta.relations {
        let target = catalog.target(relation)?;
        if chain.contains(&target.name) {
            continue;
        }
        let mut child_path = path.to_vec();
        child_path.push(relation.property.clone());
        let (child_alias, child_meta) = match state.resolve(&child_path, Purpose::Select) {
            Ok(resolved) => resolved,
            Err(CompileError::MissingJoinKey { table, property }) => {
                debug!(%table, %property, "Skipping unjoinable relation in wildcard");
                continue;
            }
            Err(e) => return Err(e),
        };

        chain.push(target.name.clone());
        expand(state, &child_path, &child_alias, child_meta, chain, depth + 1)?;
        chain.pop();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::blog_catalog;
    use crate::compile::CompileOptions;

    fn selected(root: &str, fields: &[&str]) -> Result<Vec<String>> {
        let catalog = blog_catalog();
        let options = CompileOptions::default();
        let mut state = CompilationState::new(&catalog, catalog.table(root)?, &options);
        select_fields(&mut state, &RequestedFields::new(fields.iter().copied()))?;
        Ok(state
            .select
            .iter()
            .map(|(alias, column)| format!("{alias}.{column}"))
            .collect())
    }

    #[test]
    fn test_scalar_and_relation_fields() -> Result<()> {
        assert_eq!(
            selected("posts", &["title", "author.name"])?,
            vec!["self.id", "self.title", "self$author.id", "self$author.name"]
        );
        Ok(())
    }

    #[test]
    fn test_bare_relation_selects_primary_key() -> Result<()> {
        assert_eq!(
            selected("posts", &["author"])?,
            vec!["self.id", "self$author.id"]
        );
        assert_eq!(
            selected("comments", &["post.author"])?,
            vec!["self.id", "self$post.id", "self$post$author.id"]
        );
        Ok(())
    }

    #[test]
    fn test_root_wildcard_goes_one_level() -> Result<()> {
        let columns = selected("comments", &["*"])?;
        assert_eq!(
            columns,
            vec![
                "self.id",
                "self.body",
                "self.approved",
                "self.post_id",
                "self.author_id",
                "self$post.id",
                "self$author.id",
            ]
        );
        Ok(())
    }

    #[test]
    fn test_relation_wildcard_expands_with_cycle_guard() -> Result<()> {
        let columns = selected("comments", &["post.*"])?;
        assert!(columns.contains(&"self$post.title".to_string()));
        assert!(columns.contains(&"self$post$author.email".to_string()));
        assert!(columns.contains(&"self$post$tags.label".to_string()));
        // comments are already on the chain
        assert!(!columns.iter().any(|c| c.starts_with("self$post$comments")));
        // users -> posts would revisit posts
        assert!(!columns.iter().any(|c| c.starts_with("self$post$author$posts")));
        Ok(())
    }

    #[test]
    fn test_expansion_depth_is_bounded() -> Result<()> {
        let catalog = blog_catalog();
        let options = CompileOptions {
            max_expansion_depth: 0,
            ..Default::default()
        };
        let mut state = CompilationState::new(&catalog, catalog.table("comments")?, &options);
        select_fields(&mut state, &RequestedFields::new(["post.*"]))?;
        assert_eq!(state.joins.len(), 1);
        Ok(())
    }

    #[test]
    fn test_wildcard_skips_unjoinable_relations() -> Result<()> {
        assert_eq!(
            selected("users", &["*"])?,
            vec![
                "self.id",
                "self.name",
                "self.email",
                "self.created_at",
                "self$posts.id",
                "self$profile.id",
            ]
        );
        assert!(selected("users", &["drafts.title"]).is_err());
        Ok(())
    }

    #[test]
    fn test_unknown_fields() {
        assert_eq!(
            selected("posts", &["nope"]).unwrap_err(),
            CompileError::UnknownField {
                table: "posts".into(),
                field: "nope".into()
            }
        );
        assert_eq!(
            selected("posts", &["author.nope"]).unwrap_err(),
            CompileError::UnknownField {
                table: "users".into(),
                field: "nope".into()
            }
        );
        assert!(matches!(
            selected("posts", &["writer.name"]),
            Err(CompileError::UnknownRelation { .. })
        ));
        assert!(selected("posts", &["author..name"]).is_err());
    }
}
