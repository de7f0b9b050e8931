use serde_json::Value;

use crate::error::{CompileError, Result};
use crate::sql::helpers::ROOT_ALIAS;
use crate::sql::SortDirection;

use super::resolver::Purpose;
use super::{CompilationState, CompileOptions};

/// One `ORDER BY` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
    pub alias: String,
    pub column: String,
    pub direction: SortDirection,
}

impl OrderTerm {
    pub fn is_root(&self) -> bool {
        self.alias == ROOT_ALIAS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
}

impl Pagination {
    pub fn skip(&self) -> u64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

/// Compile sort paths; the root primary key always ends the list.
pub fn compile_sort<S: AsRef<str>>(state: &mut CompilationState<'_>, sort: &[S]) -> Result<Vec<OrderTerm>> {
    let mut terms: Vec<OrderTerm> = Vec::with_capacity(sort.len() + 1);
    for raw in sort {
        let raw = raw.as_ref().trim();
        let (direction, path) = if let Some(rest) = raw.strip_prefix('-') {
            (SortDirection::Desc, rest)
        } else if let Some(rest) = raw.strip_prefix('+') {
            (SortDirection::Asc, rest)
        } else {
            (SortDirection::Asc, raw)
        };

        let segments: Vec<&str> = path.split('.').collect();
        let Some((column, relation_path)) = segments.split_last() else {
            continue;
        };
        if segments.iter().any(|s| s.is_empty()) {
            return Err(CompileError::UnknownField {
                table: state.root.name.clone(),
                field: path.to_string(),
            });
        }

        let (alias, meta) = state.resolve(relation_path, Purpose::Sort)?;
        if meta.find_column(column).is_none() {
            return Err(CompileError::UnknownField {
                table: meta.name.clone(),
                field: column.to_string(),
            });
        }
        if terms.iter().any(|t| t.alias == alias && t.column == *column) {
            continue;
        }
        terms.push(OrderTerm {
            alias,
            column: column.to_string(),
            direction,
        });
    }

    let pk = &state.root.primary_key;
    if !terms.iter().any(|t| t.is_root() && &t.column == pk) {
        terms.push(OrderTerm {
            alias: ROOT_ALIAS.to_string(),
            column: pk.clone(),
            direction: SortDirection::Asc,
        });
    }
    Ok(terms)
}

pub fn compile_pagination(
    page: Option<&Value>,
    limit: Option<&Value>,
    options: &CompileOptions,
) -> Result<Pagination> {
    let page = match page {
        Some(value) => positive_integer("page", value)?,
        None => 1,
    };
    let limit = match limit {
        Some(value) => positive_integer("limit", value)?,
        None => options.default_limit,
    };
    if limit > options.max_limit {
        return Err(CompileError::InvalidPagination(format!(
            "limit {limit} exceeds the maximum of {}",
            options.max_limit
        )));
    }
    Ok(Pagination { page, limit })
}

fn positive_integer(name: &str, value: &Value) -> Result<u64> {
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    match parsed {
        Some(n) if n > 0 => Ok(n),
        _ => Err(CompileError::InvalidPagination(format!(
            "{name} must be a positive integer, got {value}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::blog_catalog;
    use serde_json::json;

    fn sort(root: &str, items: &[&str]) -> Result<Vec<String>> {
        let catalog = blog_catalog();
        let options = CompileOptions::default();
        let mut state = CompilationState::new(&catalog, catalog.table(root)?, &options);
        Ok(compile_sort(&mut state, items)?
            .into_iter()
            .map(|t| {
                let dir = match t.direction {
                    SortDirection::Asc => "asc",
                    SortDirection::Desc => "desc",
                };
                format!("{}.{} {dir}", t.alias, t.column)
            })
            .collect())
    }

    #[test]
    fn test_sort_terms() -> Result<()> {
        assert_eq!(
            sort("posts", &["-published_at", "+author.name", "title"])?,
            vec![
                "self.published_at desc",
                "self$author.name asc",
                "self.title asc",
                "self.id asc",
            ]
        );
        Ok(())
    }

    #[test]
    fn test_primary_key_not_duplicated() -> Result<()> {
        assert_eq!(sort("posts", &["-id"])?, vec!["self.id desc"]);
        assert_eq!(sort("posts", &[])?, vec!["self.id asc"]);
        Ok(())
    }

    #[test]
    fn test_unknown_sort_column() {
        assert_eq!(
            sort("posts", &["author.nope"]).unwrap_err(),
            CompileError::UnknownField {
                table: "users".into(),
                field: "nope".into()
            }
        );
    }

    #[test]
    fn test_pagination() -> Result<()> {
        let options = CompileOptions::default();
        let p = compile_pagination(Some(&json!(2)), Some(&json!("10")), &options)?;
        assert_eq!(p, Pagination { page: 2, limit: 10 });
        assert_eq!(p.skip(), 10);
        assert_eq!(compile_pagination(None, None, &options)?.skip(), 0);
        Ok(())
    }

    #[test]
    fn test_invalid_pagination() {
        let options = CompileOptions::default();
        for (page, limit) in [
            (json!(0), json!(10)),
            (json!(-1), json!(10)),
            (json!(1.5), json!(10)),
            (json!("x"), json!(10)),
            (json!(1), json!(0)),
            (json!(1), json!(1001)),
            (json!(1), json!(null)),
        ] {
            assert!(
                matches!(
                    compile_pagination(Some(&page), Some(&limit), &options),
                    Err(CompileError::InvalidPagination(_))
                ),
                "page={page} limit={limit}"
            );
        }
    }
}
