//! Reduce relation objects that carry nothing but their key to the key.

use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::compile::CompiledQuery;
use crate::request::RequestedFields;

pub struct Collapser<'a> {
    requested: &'a RequestedFields,
    /// Relation path -> primary-key column of its target.
    relations: HashMap<String, String>,
}

impl<'a> Collapser<'a> {
    pub fn new<I, P, K>(requested: &'a RequestedFields, relations: I) -> Self
    where
        I: IntoIterator<Item = (P, K)>,
        P: Into<String>,
        K: Into<String>,
    {
        Self {
            requested,
            relations: relations
                .into_iter()
                .map(|(p, k)| (p.into(), k.into()))
                .collect(),
        }
    }

    pub fn from_compiled(compiled: &'a CompiledQuery) -> Self {
        Self::new(&compiled.requested, compiled.relation_keys())
    }

    pub fn collapse_rows(&self, rows: Vec<Value>) -> Vec<Value> {
        rows.into_iter().map(|row| self.walk(row, "")).collect()
    }

    fn walk(&self, value: Value, path: &str) -> Value {
        let map = match value {
            Value::Object(map) => map,
            other => return other,
        };
        let mut out = Map::with_capacity(map.len());
        for (key, child) in map {
            let child_path = if path.is_empty() {
                key.clone()
            } else {
                format!("{path}.{key}")
            };
            let child = match self.relations.get(&child_path) {
                Some(pk) => self.relation(child, &child_path, pk),
                // plain column, JSON documents included
                None => child,
            };
            out.insert(key, child);
        }
        Value::Object(out)
    }

    fn relation(&self, value: Value, path: &str, pk: &str) -> Value {
        let keep = self.requested.contains(&format!("{path}.{pk}"))
            || self.requested.contains(&format!("{path}.*"));
        match value {
            Value::Object(_) => {
                let value = self.walk(value, path);
                if keep {
                    return value;
                }
                bare_key(&value, pk).unwrap_or(value)
            }
            Value::Array(items) => {
                let items: Vec<Value> = items.into_iter().map(|i| self.walk(i, path)).collect();
                if keep {
                    return Value::Array(items);
                }
                let keys: Option<Vec<Value>> = items.iter().map(|i| bare_key(i, pk)).collect();
                match keys {
                    Some(keys) if !items.is_empty() => Value::Array(keys),
                    _ => Value::Array(items),
                }
            }
            other => other,
        }
    }
}

/// `{pk: scalar}` and nothing else.
fn bare_key(value: &Value, pk: &str) -> Option<Value> {
    let map = value.as_object()?;
    if map.len() != 1 {
        return None;
    }
    match map.get(pk)? {
        Value::Object(_) | Value::Array(_) => None,
        scalar => Some(scalar.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn collapse(fields: &[&str], row: Value) -> Value {
        let requested = RequestedFields::new(fields.iter().copied());
        let collapser = Collapser::new(
            &requested,
            [("author", "id"), ("tags", "id"), ("comments", "id"), ("comments.author", "id")],
        );
        collapser.collapse_rows(vec![row]).remove(0)
    }

    #[test]
    fn test_to_one_collapses_to_key() {
        assert_eq!(
            collapse(&["name"], json!({"id": 1, "name": "x", "author": {"id": 7}})),
            json!({"id": 1, "name": "x", "author": 7})
        );
    }

    #[test]
    fn test_explicit_key_or_wildcard_keeps_object() {
        let row = json!({"id": 1, "author": {"id": 7}});
        assert_eq!(collapse(&["author.id"], row.clone()), row);
        assert_eq!(collapse(&["author.*"], row.clone()), row);
    }

    #[test]
    fn test_arrays_collapse_only_as_a_whole() {
        assert_eq!(
            collapse(&["tags"], json!({"id": 1, "tags": [{"id": 2}, {"id": 3}]})),
            json!({"id": 1, "tags": [2, 3]})
        );
        let mixed = json!({"id": 1, "tags": [{"id": 2}, {"id": 3, "label": "x"}]});
        assert_eq!(collapse(&["tags"], mixed.clone()), mixed);
        assert_eq!(collapse(&["tags"], json!({"tags": []})), json!({"tags": []}));
    }

    #[test]
    fn test_nested_relations_collapse_inside_kept_objects() {
        assert_eq!(
            collapse(
                &["comments.body", "comments.author"],
                json!({"id": 1, "comments": [{"id": 5, "body": "b", "author": {"id": 9}}]})
            ),
            json!({"id": 1, "comments": [{"id": 5, "body": "b", "author": 9}]})
        );
    }

    #[test]
    fn test_json_columns_and_nulls_untouched() {
        let row = json!({"id": 1, "metadata": {"id": 3}, "author": null});
        assert_eq!(collapse(&["metadata", "author"], row.clone()), row);
    }
}
