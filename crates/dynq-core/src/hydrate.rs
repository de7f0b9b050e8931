//! Flat labelled rows to nested entity objects.

use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::compile::{CompiledQuery, JoinEntry};
use crate::sql::helpers::{label, ROOT_ALIAS};

/// One result row, keyed by `alias.column` labels.
pub type Row = Map<String, Value>;

#[derive(Debug, Default)]
struct Node {
    fields: Map<String, Value>,
    children: IndexMap<String, Child>,
}

#[derive(Debug)]
enum Child {
    One(Option<Node>),
    Many(IndexMap<String, Node>),
}

impl Node {
    fn into_value(self) -> Value {
        let mut object = self.fields;
        for (property, child) in self.children {
            let value = match child {
                Child::One(node) => node.map(Node::into_value).unwrap_or(Value::Null),
                Child::Many(nodes) => Value::Array(nodes.into_values().map(Node::into_value).collect()),
            };
            object.insert(property, value);
        }
        Value::Object(object)
    }
}

/// Column and child-join layout per alias, derived once per query.
struct Layout<'q> {
    columns: HashMap<&'q str, Vec<(&'q str, String)>>,
    children: HashMap<&'q str, Vec<&'q JoinEntry>>,
}

impl<'q> Layout<'q> {
    fn new(compiled: &'q CompiledQuery) -> Self {
        let mut columns: HashMap<&str, Vec<(&str, String)>> = HashMap::new();
        for (alias, column) in &compiled.select {
            columns
                .entry(alias.as_str())
                .or_default()
                .push((column.as_str(), label(alias, column)));
        }
        let mut children: HashMap<&str, Vec<&JoinEntry>> = HashMap::new();
        for join in compiled.joins.iter() {
            children.entry(join.parent_alias.as_str()).or_default().push(join);
        }
        Self { columns, children }
    }

    fn absorb(&self, node: &mut Node, alias: &str, row: &Row) {
        if let Some(columns) = self.columns.get(alias) {
            for (column, label) in columns {
                if let Some(value) = row.get(label) {
                    node.fields.insert(column.to_string(), value.clone());
                }
            }
        }

        let Some(children) = self.children.get(alias) else {
            return;
        };
        for join in children {
            let slot = node
                .children
                .entry(join.property.clone())
                .or_insert_with(|| {
                    if join.is_to_many() {
                        Child::Many(IndexMap::new())
                    } else {
                        Child::One(None)
                    }
                });
            let key = match row.get(&label(&join.alias, &join.target_key)) {
                None | Some(Value::Null) => continue,
                Some(key) => key.to_string(),
            };
            match slot {
                Child::One(existing) => {
                    let child = existing.get_or_insert_with(Node::default);
                    self.absorb(child, &join.alias, row);
                }
                Child::Many(nodes) => {
                    let child = nodes.entry(key).or_default();
                    self.absorb(child, &join.alias, row);
                }
            }
        }
    }
}

/// Group rows by root key, in first-appearance order, nesting joined rows
/// under their relation property. To-one relations become an object or
/// `null`; to-many relations an array deduplicated by primary key.
pub fn hydrate(compiled: &CompiledQuery, rows: &[Row]) -> Vec<Value> {
    let layout = Layout::new(compiled);
    let root_label = compiled.root_key_label();
    let mut roots: IndexMap<String, Node> = IndexMap::new();

    for row in rows {
        let key = match row.get(&root_label) {
            None | Some(Value::Null) => continue,
            Some(key) => key.to_string(),
        };
        let node = roots.entry(key).or_default();
        layout.absorb(node, ROOT_ALIAS, row);
    }
    roots.into_values().map(Node::into_value).collect()
}

/// Root keys in row order, without duplicates.
pub fn root_keys(compiled: &CompiledQuery, rows: &[Row]) -> Vec<Value> {
    let root_label = compiled.root_key_label();
    let mut seen = std::collections::HashSet::new();
    rows.iter()
        .filter_map(|row| row.get(&root_label))
        .filter(|key| !key.is_null() && seen.insert(key.to_string()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::blog_catalog;
    use crate::compile::{compile, CompileOptions};
    use crate::request::FindRequest;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn compiled(fields: &[&str]) -> CompiledQuery {
        let request = FindRequest::new("posts").fields(fields.iter().copied());
        compile(&blog_catalog(), &request, &CompileOptions::default()).unwrap()
    }

    fn rows(value: Value) -> Vec<Row> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r.as_object().unwrap().clone())
            .collect()
    }

    #[test]
    fn test_nests_and_dedupes() {
        let q = compiled(&["title", "author.name", "comments.body"]);
        let data = rows(json!([
            {"self.id": 2, "self.title": "b", "self$author.id": 7, "self$author.name": "ann",
             "self$comments.id": 10, "self$comments.body": "x"},
            {"self.id": 1, "self.title": "a", "self$author.id": null, "self$author.name": null,
             "self$comments.id": null, "self$comments.body": null},
            {"self.id": 2, "self.title": "b", "self$author.id": 7, "self$author.name": "ann",
             "self$comments.id": 11, "self$comments.body": "y"},
            {"self.id": 2, "self.title": "b", "self$author.id": 7, "self$author.name": "ann",
             "self$comments.id": 10, "self$comments.body": "x"},
        ]));
        assert_eq!(
            hydrate(&q, &data),
            vec![
                json!({"id": 2, "title": "b", "author": {"id": 7, "name": "ann"},
                       "comments": [{"id": 10, "body": "x"}, {"id": 11, "body": "y"}]}),
                json!({"id": 1, "title": "a", "author": null, "comments": []}),
            ]
        );
        assert_eq!(root_keys(&q, &data), vec![json!(2), json!(1)]);
    }

    #[test]
    fn test_nested_relations() {
        let q = compiled(&["comments.author.name"]);
        let data = rows(json!([
            {"self.id": 1, "self$comments.id": 5, "self$comments$author.id": 3,
             "self$comments$author.name": "bo"},
            {"self.id": 1, "self$comments.id": 6, "self$comments$author.id": null,
             "self$comments$author.name": null},
        ]));
        assert_eq!(
            hydrate(&q, &data),
            vec![json!({"id": 1, "comments": [
                {"id": 5, "author": {"id": 3, "name": "bo"}},
                {"id": 6, "author": null},
            ]})]
        );
    }
}
