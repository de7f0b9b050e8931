//! Wire shape of a find call and of its response.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// A list given either as an array or as one comma-separated string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StringList {
    One(String),
    Many(Vec<String>),
}

impl Default for StringList {
    fn default() -> Self {
        StringList::Many(Vec::new())
    }
}

impl StringList {
    /// Trimmed, non-empty entries.
    pub fn items(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            StringList::One(s) => s.split(',').collect(),
            StringList::Many(items) => items.iter().map(String::as_str).collect(),
        };
        raw.into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl<S: Into<String>> FromIterator<S> for StringList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        StringList::Many(iter.into_iter().map(Into::into).collect())
    }
}

/// A find call against one root table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindRequest {
    #[serde(alias = "table")]
    pub table_name: String,
    #[serde(default)]
    pub fields: StringList,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    /// Field paths, `-` prefix for descending.
    #[serde(default)]
    pub sort: StringList,
    /// Validated during compilation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<Value>,
    #[serde(default)]
    pub meta: StringList,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<Map<String, Value>>,
}

impl FindRequest {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            ..Default::default()
        }
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().collect();
        self
    }

    pub fn filter(mut self, filter: Value) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn sort<I, S>(mut self, sort: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sort = sort.into_iter().collect();
        self
    }

    pub fn page(mut self, page: u64) -> Self {
        self.page = Some(Value::from(page));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(Value::from(limit));
        self
    }

    pub fn meta<I, S>(mut self, meta: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.meta = meta.into_iter().collect();
        self
    }

    pub fn aggregate(mut self, aggregate: Map<String, Value>) -> Self {
        self.aggregate = Some(aggregate);
        self
    }
}

/// Field paths as requested, deduplicated in request order.
///
/// No fields at all means `*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestedFields {
    paths: IndexSet<String>,
}

impl RequestedFields {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut paths: IndexSet<String> = paths.into_iter().map(Into::into).collect();
        if paths.is_empty() {
            paths.insert("*".to_string());
        }
        Self { paths }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }
}

/// Which counters the caller asked for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetaRequest {
    pub filter_count: bool,
    pub total_count: bool,
}

impl MetaRequest {
    pub fn parse<S: AsRef<str>>(tokens: &[S]) -> Self {
        let mut meta = Self::default();
        for token in tokens {
            match token.as_ref() {
                "filterCount" | "filter_count" => meta.filter_count = true,
                "totalCount" | "total_count" => meta.total_count = true,
                "*" => {
                    meta.filter_count = true;
                    meta.total_count = true;
                }
                other => debug!(token = other, "Ignoring unknown meta token"),
            }
        }
        meta
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
    /// `{fn: {alias: value}}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<Map<String, Value>>,
}

impl ResponseMeta {
    pub fn is_empty(&self) -> bool {
        self.filter_count.is_none() && self.total_count.is_none() && self.aggregate.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindResponse {
    pub data: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_parse_request() {
        let request: FindRequest = serde_json::from_value(json!({
            "table": "posts",
            "fields": "title, author.name",
            "sort": ["-published_at"],
            "filter": {"views": {"_gt": 10}},
            "page": "2",
            "meta": "filterCount,totalCount",
        }))
        .unwrap();
        assert_eq!(request.table_name, "posts");
        assert_eq!(request.fields.items(), vec!["title", "author.name"]);
        assert_eq!(request.sort.items(), vec!["-published_at"]);
        assert_eq!(request.page, Some(json!("2")));
        assert_eq!(
            MetaRequest::parse(&request.meta.items()),
            MetaRequest {
                filter_count: true,
                total_count: true
            }
        );
    }

    #[test]
    fn test_builder_matches_wire_form() {
        let built = FindRequest::new("posts")
            .fields(["title"])
            .filter(json!({"id": 1}))
            .limit(5);
        let parsed: FindRequest = serde_json::from_value(json!({
            "tableName": "posts",
            "fields": ["title"],
            "filter": {"id": 1},
            "limit": 5,
        }))
        .unwrap();
        assert_eq!(built, parsed);
    }

    #[test]
    fn test_requested_fields() {
        let fields = RequestedFields::new(["title", "author.id", "title"]);
        assert_eq!(fields.iter().collect::<Vec<_>>(), vec!["title", "author.id"]);
        assert!(fields.contains("author.id"));
        assert!(RequestedFields::new(Vec::<String>::new()).contains("*"));
    }

    #[test]
    fn test_response_serialization() {
        let response = FindResponse {
            data: vec![json!({"id": 1})],
            meta: Some(ResponseMeta {
                filter_count: Some(1),
                ..Default::default()
            }),
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"data": [{"id": 1}], "meta": {"filterCount": 1}})
        );
        let bare = FindResponse {
            data: vec![],
            meta: None,
        };
        assert_eq!(serde_json::to_value(&bare).unwrap(), json!({"data": []}));
    }
}
