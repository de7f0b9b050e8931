use serde_json::{Map, Value};

use crate::error::{CompileError, Result};
use crate::sql::{AggregateFn, Expr, Predicate};

use super::filter::compile_with_purpose;
use super::resolver::Purpose;
use super::CompilationState;

/// One aggregate column of the aggregate statement.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateProjection {
    pub function: AggregateFn,
    /// Key under `meta.aggregate.<fn>`.
    pub key: String,
    /// Result-column label.
    pub label: String,
    pub expr: Expr,
}

impl AggregateProjection {
    pub fn function_name(&self) -> &'static str {
        match self.function {
            AggregateFn::Count => "count",
            AggregateFn::Sum => "sum",
            AggregateFn::Avg => "avg",
            AggregateFn::Min => "min",
            AggregateFn::Max => "max",
        }
    }
}

fn parse_function(name: &str) -> Result<AggregateFn> {
    match name.to_ascii_lowercase().as_str() {
        "count" => Ok(AggregateFn::Count),
        "sum" => Ok(AggregateFn::Sum),
        "avg" => Ok(AggregateFn::Avg),
        "min" => Ok(AggregateFn::Min),
        "max" => Ok(AggregateFn::Max),
        _ => Err(CompileError::InvalidAggregate(format!(
            "unknown function `{name}`"
        ))),
    }
}

struct Entry<'a> {
    field: String,
    condition: Option<&'a Value>,
    alias: Option<String>,
}

fn parse_entry<'a>(function: &str, value: &'a Value) -> Result<Entry<'a>> {
    match value {
        Value::String(field) => Ok(Entry {
            field: field.trim().to_string(),
            condition: None,
            alias: None,
        }),
        Value::Object(map) => {
            let field = match map.get("field") {
                Some(Value::String(field)) => field.trim().to_string(),
                None if function == "count" => "*".to_string(),
                _ => {
                    return Err(CompileError::InvalidAggregate(format!(
                        "`{function}` entry needs a `field`"
                    )))
                }
            };
            let alias = match map.get("alias") {
                Some(Value::String(alias)) => Some(alias.clone()),
                None | Some(Value::Null) => None,
                Some(other) => {
                    return Err(CompileError::InvalidAggregate(format!(
                        "alias must be a string, got {other}"
                    )))
                }
            };
            Ok(Entry {
                field,
                condition: map.get("condition").filter(|c| !c.is_null()),
                alias,
            })
        }
        other => Err(CompileError::InvalidAggregate(format!(
            "`{function}` expects a field path or an object, got {other}"
        ))),
    }
}

/// Compile the `aggregate` section of a request.
pub fn compile_aggregates(
    state: &mut CompilationState<'_>,
    section: &Map<String, Value>,
) -> Result<Vec<AggregateProjection>> {
    let mut projections = Vec::new();
    for (name, value) in section {
        let function = parse_function(name)?;
        let entries: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            single => vec![single],
        };

        for raw in entries {
            let entry = parse_entry(name, raw)?;
            let target = target_expr(state, function, name, &entry.field)?;

            let expr = match entry.condition {
                Some(condition) => {
                    let when = compile_with_purpose(state, condition, Purpose::Aggregate)?
                        .unwrap_or(Predicate::Constant(true));
                    Expr::aggregate(
                        AggregateFn::Sum,
                        Expr::Case {
                            when: Box::new(when),
                            then: Box::new(Expr::Literal(1)),
                            otherwise: Some(Box::new(Expr::Literal(0))),
                        },
                    )
                }
                None => target,
            };

            projections.push(AggregateProjection {
                function,
                key: entry.alias.unwrap_or(entry.field),
                label: format!("agg_{}", projections.len()),
                expr,
            });
        }
    }
    Ok(projections)
}

fn target_expr(
    state: &mut CompilationState<'_>,
    function: AggregateFn,
    name: &str,
    field: &str,
) -> Result<Expr> {
    if field == "*" {
        if function != AggregateFn::Count {
            return Err(CompileError::InvalidAggregate(format!(
                "`{name}` cannot be applied to `*`"
            )));
        }
        return Ok(Expr::CountAll);
    }

    let segments: Vec<&str> = field.split('.').collect();
    let Some((column, relation_path)) = segments.split_last() else {
        return Err(CompileError::InvalidAggregate("empty field".into()));
    };
    if segments.iter().any(|s| s.is_empty()) {
        return Err(CompileError::UnknownField {
            table: state.root.name.clone(),
            field: field.to_string(),
        });
    }
    let (alias, meta) = state.resolve(relation_path, Purpose::Aggregate)?;
    let meta_column = meta
        .find_column(column)
        .ok_or_else(|| CompileError::UnknownField {
            table: meta.name.clone(),
            field: column.to_string(),
        })?;
    let column_type = meta_column.column_type;
    if function != AggregateFn::Count && !(column_type.is_numeric() || column_type.is_temporal()) {
        return Err(CompileError::InvalidAggregateType {
            function: name.to_string(),
            field: field.to_string(),
            column_type: column_type.to_string(),
        });
    }
    Ok(Expr::aggregate(function, Expr::column(&alias, column)))
}

/// Shape the single aggregate row into `{fn: {key: value}}`.
pub fn shape_aggregates(projections: &[AggregateProjection], row: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    for projection in projections {
        let value = row.get(&projection.label).cloned().unwrap_or(Value::Null);
        let bucket = out
            .entry(projection.function_name())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(bucket) = bucket {
            bucket.insert(projection.key.clone(), value);
        }
    }
    out
}
