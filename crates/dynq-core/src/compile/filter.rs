//! Filter DSL to predicate tree.
//!
//! Objects are walked recursively; every key of one object contributes
//! conjunctive fragments. `and`/`or` arrays produce nested groups, `_not`
//! flips the polarity that is pushed down to the leaves.

use serde_json::{Map, Value};
use tracing::debug;

use crate::catalog::{RelationMeta, TableMeta};
use crate::error::{CompileError, Result};
use crate::helper::{parse_array, scalar_text, truthy};
use crate::sql::helpers::ROOT_ALIAS;
use crate::sql::{Combinator, CompareOp, Expr, Predicate, Query, Selector};

use super::operators::{self, like_pattern, OperatorKind, ID_SET_OPERATORS};
use super::resolver::Purpose;
use super::{is_scalar, CompilationState};

/// Compile a request filter. `None` when nothing constrains the rows.
pub fn compile_filter(state: &mut CompilationState<'_>, filter: &Value) -> Result<Option<Predicate>> {
    compile_with_purpose(state, filter, Purpose::Filter)
}

/// Compile a filter whose joins serve `purpose`, e.g. an aggregate condition.
pub(crate) fn compile_with_purpose(
    state: &mut CompilationState<'_>,
    filter: &Value,
    purpose: Purpose,
) -> Result<Option<Predicate>> {
    let scope = Scope {
        path: Vec::new(),
        alias: ROOT_ALIAS.to_string(),
        meta: state.root,
    };
    let mut compiler = FilterCompiler { state, purpose };
    let items = compiler.object(filter, &scope, false)?;
    Ok(group(Combinator::And, items))
}

fn group(combinator: Combinator, mut items: Vec<Predicate>) -> Option<Predicate> {
    match items.len() {
        0 => None,
        1 => items.pop(),
        _ => Some(Predicate::Group { combinator, items }),
    }
}

/// Table currently filtered and how it was reached.
struct Scope<'c> {
    path: Vec<String>,
    alias: String,
    meta: &'c TableMeta,
}

impl Scope<'_> {
    fn display(&self, key: &str) -> String {
        let mut parts: Vec<&str> = self.path.iter().map(String::as_str).collect();
        if !key.is_empty() {
            parts.push(key);
        }
        parts.join(".")
    }

    fn pk(&self) -> Expr {
        Expr::column(&self.alias, &self.meta.primary_key)
    }
}

struct FilterCompiler<'s, 'c> {
    state: &'s mut CompilationState<'c>,
    purpose: Purpose,
}

impl<'s, 'c> FilterCompiler<'s, 'c> {
    fn object(&mut self, filter: &Value, scope: &Scope<'c>, negate: bool) -> Result<Vec<Predicate>> {
        let map = filter.as_object().ok_or_else(|| {
            CompileError::invalid_filter(&scope.display(""), "expected an object")
        })?;

        let mut items = Vec::new();
        for (key, value) in map {
            match key.as_str() {
                "and" | "or" => {
                    let combinator = if key == "and" {
                        Combinator::And
                    } else {
                        Combinator::Or
                    };
                    let subs = value.as_array().ok_or_else(|| {
                        CompileError::invalid_filter(&scope.display(key), "expected an array")
                    })?;
                    let mut groups = Vec::with_capacity(subs.len());
                    for sub in subs {
                        if let Some(g) = group(Combinator::And, self.object(sub, scope, negate)?) {
                            groups.push(g);
                        }
                    }
                    items.extend(group(combinator, groups));
                }
                "_not" => items.extend(self.object(value, scope, !negate)?),
                _ => {
                    if let Some(relation) = scope.meta.find_relation(key) {
                        items.extend(self.relation(relation, value, scope, negate)?);
                    } else if scope.meta.find_column(key).is_some() {
                        items.extend(self.leaf(key, value, scope, negate)?);
                    } else {
                        debug!(
                            table = %scope.meta.name,
                            key = %key,
                            "Ignoring unknown filter key"
                        );
                    }
                }
            }
        }
        Ok(items)
    }

    fn relation(
        &mut self,
        relation: &'c RelationMeta,
        value: &Value,
        scope: &Scope<'c>,
        negate: bool,
    ) -> Result<Vec<Predicate>> {
        let property = relation.property.as_str();
        let map = value.as_object().ok_or_else(|| {
            CompileError::invalid_filter(&scope.display(property), "relation filter must be an object")
        })?;
        let target = self.state.catalog.target(relation)?;

        if let Some(count) = map.get("_count") {
            return self.count(relation, count, scope, negate);
        }
        if let Some(Value::Object(ops)) = map.get(&target.primary_key) {
            if !ops.is_empty() && ops.keys().all(|k| ID_SET_OPERATORS.contains(&k.as_str())) {
                return self.id_set(relation, ops, scope, negate);
            }
        }

        let mut path = scope.path.clone();
        path.push(property.to_string());
        let (alias, meta) = self.state.resolve(&path, self.purpose)?;
        let nested = Scope { path, alias, meta };
        self.object(value, &nested, negate)
    }

    /// `scope.pk [NOT] IN (SELECT owner FROM link GROUP BY owner HAVING COUNT(DISTINCT related) op ?)`
    fn count(
        &mut self,
        relation: &RelationMeta,
        count: &Value,
        scope: &Scope<'c>,
        negate: bool,
    ) -> Result<Vec<Predicate>> {
        let path = scope.display(&format!("{}._count", relation.property));
        let link = self.state.catalog.link(scope.meta, relation)?;
        let ops = count
            .as_object()
            .ok_or_else(|| CompileError::invalid_filter(&path, "expected an operator object"))?;

        let mut items = Vec::with_capacity(ops.len());
        for (token, operand) in ops {
            let op = match operators::lookup(token).map(|o| o.kind) {
                Some(OperatorKind::Compare(op)) => op,
                Some(_) => {
                    return Err(CompileError::invalid_filter(
                        &path,
                        format!("`{token}` is not a comparison"),
                    ))
                }
                None => {
                    return Err(CompileError::UnknownOperator {
                        path,
                        operator: token.clone(),
                    })
                }
            };
            if !operand.is_number() {
                return Err(CompileError::invalid_filter(&path, "count must be a number"));
            }
            let key = self
                .state
                .params
                .bind(&format!("{}_count", relation.property), operand.clone());
            let sq = self.state.subquery_alias();
            let owner = Expr::column(&sq, &link.owner_key);
            let related = Expr::column(&sq, &link.related_key);
            let query = Query::new(&link.table, &sq)
                .select([Selector::new(owner.clone())])
                .filter(not_null(owner.clone()))
                .group_by(owner)
                .having(Predicate::compare(
                    Expr::count_distinct(related),
                    op,
                    Expr::Param(key),
                ));
            items.push(Predicate::InSubquery {
                expr: scope.pk(),
                query: Box::new(query),
                negated: negate,
            });
        }
        Ok(items)
    }

    fn id_set(
        &mut self,
        relation: &RelationMeta,
        ops: &Map<String, Value>,
        scope: &Scope<'c>,
        negate: bool,
    ) -> Result<Vec<Predicate>> {
        let link = self.state.catalog.link(scope.meta, relation)?;
        let name = relation.property.as_str();
        let mut items = Vec::with_capacity(ops.len());

        for (token, operand) in ops {
            let path = scope.display(&format!("{name}.{token}"));
            let sq = self.state.subquery_alias();
            let owner = Expr::column(&sq, &link.owner_key);
            let related = Expr::column(&sq, &link.related_key);

            if token == "_eq_set" {
                items.push(self.eq_set(name, operand, &link.table, &sq, owner, related, scope, negate, &path)?);
                continue;
            }

            let (matcher, negated) = match token.as_str() {
                "_in" | "_nin" => {
                    let values = parse_array(operand)
                        .ok_or_else(|| CompileError::invalid_filter(&path, "expected a list"))?;
                    let key = self.state.params.bind(name, Value::Array(values));
                    let matcher = Predicate::InList {
                        expr: related,
                        list: Expr::Param(key),
                        negated: false,
                    };
                    (matcher, token == "_nin")
                }
                _ => {
                    if !is_scalar(operand) || operand.is_null() {
                        return Err(CompileError::invalid_filter(&path, "expected a scalar id"));
                    }
                    let key = self.state.params.bind(name, operand.clone());
                    let matcher = Predicate::compare(related, CompareOp::Eq, Expr::Param(key));
                    (matcher, token == "_neq")
                }
            };

            let query = Query::new(&link.table, &sq)
                .select([Selector::new(Expr::Literal(1))])
                .filter(Predicate::columns_eq(owner, scope.pk()))
                .filter(matcher);
            items.push(Predicate::Exists {
                query: Box::new(query),
                negated: negated ^ negate,
            });
        }
        Ok(items)
    }

    /// Related ids equal the given set exactly.
    #[allow(clippy::too_many_arguments)]
    fn eq_set(
        &mut self,
        name: &str,
        operand: &Value,
        table: &str,
        sq: &str,
        owner: Expr,
        related: Expr,
        scope: &Scope<'c>,
        negate: bool,
        path: &str,
    ) -> Result<Predicate> {
        let raw = parse_array(operand)
            .ok_or_else(|| CompileError::invalid_filter(path, "expected a list"))?;
        let mut values: Vec<Value> = Vec::with_capacity(raw.len());
        for value in raw {
            if !values.contains(&value) {
                values.push(value);
            }
        }

        let base = Query::new(table, sq)
            .select([Selector::new(owner.clone())])
            .filter(not_null(owner.clone()));

        if values.is_empty() {
            // no related rows at all
            let query = base.filter(not_null(related));
            return Ok(Predicate::InSubquery {
                expr: scope.pk(),
                query: Box::new(query),
                negated: !negate,
            });
        }

        let size = values.len();
        let set_key = self.state.params.bind(&format!("{name}_eq_set"), Value::Array(values));
        let size_key = self.state.params.bind(&format!("{name}_size"), Value::from(size));
        let matched_key = self.state.params.bind(&format!("{name}_matched"), Value::from(size));

        let matched = Expr::Case {
            when: Box::new(Predicate::InList {
                expr: related.clone(),
                list: Expr::Param(set_key),
                negated: false,
            }),
            then: Box::new(related.clone()),
            otherwise: None,
        };
        let query = base.group_by(owner).having(Predicate::and(vec![
            Predicate::compare(Expr::count_distinct(related), CompareOp::Eq, Expr::Param(size_key)),
            Predicate::compare(Expr::count_distinct(matched), CompareOp::Eq, Expr::Param(matched_key)),
        ]));
        Ok(Predicate::InSubquery {
            expr: scope.pk(),
            query: Box::new(query),
            negated: negate,
        })
    }

    fn leaf(&mut self, column: &str, value: &Value, scope: &Scope<'c>, negate: bool) -> Result<Vec<Predicate>> {
        let expr = Expr::column(&scope.alias, column);
        match value {
            Value::Object(ops) => {
                let mut items = Vec::with_capacity(ops.len());
                for (token, operand) in ops {
                    items.push(self.operator(expr.clone(), column, token, operand, scope, negate)?);
                }
                Ok(items)
            }
            Value::Null => Ok(vec![Predicate::IsNull {
                expr,
                negated: negate,
            }]),
            Value::Array(_) => {
                let key = self.state.params.bind(column, value.clone());
                Ok(vec![Predicate::InList {
                    expr,
                    list: Expr::Param(key),
                    negated: negate,
                }])
            }
            scalar => {
                let key = self.state.params.bind(column, scalar.clone());
                Ok(vec![
                    Predicate::compare(expr, CompareOp::Eq, Expr::Param(key)).negate_if(negate)
                ])
            }
        }
    }

    fn operator(
        &mut self,
        expr: Expr,
        column: &str,
        token: &str,
        operand: &Value,
        scope: &Scope<'c>,
        negate: bool,
    ) -> Result<Predicate> {
        let path = scope.display(&format!("{column}.{token}"));
        let op = operators::lookup(token).ok_or_else(|| CompileError::UnknownOperator {
            path: path.clone(),
            operator: token.to_string(),
        })?;

        let predicate = match op.kind {
            OperatorKind::Compare(cmp) => {
                if !is_scalar(operand) {
                    return Err(CompileError::invalid_filter(&path, "expected a scalar"));
                }
                let key = self.state.params.bind(column, operand.clone());
                Predicate::compare(expr, cmp, Expr::Param(key)).negate_if(negate)
            }
            OperatorKind::List { negated } => {
                let values = parse_array(operand)
                    .ok_or_else(|| CompileError::invalid_filter(&path, "expected a list"))?;
                let key = self.state.params.bind(column, Value::Array(values));
                Predicate::InList {
                    expr,
                    list: Expr::Param(key),
                    negated: negated ^ negate,
                }
            }
            OperatorKind::Pattern(kind) => {
                let text = scalar_text(operand)
                    .ok_or_else(|| CompileError::invalid_filter(&path, "expected text"))?;
                let key = self
                    .state
                    .params
                    .bind(column, Value::String(like_pattern(kind, &text)));
                let collation = self.state.options.accent_collation.as_str();
                Predicate::Like {
                    expr: Expr::normalize(expr, collation),
                    pattern: Expr::normalize(Expr::Param(key), collation),
                }
                .negate_if(negate)
            }
            OperatorKind::Range { negated } => {
                let bounds = parse_array(operand).unwrap_or_default();
                let [from, to] = <[Value; 2]>::try_from(bounds).map_err(|_| {
                    CompileError::invalid_filter(&path, "expected a two-element array")
                })?;
                let from = self.state.params.bind(&format!("{column}_from"), from);
                let to = self.state.params.bind(&format!("{column}_to"), to);
                Predicate::Between {
                    expr,
                    from: Expr::Param(from),
                    to: Expr::Param(to),
                    negated: negated ^ negate,
                }
            }
            OperatorKind::NullTest { negated } => {
                // `_is_null: false` asks for the opposite test
                let inverted = !truthy(operand);
                Predicate::IsNull {
                    expr,
                    negated: negated ^ inverted ^ negate,
                }
            }
        };
        Ok(predicate)
    }
}

fn not_null(expr: Expr) -> Predicate {
    Predicate::IsNull {
        expr,
        negated: true,
    }
}
