//! Typed SQL expressions and predicates.
//!
//! Values never end up in SQL text: they are bound positionally, either
//! through a key of the [`ParamMap`] or inline via [`Expr::Value`].

use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

use crate::error::{CompileError, Result};

use super::helpers::{quote_ident, validate_alias, validate_name};
use super::query::Query;

/// Named parameters collected during one compilation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamMap {
    values: IndexMap<String, Value>,
}

impl ParamMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under a fresh key derived from `name` and the running
    /// parameter count, and return the key.
    pub fn bind(&mut self, name: &str, value: Value) -> String {
        let key = format!("{name}_{}", self.values.len());
        self.values.insert(key.clone(), value);
        key
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    And,
    Or,
}

impl Combinator {
    fn as_sql(&self) -> &'static str {
        match self {
            Combinator::And => " AND ",
            Combinator::Or => " OR ",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFn {
    pub fn as_sql(&self) -> &'static str {
        match self {
            AggregateFn::Count => "COUNT",
            AggregateFn::Sum => "SUM",
            AggregateFn::Avg => "AVG",
            AggregateFn::Min => "MIN",
            AggregateFn::Max => "MAX",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `source`.`column`
    Column { source: Arc<str>, column: Arc<str> },
    /// Bound through the parameter map; arrays expand to a list.
    Param(String),
    /// Bound inline.
    Value(Value),
    /// Integer constant written into the SQL text.
    Literal(i64),
    /// Case- and accent-insensitive form used on both sides of `LIKE`.
    Normalize { expr: Box<Expr>, collation: Arc<str> },
    Aggregate {
        function: AggregateFn,
        distinct: bool,
        expr: Box<Expr>,
    },
    CountAll,
    /// `CASE WHEN .. THEN .. ELSE .. END`
    Case {
        when: Box<Predicate>,
        then: Box<Expr>,
        otherwise: Option<Box<Expr>>,
    },
}

impl Expr {
    pub fn column(source: &str, column: &str) -> Self {
        Expr::Column {
            source: Arc::from(source),
            column: Arc::from(column),
        }
    }

    pub fn aggregate(function: AggregateFn, expr: Expr) -> Self {
        Expr::Aggregate {
            function,
            distinct: false,
            expr: Box::new(expr),
        }
    }

    pub fn count_distinct(expr: Expr) -> Self {
        Expr::Aggregate {
            function: AggregateFn::Count,
            distinct: true,
            expr: Box::new(expr),
        }
    }

    pub fn normalize(expr: Expr, collation: &str) -> Self {
        Expr::Normalize {
            expr: Box::new(expr),
            collation: Arc::from(collation),
        }
    }

    pub(crate) fn render(&self, w: &mut SqlWriter<'_>) -> Result<()> {
        match self {
            Expr::Column { source, column } => {
                validate_alias(source)?;
                validate_name(column)?;
                w.push(&quote_ident(source));
                w.push(".");
                w.push(&quote_ident(column));
            }
            Expr::Param(key) => {
                let value = w.param(key)?;
                w.bind(value);
            }
            Expr::Value(value) => w.bind(value.clone()),
            Expr::Literal(n) => w.push(&n.to_string()),
            Expr::Normalize { expr, collation } => {
                validate_name(collation)?;
                w.push("LOWER(");
                expr.render(w)?;
                w.push(") COLLATE ");
                w.push(collation);
            }
            Expr::Aggregate {
                function,
                distinct,
                expr,
            } => {
                w.push(function.as_sql());
                w.push("(");
                if *distinct {
                    w.push("DISTINCT ");
                }
                expr.render(w)?;
                w.push(")");
            }
            Expr::CountAll => w.push("COUNT(*)"),
            Expr::Case {
                when,
                then,
                otherwise,
            } => {
                w.push("CASE WHEN ");
                when.render(w)?;
                w.push(" THEN ");
                then.render(w)?;
                if let Some(otherwise) = otherwise {
                    w.push(" ELSE ");
                    otherwise.render(w)?;
                }
                w.push(" END");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        left: Expr,
        op: CompareOp,
        right: Expr,
    },
    Like {
        expr: Expr,
        pattern: Expr,
    },
    /// `expr [NOT] IN (..)` where `list` is an array parameter or value.
    InList {
        expr: Expr,
        list: Expr,
        negated: bool,
    },
    Between {
        expr: Expr,
        from: Expr,
        to: Expr,
        negated: bool,
    },
    IsNull {
        expr: Expr,
        negated: bool,
    },
    InSubquery {
        expr: Expr,
        query: Box<Query>,
        negated: bool,
    },
    Exists {
        query: Box<Query>,
        negated: bool,
    },
    Not(Box<Predicate>),
    Group {
        combinator: Combinator,
        items: Vec<Predicate>,
    },
    Constant(bool),
}

impl Predicate {
    pub fn compare(left: Expr, op: CompareOp, right: Expr) -> Self {
        Predicate::Compare { left, op, right }
    }

    pub fn columns_eq(left: Expr, right: Expr) -> Self {
        Predicate::Compare {
            left,
            op: CompareOp::Eq,
            right,
        }
    }

    pub fn and(items: Vec<Predicate>) -> Self {
        Predicate::Group {
            combinator: Combinator::And,
            items,
        }
    }

    /// Wrap in `NOT (..)` when `negate` is set.
    pub fn negate_if(self, negate: bool) -> Self {
        if negate {
            Predicate::Not(Box::new(self))
        } else {
            self
        }
    }

    pub(crate) fn render(&self, w: &mut SqlWriter<'_>) -> Result<()> {
        match self {
            Predicate::Compare { left, op, right } => {
                left.render(w)?;
                w.push(" ");
                w.push(op.as_sql());
                w.push(" ");
                right.render(w)?;
            }
            Predicate::Like { expr, pattern } => {
                expr.render(w)?;
                w.push(" LIKE ");
                pattern.render(w)?;
            }
            Predicate::InList {
                expr,
                list,
                negated,
            } => {
                let values = w.list(list)?;
                if values.is_empty() {
                    // nothing is IN an empty list
                    w.push(if *negated { "1 = 1" } else { "1 = 0" });
                    return Ok(());
                }
                expr.render(w)?;
                w.push(if *negated { " NOT IN (" } else { " IN (" });
                for (i, value) in values.into_iter().enumerate() {
                    if i > 0 {
                        w.push(", ");
                    }
                    w.bind(value);
                }
                w.push(")");
            }
            Predicate::Between {
                expr,
                from,
                to,
                negated,
            } => {
                expr.render(w)?;
                w.push(if *negated { " NOT BETWEEN " } else { " BETWEEN " });
                from.render(w)?;
                w.push(" AND ");
                to.render(w)?;
            }
            Predicate::IsNull { expr, negated } => {
                expr.render(w)?;
                w.push(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            Predicate::InSubquery {
                expr,
                query,
                negated,
            } => {
                expr.render(w)?;
                w.push(if *negated { " NOT IN (" } else { " IN (" });
                query.render(w)?;
                w.push(")");
            }
            Predicate::Exists { query, negated } => {
                w.push(if *negated { "NOT EXISTS (" } else { "EXISTS (" });
                query.render(w)?;
                w.push(")");
            }
            Predicate::Not(inner) => {
                w.push("NOT (");
                inner.render(w)?;
                w.push(")");
            }
            Predicate::Group { combinator, items } => match items.as_slice() {
                [] => w.push("1 = 1"),
                [single] => single.render(w)?,
                items => {
                    w.push("(");
                    for (i, item) in items.iter().enumerate() {
                        if i > 0 {
                            w.push(combinator.as_sql());
                        }
                        item.render(w)?;
                    }
                    w.push(")");
                }
            },
            Predicate::Constant(true) => w.push("1 = 1"),
            Predicate::Constant(false) => w.push("1 = 0"),
        }
        Ok(())
    }
}

/// Accumulates SQL text and positional binds.
pub(crate) struct SqlWriter<'a> {
    params: &'a ParamMap,
    sql: String,
    binds: Vec<Value>,
}

impl<'a> SqlWriter<'a> {
    pub(crate) fn new(params: &'a ParamMap) -> Self {
        Self {
            params,
            sql: String::new(),
            binds: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    pub(crate) fn bind(&mut self, value: Value) {
        self.sql.push('?');
        self.binds.push(value);
    }

    fn param(&self, key: &str) -> Result<Value> {
        self.params
            .get(key)
            .cloned()
            .ok_or_else(|| CompileError::invalid_filter(key, "unbound parameter"))
    }

    fn list(&self, list: &Expr) -> Result<Vec<Value>> {
        let value = match list {
            Expr::Param(key) => self.param(key)?,
            Expr::Value(value) => value.clone(),
            other => {
                return Err(CompileError::invalid_filter(
                    "IN",
                    format!("list operand must be bound, got {other:?}"),
                ))
            }
        };
        Ok(match value {
            Value::Array(items) => items,
            single => vec![single],
        })
    }

    pub(crate) fn finish(self) -> (String, Vec<Value>) {
        (self.sql, self.binds)
    }
}
