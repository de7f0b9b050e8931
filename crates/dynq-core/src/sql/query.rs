use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;

use super::expr::{Expr, ParamMap, Predicate, SqlWriter};
use super::helpers::{quote_ident, validate_alias, validate_name};
use super::selector::Selector;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: Arc<str>,
    pub alias: Arc<str>,
    pub on: Predicate,
}

/// A rendered statement: SQL text plus positional binds.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub binds: Vec<Value>,
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql)?;
        if !self.binds.is_empty() {
            let binds: Vec<String> = self.binds.iter().map(Value::to_string).collect();
            write!(f, " -- binds: [{}]", binds.join(", "))?;
        }
        Ok(())
    }
}

/// An assembled `SELECT` over one aliased base table.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    table: Arc<str>,
    alias: Arc<str>,
    select: Vec<Selector>,
    joins: Vec<Join>,
    filter: Option<Predicate>,
    group_by: Vec<Expr>,
    having: Option<Predicate>,
    order_by: Vec<(Expr, SortDirection)>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Query {
    /// Creates an empty query object for a specific table.
    pub fn new(table: &str, alias: &str) -> Self {
        Query {
            table: Arc::from(table),
            alias: Arc::from(alias),
            select: Vec::new(),
            joins: Vec::new(),
            filter: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn selectors(&self) -> &[Selector] {
        &self.select
    }

    pub fn select<I>(mut self, cols: I) -> Self
    where
        I: IntoIterator<Item = Selector>,
    {
        self.select.extend(cols);
        self
    }

    pub fn join(mut self, kind: JoinKind, table: &str, alias: &str, on: Predicate) -> Self {
        self.joins.push(Join {
            kind,
            table: Arc::from(table),
            alias: Arc::from(alias),
            on,
        });
        self
    }

    /// AND `predicate` into the WHERE clause.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filter = Some(match self.filter.take() {
            None => predicate,
            Some(Predicate::Group {
                combinator: super::expr::Combinator::And,
                mut items,
            }) => {
                items.push(predicate);
                Predicate::and(items)
            }
            Some(existing) => Predicate::and(vec![existing, predicate]),
        });
        self
    }

    pub fn group_by(mut self, expr: Expr) -> Self {
        self.group_by.push(expr);
        self
    }

    pub fn having(mut self, predicate: Predicate) -> Self {
        self.having = Some(predicate);
        self
    }

    pub fn order_by(mut self, expr: Expr, direction: SortDirection) -> Self {
        self.order_by.push((expr, direction));
        self
    }

    /// Limits the query to `count` rows.
    pub fn limit(mut self, count: u64) -> Self {
        self.limit = Some(count);
        self
    }

    /// Offsets the query by `count` rows.
    pub fn offset(mut self, count: u64) -> Self {
        self.offset = Some(count);
        self
    }

    pub fn to_statement(&self, params: &ParamMap) -> Result<Statement> {
        let mut w = SqlWriter::new(params);
        self.render(&mut w)?;
        let (sql, binds) = w.finish();
        Ok(Statement { sql, binds })
    }

    pub(crate) fn render(&self, w: &mut SqlWriter<'_>) -> Result<()> {
        validate_name(&self.table)?;
        validate_alias(&self.alias)?;

        // SELECT
        w.push("SELECT ");
        if self.select.is_empty() {
            // avoid ambiguity when joins exist
            w.push(&quote_ident(&self.alias));
            w.push(".*");
        } else {
            for (i, sel) in self.select.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                sel.render(w)?;
            }
        }
        w.push(" FROM ");
        w.push(&quote_ident(&self.table));
        w.push(" AS ");
        w.push(&quote_ident(&self.alias));

        // JOINs (must come before WHERE)
        for j in &self.joins {
            validate_name(&j.table)?;
            validate_alias(&j.alias)?;
            w.push(match j.kind {
                JoinKind::Inner => " INNER JOIN ",
                JoinKind::Left => " LEFT JOIN ",
            });
            w.push(&quote_ident(&j.table));
            w.push(" AS ");
            w.push(&quote_ident(&j.alias));
            w.push(" ON ");
            j.on.render(w)?;
        }

        if let Some(filter) = &self.filter {
            w.push(" WHERE ");
            filter.render(w)?;
        }

        if !self.group_by.is_empty() {
            w.push(" GROUP BY ");
            for (i, expr) in self.group_by.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                expr.render(w)?;
            }
        }

        if let Some(having) = &self.having {
            w.push(" HAVING ");
            having.render(w)?;
        }

        if !self.order_by.is_empty() {
            w.push(" ORDER BY ");
            for (i, (expr, direction)) in self.order_by.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                expr.render(w)?;
                w.push(" ");
                w.push(direction.as_sql());
            }
        }

        // MySQL only accepts OFFSET after a LIMIT
        match (self.limit, self.offset) {
            (Some(limit), offset) => {
                w.push(" LIMIT ");
                w.bind(Value::from(limit));
                if let Some(offset) = offset {
                    w.push(" OFFSET ");
                    w.bind(Value::from(offset));
                }
            }
            (None, Some(offset)) => {
                w.push(" LIMIT 18446744073709551615 OFFSET ");
                w.bind(Value::from(offset));
            }
            (None, None) => {}
        }

        Ok(())
    }
}
