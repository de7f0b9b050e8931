//! Statement assembly for a compiled query.
//!
//! When a to-many join can multiply root rows, paging runs in two phases:
//! a page statement picks the root keys, then the data statement loads
//! every joined row of those roots.

use serde_json::Value;

use crate::error::Result;
use crate::sql::helpers::{label, ROOT_ALIAS};
use crate::sql::{AggregateFn, Expr, JoinKind, Predicate, Query, Selector, SortDirection, Statement};

use super::resolver::{JoinEntry, Purpose};
use super::CompiledQuery;

/// Label of the count column in count statements.
pub const COUNT_LABEL: &str = "count";

impl CompiledQuery {
    /// Whether paging needs a separate page statement.
    pub fn is_two_phase(&self) -> bool {
        self.joins.has_to_many()
    }

    /// Label under which the root primary key is read back.
    pub fn root_key_label(&self) -> String {
        label(ROOT_ALIAS, &self.primary_key)
    }

    fn root_key(&self) -> Expr {
        Expr::column(ROOT_ALIAS, &self.primary_key)
    }

    fn base<'a>(&self, joins: impl Iterator<Item = &'a JoinEntry>) -> Query {
        let mut query = Query::new(&self.table, ROOT_ALIAS);
        for join in joins {
            for (table, alias, on) in join.clauses() {
                query = query.join(JoinKind::Left, &table, &alias, on);
            }
        }
        query
    }

    fn filtered(&self, query: Query) -> Query {
        match &self.predicate {
            Some(predicate) => query.filter(predicate.clone()),
            None => query,
        }
    }

    /// Root keys of the requested page, `None` for single-phase queries.
    pub fn page_statement(&self) -> Result<Option<Statement>> {
        if !self.is_two_phase() {
            return Ok(None);
        }
        let mut query = self
            .base(self.joins.serving(&[Purpose::Filter, Purpose::Sort]))
            .select([Selector::new(self.root_key()).set_alias(&self.root_key_label())]);
        query = self.filtered(query).group_by(self.root_key());
        for term in &self.order_by {
            let column = Expr::column(&term.alias, &term.column);
            // one value per root row
            let expr = match (term.is_root(), term.direction) {
                (true, _) => column,
                (false, SortDirection::Asc) => Expr::aggregate(AggregateFn::Min, column),
                (false, SortDirection::Desc) => Expr::aggregate(AggregateFn::Max, column),
            };
            query = query.order_by(expr, term.direction);
        }
        let query = query
            .limit(self.pagination.limit)
            .offset(self.pagination.skip());
        query.to_statement(&self.params).map(Some)
    }

    /// The row-loading statement.
    ///
    /// For two-phase queries it is restricted to `page_ids`; without ids it
    /// renders a single placeholder.
    pub fn data_statement(&self, page_ids: Option<&[Value]>) -> Result<Statement> {
        let selectors = self
            .select
            .iter()
            .map(|(alias, column)| Selector::column(alias, column).set_alias(&label(alias, column)));
        let mut query = self.filtered(self.base(self.joins.iter()).select(selectors));

        for term in &self.order_by {
            query = query.order_by(Expr::column(&term.alias, &term.column), term.direction);
        }

        if self.is_two_phase() {
            let ids = match page_ids {
                Some(ids) => Value::Array(ids.to_vec()),
                None => Value::Array(vec![Value::Null]),
            };
            query = query.filter(Predicate::InList {
                expr: self.root_key(),
                list: Expr::Value(ids),
                negated: false,
            });
            // stable order inside nested arrays
            for join in self.joins.iter().filter(|j| j.is_to_many()) {
                query = query.order_by(Expr::column(&join.alias, &join.target_key), SortDirection::Asc);
            }
        } else {
            query = query
                .limit(self.pagination.limit)
                .offset(self.pagination.skip());
        }
        query.to_statement(&self.params)
    }

    /// Distinct root rows matching the filter, ignoring pagination.
    pub fn filter_count_statement(&self) -> Result<Option<Statement>> {
        if !self.meta.filter_count {
            return Ok(None);
        }
        let query = self
            .base(self.joins.serving(&[Purpose::Filter]))
            .select([Selector::new(Expr::count_distinct(self.root_key())).set_alias(COUNT_LABEL)]);
        self.filtered(query).to_statement(&self.params).map(Some)
    }

    /// All rows of the root table.
    pub fn total_count_statement(&self) -> Result<Option<Statement>> {
        if !self.meta.total_count {
            return Ok(None);
        }
        Query::new(&self.table, ROOT_ALIAS)
            .select([Selector::new(Expr::CountAll).set_alias(COUNT_LABEL)])
            .to_statement(&self.params)
            .map(Some)
    }

    /// Aggregates over the filtered rows.
    ///
    /// A to-many filter join would repeat root rows, so the filter then runs
    /// as `pk IN (matching root keys)` and only aggregate joins stay outside.
    pub fn aggregate_statement(&self) -> Result<Option<Statement>> {
        if self.aggregates.is_empty() {
            return Ok(None);
        }
        let selectors = self
            .aggregates
            .iter()
            .map(|a| Selector::new(a.expr.clone()).set_alias(&a.label));

        let filter_fans_out = self.joins.serving(&[Purpose::Filter]).any(JoinEntry::is_to_many);
        let query = match &self.predicate {
            Some(predicate) if filter_fans_out => {
                let matching = self
                    .base(self.joins.serving(&[Purpose::Filter]))
                    .select([Selector::new(self.root_key())])
                    .filter(predicate.clone());
                self.base(self.joins.serving(&[Purpose::Aggregate]))
                    .select(selectors)
                    .filter(Predicate::InSubquery {
                        expr: self.root_key(),
                        query: Box::new(matching),
                        negated: false,
                    })
            }
            _ => self.filtered(
                self.base(self.joins.serving(&[Purpose::Filter, Purpose::Aggregate]))
                    .select(selectors),
            ),
        };
        query.to_statement(&self.params).map(Some)
    }

    /// Every statement a find call would run, in execution order.
    pub fn statements(&self) -> Result<Vec<Statement>> {
        let mut statements = Vec::new();
        statements.extend(self.page_statement()?);
        statements.push(self.data_statement(None)?);
        statements.extend(self.filter_count_statement()?);
        statements.extend(self.total_count_statement()?);
        statements.extend(self.aggregate_statement()?);
        Ok(statements)
    }
}
