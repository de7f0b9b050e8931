//! Runs compiled find requests and builds the `{data, meta}` envelope.

use async_trait::async_trait;
use dynq_core::compile::{shape_aggregates, COUNT_LABEL};
use dynq_core::hydrate::root_keys;
use dynq_core::{
    hydrate, CatalogHandle, Collapser, CompileOptions, CompiledQuery, FindRequest, FindResponse,
    ResponseMeta, Row, Statement,
};
use dynq_shared::{PerfTimer, QueryConfig, QueryMetrics};
use serde_json::{Map, Value};
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use crate::error::{DynqError, Result};

/// Executes one rendered statement and returns its rows keyed by label.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueryRunner: Send + Sync {
    async fn fetch_all(&self, statement: &Statement) -> anyhow::Result<Vec<Row>>;
}

/// Compile options from the `query` config section.
pub fn compile_options(config: &QueryConfig) -> CompileOptions {
    CompileOptions {
        default_limit: config.default_limit,
        max_limit: config.max_limit,
        max_expansion_depth: config.max_expansion_depth,
        accent_collation: config.accent_collation.clone(),
    }
}

pub struct Executor<R> {
    runner: R,
    catalog: CatalogHandle,
    options: CompileOptions,
    statement_timeout: Option<Duration>,
}

impl<R: QueryRunner> Executor<R> {
    pub fn new(runner: R, catalog: CatalogHandle, options: CompileOptions) -> Self {
        Self {
            runner,
            catalog,
            options,
            statement_timeout: None,
        }
    }

    /// Bound every statement by `timeout`; `None` waits indefinitely.
    pub fn with_statement_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.statement_timeout = timeout;
        self
    }

    /// Compile against the current catalog snapshot.
    pub fn compile(&self, request: &FindRequest) -> Result<CompiledQuery> {
        let start = Instant::now();
        let catalog = self.catalog.snapshot();
        match dynq_core::compile(&catalog, request, &self.options) {
            Ok(compiled) => {
                QueryMetrics::compiled(&request.table_name, start.elapsed());
                Ok(compiled)
            }
            Err(e) => {
                warn!(table = %request.table_name, error = %e, "Rejected find request");
                QueryMetrics::compile_failed(&request.table_name, e.kind());
                Err(e.into())
            }
        }
    }

    /// Statements a find call would run, without running them.
    #[instrument(skip(self, request), fields(table = %request.table_name))]
    pub fn explain(&self, request: &FindRequest) -> Result<Vec<Statement>> {
        Ok(self.compile(request)?.statements()?)
    }

    #[instrument(skip(self, request), fields(table = %request.table_name))]
    pub async fn find(&self, request: &FindRequest) -> Result<FindResponse> {
        let _timer =
            PerfTimer::new("dynq_find_duration_seconds").with_label("table", &request.table_name);
        let compiled = self.compile(request)?;

        // render up front so nothing runs when a statement cannot be built
        let page = compiled.page_statement()?;
        let data = match page {
            Some(_) => None,
            None => Some(compiled.data_statement(None)?),
        };
        let filter_count = compiled.filter_count_statement()?;
        let total_count = compiled.total_count_statement()?;
        let aggregate = compiled.aggregate_statement()?;

        let (rows, filter_count, total_count, aggregate) = tokio::try_join!(
            self.load_rows(&compiled, page, data),
            self.count("filter_count", &compiled.table, filter_count.as_ref()),
            self.count("total_count", &compiled.table, total_count.as_ref()),
            self.aggregate(&compiled, aggregate.as_ref()),
        )?;

        let data = Collapser::from_compiled(&compiled).collapse_rows(hydrate(&compiled, &rows));
        QueryMetrics::rows_returned(&compiled.table, data.len());
        debug!(rows = rows.len(), entities = data.len(), "Find completed");

        let meta = ResponseMeta {
            filter_count,
            total_count,
            aggregate,
        };
        Ok(FindResponse {
            data,
            meta: (!meta.is_empty()).then_some(meta),
        })
    }

    async fn load_rows(
        &self,
        compiled: &CompiledQuery,
        page: Option<Statement>,
        data: Option<Statement>,
    ) -> Result<Vec<Row>> {
        if let Some(data) = data {
            return self.run("data", &compiled.table, &data).await;
        }
        let page = match page {
            Some(page) => page,
            None => return Ok(Vec::new()),
        };
        let page_rows = self.run("page", &compiled.table, &page).await?;
        let ids = root_keys(compiled, &page_rows);
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let data = compiled.data_statement(Some(&ids))?;
        self.run("data", &compiled.table, &data).await
    }

    async fn count(
        &self,
        kind: &'static str,
        table: &str,
        statement: Option<&Statement>,
    ) -> Result<Option<u64>> {
        let statement = match statement {
            Some(statement) => statement,
            None => return Ok(None),
        };
        let rows = self.run(kind, table, statement).await?;
        let count = rows
            .first()
            .and_then(|row| row.get(COUNT_LABEL))
            .and_then(count_value)
            .unwrap_or(0);
        Ok(Some(count))
    }

    async fn aggregate(
        &self,
        compiled: &CompiledQuery,
        statement: Option<&Statement>,
    ) -> Result<Option<Map<String, Value>>> {
        let statement = match statement {
            Some(statement) => statement,
            None => return Ok(None),
        };
        let rows = self.run("aggregate", &compiled.table, statement).await?;
        let row = rows.into_iter().next().unwrap_or_default();
        Ok(Some(shape_aggregates(&compiled.aggregates, &row)))
    }

    async fn run(&self, kind: &'static str, table: &str, statement: &Statement) -> Result<Vec<Row>> {
        debug!(kind, sql = %statement.sql, binds = statement.binds.len(), "Executing statement");
        let start = Instant::now();
        let fetch = self.runner.fetch_all(statement);
        let result = match self.statement_timeout {
            Some(limit) => match tokio::time::timeout(limit, fetch).await {
                Ok(rows) => rows.map_err(DynqError::from),
                Err(_) => Err(DynqError::Timeout(limit)),
            },
            None => fetch.await.map_err(DynqError::from),
        };
        QueryMetrics::statement_executed(kind, table, start.elapsed(), result.is_ok());
        if let Err(e) = &result {
            warn!(kind, error = %e, "Statement failed");
        }
        result
    }
}

fn count_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
