//! Logging and metrics setup, plus the query metrics recorded by executors

use metrics::{counter, histogram, Label};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{info, Level};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::config::{LoggingConfig, MetricsConfig, ObservabilityConfig};

static INITIALIZED: OnceCell<()> = OnceCell::new();

/// Process-wide logging and metrics setup
pub struct ObservabilitySystem;

impl ObservabilitySystem {
    /// Initialize logging and, when enabled, the Prometheus exporter.
    /// Must run inside a tokio runtime when metrics are enabled.
    pub fn init(config: &ObservabilityConfig) -> anyhow::Result<()> {
        Self::init_logging(&config.logging)?;

        if config.metrics.enabled {
            Self::init_metrics(&config.metrics)?;
        }

        INITIALIZED
            .set(())
            .map_err(|_| anyhow::anyhow!("Observability system already initialized"))?;

        info!("Observability system initialized");
        Ok(())
    }

    fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
        let filter = EnvFilter::builder()
            .with_default_directive(parse_level(&config.level).into())
            .from_env_lossy();

        // logs go to stderr, stdout carries command output
        let output: Box<dyn Layer<Registry> + Send + Sync> = if config.format.eq_ignore_ascii_case("json") {
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_span_events(FmtSpan::CLOSE)
                .boxed()
        } else {
            fmt::layer()
                .pretty()
                .with_writer(std::io::stderr)
                .with_span_events(FmtSpan::CLOSE)
                .boxed()
        };

        tracing_subscriber::registry()
            .with(output)
            .with(filter)
            .try_init()?;
        Ok(())
    }

    fn init_metrics(config: &MetricsConfig) -> anyhow::Result<()> {
        let listen: SocketAddr = config.bind_address.parse()?;
        PrometheusBuilder::new().with_http_listener(listen).install()?;
        info!(%listen, "Prometheus exporter installed");
        Ok(())
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Find-call metrics
pub struct QueryMetrics;

impl QueryMetrics {
    /// Record a successful compilation
    pub fn compiled(table: &str, duration: Duration) {
        counter!("dynq_compilations_total", "table" => table.to_string()).increment(1);
        histogram!("dynq_compile_duration_seconds", "table" => table.to_string())
            .record(duration.as_secs_f64());
    }

    /// Record a rejected request; `kind` is the error kind
    pub fn compile_failed(table: &str, kind: &str) {
        counter!("dynq_compile_failures_total",
                "table" => table.to_string(),
                "kind" => kind.to_string())
        .increment(1);
    }

    /// Record one executed statement
    pub fn statement_executed(kind: &str, table: &str, duration: Duration, success: bool) {
        let status = if success { "success" } else { "error" };
        counter!("dynq_statements_total",
                "kind" => kind.to_string(),
                "table" => table.to_string(),
                "status" => status.to_string())
        .increment(1);
        histogram!("dynq_statement_duration_seconds",
                  "kind" => kind.to_string(),
                  "table" => table.to_string())
        .record(duration.as_secs_f64());
    }

    /// Record the number of entities returned by a find call
    pub fn rows_returned(table: &str, rows: usize) {
        histogram!("dynq_rows_returned", "table" => table.to_string()).record(rows as f64);
    }
}

/// Records the elapsed time into a histogram when finished or dropped
pub struct PerfTimer {
    start: Instant,
    metric_name: String,
    labels: Vec<(String, String)>,
    recorded: bool,
}

impl PerfTimer {
    pub fn new(metric_name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            metric_name: metric_name.into(),
            labels: Vec::new(),
            recorded: false,
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), value.into()));
        self
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Record now and return the measured duration
    pub fn finish(mut self) -> Duration {
        self.record()
    }

    fn record(&mut self) -> Duration {
        let duration = self.start.elapsed();
        if !self.recorded {
            self.recorded = true;
            let labels: Vec<Label> = self
                .labels
                .iter()
                .map(|(k, v)| Label::new(k.clone(), v.clone()))
                .collect();
            histogram!(self.metric_name.clone(), labels).record(duration.as_secs_f64());
        }
        duration
    }
}

impl Drop for PerfTimer {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            self.record();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perf_timer() {
        let timer = PerfTimer::new("test_metric").with_label("test_label", "test_value");

        assert_eq!(timer.metric_name, "test_metric");
        assert_eq!(timer.labels.len(), 1);

        let elapsed = timer.finish();
        assert!(elapsed < Duration::from_secs(60));
    }

    #[test]
    fn test_perf_timer_records_once() {
        let mut timer = PerfTimer::new("test_metric");
        timer.record();
        assert!(timer.recorded);
        // drop must not record a second sample
        drop(timer);
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level("bogus"), Level::INFO);
    }

    #[test]
    fn test_metrics_without_recorder_are_noops() {
        QueryMetrics::compiled("posts", Duration::from_millis(1));
        QueryMetrics::compile_failed("posts", "unknown_field");
        QueryMetrics::statement_executed("data", "posts", Duration::from_millis(2), true);
        QueryMetrics::rows_returned("posts", 3);
    }
}
