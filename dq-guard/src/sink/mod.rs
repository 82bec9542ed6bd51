//! Report delivery.
//!
//! A [`ReportSink`] receives the finalized [`Report`] of a run. Sinks never
//! alter the report; a failing sink surfaces as [`GuardError::Sink`] to the
//! caller of [`Orchestrator::emit`](crate::core::Orchestrator::emit).
//!
//! | Sink | Destination |
//! |------|-------------|
//! | [`WriterSink`] | any `std::io::Write` (stdout, a buffer) |
//! | [`FileSink`] | a file, written asynchronously |
//! | [`LogSink`] | `tracing` events, one per failing result |
//! | [`CollectingSink`] | memory, for tests and embedding |

use crate::core::Report;
use crate::error::{GuardError, Result};
use async_trait::async_trait;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{info, instrument, warn};

mod format;

pub use format::{
    FormatterConfig, HumanFormatter, JsonFormatter, MarkdownFormatter, ReportFormatter,
};

/// Destination for finalized reports.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Delivers `report`.
    async fn emit(&self, report: &Report) -> Result<()>;
}

/// Writes formatted reports to a `std::io::Write`.
pub struct WriterSink<W: Write + Send + 'static> {
    writer: Mutex<W>,
    formatter: Box<dyn ReportFormatter>,
}

impl<W: Write + Send + 'static> WriterSink<W> {
    /// Creates a sink writing with `formatter`.
    pub fn new(writer: W, formatter: impl ReportFormatter + 'static) -> Self {
        Self {
            writer: Mutex::new(writer),
            formatter: Box::new(formatter),
        }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|_| GuardError::sink("writer", "writer lock poisoned"))
    }
}

impl WriterSink<std::io::Stdout> {
    /// Human-readable reports on stdout.
    pub fn stdout() -> Self {
        Self::new(std::io::stdout(), HumanFormatter::new())
    }
}

#[async_trait]
impl<W: Write + Send + 'static> ReportSink for WriterSink<W> {
    fn name(&self) -> &str {
        "writer"
    }

    async fn emit(&self, report: &Report) -> Result<()> {
        let rendered = self.formatter.format(report)?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| GuardError::sink(self.name(), "writer lock poisoned"))?;
        writer
            .write_all(rendered.as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|e| GuardError::sink(self.name(), e.to_string()))
    }
}

/// Writes formatted reports to a file, replacing its content.
pub struct FileSink {
    path: PathBuf,
    formatter: Box<dyn ReportFormatter>,
}

impl FileSink {
    /// JSON report at `path`.
    pub fn json(path: impl Into<PathBuf>) -> Self {
        Self::new(path, JsonFormatter::new())
    }

    pub fn new(path: impl Into<PathBuf>, formatter: impl ReportFormatter + 'static) -> Self {
        Self {
            path: path.into(),
            formatter: Box::new(formatter),
        }
    }
}

#[async_trait]
impl ReportSink for FileSink {
    fn name(&self) -> &str {
        "file"
    }

    #[instrument(skip(self, report), fields(path = %self.path.display()))]
    async fn emit(&self, report: &Report) -> Result<()> {
        let rendered = self.formatter.format(report)?;
        tokio::fs::write(&self.path, rendered)
            .await
            .map_err(|e| GuardError::sink(self.name(), format!("{}: {e}", self.path.display())))?;
        info!("Report written");
        Ok(())
    }
}

/// Emits one `tracing` event per failing result plus a summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl ReportSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn emit(&self, report: &Report) -> Result<()> {
        for result in report.failures() {
            warn!(
                result.table = %result.table(),
                result.column = result.column().unwrap_or("-"),
                result.check = %result.check_name(),
                result.violations = result.violation_count(),
                result.timed_out = result.is_timeout(),
                "{}",
                result.details()
            );
        }
        let summary = report.summary();
        info!(
            report.status = %report.overall_status(),
            report.complete = report.is_complete(),
            report.total = summary.total_checks,
            report.failed = summary.failed_checks,
            report.violations = summary.total_violations,
            "Data quality report"
        );
        Ok(())
    }
}

/// Keeps every emitted report in memory.
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    reports: Arc<Mutex<Vec<Report>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports received so far, oldest first.
    pub fn reports(&self) -> Vec<Report> {
        self.reports
            .lock()
            .map(|reports| reports.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ReportSink for CollectingSink {
    fn name(&self) -> &str {
        "collecting"
    }

    async fn emit(&self, report: &Report) -> Result<()> {
        self.reports
            .lock()
            .map_err(|_| GuardError::sink(self.name(), "report store lock poisoned"))?
            .push(report.clone());
        Ok(())
    }
}
