//! Report formatting.
//!
//! Three formatters render a [`Report`] for different audiences:
//! [`JsonFormatter`] for machines, [`HumanFormatter`] for terminals and logs,
//! and [`MarkdownFormatter`] for documents and pull request comments.
//!
//! # Examples
//!
//! ```rust
//! use dq_guard::core::{CheckResult, Report, RuleSpec};
//! use dq_guard::sink::{HumanFormatter, ReportFormatter};
//!
//! let rule = RuleSpec::null_check("Customer", "Email");
//! let report = Report::new(vec![CheckResult::from_violations(&rule, 1, "1 null values found")], true);
//!
//! let output = HumanFormatter::new().format(&report).unwrap();
//! assert!(output.contains("Data quality FAILED"));
//! ```

use crate::core::{CheckResult, CheckStatus, Report};
use crate::error::{GuardError, Result};
use serde::Serialize;
use std::fmt::{self, Write};

/// Configuration options for formatting reports.
#[derive(Debug, Clone)]
pub struct FormatterConfig {
    /// Include the summary block
    pub include_summary: bool,
    /// Include PASS results, not only failures
    pub include_passed: bool,
    /// Maximum number of results to display (`None` for all)
    pub max_results: Option<usize>,
    /// Whether to use ANSI colors (human formatter)
    pub use_colors: bool,
    /// Whether to include the generation timestamp
    pub include_timestamps: bool,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            include_summary: true,
            include_passed: true,
            max_results: None,
            use_colors: true,
            include_timestamps: true,
        }
    }
}

impl FormatterConfig {
    /// Summary and failures only.
    pub fn minimal() -> Self {
        Self {
            include_summary: true,
            include_passed: false,
            max_results: Some(0),
            use_colors: false,
            include_timestamps: false,
        }
    }

    /// Settings for CI logs: no colors, bounded output.
    pub fn ci() -> Self {
        Self {
            include_summary: true,
            include_passed: false,
            max_results: Some(50),
            use_colors: false,
            include_timestamps: true,
        }
    }

    pub fn with_passed(mut self, include: bool) -> Self {
        self.include_passed = include;
        self
    }

    pub fn with_max_results(mut self, max: Option<usize>) -> Self {
        self.max_results = max;
        self
    }

    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }

    pub fn with_timestamps(mut self, include: bool) -> Self {
        self.include_timestamps = include;
        self
    }

    /// Results to display, with the number left out.
    fn select<'r>(&self, report: &'r Report) -> (Vec<&'r CheckResult>, usize) {
        let candidates: Vec<&CheckResult> = report
            .results()
            .iter()
            .filter(|r| self.include_passed || r.status().is_fail())
            .collect();
        let shown = self.max_results.unwrap_or(candidates.len()).min(candidates.len());
        let hidden = candidates.len() - shown;
        (candidates.into_iter().take(shown).collect(), hidden)
    }
}

/// Renders a report as text.
pub trait ReportFormatter: Send + Sync {
    /// Formats with the formatter's own configuration.
    fn format(&self, report: &Report) -> Result<String>;
}

fn render_error(e: fmt::Error) -> GuardError {
    GuardError::Serialization(format!("failed to render report: {e}"))
}

/// Formats reports as JSON.
#[derive(Debug, Clone)]
pub struct JsonFormatter {
    config: FormatterConfig,
    pretty: bool,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    overall_status: CheckStatus,
    complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    generated_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<crate::core::ReportSummary>,
    results: Vec<&'a CheckResult>,
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self {
            config: FormatterConfig::default(),
            pretty: true,
        }
    }

    pub fn with_config(config: FormatterConfig) -> Self {
        Self {
            config,
            pretty: true,
        }
    }

    /// Sets whether to pretty-print.
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportFormatter for JsonFormatter {
    fn format(&self, report: &Report) -> Result<String> {
        let (results, _) = self.config.select(report);
        let document = JsonReport {
            overall_status: report.overall_status(),
            complete: report.is_complete(),
            generated_at: self
                .config
                .include_timestamps
                .then(|| report.generated_at().to_rfc3339()),
            summary: self.config.include_summary.then(|| report.summary()),
            results,
        };
        let json = if self.pretty {
            serde_json::to_string_pretty(&document)?
        } else {
            serde_json::to_string(&document)?
        };
        Ok(json)
    }
}

/// Formats reports for terminals and logs.
#[derive(Debug, Clone, Default)]
pub struct HumanFormatter {
    config: FormatterConfig,
}

impl HumanFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: FormatterConfig) -> Self {
        Self { config }
    }

    fn paint(&self, text: &str, color: &str) -> String {
        if self.config.use_colors {
            format!("\x1b[{color}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    fn render(&self, report: &Report, out: &mut String) -> fmt::Result {
        let config = &self.config;
        writeln!(out)?;
        match report.overall_status() {
            CheckStatus::Pass => writeln!(out, "✅ {}", self.paint("Data quality PASSED", "32"))?,
            CheckStatus::Fail => writeln!(out, "❌ {}", self.paint("Data quality FAILED", "31"))?,
        }
        if !report.is_complete() {
            let warning = self.paint("Run was cancelled; report is incomplete", "33");
            writeln!(out, "⚠️  {warning}")?;
        }
        if config.include_timestamps {
            writeln!(out, "Generated: {}", report.generated_at().to_rfc3339())?;
        }

        if config.include_summary {
            let summary = report.summary();
            writeln!(out)?;
            writeln!(out, "📊 Summary:")?;
            writeln!(out, "   Total Checks: {}", summary.total_checks)?;
            let passed = self.paint(&summary.passed_checks.to_string(), "32");
            let failed = self.paint(&summary.failed_checks.to_string(), "31");
            writeln!(out, "   ✅ Passed: {passed}")?;
            writeln!(out, "   ❌ Failed: {failed}")?;
            if summary.timed_out_checks > 0 {
                writeln!(out, "   ⏱️  Timed out: {}", summary.timed_out_checks)?;
            }
            writeln!(out, "   Violations: {}", summary.total_violations)?;
            writeln!(out, "   Pass Rate: {:.1}%", summary.pass_rate())?;
        }

        let (results, hidden) = config.select(report);
        if !results.is_empty() {
            writeln!(out)?;
            writeln!(out, "🔍 Results:")?;
            for result in results {
                let status = match result.status() {
                    CheckStatus::Pass => self.paint("PASS", "32"),
                    CheckStatus::Fail => self.paint("FAIL", "31"),
                };
                let target = match result.column() {
                    Some(column) => format!("{}.{column}", result.table()),
                    None => result.table().to_string(),
                };
                writeln!(out, "   [{status}] {} on {target}", result.check_name())?;
                writeln!(out, "      {}", result.details())?;
            }
        }
        if hidden > 0 {
            writeln!(out)?;
            writeln!(out, "   ... and {hidden} more results")?;
        }
        writeln!(out)
    }
}

impl ReportFormatter for HumanFormatter {
    fn format(&self, report: &Report) -> Result<String> {
        let mut out = String::new();
        self.render(report, &mut out).map_err(render_error)?;
        Ok(out)
    }
}

/// Formats reports as Markdown.
#[derive(Debug, Clone)]
pub struct MarkdownFormatter {
    config: FormatterConfig,
    heading_level: u8,
}

impl MarkdownFormatter {
    pub fn new() -> Self {
        Self {
            config: FormatterConfig::default(),
            heading_level: 2,
        }
    }

    pub fn with_config(config: FormatterConfig) -> Self {
        Self {
            config,
            heading_level: 2,
        }
    }

    /// Sets the base heading level, clamped to 1..=6.
    pub fn with_heading_level(mut self, level: u8) -> Self {
        self.heading_level = level.clamp(1, 6);
        self
    }

    fn render(&self, report: &Report, out: &mut String) -> fmt::Result {
        let h = "#".repeat(self.heading_level as usize);
        let config = &self.config;

        match report.overall_status() {
            CheckStatus::Pass => writeln!(out, "{h} ✅ Data Quality Report - PASSED")?,
            CheckStatus::Fail => writeln!(out, "{h} ❌ Data Quality Report - FAILED")?,
        }
        writeln!(out)?;
        if !report.is_complete() {
            writeln!(out, "> **Incomplete:** the run was cancelled before every rule finished.")?;
            writeln!(out)?;
        }
        if config.include_timestamps {
            writeln!(out, "**Generated:** {}", report.generated_at().to_rfc3339())?;
            writeln!(out)?;
        }

        if config.include_summary {
            let summary = report.summary();
            writeln!(out, "{h}# Summary")?;
            writeln!(out)?;
            writeln!(out, "| Metric | Value |")?;
            writeln!(out, "|--------|-------|")?;
            writeln!(out, "| Total Checks | {} |", summary.total_checks)?;
            writeln!(out, "| Passed | {} |", summary.passed_checks)?;
            writeln!(out, "| Failed | {} |", summary.failed_checks)?;
            writeln!(out, "| Timed Out | {} |", summary.timed_out_checks)?;
            writeln!(out, "| Violations | {} |", summary.total_violations)?;
            writeln!(out, "| Pass Rate | {:.1}% |", summary.pass_rate())?;
            writeln!(out)?;
        }

        let (results, hidden) = config.select(report);
        if !results.is_empty() {
            writeln!(out, "{h}# Results")?;
            writeln!(out)?;
            writeln!(out, "| Status | Table | Column | Check | Violations | Details |")?;
            writeln!(out, "|--------|-------|--------|-------|------------|---------|")?;
            for result in results {
                writeln!(
                    out,
                    "| {} | {} | {} | {} | {} | {} |",
                    result.status(),
                    result.table(),
                    result.column().unwrap_or("-"),
                    result.check_name(),
                    result.violation_count(),
                    result.details().replace('|', "\\|"),
                )?;
            }
            if hidden > 0 {
                writeln!(out)?;
                writeln!(out, "_{hidden} more results not shown._")?;
            }
        }
        Ok(())
    }
}

impl Default for MarkdownFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportFormatter for MarkdownFormatter {
    fn format(&self, report: &Report) -> Result<String> {
        let mut out = String::new();
        self.render(report, &mut out).map_err(render_error)?;
        Ok(out)
    }
}
