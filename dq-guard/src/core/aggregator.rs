//! Ordered collection of check results.

use super::{CheckResult, Report};
use crate::error::{GuardError, Result};
use tracing::debug;

/// Collects [`CheckResult`]s in the order they are added and seals them into a
/// [`Report`].
///
/// After the first [`finalize`](Self::finalize) the aggregator is read-only:
/// further `add` calls fail with [`GuardError::AggregatorClosed`] and further
/// `finalize` calls return the same report.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    results: Vec<CheckResult>,
    incomplete: bool,
    finalized: Option<Report>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a result.
    pub fn add(&mut self, result: CheckResult) -> Result<()> {
        if self.finalized.is_some() {
            return Err(GuardError::AggregatorClosed);
        }
        self.results.push(result);
        Ok(())
    }

    /// Marks the eventual report as incomplete (the run was cancelled).
    pub fn mark_incomplete(&mut self) -> Result<()> {
        if self.finalized.is_some() {
            return Err(GuardError::AggregatorClosed);
        }
        self.incomplete = true;
        Ok(())
    }

    /// Number of results collected so far.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Returns true once `finalize` has been called.
    pub fn is_closed(&self) -> bool {
        self.finalized.is_some()
    }

    /// Seals the collected results into a report.
    pub fn finalize(&mut self) -> Report {
        if let Some(report) = &self.finalized {
            return report.clone();
        }
        let report = Report::new(std::mem::take(&mut self.results), !self.incomplete);
        debug!(
            report.results = report.results().len(),
            report.complete = report.is_complete(),
            report.status = %report.overall_status(),
            "Result aggregator finalized"
        );
        self.finalized = Some(report.clone());
        report
    }
}
