//! The aggregated report of one engine run.

use super::{CheckResult, CheckStatus};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Summary statistics over a report's results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Number of results
    pub total_checks: usize,
    /// Results with status PASS
    pub passed_checks: usize,
    /// Results with status FAIL
    pub failed_checks: usize,
    /// FAIL results recorded for rules that timed out
    pub timed_out_checks: usize,
    /// Sum of all violation counts
    pub total_violations: u64,
}

impl ReportSummary {
    /// Returns the pass rate as a percentage (0.0 to 100.0).
    pub fn pass_rate(&self) -> f64 {
        if self.total_checks == 0 {
            100.0
        } else {
            (self.passed_checks as f64 / self.total_checks as f64) * 100.0
        }
    }
}

/// Ordered results of one run, with derived overall status.
///
/// `results` keep rule declaration order. The overall status is never
/// stored: it is FAIL exactly when some result is FAIL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    results: Vec<CheckResult>,
    generated_at: DateTime<Utc>,
    complete: bool,
}

#[derive(Serialize)]
struct FingerprintInput<'a> {
    results: &'a [CheckResult],
    complete: bool,
}

impl Report {
    /// Creates a report stamped with the current time.
    pub fn new(results: Vec<CheckResult>, complete: bool) -> Self {
        Self {
            results,
            generated_at: Utc::now(),
            complete,
        }
    }

    pub fn results(&self) -> &[CheckResult] {
        &self.results
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    /// Returns false if the run was cancelled before every rule finished.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// FAIL if any result failed, else PASS.
    pub fn overall_status(&self) -> CheckStatus {
        if self.results.iter().any(|r| r.status().is_fail()) {
            CheckStatus::Fail
        } else {
            CheckStatus::Pass
        }
    }

    /// Returns the failing results in report order.
    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.results.iter().filter(|r| r.status().is_fail())
    }

    /// Computes summary statistics.
    pub fn summary(&self) -> ReportSummary {
        self.results
            .iter()
            .fold(ReportSummary::default(), |mut summary, result| {
                summary.total_checks += 1;
                match result.status() {
                    CheckStatus::Pass => summary.passed_checks += 1,
                    CheckStatus::Fail => summary.failed_checks += 1,
                }
                if result.is_timeout() {
                    summary.timed_out_checks += 1;
                }
                summary.total_violations += result.violation_count();
                summary
            })
    }

    /// SHA-256 (hex) of the canonical JSON of the results and completeness flag.
    ///
    /// The timestamp is excluded, so two runs over the same data produce the
    /// same fingerprint.
    pub fn fingerprint(&self) -> Result<String> {
        let canonical = serde_json::to_vec(&FingerprintInput {
            results: &self.results,
            complete: self.complete,
        })?;
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        Ok(hex::encode(hasher.finalize()))
    }
}
