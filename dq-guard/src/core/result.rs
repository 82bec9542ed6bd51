//! Per-rule check results.

use super::RuleSpec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Outcome of one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    /// No violations
    Pass,
    /// At least one violation
    Fail,
}

impl CheckStatus {
    /// Returns true if this is a Pass status.
    pub fn is_pass(&self) -> bool {
        matches!(self, CheckStatus::Pass)
    }

    /// Returns true if this is a Fail status.
    pub fn is_fail(&self) -> bool {
        matches!(self, CheckStatus::Fail)
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckStatus::Pass => f.write_str("PASS"),
            CheckStatus::Fail => f.write_str("FAIL"),
        }
    }
}

/// The result of evaluating one [`RuleSpec`].
///
/// Fields are private so that `status` can only be derived from
/// `violation_count`: a result is FAIL exactly when the count is non-zero.
/// Deserialization rejects payloads whose status disagrees with the count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredCheckResult")]
pub struct CheckResult {
    table: String,
    column: Option<String>,
    check_name: String,
    status: CheckStatus,
    violation_count: u64,
    details: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    timed_out: bool,
}

/// Wire form of a [`CheckResult`], checked before it becomes one.
#[derive(Deserialize)]
struct StoredCheckResult {
    table: String,
    column: Option<String>,
    check_name: String,
    status: CheckStatus,
    violation_count: u64,
    details: String,
    #[serde(default)]
    timed_out: bool,
}

impl TryFrom<StoredCheckResult> for CheckResult {
    type Error = String;

    fn try_from(stored: StoredCheckResult) -> Result<Self, Self::Error> {
        let mut result = CheckResult::new(
            stored.table,
            stored.column,
            stored.check_name,
            stored.violation_count,
            stored.details,
        );
        if result.status != stored.status {
            return Err(format!(
                "status {} disagrees with violation_count {}",
                stored.status, stored.violation_count
            ));
        }
        result.timed_out = stored.timed_out;
        Ok(result)
    }
}

impl CheckResult {
    /// Builds a result for `rule` from its violation count.
    pub fn from_violations(
        rule: &RuleSpec,
        violation_count: u64,
        details: impl Into<String>,
    ) -> Self {
        Self::new(
            rule.table.clone(),
            rule.column_label(),
            rule.check_name(),
            violation_count,
            details,
        )
    }

    /// Builds a result from its parts.
    pub fn new(
        table: impl Into<String>,
        column: Option<String>,
        check_name: impl Into<String>,
        violation_count: u64,
        details: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            column,
            check_name: check_name.into(),
            status: if violation_count == 0 {
                CheckStatus::Pass
            } else {
                CheckStatus::Fail
            },
            violation_count,
            details: details.into(),
            timed_out: false,
        }
    }

    /// Records a rule that exceeded its time budget as a single violation.
    pub fn timed_out(rule: &RuleSpec, timeout: Duration) -> Self {
        let details = format!("rule timed out after {timeout:?}");
        let mut result = Self::from_violations(rule, 1, details);
        result.timed_out = true;
        result
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn column(&self) -> Option<&str> {
        self.column.as_deref()
    }

    pub fn check_name(&self) -> &str {
        &self.check_name
    }

    pub fn status(&self) -> CheckStatus {
        self.status
    }

    pub fn violation_count(&self) -> u64 {
        self.violation_count
    }

    pub fn details(&self) -> &str {
        &self.details
    }

    /// Returns true if this result stands in for a rule that timed out.
    pub fn is_timeout(&self) -> bool {
        self.timed_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_follows_violation_count() {
        let rule = RuleSpec::null_check("Customer", "Email");
        let pass = CheckResult::from_violations(&rule, 0, "0 null values found");
        assert_eq!(pass.status(), CheckStatus::Pass);
        let fail = CheckResult::from_violations(&rule, 3, "3 null values found");
        assert_eq!(fail.status(), CheckStatus::Fail);
        assert_eq!(fail.table(), "Customer");
        assert_eq!(fail.column(), Some("Email"));
        assert_eq!(fail.check_name(), "Null Check");
    }

    #[test]
    fn test_timeout_result() {
        let rule = RuleSpec::uniqueness("Card", "CardNumber");
        let result = CheckResult::timed_out(&rule, Duration::from_millis(250));
        assert!(result.status().is_fail());
        assert_eq!(result.violation_count(), 1);
        assert_eq!(result.details(), "rule timed out after 250ms");
        assert!(result.is_timeout());
    }

    #[test]
    fn test_serialization_shape() {
        let rule = RuleSpec::uniqueness("Card", "CardNumber");
        let result = CheckResult::from_violations(&rule, 0, "No duplicates");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "PASS");
        assert_eq!(json["column"], "CardNumber");
        assert!(json.get("timed_out").is_none());

        let parsed: CheckResult = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, result);
    }

    #[test]
    fn test_deserialize_rejects_inconsistent_status() {
        let forged = serde_json::json!({
            "table": "Customer",
            "column": "Email",
            "check_name": "Null Check",
            "status": "PASS",
            "violation_count": 3,
            "details": "3 null values found"
        });
        let err = serde_json::from_value::<CheckResult>(forged).unwrap_err();
        assert!(err.to_string().contains("disagrees"));

        let timed_out = CheckResult::timed_out(
            &RuleSpec::uniqueness("Card", "CardNumber"),
            Duration::from_secs(1),
        );
        let json = serde_json::to_value(&timed_out).unwrap();
        let parsed: CheckResult = serde_json::from_value(json).unwrap();
        assert!(parsed.is_timeout());
    }
}
