//! Format check: every non-null value must match a whole-value pattern.

use super::{target_column, validate_target};
use crate::core::{CheckResult, EvaluationContext, RuleEvaluator, RuleSpec, Value};
use crate::error::{GuardError, Result};
use crate::log_rule;
use crate::security::SqlSecurity;
use crate::sources::{DataSource, Predicate, QueryDescriptor};
use async_trait::async_trait;
use regex::Regex;
use tracing::instrument;

/// Evaluator for [`RuleKind::FormatCheck`](crate::core::RuleKind::FormatCheck).
///
/// The `pattern` parameter is compiled as `^(?:pattern)$`. Non-text values
/// are matched against their display form, so a numeric column can still be
/// checked for digit count.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatEvaluator;

impl FormatEvaluator {
    fn compile(rule: &RuleSpec) -> Result<Regex> {
        let pattern = rule.require_text("pattern")?;
        SqlSecurity::compile_anchored_pattern(pattern).map_err(|e| {
            GuardError::configuration(format!(
                "rule '{}': invalid pattern '{pattern}': {e}",
                rule.label()
            ))
        })
    }
}

#[async_trait]
impl RuleEvaluator for FormatEvaluator {
    fn validate(&self, rule: &RuleSpec) -> Result<()> {
        validate_target(rule)?;
        rule.expect_columns(1)?;
        Self::compile(rule).map(|_| ())
    }

    #[instrument(
        skip(self, rule, source, ctx),
        fields(rule.kind = "format_check", rule.table = %rule.table)
    )]
    async fn evaluate(
        &self,
        rule: &RuleSpec,
        source: &dyn DataSource,
        ctx: &EvaluationContext,
    ) -> Result<CheckResult> {
        let column = target_column(rule)?;
        let regex = Self::compile(rule)?;

        let query = QueryDescriptor::table(&rule.table)
            .select([column])
            .filter(Predicate::IsNotNull(column.to_string()));
        let rows = super::fetch(source, &query, ctx).await?;

        let mut invalid = 0u64;
        for value in rows.iter().filter_map(|row| row.first()) {
            let matched = match value {
                Value::Null => continue,
                Value::Text(text) => regex.is_match(text),
                other => regex.is_match(&other.to_string()),
            };
            if !matched {
                invalid += 1;
            }
        }

        log_rule!(
            ctx.log,
            rule.column = %column,
            checked = rows.len(),
            invalid,
            "Format check evaluated"
        );

        let details = if invalid == 0 {
            "All values valid".to_string()
        } else {
            format!("{invalid} invalid values found")
        };
        Ok(CheckResult::from_violations(rule, invalid, details))
    }
}
