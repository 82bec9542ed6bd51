//! Uniqueness check.
//!
//! The violation count is the number of *distinct values* that occur more
//! than once, not the number of duplicate rows: `[1, 1, 1, 2, 3, 3]` has two
//! violations (`1` and `3`). Null values are ignored.

use super::{target_column, validate_target};
use crate::core::{CheckResult, EvaluationContext, RuleEvaluator, RuleSpec};
use crate::error::{GuardError, Result};
use crate::log_rule;
use crate::sources::{Aggregate, DataSource, Predicate, QueryDescriptor};
use async_trait::async_trait;
use tracing::instrument;

/// Evaluator for [`RuleKind::UniquenessCheck`](crate::core::RuleKind::UniquenessCheck).
#[derive(Debug, Clone, Copy, Default)]
pub struct UniquenessEvaluator;

#[async_trait]
impl RuleEvaluator for UniquenessEvaluator {
    fn validate(&self, rule: &RuleSpec) -> Result<()> {
        validate_target(rule)?;
        rule.expect_columns(1)
    }

    #[instrument(
        skip(self, rule, source, ctx),
        fields(rule.kind = "uniqueness_check", rule.table = %rule.table)
    )]
    async fn evaluate(
        &self,
        rule: &RuleSpec,
        source: &dyn DataSource,
        ctx: &EvaluationContext,
    ) -> Result<CheckResult> {
        let column = target_column(rule)?;
        let query = QueryDescriptor::table(&rule.table)
            .filter(Predicate::IsNotNull(column.to_string()))
            .group_by([column])
            .aggregate(Aggregate::CountRows);
        let groups = super::fetch(source, &query, ctx).await?;

        let mut duplicated = 0u64;
        for group in &groups {
            let count = group.get(1).and_then(|v| v.as_i64()).ok_or_else(|| {
                GuardError::query(&rule.table, "grouped count returned no count column")
            })?;
            if count > 1 {
                duplicated += 1;
            }
        }

        log_rule!(
            ctx.log,
            rule.column = %column,
            groups = groups.len(),
            duplicated,
            "Uniqueness check evaluated"
        );

        let details = if duplicated == 0 {
            "No duplicates".to_string()
        } else {
            format!("{duplicated} duplicate values found")
        };
        Ok(CheckResult::from_violations(rule, duplicated, details))
    }
}
