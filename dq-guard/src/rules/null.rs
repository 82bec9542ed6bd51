//! Null check: counts rows with an absent value in the target column.

use super::validate_target;
use crate::core::{CheckResult, EvaluationContext, RuleEvaluator, RuleSpec};
use crate::error::{GuardError, Result};
use crate::log_rule;
use crate::sources::{Aggregate, DataSource, Predicate, QueryDescriptor};
use async_trait::async_trait;
use tracing::instrument;

/// Evaluator for [`RuleKind::NullCheck`](crate::core::RuleKind::NullCheck).
///
/// A rule with no column is schema-driven and must be expanded by the
/// planner before it reaches [`evaluate`](RuleEvaluator::evaluate).
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCheckEvaluator;

#[async_trait]
impl RuleEvaluator for NullCheckEvaluator {
    fn validate(&self, rule: &RuleSpec) -> Result<()> {
        validate_target(rule)?;
        if rule.columns.len() > 1 {
            return Err(GuardError::configuration(format!(
                "rule '{}' checks one column at a time; declare one rule per column or none for all",
                rule.label()
            )));
        }
        rule.list("exclude")?;
        Ok(())
    }

    #[instrument(
        skip(self, rule, source, ctx),
        fields(rule.kind = "null_check", rule.table = %rule.table)
    )]
    async fn evaluate(
        &self,
        rule: &RuleSpec,
        source: &dyn DataSource,
        ctx: &EvaluationContext,
    ) -> Result<CheckResult> {
        let column = rule.columns.first().ok_or_else(|| {
            GuardError::configuration(format!(
                "rule '{}' has no column; schema-driven null checks are expanded during planning",
                rule.label()
            ))
        })?;

        let query = QueryDescriptor::table(&rule.table)
            .filter(Predicate::IsNull(column.clone()))
            .aggregate(Aggregate::CountRows);
        let rows = super::fetch(source, &query, ctx).await?;
        let nulls = super::single_count(&rows, &rule.table)?;

        log_rule!(ctx.log, rule.column = %column, nulls, "Null check evaluated");
        Ok(CheckResult::from_violations(
            rule,
            nulls,
            format!("{nulls} null values found"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CheckStatus, Value};
    use crate::rules::test_support::{evaluate, single_column};

    #[tokio::test]
    async fn test_counts_nulls() {
        let source = single_column(vec![
            Value::from("a"),
            Value::Null,
            Value::from(""),
            Value::Null,
        ]);
        let rule = RuleSpec::null_check("data", "value");
        let result = evaluate(&NullCheckEvaluator, &rule, &source).await;

        assert_eq!(result.violation_count(), 2);
        assert_eq!(result.status(), CheckStatus::Fail);
        assert_eq!(result.details(), "2 null values found");
        assert_eq!(result.check_name(), "Null Check");
        assert_eq!(result.column(), Some("value"));
    }

    #[tokio::test]
    async fn test_no_nulls_passes() {
        let source = single_column(vec![Value::from("a"), Value::from("b")]);
        let rule = RuleSpec::null_check("data", "value");
        let result = evaluate(&NullCheckEvaluator, &rule, &source).await;
        assert_eq!(result.status(), CheckStatus::Pass);
        assert_eq!(result.details(), "0 null values found");
    }

    #[tokio::test]
    async fn test_empty_table_passes() {
        let source = single_column(vec![]);
        let rule = RuleSpec::null_check("data", "value");
        let result = evaluate(&NullCheckEvaluator, &rule, &source).await;
        assert_eq!(result.violation_count(), 0);
    }

    #[tokio::test]
    async fn test_unexpanded_rule_is_rejected_at_evaluation() {
        let source = single_column(vec![Value::Null]);
        let rule = RuleSpec::null_check_all("data");
        NullCheckEvaluator.validate(&rule).unwrap();
        let err = NullCheckEvaluator
            .evaluate(&rule, &source, &EvaluationContext::default())
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_validate() {
        let two = RuleSpec::null_check("data", "a").column("b");
        assert!(NullCheckEvaluator.validate(&two).is_err());

        let bad_exclude = RuleSpec::null_check_all("data").param("exclude", "a");
        assert!(NullCheckEvaluator.validate(&bad_exclude).is_err());

        let ok = RuleSpec::null_check_all("data").param("exclude", vec!["a"]);
        assert!(NullCheckEvaluator.validate(&ok).is_ok());
    }
}
