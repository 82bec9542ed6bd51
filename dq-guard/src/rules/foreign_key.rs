//! Foreign key integrity check.
//!
//! Every non-null value of the child column must match a valid row of the
//! parent table. A parent row is valid unless a status filter is configured
//! and its status is one of the rejected values:
//!
//! ```json
//! {"kind": "foreign_key_check", "table": "PaymentTransaction", "columns": ["DeviceID"],
//!  "params": {"parent_table": "Device", "parent_key": "DeviceID",
//!             "parent_status_column": "Status",
//!             "rejected_parent_values": ["Suspicious", "Blocked"],
//!             "ignore_orphans": true}}
//! ```
//!
//! With `ignore_orphans`, child values with no parent at all are not
//! counted; only references to rejected parents are.

use super::{identifier_param, optional_identifier_param, target_column, validate_target};
use crate::core::{CheckResult, EvaluationContext, RuleEvaluator, RuleSpec, Value, ValueKey};
use crate::error::{GuardError, Result};
use crate::log_rule;
use crate::sources::{DataSource, Predicate, QueryDescriptor};
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::{debug, instrument};

/// Evaluator for [`RuleKind::ForeignKeyCheck`](crate::core::RuleKind::ForeignKeyCheck).
#[derive(Debug, Clone, Copy, Default)]
pub struct ForeignKeyEvaluator;

/// Resolved parameters of one foreign key rule.
struct ForeignKeyParams<'r> {
    parent_table: &'r str,
    parent_key: &'r str,
    status_filter: Option<(&'r str, &'r [String])>,
    ignore_orphans: bool,
}

impl<'r> ForeignKeyParams<'r> {
    fn from_rule(rule: &'r RuleSpec) -> Result<Self> {
        let parent_table = identifier_param(rule, "parent_table")?;
        let parent_key = identifier_param(rule, "parent_key")?;
        let status_column = optional_identifier_param(rule, "parent_status_column")?;
        let rejected = rule.list("rejected_parent_values")?;

        let status_filter = match (status_column, rejected) {
            (Some(column), Some(values)) if !values.is_empty() => Some((column, values)),
            (None, None) => None,
            _ => {
                return Err(GuardError::configuration(format!(
                    "rule '{}': 'parent_status_column' and a non-empty 'rejected_parent_values' must be given together",
                    rule.label()
                )))
            }
        };

        let ignore_orphans = rule.flag("ignore_orphans")?;
        if ignore_orphans && status_filter.is_none() {
            return Err(GuardError::configuration(format!(
                "rule '{}': 'ignore_orphans' requires a parent status filter",
                rule.label()
            )));
        }

        Ok(Self {
            parent_table,
            parent_key,
            status_filter,
            ignore_orphans,
        })
    }
}

/// Parent keys split by status.
#[derive(Debug, Default)]
struct ParentKeys {
    /// Keys with at least one non-rejected parent row
    valid: HashSet<ValueKey>,
    /// Keys with at least one rejected parent row
    rejected: HashSet<ValueKey>,
}

impl ParentKeys {
    fn is_violation(&self, key: &ValueKey, ignore_orphans: bool) -> bool {
        if ignore_orphans {
            self.rejected.contains(key)
        } else {
            !self.valid.contains(key)
        }
    }
}

async fn load_parent_keys(
    source: &dyn DataSource,
    params: &ForeignKeyParams<'_>,
    ctx: &EvaluationContext,
) -> Result<ParentKeys> {
    let mut columns = vec![params.parent_key];
    if let Some((status_column, _)) = params.status_filter {
        columns.push(status_column);
    }
    let query = QueryDescriptor::table(params.parent_table)
        .select(columns)
        .filter(Predicate::IsNotNull(params.parent_key.to_string()))
        .distinct();
    let rows = super::fetch(source, &query, ctx).await?;

    let mut keys = ParentKeys::default();
    for row in &rows {
        let Some(key) = row.first() else { continue };
        let rejected = match (params.status_filter, row.get(1)) {
            (Some((_, rejected_values)), Some(Value::Text(status))) => {
                rejected_values.iter().any(|r| r == status)
            }
            (Some((_, rejected_values)), Some(status)) if !status.is_null() => {
                let status = status.to_string();
                rejected_values.iter().any(|r| *r == status)
            }
            _ => false,
        };
        if rejected {
            keys.rejected.insert(key.key());
        } else {
            keys.valid.insert(key.key());
        }
    }
    Ok(keys)
}

#[async_trait]
impl RuleEvaluator for ForeignKeyEvaluator {
    fn validate(&self, rule: &RuleSpec) -> Result<()> {
        validate_target(rule)?;
        rule.expect_columns(1)?;
        ForeignKeyParams::from_rule(rule).map(|_| ())
    }

    #[instrument(
        skip(self, rule, source, ctx),
        fields(rule.kind = "foreign_key_check", rule.table = %rule.table)
    )]
    async fn evaluate(
        &self,
        rule: &RuleSpec,
        source: &dyn DataSource,
        ctx: &EvaluationContext,
    ) -> Result<CheckResult> {
        let column = target_column(rule)?;
        let params = ForeignKeyParams::from_rule(rule)?;

        let parents = load_parent_keys(source, &params, ctx).await?;
        debug!(
            parent.table = params.parent_table,
            parent.valid = parents.valid.len(),
            parent.rejected = parents.rejected.len(),
            "Loaded parent keys"
        );

        let query = QueryDescriptor::table(&rule.table)
            .select([column])
            .filter(Predicate::IsNotNull(column.to_string()));
        let children = super::fetch(source, &query, ctx).await?;

        let invalid = children
            .iter()
            .filter_map(|row| row.first())
            .filter(|value| !value.is_null())
            .filter(|value| parents.is_violation(&value.key(), params.ignore_orphans))
            .count() as u64;

        log_rule!(
            ctx.log,
            rule.column = %column,
            children = children.len(),
            invalid,
            "Foreign key check evaluated"
        );

        Ok(CheckResult::from_violations(
            rule,
            invalid,
            format!("{invalid} invalid foreign keys found"),
        ))
    }
}
