//! Built-in rule evaluators.
//!
//! One [`RuleEvaluator`](crate::core::RuleEvaluator) per [`RuleKind`]:
//!
//! | Kind | Evaluator | Violation unit |
//! |------|-----------|----------------|
//! | `null_check` | [`NullCheckEvaluator`] | row with an absent value |
//! | `uniqueness_check` | [`UniquenessEvaluator`] | value occurring more than once (one per group) |
//! | `format_check` | [`FormatEvaluator`] | non-null value not matching the anchored pattern |
//! | `foreign_key_check` | [`ForeignKeyEvaluator`] | child row whose key has no valid parent |
//! | `aggregate_threshold_check` | [`AggregateThresholdEvaluator`] | group over the threshold with no strong auth |
//!
//! Evaluators only speak [`QueryDescriptor`](crate::sources::QueryDescriptor)s,
//! so they run unchanged against any [`DataSource`](crate::sources::DataSource).

use crate::core::{EvaluationContext, RuleKind, RuleRegistry, RuleSpec, Row};
use crate::error::{GuardError, Result};
use crate::log_data_op;
use crate::logging::truncate_field;
use crate::security::SqlSecurity;
use crate::sources::{DataSource, QueryDescriptor};
use std::sync::Arc;

mod aggregate;
mod foreign_key;
mod format;
mod null;
mod uniqueness;

pub use aggregate::AggregateThresholdEvaluator;
pub use foreign_key::ForeignKeyEvaluator;
pub use format::FormatEvaluator;
pub use null::NullCheckEvaluator;
pub use uniqueness::UniquenessEvaluator;

/// Registers every built-in kind.
pub fn register_builtin_rules(registry: &mut RuleRegistry) {
    registry.register(RuleKind::NullCheck, || Arc::new(NullCheckEvaluator));
    registry.register(RuleKind::UniquenessCheck, || Arc::new(UniquenessEvaluator));
    registry.register(RuleKind::FormatCheck, || Arc::new(FormatEvaluator));
    registry.register(RuleKind::ForeignKeyCheck, || Arc::new(ForeignKeyEvaluator));
    registry.register(RuleKind::AggregateThresholdCheck, || {
        Arc::new(AggregateThresholdEvaluator)
    });
}

/// Validates the table and column names every rule carries.
pub(crate) fn validate_target(rule: &RuleSpec) -> Result<()> {
    SqlSecurity::validate_identifier(&rule.table)?;
    for column in &rule.columns {
        SqlSecurity::validate_identifier(column)?;
    }
    Ok(())
}

/// The single target column of a validated rule.
pub(crate) fn target_column(rule: &RuleSpec) -> Result<&str> {
    match rule.columns.as_slice() {
        [column] => Ok(column),
        other => Err(GuardError::configuration(format!(
            "rule '{}' expects 1 column(s), got {}",
            rule.label(),
            other.len()
        ))),
    }
}

/// Validates a required identifier parameter and returns it.
pub(crate) fn identifier_param<'r>(rule: &'r RuleSpec, key: &str) -> Result<&'r str> {
    let value = rule.require_text(key)?;
    SqlSecurity::validate_identifier(value)?;
    Ok(value)
}

/// Validates an optional identifier parameter.
pub(crate) fn optional_identifier_param<'r>(
    rule: &'r RuleSpec,
    key: &str,
) -> Result<Option<&'r str>> {
    match rule.text(key)? {
        Some(value) => {
            SqlSecurity::validate_identifier(value)?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// Executes a descriptor on behalf of a rule.
pub(crate) async fn fetch(
    source: &dyn DataSource,
    query: &QueryDescriptor,
    ctx: &EvaluationContext,
) -> Result<Vec<Row>> {
    let rows = source.execute(query).await?;
    log_data_op!(
        ctx.log,
        source = %source.description(),
        query = %truncate_field(&format!("{query:?}"), ctx.log.max_field_length),
        rows = rows.len(),
        "Descriptor executed"
    );
    Ok(rows)
}

/// Reads the single count produced by an ungrouped `CountRows` descriptor.
pub(crate) fn single_count(rows: &[Row], table: &str) -> Result<u64> {
    let value = rows
        .first()
        .and_then(|row| row.first())
        .ok_or_else(|| GuardError::query(table, "count query returned no rows"))?;
    value
        .as_i64()
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| {
            GuardError::query(table, format!("count query returned non-count value {value}"))
        })
}

/// Formats a threshold without a trailing `.0` for integral values.
pub(crate) fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}
