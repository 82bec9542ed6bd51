//! Aggregate threshold check.
//!
//! Rows of the primary table are grouped by an entity key and summed. A
//! group violates the rule when its sum exceeds `threshold` *and* none of its
//! rows is linked to strong authentication evidence. Both conditions must
//! hold: a high total that was strongly authenticated passes.
//!
//! | Parameter | Meaning |
//! |-----------|---------|
//! | `group_by` | entity key (on the lookup table if one is set, else on the primary table) |
//! | `sum_column` | summed column of the primary table |
//! | `threshold` | strict upper bound on the sum |
//! | `evidence_table` / `evidence_key` | evidence rows and their id |
//! | `evidence_link` | primary column pointing at `evidence_key` |
//! | `evidence_column` / `strong_auth_kinds` | an evidence row is strong when this column is one of the kinds |
//! | `timestamp_column` + `window` | only rows with `timestamp >= as_of - window` |
//! | `lookup_table` / `lookup_via` / `lookup_key` | resolve the entity through `primary.lookup_via = lookup.lookup_key` |
//!
//! Rows whose link has no strong evidence row, including dangling links,
//! count as not strongly authenticated. Rows whose entity is null are
//! dropped, and with a lookup so are rows with no lookup match. Null amounts
//! add nothing; any other non-numeric amount is a configuration error.

use super::{format_number, identifier_param, optional_identifier_param, validate_target};
use crate::core::{CheckResult, EvaluationContext, RuleEvaluator, RuleSpec, Value, ValueKey};
use crate::error::{GuardError, Result};
use crate::log_rule;
use crate::sources::{DataSource, Predicate, QueryDescriptor};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, instrument};

/// Evaluator for [`RuleKind::AggregateThresholdCheck`](crate::core::RuleKind::AggregateThresholdCheck).
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregateThresholdEvaluator;

struct Window<'r> {
    timestamp_column: &'r str,
    length: Duration,
}

struct Lookup<'r> {
    table: &'r str,
    via: &'r str,
    key: &'r str,
}

struct AggregateParams<'r> {
    group_by: &'r str,
    sum_column: &'r str,
    threshold: f64,
    evidence_table: &'r str,
    evidence_link: &'r str,
    evidence_key: &'r str,
    evidence_column: &'r str,
    strong_auth_kinds: &'r [String],
    window: Option<Window<'r>>,
    lookup: Option<Lookup<'r>>,
}

impl<'r> AggregateParams<'r> {
    fn from_rule(rule: &'r RuleSpec) -> Result<Self> {
        let window = match (
            optional_identifier_param(rule, "timestamp_column")?,
            rule.duration("window")?,
        ) {
            (Some(timestamp_column), Some(length)) => Some(Window {
                timestamp_column,
                length,
            }),
            (None, None) => None,
            _ => {
                return Err(GuardError::configuration(format!(
                    "rule '{}': 'timestamp_column' and 'window' must be given together",
                    rule.label()
                )))
            }
        };

        let lookup = match (
            optional_identifier_param(rule, "lookup_table")?,
            optional_identifier_param(rule, "lookup_via")?,
            optional_identifier_param(rule, "lookup_key")?,
        ) {
            (Some(table), Some(via), Some(key)) => Some(Lookup { table, via, key }),
            (None, None, None) => None,
            _ => {
                return Err(GuardError::configuration(format!(
                    "rule '{}': 'lookup_table', 'lookup_via' and 'lookup_key' must be given together",
                    rule.label()
                )))
            }
        };

        Ok(Self {
            group_by: identifier_param(rule, "group_by")?,
            sum_column: identifier_param(rule, "sum_column")?,
            threshold: rule.require_number("threshold")?,
            evidence_table: identifier_param(rule, "evidence_table")?,
            evidence_link: identifier_param(rule, "evidence_link")?,
            evidence_key: identifier_param(rule, "evidence_key")?,
            evidence_column: identifier_param(rule, "evidence_column")?,
            strong_auth_kinds: rule.require_list("strong_auth_kinds")?,
            window,
            lookup,
        })
    }

    /// Primary-table column carrying the entity (or the lookup reference).
    fn entity_column(&self) -> &'r str {
        match &self.lookup {
            Some(lookup) => lookup.via,
            None => self.group_by,
        }
    }
}

#[derive(Debug, Default)]
struct GroupTotals {
    sum: f64,
    strong: bool,
}

/// Projects distinct column names and remembers where each landed.
fn position<'a>(columns: &mut Vec<&'a str>, column: &'a str) -> usize {
    match columns.iter().position(|c| *c == column) {
        Some(i) => i,
        None => {
            columns.push(column);
            columns.len() - 1
        }
    }
}

impl AggregateThresholdEvaluator {
    async fn strong_evidence(
        source: &dyn DataSource,
        params: &AggregateParams<'_>,
        ctx: &EvaluationContext,
    ) -> Result<HashSet<ValueKey>> {
        let kinds = params
            .strong_auth_kinds
            .iter()
            .map(|k| Value::Text(k.clone()))
            .collect();
        let query = QueryDescriptor::table(params.evidence_table)
            .select([params.evidence_key])
            .filter(Predicate::InSet(params.evidence_column.to_string(), kinds))
            .distinct();
        let rows = super::fetch(source, &query, ctx).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.first())
            .filter(|v| !v.is_null())
            .map(Value::key)
            .collect())
    }

    async fn entity_lookup(
        source: &dyn DataSource,
        params: &AggregateParams<'_>,
        lookup: &Lookup<'_>,
        ctx: &EvaluationContext,
    ) -> Result<HashMap<ValueKey, ValueKey>> {
        let query = QueryDescriptor::table(lookup.table)
            .select([lookup.key, params.group_by])
            .filter(Predicate::IsNotNull(lookup.key.to_string()));
        let rows = super::fetch(source, &query, ctx).await?;
        Ok(rows
            .iter()
            .filter_map(|row| match row.as_slice() {
                [key, entity, ..] if !entity.is_null() => Some((key.key(), entity.key())),
                _ => None,
            })
            .collect())
    }
}

#[async_trait]
impl RuleEvaluator for AggregateThresholdEvaluator {
    fn validate(&self, rule: &RuleSpec) -> Result<()> {
        validate_target(rule)?;
        AggregateParams::from_rule(rule).map(|_| ())
    }

    #[instrument(
        skip(self, rule, source, ctx),
        fields(rule.kind = "aggregate_threshold_check", rule.table = %rule.table)
    )]
    async fn evaluate(
        &self,
        rule: &RuleSpec,
        source: &dyn DataSource,
        ctx: &EvaluationContext,
    ) -> Result<CheckResult> {
        let params = AggregateParams::from_rule(rule)?;

        let mut columns = Vec::new();
        let entity_idx = position(&mut columns, params.entity_column());
        let sum_idx = position(&mut columns, params.sum_column);
        let link_idx = position(&mut columns, params.evidence_link);

        let mut query = QueryDescriptor::table(&rule.table);
        if let Some(window) = &params.window {
            let length = chrono::Duration::from_std(window.length).map_err(|e| {
                GuardError::configuration(format!("rule '{}': window too large: {e}", rule.label()))
            })?;
            let since = ctx.as_of - length;
            debug!(window.since = %since, "Applying time window");
            query = query.filter(Predicate::GtEq(
                window.timestamp_column.to_string(),
                Value::Timestamp(since),
            ));
        }
        if params.lookup.is_some() {
            query = query.filter(Predicate::IsNotNull(params.entity_column().to_string()));
        }
        let rows = super::fetch(source, &query.select(columns), ctx).await?;

        let entities = match &params.lookup {
            Some(lookup) => Some(Self::entity_lookup(source, &params, lookup, ctx).await?),
            None => None,
        };
        let strong = Self::strong_evidence(source, &params, ctx).await?;

        let mut groups: HashMap<ValueKey, GroupTotals> = HashMap::new();
        for row in &rows {
            let (Some(entity), Some(amount), Some(link)) =
                (row.get(entity_idx), row.get(sum_idx), row.get(link_idx))
            else {
                return Err(GuardError::query(&rule.table, "projection returned a short row"));
            };
            if entity.is_null() {
                continue;
            }
            let entity = match &entities {
                Some(map) => match map.get(&entity.key()) {
                    Some(resolved) => resolved.clone(),
                    None => continue,
                },
                None => entity.key(),
            };

            let amount = match amount {
                Value::Null => 0.0,
                other => other.as_f64().ok_or_else(|| {
                    GuardError::configuration(format!(
                        "rule '{}': '{}' holds non-numeric value '{other}'",
                        rule.label(),
                        params.sum_column
                    ))
                })?,
            };

            let totals = groups.entry(entity).or_default();
            totals.sum += amount;
            if !link.is_null() && strong.contains(&link.key()) {
                totals.strong = true;
            }
        }

        let violations = groups
            .values()
            .filter(|g| g.sum > params.threshold && !g.strong)
            .count() as u64;

        log_rule!(
            ctx.log,
            rows = rows.len(),
            groups = groups.len(),
            strong_evidence = strong.len(),
            violations,
            "Aggregate threshold check evaluated"
        );

        Ok(CheckResult::from_violations(
            rule,
            violations,
            format!(
                "{violations} groups with SUM({}) > {} without strong auth",
                params.sum_column,
                format_number(params.threshold)
            ),
        ))
    }
}
