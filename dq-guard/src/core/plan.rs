//! Rule planning: turns declared rules into the concrete list to evaluate.
//!
//! A NullCheck with no columns stands for "every non-nullable column of the
//! table". Planning resolves it against the source schema, in schema order,
//! minus the exclusion set. Each `describe` runs under the rule's time
//! budget; a budget overrun is reported as a [`GuardError::RuleTimeout`]
//! for that rule alone.

use super::{RuleKind, RuleSpec};
use crate::error::{GuardError, Result};
use crate::sources::DataSource;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

/// A rule ready for evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedRule {
    /// Position of the originating rule in the declared list
    pub declared: usize,
    /// Concrete rule
    pub spec: RuleSpec,
}

/// The outcome of planning.
#[derive(Debug, Default)]
pub struct Plan {
    /// Rules to evaluate, in report order
    pub rules: Vec<PlannedRule>,
    /// Declared rules that could not be expanded
    pub failures: Vec<(usize, RuleSpec, GuardError)>,
}

/// Returns true if any rule needs the source schema to be planned.
pub fn needs_schema(rules: &[RuleSpec]) -> bool {
    rules.iter().any(is_schema_driven)
}

fn is_schema_driven(rule: &RuleSpec) -> bool {
    rule.kind == RuleKind::NullCheck && rule.columns.is_empty()
}

/// Expands `rules` into a [`Plan`].
///
/// `source` is only consulted for schema-driven rules and may be `None` when
/// [`needs_schema`] is false. A `describe` failure or timeout affects only
/// the rule that needed it. `default_timeout` applies to rules without a
/// `timeout` parameter.
pub async fn plan_rules(
    rules: &[RuleSpec],
    source: Option<&dyn DataSource>,
    exclusions: &[String],
    default_timeout: Duration,
) -> Plan {
    let mut plan = Plan::default();

    for (declared, rule) in rules.iter().enumerate() {
        if !is_schema_driven(rule) {
            plan.rules.push(PlannedRule {
                declared,
                spec: rule.clone(),
            });
            continue;
        }

        let budget = rule.timeout().ok().flatten().unwrap_or(default_timeout);
        let expansion =
            tokio::time::timeout(budget, expand_null_check(rule, source, exclusions)).await;
        match expansion {
            Ok(Ok(expanded)) => {
                debug!(
                    rule.table = %rule.table,
                    rule.expanded = expanded.len(),
                    "Expanded schema-driven null check"
                );
                plan.rules
                    .extend(expanded.into_iter().map(|spec| PlannedRule { declared, spec }));
            }
            Ok(Err(e)) => plan.failures.push((declared, rule.clone(), e)),
            Err(_) => plan.failures.push((
                declared,
                rule.clone(),
                GuardError::RuleTimeout {
                    rule: rule.label(),
                    timeout: budget,
                },
            )),
        }
    }

    plan
}

async fn expand_null_check(
    rule: &RuleSpec,
    source: Option<&dyn DataSource>,
    exclusions: &[String],
) -> Result<Vec<RuleSpec>> {
    let source = source.ok_or_else(|| {
        GuardError::connection("planner", "no data source available to resolve the schema")
    })?;
    let schema = source.describe(&rule.table).await?;

    let mut excluded: HashSet<&str> = exclusions.iter().map(String::as_str).collect();
    if let Some(extra) = rule.list("exclude")? {
        excluded.extend(extra.iter().map(String::as_str));
    }

    Ok(schema
        .non_nullable_columns()
        .into_iter()
        .filter(|column| !excluded.contains(column))
        .map(|column| {
            let mut spec = rule.clone().column(column);
            spec.params.remove("exclude");
            spec
        })
        .collect())
}
