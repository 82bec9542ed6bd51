//! Rendering of [`QueryDescriptor`]s to SQL.
//!
//! Every identifier passes through [`SqlSecurity::escape_identifier`] and every
//! literal through [`SqlSecurity::quote_literal`], so no user-influenced text
//! reaches the SQL engine unescaped.

use super::{Aggregate, Predicate, QueryDescriptor};
use crate::core::Value;
use crate::error::{GuardError, Result};
use crate::security::SqlSecurity;

/// Renders a descriptor as a single SELECT statement.
///
/// # Examples
///
/// ```rust
/// use dq_guard::sources::{sql, Predicate, QueryDescriptor};
///
/// let q = QueryDescriptor::table("Customer")
///     .select(["CustomerID"])
///     .filter(Predicate::IsNull("Email".into()));
/// assert_eq!(
///     sql::render(&q).unwrap(),
///     "SELECT \"CustomerID\" FROM \"Customer\" WHERE \"Email\" IS NULL"
/// );
/// ```
pub fn render(query: &QueryDescriptor) -> Result<String> {
    let table = SqlSecurity::escape_identifier(&query.table)?;

    let mut sql = String::from("SELECT ");
    if query.is_aggregate() {
        let mut items = escape_all(&query.group_by)?;
        for (i, aggregate) in query.aggregates.iter().enumerate() {
            items.push(match aggregate {
                Aggregate::CountRows => format!("COUNT(*) AS \"agg_{i}\""),
                Aggregate::Sum(column) => format!(
                    "SUM({}) AS \"agg_{i}\"",
                    SqlSecurity::escape_identifier(column)?
                ),
            });
        }
        sql.push_str(&items.join(", "));
    } else {
        if query.columns.is_empty() {
            return Err(GuardError::query(
                &query.table,
                "descriptor selects no columns",
            ));
        }
        if query.distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(&escape_all(&query.columns)?.join(", "));
    }

    sql.push_str(" FROM ");
    sql.push_str(&table);

    if let Some(filter) = &query.filter {
        sql.push_str(" WHERE ");
        sql.push_str(&render_predicate(filter)?);
    }

    if !query.group_by.is_empty() {
        sql.push_str(" GROUP BY ");
        sql.push_str(&escape_all(&query.group_by)?.join(", "));
    }

    Ok(sql)
}

fn escape_all(columns: &[String]) -> Result<Vec<String>> {
    columns
        .iter()
        .map(|c| SqlSecurity::escape_identifier(c))
        .collect()
}

/// Renders a predicate as a boolean SQL expression.
pub fn render_predicate(predicate: &Predicate) -> Result<String> {
    let column = SqlSecurity::escape_identifier;
    Ok(match predicate {
        Predicate::IsNull(c) => format!("{} IS NULL", column(c)?),
        Predicate::IsNotNull(c) => format!("{} IS NOT NULL", column(c)?),
        Predicate::Eq(c, v) => format!("{} = {}", column(c)?, render_literal(v)?),
        Predicate::Gt(c, v) => format!("{} > {}", column(c)?, render_literal(v)?),
        Predicate::GtEq(c, v) => format!("{} >= {}", column(c)?, render_literal(v)?),
        Predicate::InSet(c, values) => {
            if values.is_empty() {
                "FALSE".to_string()
            } else {
                let list = values
                    .iter()
                    .map(render_literal)
                    .collect::<Result<Vec<_>>>()?;
                format!("{} IN ({})", column(c)?, list.join(", "))
            }
        }
        Predicate::And(parts) => join_parts(parts, " AND ", "TRUE")?,
        Predicate::Or(parts) => join_parts(parts, " OR ", "FALSE")?,
        Predicate::Not(inner) => format!("NOT ({})", render_predicate(inner)?),
    })
}

fn join_parts(parts: &[Predicate], separator: &str, empty: &str) -> Result<String> {
    if parts.is_empty() {
        return Ok(empty.to_string());
    }
    let rendered = parts
        .iter()
        .map(render_predicate)
        .collect::<Result<Vec<_>>>()?;
    Ok(format!("({})", rendered.join(separator)))
}

/// Renders a literal value.
pub fn render_literal(value: &Value) -> Result<String> {
    Ok(match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Int(v) => v.to_string(),
        Value::Float(v) => {
            if !v.is_finite() {
                return Err(GuardError::Security(format!(
                    "non-finite float literal {v} cannot be rendered"
                )));
            }
            format!("{v:?}")
        }
        Value::Text(s) => SqlSecurity::quote_literal(s)?,
        Value::Timestamp(ts) => format!(
            "CAST('{}' AS TIMESTAMP)",
            ts.format("%Y-%m-%d %H:%M:%S%.6f")
        ),
    })
}
