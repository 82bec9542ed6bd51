//! Declarative rule specifications.
//!
//! A [`RuleSpec`] is plain data: a kind, a target table, the columns the rule
//! looks at and a bag of named parameters. Which parameters are required is
//! decided by the evaluator registered for the kind, and checked before any
//! rule runs.

use crate::config::parse_duration;
use crate::error::{GuardError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// The built-in rule categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// Counts absent values in a column
    NullCheck,
    /// Counts values that occur more than once
    UniquenessCheck,
    /// Counts values not matching an anchored pattern
    FormatCheck,
    /// Counts child values without a parent row
    ForeignKeyCheck,
    /// Counts groups over a sum threshold that lack strong-auth evidence
    AggregateThresholdCheck,
}

impl RuleKind {
    /// All built-in kinds, in registration order.
    pub const ALL: [RuleKind; 5] = [
        RuleKind::NullCheck,
        RuleKind::UniquenessCheck,
        RuleKind::FormatCheck,
        RuleKind::ForeignKeyCheck,
        RuleKind::AggregateThresholdCheck,
    ];

    /// Machine name, as used in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::NullCheck => "null_check",
            RuleKind::UniquenessCheck => "uniqueness_check",
            RuleKind::FormatCheck => "format_check",
            RuleKind::ForeignKeyCheck => "foreign_key_check",
            RuleKind::AggregateThresholdCheck => "aggregate_threshold_check",
        }
    }

    /// Human-readable label used as the default `check_name`.
    pub fn label(&self) -> &'static str {
        match self {
            RuleKind::NullCheck => "Null Check",
            RuleKind::UniquenessCheck => "Uniqueness Check",
            RuleKind::FormatCheck => "Format Check",
            RuleKind::ForeignKeyCheck => "Foreign Key Integrity",
            RuleKind::AggregateThresholdCheck => "Aggregate Threshold Check",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleKind {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self> {
        RuleKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| GuardError::UnknownRuleKind(s.to_string()))
    }
}

/// A rule parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl ParamValue {
    fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "boolean",
            ParamValue::Number(_) => "number",
            ParamValue::Text(_) => "string",
            ParamValue::List(_) => "list",
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Number(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Number(v as f64)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Text(v)
    }
}

impl<S: Into<String>> From<Vec<S>> for ParamValue {
    fn from(v: Vec<S>) -> Self {
        ParamValue::List(v.into_iter().map(Into::into).collect())
    }
}

/// Declarative description of a single check.
///
/// # Examples
///
/// ```rust
/// use dq_guard::core::{RuleKind, RuleSpec};
///
/// let rule = RuleSpec::format("Customer", "CCCD_Passport", r"\d{12}");
/// assert_eq!(rule.kind, RuleKind::FormatCheck);
/// assert_eq!(rule.text("pattern").unwrap(), Some(r"\d{12}"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    /// Rule category
    pub kind: RuleKind,
    /// Primary target relation
    pub table: String,
    /// Columns relevant to the rule, in order
    #[serde(default)]
    pub columns: Vec<String>,
    /// Named parameters
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, ParamValue>,
    /// Optional display name replacing the kind label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl RuleSpec {
    /// Creates a rule with no columns and no parameters.
    pub fn new(kind: RuleKind, table: impl Into<String>) -> Self {
        Self {
            kind,
            table: table.into(),
            columns: Vec::new(),
            params: BTreeMap::new(),
            name: None,
        }
    }

    /// Null check on a single column.
    pub fn null_check(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::new(RuleKind::NullCheck, table).column(column)
    }

    /// Null check over every non-nullable column of `table`, resolved from
    /// the source schema at plan time.
    pub fn null_check_all(table: impl Into<String>) -> Self {
        Self::new(RuleKind::NullCheck, table)
    }

    /// Uniqueness check on a single column.
    pub fn uniqueness(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::new(RuleKind::UniquenessCheck, table).column(column)
    }

    /// Anchored format check on a single column.
    pub fn format(
        table: impl Into<String>,
        column: impl Into<String>,
        pattern: impl Into<String>,
    ) -> Self {
        Self::new(RuleKind::FormatCheck, table)
            .column(column)
            .param("pattern", ParamValue::Text(pattern.into()))
    }

    /// Referential integrity check from `table.column` to `parent_table.parent_key`.
    pub fn foreign_key(
        table: impl Into<String>,
        column: impl Into<String>,
        parent_table: impl Into<String>,
        parent_key: impl Into<String>,
    ) -> Self {
        Self::new(RuleKind::ForeignKeyCheck, table)
            .column(column)
            .param("parent_table", ParamValue::Text(parent_table.into()))
            .param("parent_key", ParamValue::Text(parent_key.into()))
    }

    /// Appends a column.
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.columns.push(column.into());
        self
    }

    /// Replaces the column list.
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Sets a parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Sets the display name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Name reported in results: the display name if set, else the kind label.
    pub fn check_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.kind.label().to_string())
    }

    /// Column reported in results. Multi-column rules get a `/`-joined label.
    pub fn column_label(&self) -> Option<String> {
        match self.columns.len() {
            0 => None,
            1 => Some(self.columns[0].clone()),
            _ => Some(self.columns.join("/")),
        }
    }

    /// Short description for logs and error messages.
    pub fn label(&self) -> String {
        match self.column_label() {
            Some(column) => format!("{} on {}.{}", self.check_name(), self.table, column),
            None => format!("{} on {}", self.check_name(), self.table),
        }
    }

    /// Returns a raw parameter.
    pub fn param_value(&self, key: &str) -> Option<&ParamValue> {
        self.params.get(key)
    }

    /// Returns a string parameter, failing if it is present with another type.
    pub fn text(&self, key: &str) -> Result<Option<&str>> {
        match self.params.get(key) {
            None => Ok(None),
            Some(ParamValue::Text(s)) => Ok(Some(s)),
            Some(other) => Err(self.wrong_type(key, "string", other)),
        }
    }

    /// Returns a required string parameter.
    pub fn require_text(&self, key: &str) -> Result<&str> {
        self.text(key)?.ok_or_else(|| self.missing(key))
    }

    /// Returns a numeric parameter.
    pub fn number(&self, key: &str) -> Result<Option<f64>> {
        match self.params.get(key) {
            None => Ok(None),
            Some(ParamValue::Number(n)) if n.is_finite() => Ok(Some(*n)),
            Some(ParamValue::Number(n)) => Err(GuardError::configuration(format!(
                "rule '{}': parameter '{key}' must be finite, got {n}",
                self.label()
            ))),
            Some(other) => Err(self.wrong_type(key, "number", other)),
        }
    }

    /// Returns a required numeric parameter.
    pub fn require_number(&self, key: &str) -> Result<f64> {
        self.number(key)?.ok_or_else(|| self.missing(key))
    }

    /// Returns a list parameter.
    pub fn list(&self, key: &str) -> Result<Option<&[String]>> {
        match self.params.get(key) {
            None => Ok(None),
            Some(ParamValue::List(items)) => Ok(Some(items)),
            Some(other) => Err(self.wrong_type(key, "list", other)),
        }
    }

    /// Returns a required, non-empty list parameter.
    pub fn require_list(&self, key: &str) -> Result<&[String]> {
        let items = self.list(key)?.ok_or_else(|| self.missing(key))?;
        if items.is_empty() {
            return Err(GuardError::configuration(format!(
                "rule '{}': parameter '{key}' must not be empty",
                self.label()
            )));
        }
        Ok(items)
    }

    /// Returns a boolean parameter, defaulting to false.
    pub fn flag(&self, key: &str) -> Result<bool> {
        match self.params.get(key) {
            None => Ok(false),
            Some(ParamValue::Bool(b)) => Ok(*b),
            Some(other) => Err(self.wrong_type(key, "boolean", other)),
        }
    }

    /// Returns a duration parameter such as `"1d"` or `"500ms"`.
    pub fn duration(&self, key: &str) -> Result<Option<Duration>> {
        match self.text(key)? {
            None => Ok(None),
            Some(raw) => parse_duration(raw).map(Some).map_err(|e| {
                GuardError::configuration(format!(
                    "rule '{}': parameter '{key}': {e}",
                    self.label()
                ))
            }),
        }
    }

    /// Per-rule timeout override.
    pub fn timeout(&self) -> Result<Option<Duration>> {
        self.duration("timeout")
    }

    /// Fails unless the rule names exactly `expected` columns.
    pub fn expect_columns(&self, expected: usize) -> Result<()> {
        if self.columns.len() != expected {
            return Err(GuardError::configuration(format!(
                "rule '{}' expects {expected} column(s), got {}",
                self.label(),
                self.columns.len()
            )));
        }
        Ok(())
    }

    fn missing(&self, key: &str) -> GuardError {
        GuardError::configuration(format!(
            "rule '{}' requires parameter '{key}'",
            self.label()
        ))
    }

    fn wrong_type(&self, key: &str, expected: &str, got: &ParamValue) -> GuardError {
        GuardError::configuration(format!(
            "rule '{}': parameter '{key}' must be a {expected}, got a {}",
            self.label(),
            got.type_name()
        ))
    }
}
