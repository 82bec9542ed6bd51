//! Data source boundary for dq-guard.
//!
//! Rule evaluators never see SQL. They describe what they need as a
//! [`QueryDescriptor`] and hand it to a [`DataSource`], which returns typed
//! [`Row`]s. Two implementations ship with the crate:
//!
//! - [`MemorySource`]: an in-process relational snapshot, useful for tests and
//!   for small datasets already loaded by the caller.
//! - [`SessionSource`]: a DataFusion-backed source that renders descriptors to
//!   SQL through [`sql::render`].
//!
//! A [`SourceProvider`] hands out one connection per rule evaluation so that
//! concurrent evaluations never share a connection.

use crate::core::{Row, Value};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

mod memory;
mod session;
pub mod sql;

pub use memory::{MemoryDatabase, MemoryProvider, MemorySource, MemoryTable};
pub use session::{SessionProvider, SessionSource};

/// Column metadata reported by [`DataSource::describe`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,
    /// Source-specific type name (e.g. "Int64", "Utf8")
    pub data_type: String,
    /// Whether the schema allows NULL in this column
    pub nullable: bool,
}

impl ColumnInfo {
    /// Creates column metadata.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
        }
    }
}

/// The declared schema of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name
    pub table: String,
    /// Columns in declaration order
    pub columns: Vec<ColumnInfo>,
}

impl TableSchema {
    /// Returns the names of columns declared NOT NULL, in declaration order.
    pub fn non_nullable_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| !c.nullable)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Returns the position of a column.
    pub fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == column)
    }
}

/// A row filter. Comparisons follow SQL three-valued logic: a comparison
/// involving NULL is never true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    IsNull(String),
    IsNotNull(String),
    Eq(String, Value),
    Gt(String, Value),
    GtEq(String, Value),
    InSet(String, Vec<Value>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    /// Returns every column referenced by this predicate.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            Predicate::IsNull(c)
            | Predicate::IsNotNull(c)
            | Predicate::Eq(c, _)
            | Predicate::Gt(c, _)
            | Predicate::GtEq(c, _)
            | Predicate::InSet(c, _) => vec![c.as_str()],
            Predicate::And(parts) | Predicate::Or(parts) => {
                parts.iter().flat_map(Predicate::columns).collect()
            }
            Predicate::Not(inner) => inner.columns(),
        }
    }

    /// Conjunction of two predicates, flattening nested `And`s.
    pub fn and(self, other: Predicate) -> Predicate {
        match self {
            Predicate::And(mut parts) => {
                parts.push(other);
                Predicate::And(parts)
            }
            first => Predicate::And(vec![first, other]),
        }
    }
}

/// An aggregate computed per group (or over the whole filtered table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    /// Number of rows in the group
    CountRows,
    /// Sum of a numeric column, ignoring NULLs; NULL when the group has no values
    Sum(String),
}

/// A structured read request.
///
/// Output shape:
/// - if `group_by` or `aggregates` is non-empty, each row holds the group
///   columns followed by the aggregates;
/// - otherwise each row holds the projected `columns`, deduplicated when
///   `distinct` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    pub table: String,
    pub columns: Vec<String>,
    pub filter: Option<Predicate>,
    pub group_by: Vec<String>,
    pub aggregates: Vec<Aggregate>,
    pub distinct: bool,
}

impl QueryDescriptor {
    /// Starts a descriptor reading from `table`.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            filter: None,
            group_by: Vec::new(),
            aggregates: Vec::new(),
            distinct: false,
        }
    }

    /// Sets the projected columns.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a filter, conjoined with any existing one.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    /// Sets the grouping columns.
    pub fn group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Appends an aggregate.
    pub fn aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregates.push(aggregate);
        self
    }

    /// Deduplicates projected rows.
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Returns true if the descriptor produces grouped/aggregated output.
    pub fn is_aggregate(&self) -> bool {
        !self.group_by.is_empty() || !self.aggregates.is_empty()
    }
}

/// A queryable relational store.
///
/// Implementations perform reads only. Failures are reported as
/// [`GuardError::Connection`](crate::error::GuardError::Connection) when the
/// store is unreachable and [`GuardError::Query`](crate::error::GuardError::Query)
/// when a descriptor cannot be translated or executed. Neither is retried here.
#[async_trait]
pub trait DataSource: Debug + Send + Sync {
    /// Executes a descriptor and returns its rows.
    async fn execute(&self, query: &QueryDescriptor) -> Result<Vec<Row>>;

    /// Returns the declared schema of a table.
    async fn describe(&self, table: &str) -> Result<TableSchema>;

    /// Returns a human-readable description of this source.
    fn description(&self) -> String;
}

/// Hands out [`DataSource`] connections.
#[async_trait]
pub trait SourceProvider: Debug + Send + Sync {
    /// Opens a connection for a single rule evaluation.
    async fn connect(&self) -> Result<Arc<dyn DataSource>>;
}
