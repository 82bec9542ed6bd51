//! In-process relational snapshot implementing [`DataSource`].

use super::{
    Aggregate, ColumnInfo, DataSource, Predicate, QueryDescriptor, SourceProvider, TableSchema,
};
use crate::core::{Row, Value, ValueKey};
use crate::error::{GuardError, Result};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument};

/// A table with a declared schema and its rows.
#[derive(Debug, Clone)]
pub struct MemoryTable {
    schema: TableSchema,
    rows: Vec<Row>,
}

impl MemoryTable {
    /// Creates an empty table with no columns.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: TableSchema {
                table: name.into(),
                columns: Vec::new(),
            },
            rows: Vec::new(),
        }
    }

    /// Declares a column. `nullable = false` marks it NOT NULL in the schema;
    /// the snapshot still stores whatever rows it is given.
    pub fn column(
        mut self,
        name: impl Into<String>,
        data_type: impl Into<String>,
        nullable: bool,
    ) -> Self {
        self.schema
            .columns
            .push(ColumnInfo::new(name, data_type, nullable));
        self
    }

    /// Appends a row.
    pub fn row<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.rows.push(values.into_iter().map(Into::into).collect());
        self
    }

    /// Appends several rows.
    pub fn rows(mut self, rows: Vec<Row>) -> Self {
        self.rows.extend(rows);
        self
    }

    /// Returns the table name.
    pub fn name(&self) -> &str {
        &self.schema.table
    }

    /// Returns the declared schema.
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Returns the stored rows.
    pub fn data(&self) -> &[Row] {
        &self.rows
    }

    fn validate(&self) -> Result<()> {
        let width = self.schema.columns.len();
        if let Some((index, row)) = self
            .rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != width)
        {
            return Err(GuardError::configuration(format!(
                "Row {index} of table '{}' has {} values but the schema declares {width} columns",
                self.schema.table,
                row.len()
            )));
        }
        Ok(())
    }

    fn column_index(&self, column: &str) -> Result<usize> {
        self.schema.position(column).ok_or_else(|| {
            GuardError::query(
                &self.schema.table,
                format!("unknown column '{column}'"),
            )
        })
    }
}

/// A named collection of [`MemoryTable`]s.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    tables: HashMap<String, MemoryTable>,
}

impl MemoryDatabase {
    /// Creates an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table, rejecting rows whose width does not match the schema.
    pub fn with_table(mut self, table: MemoryTable) -> Result<Self> {
        self.insert_table(table)?;
        Ok(self)
    }

    /// Adds or replaces a table.
    pub fn insert_table(&mut self, table: MemoryTable) -> Result<()> {
        table.validate()?;
        self.tables.insert(table.name().to_string(), table);
        Ok(())
    }

    /// Looks up a table.
    pub fn table(&self, name: &str) -> Option<&MemoryTable> {
        self.tables.get(name)
    }

    fn require(&self, name: &str) -> Result<&MemoryTable> {
        self.tables
            .get(name)
            .ok_or_else(|| GuardError::query(name, "table not found"))
    }
}

/// A connection to a shared [`MemoryDatabase`].
#[derive(Debug, Clone)]
pub struct MemorySource {
    db: Arc<MemoryDatabase>,
}

impl MemorySource {
    /// Creates a source over a database snapshot.
    pub fn new(db: Arc<MemoryDatabase>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DataSource for MemorySource {
    #[instrument(skip(self, query), fields(table = %query.table))]
    async fn execute(&self, query: &QueryDescriptor) -> Result<Vec<Row>> {
        let table = self.db.require(&query.table)?;
        let rows = run_query(table, query)?;
        debug!(rows = rows.len(), "memory query executed");
        Ok(rows)
    }

    async fn describe(&self, table: &str) -> Result<TableSchema> {
        Ok(self.db.require(table)?.schema.clone())
    }

    fn description(&self) -> String {
        format!("memory database ({} tables)", self.db.tables.len())
    }
}

/// Provider handing out cheap clones of a shared snapshot.
#[derive(Debug, Clone)]
pub struct MemoryProvider {
    db: Arc<MemoryDatabase>,
}

impl MemoryProvider {
    /// Wraps a database snapshot.
    pub fn new(db: MemoryDatabase) -> Self {
        Self { db: Arc::new(db) }
    }
}

#[async_trait]
impl SourceProvider for MemoryProvider {
    async fn connect(&self) -> Result<Arc<dyn DataSource>> {
        Ok(Arc::new(MemorySource::new(Arc::clone(&self.db))))
    }
}

fn run_query(table: &MemoryTable, query: &QueryDescriptor) -> Result<Vec<Row>> {
    let filtered: Vec<&Row> = match &query.filter {
        Some(predicate) => {
            // Resolve columns up front so unknown columns fail even on empty tables
            for column in predicate.columns() {
                table.column_index(column)?;
            }
            let mut kept = Vec::new();
            for row in &table.rows {
                if eval_predicate(table, predicate, row)? == Some(true) {
                    kept.push(row);
                }
            }
            kept
        }
        None => table.rows.iter().collect(),
    };

    if query.is_aggregate() {
        aggregate_rows(table, query, &filtered)
    } else {
        project_rows(table, query, &filtered)
    }
}

fn project_rows(table: &MemoryTable, query: &QueryDescriptor, rows: &[&Row]) -> Result<Vec<Row>> {
    let indices = query
        .columns
        .iter()
        .map(|c| table.column_index(c))
        .collect::<Result<Vec<_>>>()?;

    let mut seen: HashSet<Vec<ValueKey>> = HashSet::new();
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let projected: Row = indices.iter().map(|&i| row[i].clone()).collect();
        if query.distinct {
            let key: Vec<ValueKey> = projected.iter().map(Value::key).collect();
            if !seen.insert(key) {
                continue;
            }
        }
        out.push(projected);
    }
    Ok(out)
}

#[derive(Debug, Default, Clone)]
struct SumAcc {
    int_total: i64,
    float_total: f64,
    is_float: bool,
    seen: bool,
}

impl SumAcc {
    fn add(&mut self, value: &Value) {
        match value {
            Value::Int(v) if !self.is_float => match self.int_total.checked_add(*v) {
                Some(total) => self.int_total = total,
                None => {
                    self.is_float = true;
                    self.float_total = self.int_total as f64 + *v as f64;
                }
            },
            other => {
                if let Some(v) = other.as_f64() {
                    if !self.is_float {
                        self.is_float = true;
                        self.float_total = self.int_total as f64;
                    }
                    self.float_total += v;
                } else {
                    return;
                }
            }
        }
        self.seen = true;
    }

    fn finish(&self) -> Value {
        match (self.seen, self.is_float) {
            (false, _) => Value::Null,
            (true, false) => Value::Int(self.int_total),
            (true, true) => Value::Float(self.float_total),
        }
    }
}

fn aggregate_rows(
    table: &MemoryTable,
    query: &QueryDescriptor,
    rows: &[&Row],
) -> Result<Vec<Row>> {
    let group_indices = query
        .group_by
        .iter()
        .map(|c| table.column_index(c))
        .collect::<Result<Vec<_>>>()?;

    let sum_indices = query
        .aggregates
        .iter()
        .map(|a| match a {
            Aggregate::CountRows => Ok(None),
            Aggregate::Sum(c) => table.column_index(c).map(Some),
        })
        .collect::<Result<Vec<_>>>()?;

    struct Group {
        values: Row,
        count: i64,
        sums: Vec<SumAcc>,
    }

    let mut order: Vec<Group> = Vec::new();
    let mut index: HashMap<Vec<ValueKey>, usize> = HashMap::new();

    // Without GROUP BY an aggregate always yields exactly one row
    if group_indices.is_empty() {
        order.push(Group {
            values: Vec::new(),
            count: 0,
            sums: vec![SumAcc::default(); sum_indices.len()],
        });
        index.insert(Vec::new(), 0);
    }

    for row in rows {
        let values: Row = group_indices.iter().map(|&i| row[i].clone()).collect();
        let key: Vec<ValueKey> = values.iter().map(Value::key).collect();
        let slot = *index.entry(key).or_insert_with(|| {
            order.push(Group {
                values,
                count: 0,
                sums: vec![SumAcc::default(); sum_indices.len()],
            });
            order.len() - 1
        });
        let group = &mut order[slot];
        group.count += 1;
        for (acc, column) in group.sums.iter_mut().zip(&sum_indices) {
            if let Some(i) = column {
                acc.add(&row[*i]);
            }
        }
    }

    Ok(order
        .into_iter()
        .map(|group| {
            let mut out = group.values;
            for (aggregate, acc) in query.aggregates.iter().zip(&group.sums) {
                out.push(match aggregate {
                    Aggregate::CountRows => Value::Int(group.count),
                    Aggregate::Sum(_) => acc.finish(),
                });
            }
            out
        })
        .collect())
}

fn cell<'r>(table: &MemoryTable, row: &'r Row, column: &str) -> Result<&'r Value> {
    Ok(&row[table.column_index(column)?])
}

fn eval_predicate(table: &MemoryTable, predicate: &Predicate, row: &Row) -> Result<Option<bool>> {
    let value_of = |column: &str| cell(table, row, column);

    Ok(match predicate {
        Predicate::IsNull(c) => Some(value_of(c)?.is_null()),
        Predicate::IsNotNull(c) => Some(!value_of(c)?.is_null()),
        Predicate::Eq(c, v) => value_of(c)?.compare(v).map(|o| o == Ordering::Equal),
        Predicate::Gt(c, v) => value_of(c)?.compare(v).map(|o| o == Ordering::Greater),
        Predicate::GtEq(c, v) => value_of(c)?.compare(v).map(|o| o != Ordering::Less),
        Predicate::InSet(c, set) => {
            let value = value_of(c)?;
            if value.is_null() {
                None
            } else if set
                .iter()
                .any(|candidate| value.compare(candidate) == Some(Ordering::Equal))
            {
                Some(true)
            } else if set.iter().any(Value::is_null) {
                None
            } else {
                Some(false)
            }
        }
        Predicate::And(parts) => {
            let mut unknown = false;
            for part in parts {
                match eval_predicate(table, part, row)? {
                    Some(false) => return Ok(Some(false)),
                    None => unknown = true,
                    Some(true) => {}
                }
            }
            if unknown {
                None
            } else {
                Some(true)
            }
        }
        Predicate::Or(parts) => {
            let mut unknown = false;
            for part in parts {
                match eval_predicate(table, part, row)? {
                    Some(true) => return Ok(Some(true)),
                    None => unknown = true,
                    Some(false) => {}
                }
            }
            if unknown {
                None
            } else {
                Some(false)
            }
        }
        Predicate::Not(inner) => eval_predicate(table, inner, row)?.map(|b| !b),
    })
}
