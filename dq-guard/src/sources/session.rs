//! DataFusion-backed [`DataSource`].
//!
//! Descriptors are rendered to SQL with [`sql::render`](super::sql::render) and
//! executed against a shared [`SessionContext`]. Result batches are converted
//! column by column into [`Value`]s.

use super::{sql, ColumnInfo, DataSource, QueryDescriptor, SourceProvider, TableSchema};
use crate::core::{Row, Value};
use crate::error::{GuardError, Result};
use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray,
    TimestampMicrosecondArray,
};
use arrow::compute::cast;
use arrow::datatypes::{DataType, TimeUnit};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::DateTime;
use datafusion::common::TableReference;
use datafusion::datasource::{MemTable, TableProvider};
use datafusion::prelude::SessionContext;
use std::sync::Arc;
use tracing::{debug, instrument};

/// A connection to a DataFusion session.
#[derive(Clone)]
pub struct SessionSource {
    ctx: SessionContext,
}

impl std::fmt::Debug for SessionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSource")
            .field("session_id", &self.ctx.session_id())
            .finish()
    }
}

impl SessionSource {
    /// Wraps an existing session. Tables must already be registered.
    pub fn new(ctx: SessionContext) -> Self {
        Self { ctx }
    }

    /// Registers a record batch as an in-memory table.
    ///
    /// The name is registered verbatim, so `PaymentTransaction` stays
    /// `PaymentTransaction` rather than being folded to lower case.
    pub fn register_batch(&self, table: &str, batch: RecordBatch) -> Result<()> {
        let provider = MemTable::try_new(batch.schema(), vec![vec![batch]])?;
        self.ctx
            .register_table(TableReference::bare(table), Arc::new(provider))?;
        Ok(())
    }

    /// Returns the underlying session.
    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }
}

#[async_trait]
impl DataSource for SessionSource {
    #[instrument(skip(self, query), fields(table = %query.table))]
    async fn execute(&self, query: &QueryDescriptor) -> Result<Vec<Row>> {
        let statement = sql::render(query)?;
        debug!(sql = %statement, "executing rendered query");

        let batches = self
            .ctx
            .sql(&statement)
            .await
            .map_err(|e| GuardError::query(&query.table, e.to_string()))?
            .collect()
            .await
            .map_err(|e| GuardError::query(&query.table, e.to_string()))?;

        let mut rows = Vec::new();
        for batch in &batches {
            rows.extend(batch_to_rows(batch)?);
        }
        debug!(rows = rows.len(), "datafusion query executed");
        Ok(rows)
    }

    async fn describe(&self, table: &str) -> Result<TableSchema> {
        let provider = self
            .ctx
            .table_provider(TableReference::bare(table))
            .await
            .map_err(|e| GuardError::query(table, e.to_string()))?;
        let columns = provider
            .schema()
            .fields()
            .iter()
            .map(|f| ColumnInfo::new(f.name(), f.data_type().to_string(), f.is_nullable()))
            .collect();
        Ok(TableSchema {
            table: table.to_string(),
            columns,
        })
    }

    fn description(&self) -> String {
        format!("datafusion session {}", self.ctx.session_id())
    }
}

/// Provider sharing one [`SessionContext`] across connections.
///
/// Cloning a context is cheap; each clone shares the catalog but executes
/// independently.
#[derive(Debug, Clone)]
pub struct SessionProvider {
    source: SessionSource,
}

impl SessionProvider {
    /// Wraps a session whose tables are already registered.
    pub fn new(ctx: SessionContext) -> Self {
        Self {
            source: SessionSource::new(ctx),
        }
    }

    /// Returns the shared source, e.g. to register more tables.
    pub fn source(&self) -> &SessionSource {
        &self.source
    }
}

#[async_trait]
impl SourceProvider for SessionProvider {
    async fn connect(&self) -> Result<Arc<dyn DataSource>> {
        Ok(Arc::new(self.source.clone()))
    }
}

fn batch_to_rows(batch: &RecordBatch) -> Result<Vec<Row>> {
    let columns = batch
        .columns()
        .iter()
        .map(column_values)
        .collect::<Result<Vec<_>>>()?;

    let mut rows: Vec<Row> = (0..batch.num_rows())
        .map(|_| Vec::with_capacity(columns.len()))
        .collect();
    for column in columns {
        for (row, value) in rows.iter_mut().zip(column) {
            row.push(value);
        }
    }
    Ok(rows)
}

fn column_values(array: &ArrayRef) -> Result<Vec<Value>> {
    let len = array.len();
    let values = match array.data_type() {
        DataType::Null => vec![Value::Null; len],
        DataType::Boolean => {
            let typed = downcast::<BooleanArray>(array)?;
            (0..len)
                .map(|i| Value::from(typed.is_valid(i).then(|| typed.value(i))))
                .collect()
        }
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32 => {
            let cast_array = cast(array, &DataType::Int64)?;
            let typed = downcast::<Int64Array>(&cast_array)?;
            (0..len)
                .map(|i| Value::from(typed.is_valid(i).then(|| typed.value(i))))
                .collect()
        }
        DataType::UInt64
        | DataType::Float16
        | DataType::Float32
        | DataType::Float64
        | DataType::Decimal128(_, _)
        | DataType::Decimal256(_, _) => {
            let cast_array = cast(array, &DataType::Float64)?;
            let typed = downcast::<Float64Array>(&cast_array)?;
            (0..len)
                .map(|i| Value::from(typed.is_valid(i).then(|| typed.value(i))))
                .collect()
        }
        DataType::Timestamp(_, tz) => {
            timestamps(array, DataType::Timestamp(TimeUnit::Microsecond, tz.clone()))?
        }
        DataType::Date32 | DataType::Date64 => {
            timestamps(array, DataType::Timestamp(TimeUnit::Microsecond, None))?
        }
        _ => {
            let cast_array = cast(array, &DataType::Utf8)?;
            let typed = downcast::<StringArray>(&cast_array)?;
            (0..len)
                .map(|i| Value::from(typed.is_valid(i).then(|| typed.value(i))))
                .collect()
        }
    };
    Ok(values)
}

fn timestamps(array: &ArrayRef, target: DataType) -> Result<Vec<Value>> {
    let cast_array = cast(array, &target)?;
    let typed = downcast::<TimestampMicrosecondArray>(&cast_array)?;
    Ok((0..typed.len())
        .map(|i| {
            if typed.is_valid(i) {
                DateTime::from_timestamp_micros(typed.value(i))
                    .map_or(Value::Null, Value::Timestamp)
            } else {
                Value::Null
            }
        })
        .collect())
}

fn downcast<T: 'static>(array: &ArrayRef) -> Result<&T> {
    array.as_any().downcast_ref::<T>().ok_or_else(|| {
        GuardError::Arrow(arrow::error::ArrowError::CastError(format!(
            "unexpected array type {}",
            array.data_type()
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{Aggregate, Predicate};
    use arrow::datatypes::{Field, Schema};

    fn source() -> SessionSource {
        let schema = Arc::new(Schema::new(vec![
            Field::new("CustomerID", DataType::Int64, false),
            Field::new("Email", DataType::Utf8, true),
            Field::new("Score", DataType::Float64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3])),
                Arc::new(StringArray::from(vec![Some("a@x.vn"), None, Some("a@x.vn")])),
                Arc::new(Float64Array::from(vec![Some(1.5), Some(2.0), None])),
            ],
        )
        .unwrap();
        let src = SessionSource::new(SessionContext::new());
        src.register_batch("Customer", batch).unwrap();
        src
    }

    #[tokio::test]
    async fn test_mixed_case_table_and_null_filter() {
        let rows = source()
            .execute(
                &QueryDescriptor::table("Customer")
                    .select(["CustomerID"])
                    .filter(Predicate::IsNull("Email".into())),
            )
            .await
            .unwrap();
        assert_eq!(rows, vec![vec![Value::Int(2)]]);
    }

    #[tokio::test]
    async fn test_grouped_count_values() {
        let rows = source()
            .execute(
                &QueryDescriptor::table("Customer")
                    .filter(Predicate::IsNotNull("Email".into()))
                    .group_by(["Email"])
                    .aggregate(Aggregate::CountRows),
            )
            .await
            .unwrap();
        assert_eq!(rows, vec![vec![Value::from("a@x.vn"), Value::Int(2)]]);
    }

    #[tokio::test]
    async fn test_sum_and_nulls_convert() {
        let rows = source()
            .execute(&QueryDescriptor::table("Customer").aggregate(Aggregate::Sum("Score".into())))
            .await
            .unwrap();
        assert_eq!(rows, vec![vec![Value::Float(3.5)]]);
    }

    #[tokio::test]
    async fn test_describe_reports_nullability() {
        let schema = source().describe("Customer").await.unwrap();
        assert_eq!(schema.non_nullable_columns(), vec!["CustomerID"]);
        assert_eq!(schema.columns[1].data_type, "Utf8");
    }

    #[tokio::test]
    async fn test_missing_table_is_query_error() {
        let src = source();
        let err = src
            .execute(&QueryDescriptor::table("Missing").select(["x"]))
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::Query { .. }));
        assert!(src.describe("Missing").await.is_err());
    }
}
