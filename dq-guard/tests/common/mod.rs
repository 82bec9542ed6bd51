//! Shared fixtures for integration tests.
//!
//! `banking_db` is a small payment dataset with known defects:
//!
//! - Customer 2 has no email; customers 1 and 4 share one
//! - Customer 3 has a 5-digit CCCD
//! - BankAccount 103 points at a customer that does not exist
//! - Transaction 2 is a weakly authenticated 12M transfer
//! - Transactions 2 and 3 come from a Suspicious device
//! - Customer 2 moved 21M in the last day without strong auth
//!
//! `clean_banking_tables` fixes every defect except the missing email.

#![allow(dead_code)]

use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray, TimestampMicrosecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use dq_guard::core::{Row, Value};
use dq_guard::error::{GuardError, Result};
use dq_guard::presets::BANKING_TABLES;
use dq_guard::sources::{
    DataSource, MemoryDatabase, MemoryProvider, MemoryTable, QueryDescriptor, SessionSource,
    SourceProvider, TableSchema,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Reference instant of the fixture.
pub fn as_of() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, 20, 0, 0, 0).unwrap()
}

fn hours_before(hours: i64) -> Value {
    Value::Timestamp(as_of() - chrono::Duration::hours(hours))
}

fn int(v: i64) -> Value {
    Value::Int(v)
}

fn text(v: &str) -> Value {
    Value::from(v)
}

fn customer() -> MemoryTable {
    MemoryTable::new("Customer")
        .column("CustomerID", "Int64", false)
        .column("FirstName", "Utf8", false)
        .column("LastName", "Utf8", false)
        .column("Email", "Utf8", false)
        .column("CCCD_Passport", "Utf8", false)
}

fn bank_account() -> MemoryTable {
    MemoryTable::new("BankAccount")
        .column("AccountID", "Int64", false)
        .column("CustomerID", "Int64", false)
        .column("AccountNumber", "Utf8", false)
        .column("Balance", "Float64", false)
        .row([int(100), int(1), text("ACC100"), Value::Float(50_000_000.0)])
        .row([int(101), int(2), text("ACC101"), Value::Float(30_000_000.0)])
        .row([int(102), int(3), text("ACC102"), Value::Float(10_000_000.0)])
}

fn card() -> MemoryTable {
    MemoryTable::new("Card")
        .column("CardID", "Int64", false)
        .column("AccountID", "Int64", false)
        .column("CardNumber", "Utf8", false)
        .row([int(500), int(100), text("4111111111111111")])
        .row([int(501), int(101), text("4222222222222222")])
}

fn merchant() -> MemoryTable {
    MemoryTable::new("Merchant")
        .column("MerchantID", "Int64", false)
        .column("Name", "Utf8", false)
        .row([int(700), text("Saigon Market")])
}

fn device(second_status: &str) -> MemoryTable {
    MemoryTable::new("Device")
        .column("DeviceID", "Int64", false)
        .column("CustomerID", "Int64", false)
        .column("DeviceFingerprint", "Utf8", false)
        .column("Status", "Utf8", false)
        .row([int(10), int(1), text("fp-a"), text("Verified")])
        .row([int(11), int(2), text("fp-b"), text(second_status)])
        .row([int(12), int(3), text("fp-c"), text("Verified")])
}

fn authentication_log(second_kind: &str) -> MemoryTable {
    MemoryTable::new("AuthenticationLog")
        .column("AuthLogID", "Int64", false)
        .column("CustomerID", "Int64", false)
        .column("DeviceID", "Int64", false)
        .column("TransactionID", "Int64", true)
        .column("AuthType", "Utf8", false)
        .row([int(1000), int(1), int(10), int(1), text("OTP")])
        .row([int(1001), int(2), int(11), int(2), text(second_kind)])
        .row([int(1002), int(3), int(12), int(4), text("Biometric")])
}

fn payment_transaction() -> MemoryTable {
    MemoryTable::new("PaymentTransaction")
        .column("TransactionID", "Int64", false)
        .column("AccountID", "Int64", false)
        .column("CardID", "Int64", true)
        .column("MerchantID", "Int64", false)
        .column("DeviceID", "Int64", true)
        .column("AuthLogID", "Int64", true)
        .column("Amount", "Float64", false)
        .column("TransactionDate", "Timestamp", false)
        .row([
            int(1),
            int(100),
            int(500),
            int(700),
            int(10),
            int(1000),
            Value::Float(15_000_000.0),
            hours_before(2),
        ])
        .row([
            int(2),
            int(101),
            int(501),
            int(700),
            int(11),
            int(1001),
            Value::Float(12_000_000.0),
            hours_before(3),
        ])
        .row([
            int(3),
            int(101),
            Value::Null,
            int(700),
            int(11),
            Value::Null,
            Value::Float(9_000_000.0),
            hours_before(4),
        ])
        .row([
            int(4),
            int(102),
            Value::Null,
            int(700),
            int(12),
            int(1002),
            Value::Float(5_000_000.0),
            hours_before(5),
        ])
}

fn fraud_alert() -> MemoryTable {
    MemoryTable::new("FraudAlert")
        .column("AlertID", "Int64", false)
        .column("CustomerID", "Int64", false)
        .column("TransactionID", "Int64", false)
        .column("DeviceID", "Int64", true)
        .column("AuthLogID", "Int64", true)
        .row([int(1), int(2), int(2), int(11), int(1001)])
}

/// The defective banking dataset described at the top of this module.
pub fn banking_tables() -> Vec<MemoryTable> {
    vec![
        customer()
            .row([int(1), text("An"), text("Nguyen"), text("an@bank.vn"), text("012345678901")])
            .row([int(2), text("Binh"), text("Tran"), Value::Null, text("123456789012")])
            .row([int(3), text("Chi"), text("Le"), text("chi@bank.vn"), text("12345")])
            .row([int(4), text("Dung"), text("Pham"), text("an@bank.vn"), text("234567890123")]),
        bank_account().row([int(103), int(9), text("ACC103"), Value::Float(0.0)]),
        card(),
        merchant(),
        device("Suspicious"),
        authentication_log("Password"),
        payment_transaction(),
        fraud_alert(),
    ]
}

/// A consistent banking dataset whose only defect is customer 2's missing
/// email. Customer 2 still moves 21M in a day, but with OTP evidence.
pub fn clean_banking_tables() -> Vec<MemoryTable> {
    vec![
        customer()
            .row([int(1), text("An"), text("Nguyen"), text("an@bank.vn"), text("012345678901")])
            .row([int(2), text("Binh"), text("Tran"), Value::Null, text("123456789012")])
            .row([int(3), text("Chi"), text("Le"), text("chi@bank.vn"), text("345678901234")])
            .row([int(4), text("Dung"), text("Pham"), text("dung@bank.vn"), text("234567890123")]),
        bank_account(),
        card(),
        merchant(),
        device("Verified"),
        authentication_log("OTP"),
        payment_transaction(),
        fraud_alert(),
    ]
}

fn database(tables: Vec<MemoryTable>) -> MemoryDatabase {
    let mut db = MemoryDatabase::new();
    for table in tables {
        db.insert_table(table).unwrap();
    }
    db
}

pub fn banking_db() -> MemoryDatabase {
    database(banking_tables())
}

pub fn banking_provider() -> Arc<MemoryProvider> {
    Arc::new(MemoryProvider::new(banking_db()))
}

pub fn clean_banking_provider() -> Arc<MemoryProvider> {
    Arc::new(MemoryProvider::new(database(clean_banking_tables())))
}

/// Converts a memory table into an Arrow batch. Every field is declared
/// nullable, since the fixture deliberately violates NOT NULL.
pub fn to_record_batch(table: &MemoryTable) -> RecordBatch {
    let schema = table.schema();
    let mut fields = Vec::new();
    let mut columns: Vec<ArrayRef> = Vec::new();

    for (i, column) in schema.columns.iter().enumerate() {
        let cells = table.data().iter().map(|row| &row[i]);
        let (data_type, array): (DataType, ArrayRef) = match column.data_type.as_str() {
            "Int64" => (
                DataType::Int64,
                Arc::new(Int64Array::from(cells.map(Value::as_i64).collect::<Vec<_>>())),
            ),
            "Float64" => (
                DataType::Float64,
                Arc::new(Float64Array::from(cells.map(Value::as_f64).collect::<Vec<_>>())),
            ),
            "Timestamp" => (
                DataType::Timestamp(TimeUnit::Microsecond, None),
                Arc::new(TimestampMicrosecondArray::from(
                    cells
                        .map(|v| match v {
                            Value::Timestamp(ts) => Some(ts.timestamp_micros()),
                            _ => None,
                        })
                        .collect::<Vec<_>>(),
                )),
            ),
            _ => (
                DataType::Utf8,
                Arc::new(StringArray::from(
                    cells.map(|v| v.as_str().map(str::to_string)).collect::<Vec<_>>(),
                )),
            ),
        };
        fields.push(Field::new(&column.name, data_type, true));
        columns.push(array);
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).unwrap()
}

/// The banking fixture registered in a DataFusion session.
pub fn banking_session() -> SessionSource {
    let db = banking_db();
    let source = SessionSource::new(datafusion::prelude::SessionContext::new());
    for name in BANKING_TABLES {
        let table = db.table(name).unwrap();
        source.register_batch(name, to_record_batch(table)).unwrap();
    }
    source
}

/// Wraps a source, delaying every query and schema lookup against
/// `slow_tables`.
#[derive(Debug)]
pub struct SlowSource {
    inner: Arc<dyn DataSource>,
    slow_tables: HashSet<String>,
    delay: Duration,
}

#[async_trait]
impl DataSource for SlowSource {
    async fn execute(&self, query: &QueryDescriptor) -> Result<Vec<Row>> {
        if self.slow_tables.contains(&query.table) {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.execute(query).await
    }

    async fn describe(&self, table: &str) -> Result<TableSchema> {
        if self.slow_tables.contains(table) {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.describe(table).await
    }

    fn description(&self) -> String {
        format!("slow({})", self.inner.description())
    }
}

#[derive(Debug)]
pub struct SlowProvider {
    inner: Arc<dyn SourceProvider>,
    slow_tables: HashSet<String>,
    delay: Duration,
}

impl SlowProvider {
    pub fn new(inner: Arc<dyn SourceProvider>, slow_tables: &[&str], delay: Duration) -> Self {
        Self {
            inner,
            slow_tables: slow_tables.iter().map(|t| t.to_string()).collect(),
            delay,
        }
    }
}

#[async_trait]
impl SourceProvider for SlowProvider {
    async fn connect(&self) -> Result<Arc<dyn DataSource>> {
        Ok(Arc::new(SlowSource {
            inner: self.inner.connect().await?,
            slow_tables: self.slow_tables.clone(),
            delay: self.delay,
        }))
    }
}

/// Wraps a source, failing every query against `broken_tables` with a
/// connection error.
#[derive(Debug)]
pub struct BrokenSource {
    inner: Arc<dyn DataSource>,
    broken_tables: HashSet<String>,
}

#[async_trait]
impl DataSource for BrokenSource {
    async fn execute(&self, query: &QueryDescriptor) -> Result<Vec<Row>> {
        if self.broken_tables.contains(&query.table) {
            let message = format!("lost connection while reading {}", query.table);
            return Err(GuardError::connection("test", message));
        }
        self.inner.execute(query).await
    }

    async fn describe(&self, table: &str) -> Result<TableSchema> {
        self.inner.describe(table).await
    }

    fn description(&self) -> String {
        format!("broken({})", self.inner.description())
    }
}

#[derive(Debug)]
pub struct BrokenProvider {
    inner: Arc<dyn SourceProvider>,
    broken_tables: HashSet<String>,
}

impl BrokenProvider {
    pub fn new(inner: Arc<dyn SourceProvider>, broken_tables: &[&str]) -> Self {
        Self {
            inner,
            broken_tables: broken_tables.iter().map(|t| t.to_string()).collect(),
        }
    }
}

#[async_trait]
impl SourceProvider for BrokenProvider {
    async fn connect(&self) -> Result<Arc<dyn DataSource>> {
        Ok(Arc::new(BrokenSource {
            inner: self.inner.connect().await?,
            broken_tables: self.broken_tables.clone(),
        }))
    }
}

/// Counts connections handed out.
#[derive(Debug)]
pub struct CountingProvider {
    inner: Arc<dyn SourceProvider>,
    pub connections: AtomicUsize,
}

impl CountingProvider {
    pub fn new(inner: Arc<dyn SourceProvider>) -> Self {
        Self {
            inner,
            connections: AtomicUsize::new(0),
        }
    }

    pub fn count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceProvider for CountingProvider {
    async fn connect(&self) -> Result<Arc<dyn DataSource>> {
        self.connections.fetch_add(1, Ordering::SeqCst);
        self.inner.connect().await
    }
}
