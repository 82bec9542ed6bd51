//! # dq-guard - Declarative Data Quality Rules for Rust
//!
//! dq-guard evaluates an ordered list of declarative data-quality rules
//! against a relational dataset and produces one uniform [`CheckResult`]
//! per rule, aggregated into a [`Report`] whose overall status is FAIL
//! whenever any rule failed.
//!
//! ## Quick Start
//!
//! ```rust
//! use dq_guard::prelude::*;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> dq_guard::error::Result<()> {
//! let db = MemoryDatabase::new().with_table(
//!     MemoryTable::new("Customer")
//!         .column("CustomerID", "Int64", false)
//!         .column("CCCD_Passport", "Utf8", false)
//!         .row([Value::Int(1), Value::from("012345678901")])
//!         .row([Value::Int(2), Value::from("0123456789012")]),
//! )?;
//!
//! let rules = vec![
//!     RuleSpec::uniqueness("Customer", "CCCD_Passport"),
//!     RuleSpec::format("Customer", "CCCD_Passport", r"\d{12}"),
//! ];
//!
//! let mut orchestrator = Orchestrator::new(
//!     RuleRegistry::with_builtin_rules(),
//!     Arc::new(MemoryProvider::new(db)),
//!     OrchestratorConfig::default(),
//! );
//! let outcome = orchestrator.run(&rules).await?;
//!
//! assert_eq!(outcome.state, OrchestratorState::Completed);
//! assert_eq!(outcome.report.overall_status(), CheckStatus::Fail);
//! assert_eq!(outcome.report.results()[1].details(), "1 invalid values found");
//!
//! Orchestrator::emit(&outcome, &LogSink).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Rule Kinds
//!
//! - **Null check**: rows with an absent value; with no column, every
//!   non-nullable column of the table (resolved from the schema)
//! - **Uniqueness check**: values occurring more than once
//! - **Format check**: values not matching an anchored pattern
//! - **Foreign key check**: child values with no (valid) parent row
//! - **Aggregate threshold check**: groups summing over a threshold with no
//!   strong authentication evidence
//!
//! ## Data Sources
//!
//! Evaluators describe reads as [`sources::QueryDescriptor`]s. Any
//! [`sources::DataSource`] can serve them:
//!
//! - [`sources::MemorySource`]: an in-process snapshot
//! - [`sources::SessionSource`]: a DataFusion `SessionContext`; descriptors
//!   are rendered to SQL with validated identifiers and escaped literals
//!
//! ```rust,no_run
//! use dq_guard::prelude::*;
//! use datafusion::prelude::{CsvReadOptions, SessionContext};
//! use std::sync::Arc;
//!
//! # async fn example() -> dq_guard::error::Result<()> {
//! let ctx = SessionContext::new();
//! ctx.register_csv("Customer", "data/customer.csv", CsvReadOptions::new()).await?;
//!
//! let config = dq_guard::presets::banking_config();
//! let mut orchestrator = Orchestrator::new(
//!     RuleRegistry::with_builtin_rules(),
//!     Arc::new(SessionProvider::new(ctx)),
//!     config.orchestrator_config(),
//! );
//! let outcome = orchestrator.run(&config.rules).await?;
//! Orchestrator::emit(&outcome, &FileSink::json("dq_report.json")).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **`core`**: rules, results, reports, the registry and the orchestrator
//! - **`rules`**: the built-in evaluators
//! - **`sources`**: the data-source boundary and its implementations
//! - **`sink`**: report formatters and sinks
//! - **`config`**: JSON engine configuration
//! - **`presets`**: the banking rule set
//! - **`logging`**: `tracing` configuration
//! - **`security`**: identifier and pattern validation
//!
//! [`CheckResult`]: core::CheckResult
//! [`Report`]: core::Report

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod prelude;
pub mod presets;
pub mod rules;
pub mod security;
pub mod sink;
pub mod sources;
