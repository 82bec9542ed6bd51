//! Core types of the dq-guard rule engine.
//!
//! ## Overview
//!
//! - **[`RuleSpec`]**: a declarative check (kind, table, columns, parameters)
//! - **[`RuleEvaluator`]**: executes one rule kind against a [`DataSource`](crate::sources::DataSource)
//! - **[`RuleRegistry`]**: maps each [`RuleKind`] to its evaluator
//! - **[`CheckResult`]**: the uniform outcome of one rule
//! - **[`ResultAggregator`]** / **[`Report`]**: ordered results with derived overall status
//! - **[`Orchestrator`]**: validates, plans, evaluates and aggregates a rule list
//!
//! ## Architecture
//!
//! ```text
//! Orchestrator
//!     ├── RuleRegistry ──resolve(kind)──▶ RuleEvaluator
//!     │                                       └── DataSource (one connection per rule)
//!     └── ResultAggregator ──finalize──▶ Report ──▶ ReportSink
//! ```
//!
//! ## Example
//!
//! ```rust
//! use dq_guard::core::{CheckStatus, Orchestrator, OrchestratorConfig, RuleRegistry, RuleSpec, Value};
//! use dq_guard::sources::{MemoryDatabase, MemoryProvider, MemoryTable};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> dq_guard::error::Result<()> {
//! let db = MemoryDatabase::new().with_table(
//!     MemoryTable::new("Customer")
//!         .column("CustomerID", "Int64", false)
//!         .column("Email", "Utf8", false)
//!         .row([Value::Int(1), Value::from("an@bank.vn")])
//!         .row([Value::Int(2), Value::Null]),
//! )?;
//!
//! let mut orchestrator = Orchestrator::new(
//!     RuleRegistry::with_builtin_rules(),
//!     Arc::new(MemoryProvider::new(db)),
//!     OrchestratorConfig::default(),
//! );
//! let outcome = orchestrator
//!     .run(&[RuleSpec::null_check("Customer", "Email")])
//!     .await?;
//!
//! assert!(outcome.is_trustworthy());
//! assert_eq!(outcome.report.overall_status(), CheckStatus::Fail);
//! assert_eq!(outcome.report.results()[0].details(), "1 null values found");
//! # Ok(())
//! # }
//! ```

mod aggregator;
mod evaluator;
mod orchestrator;
pub mod plan;
mod registry;
mod report;
mod result;
mod rule;
mod value;

pub use aggregator::ResultAggregator;
pub use evaluator::{EvaluationContext, RuleEvaluator};
pub use orchestrator::{
    Orchestrator, OrchestratorConfig, OrchestratorState, RuleFailure, RunOutcome, TimeoutPolicy,
};
pub use registry::{EvaluatorFactory, RuleRegistry};
pub use report::{Report, ReportSummary};
pub use result::{CheckResult, CheckStatus};
pub use rule::{ParamValue, RuleKind, RuleSpec};
pub use value::{Row, Value, ValueKey};
