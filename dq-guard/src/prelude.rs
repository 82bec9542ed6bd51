//! Prelude for commonly used types and traits in dq-guard.

pub use crate::config::EngineConfig;
pub use crate::core::{
    CheckResult, CheckStatus, EvaluationContext, Orchestrator, OrchestratorConfig,
    OrchestratorState, Report, RuleEvaluator, RuleKind, RuleRegistry, RuleSpec, RunOutcome,
    TimeoutPolicy, Value,
};
pub use crate::error::{GuardError, Result};
pub use crate::logging::LogConfig;
pub use crate::sink::{FileSink, LogSink, ReportSink, WriterSink};
pub use crate::sources::{
    DataSource, MemoryDatabase, MemoryProvider, MemoryTable, SessionProvider, SessionSource,
    SourceProvider,
};
