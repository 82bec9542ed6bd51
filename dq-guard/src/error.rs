//! Error types for the dq-guard rule engine.
//!
//! Errors follow a two-tier taxonomy. Ordinary data-quality violations are
//! never errors: they are encoded as failing [`CheckResult`](crate::core::CheckResult)s.
//! Everything in [`GuardError`] is either a configuration problem (fatal before
//! any rule runs) or an execution problem (fatal for one rule, surfaced to the
//! orchestrator).

use std::time::Duration;
use thiserror::Error;

/// The main error type for dq-guard.
#[derive(Error, Debug)]
pub enum GuardError {
    /// A rule spec or engine configuration is malformed.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The underlying store could not be reached.
    #[error("Connection error ({source_type}): {message}")]
    Connection {
        /// Kind of data source (e.g. "memory", "datafusion")
        source_type: String,
        /// Detailed error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A query descriptor could not be translated or executed.
    #[error("Query error on '{table}': {message}")]
    Query {
        /// Table the descriptor targeted
        table: String,
        /// Detailed error message
        message: String,
    },

    /// No evaluator is registered for the requested rule kind.
    #[error("Unknown rule kind: {0}")]
    UnknownRuleKind(String),

    /// A result was added to an aggregator that was already finalized.
    #[error("Result aggregator is closed; no results can be added after finalize")]
    AggregatorClosed,

    /// A rule exceeded its time budget.
    #[error("Rule '{rule}' timed out after {timeout:?}")]
    RuleTimeout {
        /// Label of the rule that timed out
        rule: String,
        /// The budget that was exceeded
        timeout: Duration,
    },

    /// The orchestrator was driven through an invalid state transition.
    #[error("Invalid orchestrator state: {0}")]
    OrchestratorState(String),

    /// A report sink failed to persist or emit a report.
    #[error("Report sink '{sink}' failed: {message}")]
    Sink {
        /// Name of the sink
        sink: String,
        /// Detailed error message
        message: String,
    },

    /// Security-related error (unsafe identifier, literal or pattern).
    #[error("Security error: {0}")]
    Security(String),

    /// Error from serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Error from I/O operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from DataFusion operations.
    #[error("DataFusion error: {0}")]
    DataFusion(#[from] datafusion::error::DataFusionError),

    /// Error from Arrow operations.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

/// A type alias for `Result<T, GuardError>`.
pub type Result<T> = std::result::Result<T, GuardError>;

impl GuardError {
    /// Creates a new configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates a new connection error.
    pub fn connection(source_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            source_type: source_type.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new connection error with a source error.
    pub fn connection_with_source(
        source_type: impl Into<String>,
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Connection {
            source_type: source_type.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    /// Creates a new query error.
    pub fn query(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Query {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Creates a new sink error.
    pub fn sink(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Sink {
            sink: sink.into(),
            message: message.into(),
        }
    }

    /// Returns true for errors that must stop a run before any rule executes.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::UnknownRuleKind(_) | Self::Security(_)
        )
    }

    /// Returns true for per-rule execution failures (store unreachable, bad query, timeout).
    pub fn is_execution(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::Query { .. }
                | Self::RuleTimeout { .. }
                | Self::DataFusion(_)
                | Self::Arrow(_)
        )
    }
}

impl From<serde_json::Error> for GuardError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
