//! The polymorphic rule executor interface.

use super::{CheckResult, RuleSpec};
use crate::error::Result;
use crate::logging::LogConfig;
use crate::sources::DataSource;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;

/// Run-scoped inputs shared by every evaluation.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    /// Reference instant for windowed rules ("the last day" ends here)
    pub as_of: DateTime<Utc>,
    /// Log verbosity
    pub log: LogConfig,
}

impl EvaluationContext {
    /// Context anchored at `as_of`.
    pub fn new(as_of: DateTime<Utc>) -> Self {
        Self {
            as_of,
            log: LogConfig::default(),
        }
    }

    /// Replaces the log configuration.
    pub fn with_log_config(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }
}

impl Default for EvaluationContext {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

/// Executes one rule kind.
///
/// Implementations are stateless and shared across concurrent evaluations.
/// Data-quality violations are never errors: they are reported through the
/// returned [`CheckResult`]. Errors are reserved for malformed specs
/// (`validate`) and data-source failures (`evaluate`).
///
/// # Examples
///
/// ```rust,ignore
/// #[derive(Debug)]
/// struct RowCountEvaluator;
///
/// #[async_trait]
/// impl RuleEvaluator for RowCountEvaluator {
///     fn validate(&self, rule: &RuleSpec) -> Result<()> {
///         rule.expect_columns(0)
///     }
///
///     async fn evaluate(&self, rule: &RuleSpec, source: &dyn DataSource, _ctx: &EvaluationContext) -> Result<CheckResult> {
///         let rows = source.execute(&QueryDescriptor::table(&rule.table).aggregate(Aggregate::CountRows)).await?;
///         // ...
///     }
/// }
/// ```
#[async_trait]
pub trait RuleEvaluator: Debug + Send + Sync {
    /// Checks that `rule` carries everything this kind needs.
    ///
    /// Called for every rule before any evaluation starts.
    fn validate(&self, rule: &RuleSpec) -> Result<()>;

    /// Evaluates `rule` against `source`.
    async fn evaluate(
        &self,
        rule: &RuleSpec,
        source: &dyn DataSource,
        ctx: &EvaluationContext,
    ) -> Result<CheckResult>;
}
