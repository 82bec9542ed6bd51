//! Runs an ordered rule list and produces a [`Report`].
//!
//! ## Phases
//!
//! 1. **Validate**: every rule is resolved through the [`RuleRegistry`] and
//!    validated by its evaluator. Any configuration error aborts the run
//!    before a single query executes.
//! 2. **Plan**: schema-driven null checks are expanded (see [`plan`](super::plan)).
//!    Schema lookups run under the rule timeout and stop on cancellation.
//! 3. **Evaluate**: up to `max_concurrency` rules run at once, each on its own
//!    connection and under its own timeout.
//! 4. **Reorder**: results are put back in plan order before aggregation, so a
//!    concurrent run produces the same report as a sequential one.
//! 5. **Finalize**: the [`ResultAggregator`] seals the report.
//!
//! ## States
//!
//! ```text
//! Idle ──run──▶ Running ──▶ Completed   (no execution errors)
//!                       ├─▶ Failed      (some rule raised an execution error)
//!                       └─▶ Cancelled   (cancellation token fired)
//! ```
//!
//! FAIL results do not make a run `Failed`; only execution errors do. The
//! caller reads [`Report::overall_status`] for the business verdict and
//! [`RunOutcome::state`] for whether the run itself can be trusted.

use super::plan::{needs_schema, plan_rules, PlannedRule};
use super::{CheckResult, EvaluationContext, Report, ResultAggregator, RuleRegistry, RuleSpec};
use crate::config::format_duration;
use crate::error::{GuardError, Result};
use crate::logging::LogConfig;
use crate::sink::ReportSink;
use crate::sources::SourceProvider;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Lifecycle of an [`Orchestrator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl OrchestratorState {
    /// Returns true for states a run ends in.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrchestratorState::Completed | OrchestratorState::Failed | OrchestratorState::Cancelled
        )
    }
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrchestratorState::Idle => "idle",
            OrchestratorState::Running => "running",
            OrchestratorState::Completed => "completed",
            OrchestratorState::Failed => "failed",
            OrchestratorState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// How a rule that exceeds its time budget is recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// A FAIL result with a timeout detail; the run can still complete
    #[default]
    RecordAsFailure,
    /// An execution error, like a lost connection; the run ends `Failed`
    TreatAsConnectionError,
}

/// Execution settings for one run.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Default per-rule time budget, overridable per rule with `timeout`
    pub rule_timeout: Duration,
    /// Upper bound on concurrently evaluated rules
    pub max_concurrency: usize,
    /// How timeouts are recorded
    pub timeout_policy: TimeoutPolicy,
    /// Reference instant for windowed rules; `None` means the run start
    pub as_of: Option<DateTime<Utc>>,
    /// Columns never expanded by schema-driven null checks
    pub null_check_exclusions: Vec<String>,
    /// Log verbosity handed to evaluators
    pub log: LogConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            rule_timeout: Duration::from_secs(30),
            max_concurrency: num_cpus::get(),
            timeout_policy: TimeoutPolicy::default(),
            as_of: None,
            null_check_exclusions: Vec::new(),
            log: LogConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Evaluates one rule at a time.
    pub fn sequential() -> Self {
        Self {
            max_concurrency: 1,
            ..Self::default()
        }
    }

    pub fn with_rule_timeout(mut self, timeout: Duration) -> Self {
        self.rule_timeout = timeout;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_timeout_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.timeout_policy = policy;
        self
    }

    pub fn with_as_of(mut self, as_of: DateTime<Utc>) -> Self {
        self.as_of = Some(as_of);
        self
    }

    pub fn with_null_check_exclusions<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.null_check_exclusions = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_log_config(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }
}

/// A rule that produced no result because it raised an execution error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFailure {
    /// Position of the rule in the declared list
    pub index: usize,
    /// Rule label
    pub rule: String,
    /// Error message
    pub error: String,
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// The finalized report
    pub report: Report,
    /// Terminal state of the run
    pub state: OrchestratorState,
    /// Rules that raised execution errors, in declaration order
    pub failures: Vec<RuleFailure>,
}

impl RunOutcome {
    /// Returns true if every rule ran to a result.
    pub fn is_trustworthy(&self) -> bool {
        self.state == OrchestratorState::Completed
    }
}

/// Drives a rule list through evaluation.
///
/// # Examples
///
/// ```rust,no_run
/// use dq_guard::core::{Orchestrator, OrchestratorConfig, RuleRegistry, RuleSpec};
/// use dq_guard::sources::{MemoryDatabase, MemoryProvider};
/// use std::sync::Arc;
///
/// # async fn example(db: MemoryDatabase) -> dq_guard::error::Result<()> {
/// let mut orchestrator = Orchestrator::new(
///     RuleRegistry::with_builtin_rules(),
///     Arc::new(MemoryProvider::new(db)),
///     OrchestratorConfig::default(),
/// );
/// let outcome = orchestrator
///     .run(&[RuleSpec::null_check("Customer", "Email")])
///     .await?;
/// println!("{} ({})", outcome.report.overall_status(), outcome.state);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Orchestrator {
    registry: RuleRegistry,
    provider: Arc<dyn SourceProvider>,
    config: OrchestratorConfig,
    state: OrchestratorState,
}

enum Evaluated {
    Result(CheckResult),
    Failure(RuleFailure),
}

/// Report position of an evaluated item: declared index, then plan position.
type Slot = (usize, usize);

impl Orchestrator {
    pub fn new(
        registry: RuleRegistry,
        provider: Arc<dyn SourceProvider>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            registry,
            provider,
            config,
            state: OrchestratorState::Idle,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Runs `rules` to completion.
    pub async fn run(&mut self, rules: &[RuleSpec]) -> Result<RunOutcome> {
        self.run_with_cancellation(rules, CancellationToken::new()).await
    }

    /// Runs `rules`, abandoning in-flight evaluations if `cancel` fires.
    ///
    /// Results that completed before cancellation are kept and the report is
    /// marked incomplete. Abandoned rules contribute nothing.
    #[instrument(skip(self, rules, cancel), fields(
        run.rules = rules.len(),
        run.max_concurrency = self.config.max_concurrency
    ))]
    pub async fn run_with_cancellation(
        &mut self,
        rules: &[RuleSpec],
        cancel: CancellationToken,
    ) -> Result<RunOutcome> {
        if self.state != OrchestratorState::Idle {
            return Err(GuardError::OrchestratorState(format!(
                "cannot start a run from state '{}'",
                self.state
            )));
        }
        if self.config.max_concurrency == 0 {
            return Err(GuardError::configuration("max_concurrency must be at least 1"));
        }

        self.state = OrchestratorState::Running;
        info!(run.rules = rules.len(), "Starting rule run");
        let start = Instant::now();

        if let Err(e) = self.validate(rules) {
            self.state = OrchestratorState::Idle;
            error!(error = %e, "Rule validation failed; nothing was evaluated");
            return Err(e);
        }

        let ctx = EvaluationContext::new(self.config.as_of.unwrap_or_else(Utc::now))
            .with_log_config(self.config.log.clone());

        let planning = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            plan = self.plan(rules) => Some(plan),
        };

        let (mut evaluated, cancelled) = match planning {
            Some((planned, mut unplanned)) => {
                debug!(run.planned = planned.len(), "Rule plan ready");
                let (evaluated, cancelled) = self.evaluate_all(planned, &ctx, &cancel).await;
                unplanned.extend(evaluated);
                (unplanned, cancelled)
            }
            None => {
                warn!("Run cancelled while planning; nothing was evaluated");
                (Vec::new(), true)
            }
        };

        evaluated.sort_by_key(|(slot, _)| *slot);
        let mut failures = Vec::new();
        let mut aggregator = ResultAggregator::new();
        for (_, item) in evaluated {
            match item {
                Evaluated::Result(result) => aggregator.add(result)?,
                Evaluated::Failure(failure) => failures.push(failure),
            }
        }
        failures.sort_by_key(|f| f.index);

        if cancelled {
            aggregator.mark_incomplete()?;
        }
        let report = aggregator.finalize();

        self.state = if cancelled {
            OrchestratorState::Cancelled
        } else if failures.is_empty() {
            OrchestratorState::Completed
        } else {
            OrchestratorState::Failed
        };

        let summary = report.summary();
        info!(
            run.state = %self.state,
            run.status = %report.overall_status(),
            run.passed = summary.passed_checks,
            run.failed = summary.failed_checks,
            run.timed_out = summary.timed_out_checks,
            run.errors = failures.len(),
            run.duration_ms = start.elapsed().as_millis() as u64,
            "Rule run finished"
        );

        Ok(RunOutcome {
            report,
            state: self.state,
            failures,
        })
    }

    /// Forwards a finalized report to a sink.
    ///
    /// Sink errors are returned to the caller; they never alter the report.
    #[instrument(skip(outcome, sink), fields(sink = %sink.name()))]
    pub async fn emit(outcome: &RunOutcome, sink: &dyn ReportSink) -> Result<()> {
        let fingerprint = outcome.report.fingerprint()?;
        info!(
            report.fingerprint = %fingerprint,
            report.status = %outcome.report.overall_status(),
            report.complete = outcome.report.is_complete(),
            "Emitting report"
        );
        sink.emit(&outcome.report).await.map_err(|e| {
            error!(error = %e, "Report sink failed");
            e
        })
    }

    fn validate(&self, rules: &[RuleSpec]) -> Result<()> {
        for rule in rules {
            let evaluator = self.registry.resolve(rule.kind)?;
            evaluator.validate(rule)?;
            rule.timeout()?;
        }
        Ok(())
    }

    /// Expands the rule list. Rules that could not be planned come back as
    /// already evaluated items: a timeout goes through the [`TimeoutPolicy`],
    /// anything else becomes a [`RuleFailure`].
    async fn plan(&self, rules: &[RuleSpec]) -> (Vec<PlannedRule>, Vec<(Slot, Evaluated)>) {
        let budget = self.config.rule_timeout;
        let mut connect_failure = None;
        let schema_source = if needs_schema(rules) {
            match tokio::time::timeout(budget, self.provider.connect()).await {
                Ok(Ok(source)) => Some(source),
                Ok(Err(e)) => {
                    warn!(error = %e, "Cannot connect to resolve schema-driven rules");
                    connect_failure = Some(e);
                    None
                }
                Err(_) => {
                    warn!(
                        rule.timeout = %format_duration(budget),
                        "Connecting to resolve schema-driven rules timed out"
                    );
                    connect_failure = Some(GuardError::RuleTimeout {
                        rule: "schema planning".to_string(),
                        timeout: budget,
                    });
                    None
                }
            }
        } else {
            None
        };

        let plan = plan_rules(
            rules,
            schema_source.as_deref(),
            &self.config.null_check_exclusions,
            budget,
        )
        .await;

        let mut unplanned = Vec::with_capacity(plan.failures.len());
        for (index, rule, planning_error) in plan.failures {
            let cause = connect_failure.as_ref().unwrap_or(&planning_error);
            let item = match cause {
                GuardError::RuleTimeout { timeout, .. } => {
                    warn!(
                        rule = %rule.label(),
                        rule.timeout = %format_duration(*timeout),
                        "Schema lookup timed out"
                    );
                    timed_out(&rule, index, *timeout, self.config.timeout_policy)
                }
                other => {
                    warn!(rule = %rule.label(), error = %other, "Rule could not be planned");
                    Evaluated::Failure(RuleFailure {
                        index,
                        rule: rule.label(),
                        error: other.to_string(),
                    })
                }
            };
            unplanned.push(((index, 0), item));
        }
        (plan.rules, unplanned)
    }

    async fn evaluate_all(
        &self,
        planned: Vec<PlannedRule>,
        ctx: &EvaluationContext,
        cancel: &CancellationToken,
    ) -> (Vec<(Slot, Evaluated)>, bool) {
        let registry = &self.registry;
        let policy = self.config.timeout_policy;
        let tasks = planned.into_iter().enumerate().map(|(position, rule)| {
            let timeout = rule
                .spec
                .timeout()
                .ok()
                .flatten()
                .unwrap_or(self.config.rule_timeout);
            let provider = Arc::clone(&self.provider);
            async move {
                let slot = (rule.declared, position);
                let item = evaluate_one(registry, provider, rule, ctx, timeout, policy).await;
                (slot, item)
            }
        });

        let limit = self.config.max_concurrency.max(1);
        let mut in_flight = std::pin::pin!(stream::iter(tasks).buffer_unordered(limit));
        let mut evaluated = Vec::new();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(
                        run.finished = evaluated.len(),
                        "Run cancelled; abandoning in-flight rules"
                    );
                    return (evaluated, true);
                }
                next = in_flight.next() => match next {
                    Some(item) => evaluated.push(item),
                    None => return (evaluated, false),
                },
            }
        }
    }
}

async fn evaluate_one(
    registry: &RuleRegistry,
    provider: Arc<dyn SourceProvider>,
    rule: PlannedRule,
    ctx: &EvaluationContext,
    timeout: Duration,
    policy: TimeoutPolicy,
) -> Evaluated {
    let label = rule.spec.label();
    debug!(rule = %label, "Evaluating rule");
    let start = Instant::now();

    let attempt = tokio::time::timeout(timeout, async {
        let evaluator = registry.resolve(rule.spec.kind)?;
        let source = provider.connect().await?;
        evaluator.evaluate(&rule.spec, source.as_ref(), ctx).await
    })
    .await;

    match attempt {
        Ok(Ok(result)) => {
            debug!(
                rule = %label,
                rule.status = %result.status(),
                rule.violations = result.violation_count(),
                rule.duration_ms = start.elapsed().as_millis() as u64,
                "Rule evaluated"
            );
            Evaluated::Result(result)
        }
        Ok(Err(e)) => {
            error!(rule = %label, error = %e, "Rule raised an execution error");
            Evaluated::Failure(RuleFailure {
                index: rule.declared,
                rule: label,
                error: e.to_string(),
            })
        }
        Err(_) => {
            warn!(
                rule = %label,
                rule.timeout = %format_duration(timeout),
                "Rule timed out"
            );
            timed_out(&rule.spec, rule.declared, timeout, policy)
        }
    }
}

fn timed_out(rule: &RuleSpec, index: usize, timeout: Duration, policy: TimeoutPolicy) -> Evaluated {
    match policy {
        TimeoutPolicy::RecordAsFailure => Evaluated::Result(CheckResult::timed_out(rule, timeout)),
        TimeoutPolicy::TreatAsConnectionError => Evaluated::Failure(RuleFailure {
            index,
            rule: rule.label(),
            error: GuardError::RuleTimeout {
                rule: rule.label(),
                timeout,
            }
            .to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CheckStatus, Value};
    use crate::sources::{MemoryDatabase, MemoryProvider, MemoryTable};

    fn provider() -> Arc<dyn SourceProvider> {
        let db = MemoryDatabase::new()
            .with_table(
                MemoryTable::new("Customer")
                    .column("CustomerID", "Int64", false)
                    .column("Email", "Utf8", false)
                    .row([Value::Int(1), Value::from("a@x.vn")])
                    .row([Value::Int(2), Value::Null]),
            )
            .unwrap();
        Arc::new(MemoryProvider::new(db))
    }

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(
            RuleRegistry::with_builtin_rules(),
            provider(),
            OrchestratorConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_run_completes_with_fail_result() {
        let mut orch = orchestrator();
        let outcome = orch
            .run(&[
                RuleSpec::null_check("Customer", "Email"),
                RuleSpec::uniqueness("Customer", "CustomerID"),
            ])
            .await
            .unwrap();
        assert_eq!(outcome.state, OrchestratorState::Completed);
        assert!(outcome.is_trustworthy());
        assert_eq!(outcome.report.overall_status(), CheckStatus::Fail);
        assert_eq!(outcome.report.results()[0].violation_count(), 1);
        assert_eq!(orch.state(), OrchestratorState::Completed);
    }

    #[tokio::test]
    async fn test_second_run_is_rejected() {
        let mut orch = orchestrator();
        orch.run(&[]).await.unwrap();
        let err = orch.run(&[]).await.unwrap_err();
        assert!(matches!(err, GuardError::OrchestratorState(_)));
    }

    #[tokio::test]
    async fn test_configuration_error_returns_to_idle() {
        let mut orch = orchestrator();
        let bad = RuleSpec::new(crate::core::RuleKind::FormatCheck, "Customer").column("Email");
        let err = orch.run(&[bad]).await.unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(orch.state(), OrchestratorState::Idle);
    }

    #[tokio::test]
    async fn test_unknown_kind_fails_fast() {
        let mut orch =
            Orchestrator::new(RuleRegistry::new(), provider(), OrchestratorConfig::default());
        let err = orch
            .run(&[RuleSpec::null_check("Customer", "Email")])
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::UnknownRuleKind(_)));
    }

    #[tokio::test]
    async fn test_query_error_marks_run_failed_but_keeps_other_results() {
        let mut orch = orchestrator();
        let outcome = orch
            .run(&[
                RuleSpec::null_check("Missing", "Email"),
                RuleSpec::null_check("Customer", "CustomerID"),
            ])
            .await
            .unwrap();
        assert_eq!(outcome.state, OrchestratorState::Failed);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].index, 0);
        assert_eq!(outcome.report.results().len(), 1);
        assert_eq!(outcome.report.overall_status(), CheckStatus::Pass);
    }
}
