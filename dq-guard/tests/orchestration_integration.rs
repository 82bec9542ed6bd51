//! Concurrency, timeouts, partial failure and cancellation.

mod common;

use async_trait::async_trait;
use common::{BrokenProvider, CountingProvider, SlowProvider};
use dq_guard::core::{
    CheckStatus, Orchestrator, OrchestratorConfig, OrchestratorState, Row, RuleRegistry, RuleSpec,
    TimeoutPolicy,
};
use dq_guard::error::{GuardError, Result};
use dq_guard::sources::{DataSource, QueryDescriptor, SourceProvider, TableSchema};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn mixed_rules() -> Vec<RuleSpec> {
    vec![
        RuleSpec::null_check("Customer", "Email"),
        RuleSpec::uniqueness("Merchant", "Name"),
        RuleSpec::format("Customer", "CCCD_Passport", r"\d{12}"),
    ]
}

fn slow_merchant(delay: Duration) -> SlowProvider {
    SlowProvider::new(common::banking_provider(), &["Merchant"], delay)
}

fn build(provider: Arc<dyn SourceProvider>, config: OrchestratorConfig) -> Orchestrator {
    Orchestrator::new(RuleRegistry::with_builtin_rules(), provider, config)
}

#[tokio::test]
async fn test_timeout_is_recorded_as_failure() {
    let provider = slow_merchant(Duration::from_secs(10));
    let mut orchestrator = build(
        Arc::new(provider),
        OrchestratorConfig::default().with_rule_timeout(Duration::from_millis(100)),
    );
    let outcome = orchestrator.run(&mixed_rules()).await.unwrap();

    assert_eq!(outcome.state, OrchestratorState::Completed);
    let results = outcome.report.results();
    assert_eq!(results.len(), 3);

    let timed_out = &results[1];
    assert!(timed_out.is_timeout());
    assert_eq!(timed_out.status(), CheckStatus::Fail);
    assert_eq!(timed_out.violation_count(), 1);
    assert!(timed_out.details().starts_with("rule timed out after"));

    assert!(!results[0].is_timeout());
    assert_eq!(results[0].details(), "1 null values found");
    assert_eq!(outcome.report.summary().timed_out_checks, 1);
}

#[tokio::test]
async fn test_per_rule_timeout_override() {
    let provider = slow_merchant(Duration::from_secs(10));
    let mut rules = mixed_rules();
    rules[1] = rules[1].clone().param("timeout", "50ms");

    let mut orchestrator = build(Arc::new(provider), OrchestratorConfig::default());
    let outcome = orchestrator.run(&rules).await.unwrap();
    assert!(outcome.report.results()[1].is_timeout());
}

#[tokio::test]
async fn test_timeout_as_connection_error() {
    let provider = slow_merchant(Duration::from_secs(10));
    let mut orchestrator = build(
        Arc::new(provider),
        OrchestratorConfig::default()
            .with_rule_timeout(Duration::from_millis(100))
            .with_timeout_policy(TimeoutPolicy::TreatAsConnectionError),
    );
    let outcome = orchestrator.run(&mixed_rules()).await.unwrap();

    assert_eq!(outcome.state, OrchestratorState::Failed);
    assert!(!outcome.is_trustworthy());
    assert_eq!(outcome.report.results().len(), 2);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].index, 1);
    assert!(outcome.failures[0].error.contains("timed out"));
}

#[tokio::test]
async fn test_connection_error_does_not_block_other_rules() {
    let provider = BrokenProvider::new(common::banking_provider(), &["Merchant"]);
    let mut orchestrator = build(Arc::new(provider), OrchestratorConfig::default());
    let outcome = orchestrator.run(&mixed_rules()).await.unwrap();

    assert_eq!(outcome.state, OrchestratorState::Failed);
    assert_eq!(orchestrator.state(), OrchestratorState::Failed);

    let tables: Vec<_> = outcome.report.results().iter().map(|r| r.table()).collect();
    assert_eq!(tables, vec!["Customer", "Customer"]);
    assert_eq!(outcome.report.overall_status(), CheckStatus::Fail);

    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].index, 1);
    assert!(outcome.failures[0].error.contains("lost connection"));
}

#[tokio::test]
async fn test_cancellation_keeps_finished_results() {
    let provider = slow_merchant(Duration::from_secs(30));
    let mut orchestrator = build(
        Arc::new(provider),
        OrchestratorConfig::default().with_max_concurrency(4),
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let outcome = orchestrator
        .run_with_cancellation(&mixed_rules(), cancel)
        .await
        .unwrap();

    assert_eq!(outcome.state, OrchestratorState::Cancelled);
    assert!(!outcome.report.is_complete());
    let tables: Vec<_> = outcome.report.results().iter().map(|r| r.table()).collect();
    assert_eq!(tables, vec!["Customer", "Customer"]);

    let again = orchestrator.run(&mixed_rules()).await;
    assert!(matches!(again, Err(GuardError::OrchestratorState(_))));
}

#[tokio::test]
async fn test_slow_schema_lookup_is_recorded_as_timeout() {
    let mut orchestrator = build(
        Arc::new(slow_merchant(Duration::from_secs(60))),
        OrchestratorConfig::default().with_rule_timeout(Duration::from_millis(100)),
    );
    let rules = [
        RuleSpec::null_check("Customer", "Email"),
        RuleSpec::null_check_all("Merchant"),
        RuleSpec::uniqueness("Card", "CardNumber"),
    ];
    let outcome = tokio::time::timeout(Duration::from_secs(5), orchestrator.run(&rules))
        .await
        .expect("planning must respect the rule timeout")
        .unwrap();

    assert_eq!(outcome.state, OrchestratorState::Completed);
    let results = outcome.report.results();
    let tables: Vec<_> = results.iter().map(|r| r.table()).collect();
    assert_eq!(tables, vec!["Customer", "Merchant", "Card"]);

    let merchant = &results[1];
    assert!(merchant.is_timeout());
    assert_eq!(merchant.column(), None);
    assert_eq!(merchant.violation_count(), 1);
    assert!(!results[0].is_timeout());
    assert!(!results[2].is_timeout());
}

#[tokio::test]
async fn test_slow_schema_lookup_as_connection_error() {
    let mut orchestrator = build(
        Arc::new(slow_merchant(Duration::from_secs(60))),
        OrchestratorConfig::default()
            .with_rule_timeout(Duration::from_millis(100))
            .with_timeout_policy(TimeoutPolicy::TreatAsConnectionError),
    );
    let rules = [
        RuleSpec::null_check("Customer", "Email"),
        RuleSpec::null_check_all("Merchant"),
    ];
    let outcome = orchestrator.run(&rules).await.unwrap();

    assert_eq!(outcome.state, OrchestratorState::Failed);
    assert_eq!(outcome.report.results().len(), 1);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].index, 1);
    assert!(outcome.failures[0].error.contains("timed out"));
}

#[tokio::test]
async fn test_cancellation_during_planning_finalizes_report() {
    let mut orchestrator = build(
        Arc::new(slow_merchant(Duration::from_secs(60))),
        OrchestratorConfig::default(),
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let rules = [
        RuleSpec::null_check("Customer", "Email"),
        RuleSpec::null_check_all("Merchant"),
    ];
    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        orchestrator.run_with_cancellation(&rules, cancel),
    )
    .await
    .expect("cancellation must interrupt planning")
    .unwrap();

    assert_eq!(outcome.state, OrchestratorState::Cancelled);
    assert!(!outcome.report.is_complete());
    assert!(outcome.report.results().is_empty());
    assert!(outcome.failures.is_empty());
    assert_eq!(orchestrator.state(), OrchestratorState::Cancelled);
}

#[tokio::test]
async fn test_one_connection_per_rule() {
    let provider = Arc::new(CountingProvider::new(common::banking_provider()));
    let mut orchestrator = build(provider.clone(), OrchestratorConfig::default());
    orchestrator.run(&mixed_rules()).await.unwrap();
    assert_eq!(provider.count(), 3);

    // schema-driven rules cost one extra connection for planning
    let provider = Arc::new(CountingProvider::new(common::banking_provider()));
    let mut orchestrator = build(provider.clone(), OrchestratorConfig::default());
    let outcome = orchestrator
        .run(&[RuleSpec::null_check_all("Merchant")])
        .await
        .unwrap();
    assert_eq!(outcome.report.results().len(), 2);
    assert_eq!(provider.count(), 3);
}

/// Records the highest number of queries in flight at once.
#[derive(Debug, Default)]
struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

#[derive(Debug)]
struct GaugedSource {
    inner: Arc<dyn DataSource>,
    gauge: Arc<Gauge>,
}

#[async_trait]
impl DataSource for GaugedSource {
    async fn execute(&self, query: &QueryDescriptor) -> Result<Vec<Row>> {
        let now = self.gauge.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.gauge.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let rows = self.inner.execute(query).await;
        self.gauge.current.fetch_sub(1, Ordering::SeqCst);
        rows
    }

    async fn describe(&self, table: &str) -> Result<TableSchema> {
        self.inner.describe(table).await
    }

    fn description(&self) -> String {
        self.inner.description()
    }
}

#[derive(Debug)]
struct GaugedProvider {
    inner: Arc<dyn SourceProvider>,
    gauge: Arc<Gauge>,
}

#[async_trait]
impl SourceProvider for GaugedProvider {
    async fn connect(&self) -> Result<Arc<dyn DataSource>> {
        Ok(Arc::new(GaugedSource {
            inner: self.inner.connect().await?,
            gauge: Arc::clone(&self.gauge),
        }))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_is_bounded() {
    let gauge = Arc::new(Gauge::default());
    let provider = GaugedProvider {
        inner: common::banking_provider(),
        gauge: Arc::clone(&gauge),
    };
    let rules: Vec<_> = dq_guard::presets::banking_standards()
        .into_iter()
        .filter(|r| !r.columns.is_empty())
        .collect();

    let mut orchestrator = build(
        Arc::new(provider),
        OrchestratorConfig::default().with_max_concurrency(2),
    );
    let outcome = orchestrator.run(&rules).await.unwrap();

    assert_eq!(outcome.report.results().len(), rules.len());
    let peak = gauge.peak.load(Ordering::SeqCst);
    assert!(peak <= 2, "peak concurrency {peak}");
    assert!(peak >= 1);
}

#[tokio::test]
async fn test_zero_concurrency_is_rejected() {
    let mut orchestrator = build(
        common::banking_provider(),
        OrchestratorConfig::default().with_max_concurrency(0),
    );
    let err = orchestrator.run(&mixed_rules()).await.unwrap_err();
    assert!(err.is_configuration());
}
