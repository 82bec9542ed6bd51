//! Engine configuration.
//!
//! An [`EngineConfig`] is everything one run needs besides the data source:
//! the ordered rule list, the null-check exclusion set and the execution
//! knobs. It is loaded from JSON and validated before anything executes.
//!
//! ```json
//! {
//!   "rules": [
//!     {"kind": "null_check", "table": "Customer", "columns": ["Email"]},
//!     {"kind": "format_check", "table": "Customer", "columns": ["CCCD_Passport"],
//!      "params": {"pattern": "\\d{12}"}}
//!   ],
//!   "null_check_exclusions": ["TransactionID"],
//!   "rule_timeout": "30s",
//!   "max_concurrency": 4,
//!   "timeout_policy": "record_as_failure",
//!   "logging": {"base_level": "info", "log_rule_details": false}
//! }
//! ```

use crate::core::{OrchestratorConfig, RuleRegistry, RuleSpec, TimeoutPolicy};
use crate::error::{GuardError, Result};
use crate::logging::setup::LoggingConfig;
use crate::logging::LogConfig;
use crate::security::SqlSecurity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

/// Configuration of one engine run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Rules, in report order
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
    /// Columns never expanded by schema-driven null checks
    #[serde(default)]
    pub null_check_exclusions: Vec<String>,
    /// Default per-rule time budget
    #[serde(default = "default_rule_timeout", with = "duration_str")]
    pub rule_timeout: Duration,
    /// Upper bound on concurrently evaluated rules
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// How a timed-out rule is recorded
    #[serde(default)]
    pub timeout_policy: TimeoutPolicy,
    /// Reference instant for windowed rules; defaults to the run start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_of: Option<DateTime<Utc>>,
    /// Engine log verbosity
    #[serde(default)]
    pub logging: LogConfig,
}

fn default_rule_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_concurrency() -> usize {
    num_cpus::get()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            null_check_exclusions: Vec::new(),
            rule_timeout: default_rule_timeout(),
            max_concurrency: default_max_concurrency(),
            timeout_policy: TimeoutPolicy::default(),
            as_of: None,
            logging: LogConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with default knobs around `rules`.
    pub fn new(rules: Vec<RuleSpec>) -> Self {
        Self {
            rules,
            ..Self::default()
        }
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| GuardError::configuration(format!("invalid engine config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json_str(&content)?;
        info!(rules = config.rules.len(), "Loaded engine config");
        Ok(config)
    }

    /// Validates against the built-in rule kinds.
    pub fn validate(&self) -> Result<()> {
        self.validate_with(&RuleRegistry::with_builtin_rules())
    }

    /// Validates knobs and every rule against `registry`.
    pub fn validate_with(&self, registry: &RuleRegistry) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(GuardError::configuration("max_concurrency must be at least 1"));
        }
        if self.rule_timeout.is_zero() {
            return Err(GuardError::configuration("rule_timeout must be positive"));
        }
        for column in &self.null_check_exclusions {
            SqlSecurity::validate_identifier(column)?;
        }
        for rule in &self.rules {
            registry.resolve(rule.kind)?.validate(rule)?;
        }
        Ok(())
    }

    /// Adds columns to the null-check exclusion set.
    pub fn with_null_check_exclusions<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.null_check_exclusions
            .extend(columns.into_iter().map(Into::into));
        self
    }

    /// Orchestrator settings derived from this configuration.
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            rule_timeout: self.rule_timeout,
            max_concurrency: self.max_concurrency,
            timeout_policy: self.timeout_policy,
            as_of: self.as_of,
            null_check_exclusions: self.null_check_exclusions.clone(),
            log: self.logging.clone(),
        }
    }

    /// Subscriber settings matching the configured engine log level, ready
    /// for [`init_logging`](crate::logging::setup::init_logging).
    pub fn logging_setup(&self) -> LoggingConfig {
        LoggingConfig::for_engine(&self.logging)
    }
}

/// Parses a duration written as `<int><unit>`, with unit `ms`, `s`, `m`, `h` or `d`.
///
/// # Examples
///
/// ```rust
/// use dq_guard::config::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86_400));
/// assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
/// assert!(parse_duration("soon").is_err());
/// ```
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| invalid_duration(raw))?;
    let (digits, unit) = raw.split_at(split);
    let amount: u64 = digits.parse().map_err(|_| invalid_duration(raw))?;

    let seconds_per_unit = match unit {
        "ms" => return Ok(Duration::from_millis(amount)),
        "s" => 1,
        "m" => 60,
        "h" => 3_600,
        "d" => 86_400,
        _ => return Err(invalid_duration(raw)),
    };
    amount
        .checked_mul(seconds_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| invalid_duration(raw))
}

/// Formats a duration in the largest unit that represents it exactly.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1000 != 0 || millis == 0 {
        return format!("{millis}ms");
    }
    let secs = duration.as_secs();
    for (unit, size) in [("d", 86_400), ("h", 3_600), ("m", 60)] {
        if secs % size == 0 {
            return format!("{}{unit}", secs / size);
        }
    }
    format!("{secs}s")
}

fn invalid_duration(raw: &str) -> GuardError {
    GuardError::configuration(format!(
        "invalid duration '{raw}': expected <integer><ms|s|m|h|d>"
    ))
}

mod duration_str {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_duration(&raw).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RuleKind;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration(" 10ms ").unwrap(), Duration::from_millis(10));
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("1w").is_err());
        assert!(parse_duration("-1s").is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(86_400)), "1d");
        assert_eq!(format_duration(Duration::from_secs(90)), "90s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
    }

    #[test]
    fn test_defaults_from_minimal_json() {
        let config = EngineConfig::from_json_str(r#"{"rules": []}"#).unwrap();
        assert_eq!(config.rule_timeout, Duration::from_secs(30));
        assert_eq!(config.max_concurrency, num_cpus::get());
        assert_eq!(config.timeout_policy, TimeoutPolicy::RecordAsFailure);
        assert!(config.as_of.is_none());
        assert_eq!(config.logging, LogConfig::default());
    }

    #[test]
    fn test_logging_section() {
        let config = EngineConfig::from_json_str(
            r#"{"logging": {"base_level": "debug", "log_rule_details": true}}"#,
        )
        .unwrap();
        assert_eq!(config.logging.base_level, tracing::Level::DEBUG);
        assert!(config.logging.log_rule_details);

        let orchestrator = config.orchestrator_config();
        assert!(orchestrator.log.log_rule_details);
        assert_eq!(config.logging_setup().env_filter(), "info,dq_guard=debug");

        assert!(EngineConfig::from_json_str(r#"{"logging": {"base_level": "chatty"}}"#).is_err());
    }

    #[test]
    fn test_full_json() {
        let config = EngineConfig::from_json_str(
            r#"{
                "rules": [
                    {"kind": "null_check", "table": "Customer"},
                    {"kind": "format_check", "table": "Customer", "columns": ["CCCD_Passport"],
                     "params": {"pattern": "\\d{12}", "timeout": "5s"}}
                ],
                "null_check_exclusions": ["TransactionID"],
                "rule_timeout": "1m",
                "max_concurrency": 2,
                "timeout_policy": "treat_as_connection_error",
                "as_of": "2025-07-20T00:00:00Z"
            }"#,
        )
        .unwrap();
        assert_eq!(config.rules.len(), 2);
        assert_eq!(config.rules[1].kind, RuleKind::FormatCheck);
        assert_eq!(config.rule_timeout, Duration::from_secs(60));
        assert_eq!(config.timeout_policy, TimeoutPolicy::TreatAsConnectionError);
        assert!(config.as_of.is_some());

        let orchestrator = config.orchestrator_config();
        assert_eq!(orchestrator.max_concurrency, 2);
        assert_eq!(orchestrator.null_check_exclusions, vec!["TransactionID"]);
    }

    #[test]
    fn test_missing_required_param_fails_fast() {
        let err = EngineConfig::from_json_str(
            r#"{"rules": [{"kind": "format_check", "table": "Customer", "columns": ["CCCD_Passport"]}]}"#,
        )
        .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("pattern"));
    }

    #[test]
    fn test_invalid_knobs() {
        assert!(EngineConfig::from_json_str(r#"{"max_concurrency": 0}"#).is_err());
        assert!(EngineConfig::from_json_str(r#"{"rule_timeout": "0s"}"#).is_err());
        assert!(EngineConfig::from_json_str(r#"{"rule_timeout": "fast"}"#).is_err());
        assert!(EngineConfig::from_json_str(r#"{"unknown": 1}"#).is_err());
        assert!(EngineConfig::from_json_str(r#"{"null_check_exclusions": ["a b"]}"#).is_err());
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(
            &path,
            r#"{"rules": [{"kind": "uniqueness_check", "table": "Card", "columns": ["CardNumber"]}]}"#,
        )
        .unwrap();
        let config = EngineConfig::from_path(&path).unwrap();
        assert_eq!(config.rules.len(), 1);

        assert!(matches!(
            EngineConfig::from_path(dir.path().join("missing.json")),
            Err(GuardError::Io(_))
        ));
    }

    #[test]
    fn test_round_trip_keeps_duration_format() {
        let config = EngineConfig::new(vec![]);
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["rule_timeout"], "30s");
    }
}
