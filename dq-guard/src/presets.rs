//! Ready-made rule sets.
//!
//! The banking preset covers a payment schema of eight tables (Customer,
//! BankAccount, Card, Merchant, Device, AuthenticationLog, PaymentTransaction,
//! FraudAlert) with data quality standards followed by three audit rules.
//!
//! ```rust
//! use dq_guard::presets;
//!
//! let config = presets::banking_config();
//! assert!(config.validate().is_ok());
//! assert_eq!(config.rules.len(), 32);
//! ```

use crate::config::EngineConfig;
use crate::core::{RuleKind, RuleSpec};

/// Tables covered by the banking preset, in check order.
pub const BANKING_TABLES: [&str; 8] = [
    "Customer",
    "BankAccount",
    "Card",
    "Merchant",
    "Device",
    "AuthenticationLog",
    "PaymentTransaction",
    "FraudAlert",
];

/// Authentication kinds that count as strong.
pub const STRONG_AUTH_KINDS: [&str; 2] = ["OTP", "Biometric"];

const UNIQUE_COLUMNS: [(&str, &str); 5] = [
    ("Customer", "Email"),
    ("Customer", "CCCD_Passport"),
    ("BankAccount", "AccountNumber"),
    ("Card", "CardNumber"),
    ("Device", "DeviceFingerprint"),
];

const FOREIGN_KEYS: [(&str, &str, &str, &str); 15] = [
    ("BankAccount", "CustomerID", "Customer", "CustomerID"),
    ("Card", "AccountID", "BankAccount", "AccountID"),
    ("PaymentTransaction", "AccountID", "BankAccount", "AccountID"),
    ("PaymentTransaction", "CardID", "Card", "CardID"),
    ("PaymentTransaction", "MerchantID", "Merchant", "MerchantID"),
    ("PaymentTransaction", "DeviceID", "Device", "DeviceID"),
    ("PaymentTransaction", "AuthLogID", "AuthenticationLog", "AuthLogID"),
    ("Device", "CustomerID", "Customer", "CustomerID"),
    ("AuthenticationLog", "CustomerID", "Customer", "CustomerID"),
    ("AuthenticationLog", "DeviceID", "Device", "DeviceID"),
    ("AuthenticationLog", "TransactionID", "PaymentTransaction", "TransactionID"),
    ("FraudAlert", "CustomerID", "Customer", "CustomerID"),
    ("FraudAlert", "TransactionID", "PaymentTransaction", "TransactionID"),
    ("FraudAlert", "DeviceID", "Device", "DeviceID"),
    ("FraudAlert", "AuthLogID", "AuthenticationLog", "AuthLogID"),
];

/// Columns never expanded by the schema-driven null checks.
///
/// These are optional references (a transaction without a card or device)
/// even where the schema declares them NOT NULL.
pub fn banking_null_exclusions() -> Vec<String> {
    ["TransactionID", "CardID", "DeviceID", "AuthLogID"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Data quality standards: null, uniqueness, format and referential checks.
pub fn banking_standards() -> Vec<RuleSpec> {
    let nulls = BANKING_TABLES.iter().map(|table| RuleSpec::null_check_all(*table));
    let unique = UNIQUE_COLUMNS
        .iter()
        .map(|(table, column)| RuleSpec::uniqueness(*table, *column));
    let format = std::iter::once(RuleSpec::format("Customer", "CCCD_Passport", r"\d{12}"));
    let foreign = FOREIGN_KEYS
        .iter()
        .map(|(table, column, parent, key)| RuleSpec::foreign_key(*table, *column, *parent, *key));

    nulls.chain(unique).chain(format).chain(foreign).collect()
}

fn with_auth_evidence(rule: RuleSpec) -> RuleSpec {
    rule.param("evidence_table", "AuthenticationLog")
        .param("evidence_link", "AuthLogID")
        .param("evidence_key", "AuthLogID")
        .param("evidence_column", "AuthType")
        .param("strong_auth_kinds", STRONG_AUTH_KINDS.to_vec())
}

/// Transactions above 10,000,000 must be strongly authenticated.
pub fn high_value_transaction_auth() -> RuleSpec {
    with_auth_evidence(
        RuleSpec::new(RuleKind::AggregateThresholdCheck, "PaymentTransaction")
            .column("Amount")
            .param("group_by", "TransactionID")
            .param("sum_column", "Amount")
            .param("threshold", 10_000_000i64),
    )
    .named("High-Value Transaction Auth")
}

/// Transactions must not come from a Suspicious or Blocked device.
pub fn unverified_device_usage() -> RuleSpec {
    RuleSpec::foreign_key("PaymentTransaction", "DeviceID", "Device", "DeviceID")
        .param("parent_status_column", "Status")
        .param("rejected_parent_values", vec!["Suspicious", "Blocked"])
        .param("ignore_orphans", true)
        .named("Unverified Device Usage")
}

/// A customer spending more than 20,000,000 in one day needs at least one
/// strongly authenticated transaction.
pub fn daily_transaction_limit_auth() -> RuleSpec {
    with_auth_evidence(
        RuleSpec::new(RuleKind::AggregateThresholdCheck, "PaymentTransaction")
            .column("Amount")
            .param("group_by", "CustomerID")
            .param("sum_column", "Amount")
            .param("threshold", 20_000_000i64)
            .param("timestamp_column", "TransactionDate")
            .param("window", "1d")
            .param("lookup_table", "BankAccount")
            .param("lookup_via", "AccountID")
            .param("lookup_key", "AccountID"),
    )
    .named("Daily Transaction Limit Auth")
}

/// The three monitoring audit rules.
pub fn banking_audit() -> Vec<RuleSpec> {
    vec![
        high_value_transaction_auth(),
        unverified_device_usage(),
        daily_transaction_limit_auth(),
    ]
}

/// Standards followed by audit rules.
pub fn banking_rules() -> Vec<RuleSpec> {
    let mut rules = banking_standards();
    rules.extend(banking_audit());
    rules
}

/// The full banking preset as an engine configuration.
pub fn banking_config() -> EngineConfig {
    EngineConfig::new(banking_rules()).with_null_check_exclusions(banking_null_exclusions())
}
