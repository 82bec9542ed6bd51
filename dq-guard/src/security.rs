//! Security utilities for dq-guard.
//!
//! Query descriptors are structured, but a SQL-backed source still has to turn
//! table names, column names and literal values into text. Everything that
//! crosses that boundary goes through [`SqlSecurity`].

use crate::error::{GuardError, Result};
use once_cell::sync::Lazy;
use regex::Regex;

/// SQL identifier, literal and pattern validation.
pub struct SqlSecurity;

impl SqlSecurity {
    /// Validates and escapes a SQL identifier (table name, column name).
    ///
    /// Identifiers are validated against a conservative grammar and then
    /// wrapped in double quotes so that mixed-case names such as
    /// `CCCD_Passport` keep their case.
    ///
    /// # Examples
    /// ```rust
    /// use dq_guard::security::SqlSecurity;
    ///
    /// assert_eq!(SqlSecurity::escape_identifier("Email").unwrap(), "\"Email\"");
    /// assert!(SqlSecurity::escape_identifier("id; DROP TABLE users--").is_err());
    /// ```
    pub fn escape_identifier(identifier: &str) -> Result<String> {
        Self::validate_identifier(identifier)?;
        Ok(format!("\"{identifier}\""))
    }

    /// Validates a SQL identifier without escaping it.
    pub fn validate_identifier(identifier: &str) -> Result<()> {
        if identifier.trim().is_empty() {
            return Err(GuardError::Security(
                "SQL identifier cannot be empty or whitespace-only".to_string(),
            ));
        }

        // Check identifier length (prevent DoS)
        if identifier.len() > 128 {
            return Err(GuardError::Security(
                "SQL identifier too long (max 128 characters)".to_string(),
            ));
        }

        static IDENTIFIER_REGEX: Lazy<Regex> = Lazy::new(|| {
            // Hard-coded pattern, known to be valid
            #[allow(clippy::expect_used)]
            Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$")
                .expect("Hard-coded regex pattern should be valid")
        });

        if !IDENTIFIER_REGEX.is_match(identifier) {
            return Err(GuardError::Security(format!(
                "Invalid SQL identifier format: '{identifier}'. Identifiers must start with a letter or underscore and contain only letters, numbers and underscores"
            )));
        }

        Ok(())
    }

    /// Quotes a string literal, doubling embedded single quotes.
    pub fn quote_literal(value: &str) -> Result<String> {
        if value.contains('\0') {
            return Err(GuardError::Security(
                "SQL literal cannot contain null bytes".to_string(),
            ));
        }
        let escaped = value.replace('\'', "''");
        Ok(format!("'{escaped}'"))
    }

    /// Compiles a user-supplied format pattern as a whole-value match.
    ///
    /// The pattern is wrapped as `^(?:pattern)$`, so `\d{12}` rejects a
    /// 13-digit value even though it contains a 12-digit prefix.
    pub fn compile_anchored_pattern(pattern: &str) -> Result<Regex> {
        if pattern.len() > 1000 {
            return Err(GuardError::Security(
                "Regex pattern too long (max 1000 characters)".to_string(),
            ));
        }
        if pattern.contains('\0') {
            return Err(GuardError::Security(
                "Regex pattern cannot contain null bytes".to_string(),
            ));
        }
        Self::check_redos_patterns(pattern)?;

        Regex::new(&format!("^(?:{pattern})$"))
            .map_err(|e| {
                GuardError::configuration(format!("Invalid regex pattern '{pattern}': {e}"))
            })
    }

    /// Rejects the obvious catastrophic-backtracking shapes.
    fn check_redos_patterns(pattern: &str) -> Result<()> {
        let dangerous_patterns = &["(.*)*", "(.*)+", "(a+)+", "(a*)*"];

        for dangerous in dangerous_patterns {
            if pattern.contains(dangerous) {
                return Err(GuardError::Security(
                    "Regex pattern might cause ReDoS attack".to_string(),
                ));
            }
        }

        Ok(())
    }
}
