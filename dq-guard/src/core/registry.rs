//! Dispatch table from rule kind to evaluator.

use super::{RuleEvaluator, RuleKind};
use crate::error::{GuardError, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Builds an evaluator for one rule kind.
pub type EvaluatorFactory = Arc<dyn Fn() -> Arc<dyn RuleEvaluator> + Send + Sync>;

/// Maps each [`RuleKind`] to the constructor of its evaluator.
///
/// The orchestrator only ever talks to this table, so adding a kind means
/// registering it here rather than branching on kinds elsewhere.
///
/// # Examples
///
/// ```rust
/// use dq_guard::core::{RuleKind, RuleRegistry};
///
/// let registry = RuleRegistry::with_builtin_rules();
/// assert!(registry.resolve(RuleKind::FormatCheck).is_ok());
/// assert!(RuleRegistry::new().resolve(RuleKind::FormatCheck).is_err());
/// ```
#[derive(Clone, Default)]
pub struct RuleRegistry {
    factories: HashMap<RuleKind, EvaluatorFactory>,
}

impl RuleRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with every built-in kind registered.
    pub fn with_builtin_rules() -> Self {
        let mut registry = Self::new();
        crate::rules::register_builtin_rules(&mut registry);
        registry
    }

    /// Registers (or replaces) the constructor for `kind`.
    pub fn register<F>(&mut self, kind: RuleKind, constructor: F)
    where
        F: Fn() -> Arc<dyn RuleEvaluator> + Send + Sync + 'static,
    {
        self.factories.insert(kind, Arc::new(constructor));
    }

    /// Builds the evaluator registered for `kind`.
    pub fn resolve(&self, kind: RuleKind) -> Result<Arc<dyn RuleEvaluator>> {
        self.factories
            .get(&kind)
            .map(|factory| factory())
            .ok_or_else(|| GuardError::UnknownRuleKind(kind.to_string()))
    }

    /// Returns true if `kind` has an evaluator.
    pub fn contains(&self, kind: RuleKind) -> bool {
        self.factories.contains_key(&kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<RuleKind> {
        let mut kinds: Vec<_> = self.factories.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

impl fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
