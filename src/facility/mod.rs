//! Test facilities - evaluate policy rules against a spreadsheet
//!
//! Every rule variant has a matching facility. The [`Evaluator`] picks the
//! facility by matching on the rule variant; the composite facility calls
//! back into the evaluator for each sub-rule, so arbitrarily deep rule trees
//! of mixed variants are evaluated recursively.
//!
//! ```text
//! Evaluator -> MonolithicTestFacility -> CheckRegistry -> Check
//!           -> CompositeTestFacility  -> Evaluator (per sub-rule)
//!           -> DynamicTestFacility    -> Condition
//! ```

pub mod condition;
mod composite;
mod dynamic;
mod monolithic;

pub use composite::CompositeTestFacility;
pub use dynamic::DynamicTestFacility;
pub use monolithic::MonolithicTestFacility;

use crate::checks::CheckRegistry;
use crate::rule::{PolicyRule, RuleKind};
use crate::spreadsheet::Spreadsheet;
use crate::violation::Violation;
use log::{debug, warn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Failure that aborts an evaluation.
///
/// These are wiring/definition defects, never findings about the spreadsheet;
/// non-conformance is reported through [`Violation`]s.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("Rule '{rule}' uses check '{check}', which has no registered evaluator")]
    UnsupportedRuleVariant { rule: String, check: String },

    #[error("Rule '{rule}' has an invalid condition: {message}")]
    InvalidCondition { rule: String, message: String },

    #[error("Rule '{rule}' has an invalid sheet scope: {message}")]
    InvalidScope { rule: String, message: String },
}

/// Result of evaluating one rule (and its sub-rules)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Evaluation {
    /// Name of the evaluated rule
    pub rule: String,
    /// Whether the rule is violated
    pub violated: bool,
    /// Violations in evaluation order
    pub violations: Vec<Violation>,
    /// Weighted severity of this rule's outcome (0.0 when conforming)
    pub aggregate_severity: f64,
}

impl Evaluation {
    /// Outcome of a conforming rule
    pub fn conforming(rule: &str) -> Self {
        Self {
            rule: rule.to_string(),
            ..Self::default()
        }
    }

    /// Outcome of a leaf rule from its violations: severity is the weight when any exist
    pub fn from_violations(rule: &PolicyRule, violations: Vec<Violation>) -> Self {
        let violated = !violations.is_empty();
        Self {
            rule: rule.name().to_string(),
            violated,
            violations,
            aggregate_severity: if violated {
                rule.severity_weight()
            } else {
                0.0
            },
        }
    }

    pub fn conforms(&self) -> bool {
        !self.violated
    }
}

/// A facility for one rule variant
pub trait TestFacility {
    /// Variant-specific rule data this facility accepts
    type Rule;

    fn evaluate(
        &self,
        evaluator: &Evaluator,
        rule: &PolicyRule,
        variant: &Self::Rule,
        sheet: &Spreadsheet,
    ) -> Result<Evaluation, EvaluationError>;
}

/// Shared progress counters, safe to update from parallel evaluations
#[derive(Debug, Default)]
pub struct EvaluationStats {
    rules_evaluated: AtomicUsize,
    violations_found: AtomicUsize,
}

impl EvaluationStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_rule(&self) {
        self.rules_evaluated.fetch_add(1, Ordering::Relaxed);
    }

    fn record_violations(&self, count: usize) {
        self.violations_found.fetch_add(count, Ordering::Relaxed);
    }

    /// Rules evaluated so far (every node of every rule tree)
    pub fn rules_evaluated(&self) -> usize {
        self.rules_evaluated.load(Ordering::Relaxed)
    }

    /// Violations produced by leaf rules so far
    pub fn violations_found(&self) -> usize {
        self.violations_found.load(Ordering::Relaxed)
    }
}

/// Evaluates rules against spreadsheets.
///
/// An evaluator holds no per-evaluation state: the same instance may evaluate
/// any number of (rule, spreadsheet) pairs, concurrently.
pub struct Evaluator {
    /// Checks available to monolithic rules
    registry: CheckRegistry,

    /// Evaluate composite sub-rules in parallel
    parallel: bool,

    /// Dedicated pool for parallel evaluation (None = rayon's global pool)
    pool: Option<rayon::ThreadPool>,

    /// Optional progress counters
    stats: Option<Arc<EvaluationStats>>,
}

impl Evaluator {
    /// Create an evaluator over a check registry (sequential by default)
    pub fn new(registry: CheckRegistry) -> Self {
        Self {
            registry,
            parallel: false,
            pool: None,
            stats: None,
        }
    }

    /// Evaluator with every built-in check registered
    pub fn with_builtin_checks() -> Self {
        Self::new(CheckRegistry::with_builtin())
    }

    /// Enable or disable parallel evaluation of composite sub-rules
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Bound parallel evaluation to `jobs` threads (0 = number of CPUs)
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        let threads = if jobs > 0 { jobs } else { num_cpus::get() };
        match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => self.pool = Some(pool),
            Err(e) => warn!("Falling back to the global thread pool: {}", e),
        }
        self
    }

    /// Attach shared progress counters
    pub fn with_stats(mut self, stats: Arc<EvaluationStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn registry(&self) -> &CheckRegistry {
        &self.registry
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    /// Evaluate a rule (and its whole sub-rule tree) against a spreadsheet
    pub fn evaluate(
        &self,
        rule: &PolicyRule,
        sheet: &Spreadsheet,
    ) -> Result<Evaluation, EvaluationError> {
        match (&self.pool, self.parallel) {
            (Some(pool), true) => pool.install(|| self.dispatch(rule, sheet)),
            _ => self.dispatch(rule, sheet),
        }
    }

    /// Evaluate several top-level rules; the first failure aborts
    pub fn evaluate_all(
        &self,
        rules: &[PolicyRule],
        sheet: &Spreadsheet,
    ) -> Result<Vec<Evaluation>, EvaluationError> {
        rules.iter().map(|rule| self.evaluate(rule, sheet)).collect()
    }

    /// Route a rule to the facility matching its variant
    pub(crate) fn dispatch(
        &self,
        rule: &PolicyRule,
        sheet: &Spreadsheet,
    ) -> Result<Evaluation, EvaluationError> {
        let evaluation = match rule.kind() {
            RuleKind::Monolithic(monolithic) => {
                MonolithicTestFacility.evaluate(self, rule, monolithic, sheet)?
            }
            RuleKind::Composite(composite) => {
                CompositeTestFacility.evaluate(self, rule, composite, sheet)?
            }
            RuleKind::Dynamic(dynamic) => {
                DynamicTestFacility.evaluate(self, rule, dynamic, sheet)?
            }
        };

        if let Some(stats) = &self.stats {
            stats.record_rule();
            if !matches!(rule.kind(), RuleKind::Composite(_)) {
                stats.record_violations(evaluation.violations.len());
            }
        }

        debug!(
            "Evaluated {} rule '{}': {} violation(s), severity {}",
            rule.variant(),
            rule.name(),
            evaluation.violations.len(),
            evaluation.aggregate_severity
        );

        Ok(evaluation)
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::with_builtin_checks()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{CheckKind, Combinator};
    use crate::spreadsheet::{Cell, CellValue, Worksheet};

    fn sheet() -> Spreadsheet {
        Spreadsheet::new().with_sheet(
            Worksheet::new("Calc")
                .with_cell("A1", Cell::number(5.0))
                .unwrap()
                .with_cell("A2", Cell::formula("=A1*3", CellValue::Number(15.0)))
                .unwrap()
                .with_cell("A3", Cell::formula("=A1/0", CellValue::Error("#DIV/0!".into())))
                .unwrap(),
        )
    }

    #[test]
    fn test_dispatch_by_variant() {
        let evaluator = Evaluator::default();
        let sheet = sheet();

        let mono = PolicyRule::monolithic(CheckKind::ErrorContainingCell).with_name("errors");
        let result = evaluator.evaluate(&mono, &sheet).unwrap();
        assert!(result.violated);
        assert_eq!(result.rule, "errors");

        let dynamic = PolicyRule::dynamic("value > 100").with_name("big");
        assert!(evaluator.evaluate(&dynamic, &sheet).unwrap().conforms());

        let composite = PolicyRule::composite(Combinator::And, vec![mono, dynamic]);
        assert!(evaluator.evaluate(&composite, &sheet).unwrap().violated);
    }

    #[test]
    fn test_unregistered_check_fails() {
        let evaluator = Evaluator::new(CheckRegistry::new());
        let rule = PolicyRule::monolithic(CheckKind::Sanity).with_name("sanity");
        let err = evaluator.evaluate(&rule, &sheet()).unwrap_err();
        assert_eq!(
            err,
            EvaluationError::UnsupportedRuleVariant {
                rule: "sanity".to_string(),
                check: "sanity".to_string(),
            }
        );
    }

    #[test]
    fn test_stats_are_counted() {
        let stats = Arc::new(EvaluationStats::new());
        let evaluator = Evaluator::default().with_stats(Arc::clone(&stats));
        let rule = PolicyRule::composite(
            Combinator::And,
            vec![
                PolicyRule::monolithic(CheckKind::ErrorContainingCell),
                PolicyRule::monolithic(CheckKind::NoConstantsInFormulas),
            ],
        );

        evaluator.evaluate(&rule, &sheet()).unwrap();
        assert_eq!(stats.rules_evaluated(), 3);
        // A3 holds an error; A2 embeds the constant 3 (0 is ignored by default)
        assert_eq!(stats.violations_found(), 2);
    }

    #[test]
    fn test_parallel_pool() {
        let evaluator = Evaluator::default().with_parallel(true).with_jobs(2);
        assert!(evaluator.is_parallel());
        let rule = PolicyRule::composite(
            Combinator::Or,
            vec![
                PolicyRule::monolithic(CheckKind::ErrorContainingCell),
                PolicyRule::monolithic(CheckKind::RefToNull),
            ],
        );
        let result = evaluator.evaluate(&rule, &sheet()).unwrap();
        assert!(result.conforms());
    }

    #[test]
    fn test_evaluate_all() {
        let evaluator = Evaluator::default();
        let rules = vec![
            PolicyRule::monolithic(CheckKind::ErrorContainingCell),
            PolicyRule::monolithic(CheckKind::RefToNull),
        ];
        let results = evaluator.evaluate_all(&rules, &sheet()).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].violated);
        assert!(!results[1].violated);
    }
}
