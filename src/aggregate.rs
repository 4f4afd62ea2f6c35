//! Violation aggregation - group, sum and summarize evaluation results

use crate::facility::Evaluation;
use crate::violation::Violation;
use serde::Serialize;
use std::time::Duration;

/// Group label for violations whose rule has no category
pub const UNCATEGORIZED: &str = "uncategorized";

/// Violations sharing one category.
///
/// `total_contribution` sums the leaf weights of the grouped violations. It is
/// not capped by enclosing composites, so it may exceed the report's
/// `aggregate_severity`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryGroup {
    pub category: String,
    pub violations: Vec<Violation>,
    pub total_contribution: f64,
}

/// Per-rule totals (uncapped leaf contributions, like [`CategoryGroup`])
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleTotal {
    pub rule: String,
    pub violations: usize,
    pub total_contribution: f64,
}

/// Aggregated outcome of one top-level rule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViolationReport {
    /// Name of the evaluated top-level rule
    pub rule: String,
    pub violated: bool,
    /// Severity of the top-level rule (already capped by composites)
    pub aggregate_severity: f64,
    /// Category groups, in first-seen order
    pub groups: Vec<CategoryGroup>,
    /// Per-rule totals, in first-seen order
    pub rules: Vec<RuleTotal>,
}

impl ViolationReport {
    /// Build a report from an evaluation
    pub fn from_evaluation(evaluation: &Evaluation) -> Self {
        let mut groups: Vec<CategoryGroup> = Vec::new();
        let mut rules: Vec<RuleTotal> = Vec::new();

        for violation in &evaluation.violations {
            let category = violation
                .category
                .as_ref()
                .map(|c| c.label())
                .unwrap_or(UNCATEGORIZED);

            match groups.iter_mut().find(|g| g.category == category) {
                Some(group) => {
                    group.total_contribution += violation.contribution;
                    group.violations.push(violation.clone());
                }
                None => groups.push(CategoryGroup {
                    category: category.to_string(),
                    violations: vec![violation.clone()],
                    total_contribution: violation.contribution,
                }),
            }

            match rules.iter_mut().find(|r| r.rule == violation.rule) {
                Some(total) => {
                    total.violations += 1;
                    total.total_contribution += violation.contribution;
                }
                None => rules.push(RuleTotal {
                    rule: violation.rule.clone(),
                    violations: 1,
                    total_contribution: violation.contribution,
                }),
            }
        }

        Self {
            rule: evaluation.rule.clone(),
            violated: evaluation.violated,
            aggregate_severity: evaluation.aggregate_severity,
            groups,
            rules,
        }
    }

    /// Total number of violations
    pub fn violation_count(&self) -> usize {
        self.groups.iter().map(|g| g.violations.len()).sum()
    }

    /// All violations in evaluation order within category groups
    pub fn violations(&self) -> impl Iterator<Item = &Violation> {
        self.groups.iter().flat_map(|g| g.violations.iter())
    }

    pub fn conforms(&self) -> bool {
        !self.violated
    }
}

/// Reports for every top-level rule of a policy
#[derive(Debug, Clone, Default)]
pub struct PolicyReport {
    /// Policy name
    pub policy: String,
    pub reports: Vec<ViolationReport>,
    /// Time spent evaluating
    pub duration: Duration,
}

impl PolicyReport {
    pub fn new(policy: &str, evaluations: &[Evaluation], duration: Duration) -> Self {
        Self {
            policy: policy.to_string(),
            reports: evaluations
                .iter()
                .map(ViolationReport::from_evaluation)
                .collect(),
            duration,
        }
    }

    pub fn violated_count(&self) -> usize {
        self.reports.iter().filter(|r| r.violated).count()
    }

    pub fn violation_count(&self) -> usize {
        self.reports.iter().map(|r| r.violation_count()).sum()
    }

    /// Sum of the top-level rules' aggregate severities
    pub fn total_severity(&self) -> f64 {
        self.reports.iter().map(|r| r.aggregate_severity).sum()
    }

    pub fn conforms(&self) -> bool {
        self.reports.iter().all(|r| r.conforms())
    }
}
