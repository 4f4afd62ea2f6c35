//! Facility for composite rules

use super::{Evaluation, EvaluationError, Evaluator, TestFacility};
use crate::rule::{CompositeRule, PolicyRule};
use crate::spreadsheet::Spreadsheet;
use log::debug;
use rayon::prelude::*;

/// Evaluates every sub-rule through the evaluator and merges the outcomes
/// with the composite's combinator.
///
/// When the composite is violated, its violations are those of the violated
/// sub-rules in declaration order, and its severity is the sum of their
/// severities capped at the composite's own weight.
pub struct CompositeTestFacility;

impl TestFacility for CompositeTestFacility {
    type Rule = CompositeRule;

    fn evaluate(
        &self,
        evaluator: &Evaluator,
        rule: &PolicyRule,
        variant: &CompositeRule,
        sheet: &Spreadsheet,
    ) -> Result<Evaluation, EvaluationError> {
        // Fan out and join; collect() keeps declaration order and stops at the first error
        let results: Vec<Evaluation> = if evaluator.is_parallel() && variant.rules.len() > 1 {
            variant
                .rules
                .par_iter()
                .map(|sub| evaluator.dispatch(sub, sheet))
                .collect::<Result<_, _>>()?
        } else {
            variant
                .rules
                .iter()
                .map(|sub| evaluator.dispatch(sub, sheet))
                .collect::<Result<_, _>>()?
        };

        let violated_count = results.iter().filter(|r| r.violated).count();
        let violated = variant
            .combinator
            .is_violated(violated_count, results.len());

        debug!(
            "Composite '{}' ({}): {}/{} sub-rule(s) violated",
            rule.name(),
            variant.combinator,
            violated_count,
            results.len()
        );

        if !violated {
            return Ok(Evaluation::conforming(rule.name()));
        }

        let mut severity = 0.0;
        let mut violations = Vec::new();
        for (index, result) in results.into_iter().enumerate() {
            if !result.violated {
                continue;
            }
            severity += result.aggregate_severity;
            violations.extend(result.violations.into_iter().map(|v| v.nested_under(index)));
        }

        Ok(Evaluation {
            rule: rule.name().to_string(),
            violated: true,
            violations,
            aggregate_severity: severity.min(rule.severity_weight()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::{Check, CheckRegistry, Finding};
    use crate::configuration::RuleConfiguration;
    use crate::rule::{CheckKind, Combinator};
    use crate::spreadsheet::{CellLocation, Worksheet};
    use std::sync::Arc;

    /// Reports a fixed number of findings in column A
    struct FixedCheck {
        name: &'static str,
        findings: u32,
    }

    impl Check for FixedCheck {
        fn kind(&self) -> CheckKind {
            CheckKind::Custom(self.name.to_string())
        }

        fn description(&self) -> &str {
            "fixed outcome"
        }

        fn run(&self, _sheet: &Spreadsheet, _config: Option<&RuleConfiguration>) -> Vec<Finding> {
            (1..=self.findings)
                .map(|row| Finding::new(CellLocation::new("S", row, 1), self.name))
                .collect()
        }
    }

    fn evaluator(parallel: bool) -> Evaluator {
        let mut registry = CheckRegistry::new();
        registry.register(Arc::new(FixedCheck {
            name: "fail",
            findings: 1,
        }));
        registry.register(Arc::new(FixedCheck {
            name: "fail-twice",
            findings: 2,
        }));
        registry.register(Arc::new(FixedCheck {
            name: "pass",
            findings: 0,
        }));
        Evaluator::new(registry).with_parallel(parallel)
    }

    fn leaf(check: &str) -> PolicyRule {
        PolicyRule::monolithic(CheckKind::Custom(check.to_string())).with_name(check)
    }

    fn sheet() -> Spreadsheet {
        Spreadsheet::new().with_sheet(Worksheet::new("S"))
    }

    #[test]
    fn test_and_with_one_violation() {
        let rule = PolicyRule::composite(Combinator::And, vec![leaf("fail"), leaf("pass")]);
        let result = evaluator(false).evaluate(&rule, &sheet()).unwrap();
        assert!(result.violated);
        assert!(!result.violations.is_empty());
    }

    #[test]
    fn test_and_all_conforming() {
        let rule = PolicyRule::composite(Combinator::And, vec![leaf("pass"), leaf("pass")]);
        let result = evaluator(false).evaluate(&rule, &sheet()).unwrap();
        assert!(result.conforms());
        assert!(result.violations.is_empty());
        assert_eq!(result.aggregate_severity, 0.0);
    }

    #[test]
    fn test_one_among_others() {
        let one = PolicyRule::composite(
            Combinator::OneAmongOthers,
            vec![leaf("fail"), leaf("pass"), leaf("pass")],
        );
        let result = evaluator(false).evaluate(&one, &sheet()).unwrap();
        assert!(result.conforms());
        assert!(result.violations.is_empty());

        let two = PolicyRule::composite(
            Combinator::OneAmongOthers,
            vec![leaf("fail"), leaf("pass"), leaf("fail")],
        );
        let result = evaluator(false).evaluate(&two, &sheet()).unwrap();
        assert!(result.violated);
        assert_eq!(result.violations.len(), 2);
    }

    #[test]
    fn test_or() {
        let rule = PolicyRule::composite(Combinator::Or, vec![leaf("fail"), leaf("pass")]);
        assert!(evaluator(false).evaluate(&rule, &sheet()).unwrap().conforms());

        let rule = PolicyRule::composite(Combinator::Or, vec![leaf("fail"), leaf("fail")]);
        assert!(evaluator(false).evaluate(&rule, &sheet()).unwrap().violated);
    }

    #[test]
    fn test_severity_is_capped_by_composite_weight() {
        let rule = PolicyRule::composite(
            Combinator::And,
            vec![
                leaf("fail").with_severity_weight(2.0),
                leaf("fail-twice").with_severity_weight(3.0),
            ],
        )
        .with_severity_weight(4.0);
        let result = evaluator(false).evaluate(&rule, &sheet()).unwrap();
        assert_eq!(result.aggregate_severity, 4.0);

        let rule = PolicyRule::composite(
            Combinator::And,
            vec![leaf("fail").with_severity_weight(0.5), leaf("pass")],
        )
        .with_severity_weight(4.0);
        let result = evaluator(false).evaluate(&rule, &sheet()).unwrap();
        assert_eq!(result.aggregate_severity, 0.5);
    }

    #[test]
    fn test_violation_order_and_paths() {
        let rule = PolicyRule::composite(
            Combinator::And,
            vec![
                leaf("pass"),
                PolicyRule::composite(Combinator::And, vec![leaf("fail-twice")]),
                leaf("fail"),
            ],
        );
        let result = evaluator(false).evaluate(&rule, &sheet()).unwrap();
        let order: Vec<(&str, Vec<usize>, u32)> = result
            .violations
            .iter()
            .map(|v| (v.rule.as_str(), v.rule_path.clone(), v.location.row))
            .collect();
        assert_eq!(
            order,
            vec![
                ("fail-twice", vec![1, 0], 1),
                ("fail-twice", vec![1, 0], 2),
                ("fail", vec![2], 1),
            ]
        );
    }

    #[test]
    fn test_nested_unsupported_variant_aborts() {
        let rule = PolicyRule::composite(
            Combinator::Or,
            vec![
                leaf("pass"),
                PolicyRule::composite(
                    Combinator::And,
                    vec![
                        leaf("fail"),
                        PolicyRule::composite(
                            Combinator::And,
                            vec![PolicyRule::monolithic(CheckKind::StringDistance)
                                .with_name("similar-labels")],
                        ),
                    ],
                ),
            ],
        );

        for parallel in [false, true] {
            let err = evaluator(parallel).evaluate(&rule, &sheet()).unwrap_err();
            assert!(matches!(
                err,
                EvaluationError::UnsupportedRuleVariant { ref rule, .. } if rule == "similar-labels"
            ));
        }
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let rule = PolicyRule::composite(
            Combinator::And,
            vec![
                leaf("fail"),
                leaf("pass"),
                PolicyRule::composite(Combinator::Or, vec![leaf("fail-twice"), leaf("fail")]),
                leaf("fail-twice"),
            ],
        );
        let sequential = evaluator(false).evaluate(&rule, &sheet()).unwrap();
        let parallel = evaluator(true).evaluate(&rule, &sheet()).unwrap();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_empty_composite() {
        for combinator in [Combinator::And, Combinator::Or, Combinator::OneAmongOthers] {
            let rule = PolicyRule::composite(combinator, Vec::new());
            assert!(evaluator(false).evaluate(&rule, &sheet()).unwrap().conforms());
        }
    }
}
