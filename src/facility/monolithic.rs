//! Facility for monolithic rules

use super::{Evaluation, EvaluationError, Evaluator, TestFacility};
use crate::rule::{MonolithicRule, PolicyRule};
use crate::spreadsheet::Spreadsheet;
use crate::violation::Violation;

/// Runs a monolithic rule's atomic check; every finding becomes a violation
/// weighted with the rule's severity weight.
pub struct MonolithicTestFacility;

impl TestFacility for MonolithicTestFacility {
    type Rule = MonolithicRule;

    fn evaluate(
        &self,
        evaluator: &Evaluator,
        rule: &PolicyRule,
        variant: &MonolithicRule,
        sheet: &Spreadsheet,
    ) -> Result<Evaluation, EvaluationError> {
        let check = evaluator.registry().get(&variant.check).ok_or_else(|| {
            EvaluationError::UnsupportedRuleVariant {
                rule: rule.name().to_string(),
                check: variant.check.to_string(),
            }
        })?;

        let violations = check
            .run(sheet, rule.configuration())
            .into_iter()
            .map(|finding| {
                Violation::new(
                    rule.name(),
                    finding.location,
                    &finding.message,
                    rule.severity_weight(),
                )
                .with_category(rule.category().cloned())
            })
            .collect();

        Ok(Evaluation::from_violations(rule, violations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::LeafCategory;
    use crate::checks::CheckRegistry;
    use crate::configuration::RuleConfiguration;
    use crate::rule::CheckKind;
    use crate::spreadsheet::{Cell, CellValue, Worksheet};

    fn sheet() -> Spreadsheet {
        Spreadsheet::new().with_sheet(
            Worksheet::new("Calc")
                .with_cell("A1", Cell::number(2.0))
                .unwrap()
                .with_cell("B1", Cell::formula("=A1*12", CellValue::Number(24.0)))
                .unwrap()
                .with_cell("B2", Cell::formula("=A1*7", CellValue::Number(14.0)))
                .unwrap(),
        )
    }

    #[test]
    fn test_violations_are_weighted_and_classified() {
        let evaluator = Evaluator::new(CheckRegistry::with_builtin());
        let rule = PolicyRule::monolithic(CheckKind::NoConstantsInFormulas)
            .with_name("no-constants")
            .with_severity_weight(2.5)
            .with_category(LeafCategory::new("Formulas"));

        let variant = MonolithicRule {
            check: CheckKind::NoConstantsInFormulas,
        };
        let result = MonolithicTestFacility
            .evaluate(&evaluator, &rule, &variant, &sheet())
            .unwrap();

        assert!(result.violated);
        assert_eq!(result.violations.len(), 2);
        assert_eq!(result.aggregate_severity, 2.5);
        for violation in &result.violations {
            assert_eq!(violation.rule, "no-constants");
            assert_eq!(violation.contribution, 2.5);
            assert_eq!(violation.category, Some(LeafCategory::new("Formulas")));
        }
    }

    #[test]
    fn test_configuration_reaches_check() {
        let evaluator = Evaluator::new(CheckRegistry::with_builtin());
        let rule = PolicyRule::monolithic(CheckKind::NoConstantsInFormulas).with_configuration(
            RuleConfiguration::new().with("ignored_constants", vec![7.0, 12.0]),
        );

        let result = evaluator.evaluate(&rule, &sheet()).unwrap();
        assert!(result.conforms());
        assert_eq!(result.aggregate_severity, 0.0);
    }

    #[test]
    fn test_zero_weight_still_reports() {
        let evaluator = Evaluator::new(CheckRegistry::with_builtin());
        let rule =
            PolicyRule::monolithic(CheckKind::NoConstantsInFormulas).with_severity_weight(0.0);
        let result = evaluator.evaluate(&rule, &sheet()).unwrap();
        assert!(result.violated);
        assert_eq!(result.aggregate_severity, 0.0);
    }
}
