//! Facility for dynamic (user-authored) rules

use super::condition::Condition;
use super::{Evaluation, EvaluationError, Evaluator, TestFacility};
use crate::rule::{DynamicRule, PolicyRule};
use crate::spreadsheet::Spreadsheet;
use crate::violation::Violation;
use globset::{Glob, GlobMatcher};

/// Evaluates a dynamic rule's condition against every cell in scope
pub struct DynamicTestFacility;

impl DynamicTestFacility {
    fn scope_matcher(
        rule: &PolicyRule,
        variant: &DynamicRule,
    ) -> Result<Option<GlobMatcher>, EvaluationError> {
        variant
            .scope
            .as_deref()
            .map(|pattern| {
                Glob::new(pattern)
                    .map(|glob| glob.compile_matcher())
                    .map_err(|e| EvaluationError::InvalidScope {
                        rule: rule.name().to_string(),
                        message: e.to_string(),
                    })
            })
            .transpose()
    }
}

impl TestFacility for DynamicTestFacility {
    type Rule = DynamicRule;

    fn evaluate(
        &self,
        _evaluator: &Evaluator,
        rule: &PolicyRule,
        variant: &DynamicRule,
        sheet: &Spreadsheet,
    ) -> Result<Evaluation, EvaluationError> {
        let condition = Condition::parse(&variant.condition).map_err(|e| {
            EvaluationError::InvalidCondition {
                rule: rule.name().to_string(),
                message: e.to_string(),
            }
        })?;
        let scope = Self::scope_matcher(rule, variant)?;

        let message = format!("Cell matches condition: {}", variant.condition.trim());
        let violations = sheet
            .cells()
            .filter(|cell| scope.as_ref().map_or(true, |m| m.is_match(cell.sheet)))
            .filter(|cell| condition.evaluate(cell))
            .map(|cell| {
                Violation::new(
                    rule.name(),
                    cell.location(),
                    &message,
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
    use crate::spreadsheet::{Cell, CellValue, Worksheet};

    fn sheet() -> Spreadsheet {
        Spreadsheet::new()
            .with_sheet(
                Worksheet::new("Input")
                    .with_cell("A1", Cell::number(1500.0))
                    .unwrap()
                    .with_cell("A2", Cell::number(20.0))
                    .unwrap()
                    .with_cell("A3", Cell::text("note"))
                    .unwrap(),
            )
            .with_sheet(
                Worksheet::new("Report")
                    .with_cell("B2", Cell::number(2000.0))
                    .unwrap()
                    .with_cell("B3", Cell::formula("=B2*2", CellValue::Number(4000.0)))
                    .unwrap(),
            )
    }

    #[test]
    fn test_matching_cells_are_violations() {
        let rule = PolicyRule::dynamic("value > 1000")
            .with_name("large-values")
            .with_severity_weight(1.5)
            .with_category(LeafCategory::new("Values"));
        let result = Evaluator::default().evaluate(&rule, &sheet()).unwrap();

        assert!(result.violated);
        assert_eq!(result.aggregate_severity, 1.5);
        let cells: Vec<String> = result
            .violations
            .iter()
            .map(|v| v.location.to_string())
            .collect();
        assert_eq!(cells, vec!["Input!A1", "Report!B2", "Report!B3"]);
        assert_eq!(
            result.violations[0].message,
            "Cell matches condition: value > 1000"
        );
        assert_eq!(
            result.violations[0].category,
            Some(LeafCategory::new("Values"))
        );
    }

    #[test]
    fn test_no_match_conforms() {
        let rule = PolicyRule::dynamic("value > 1000000");
        let result = Evaluator::default().evaluate(&rule, &sheet()).unwrap();
        assert!(result.conforms());
        assert_eq!(result.aggregate_severity, 0.0);
    }

    #[test]
    fn test_sheet_scope() {
        let rule = PolicyRule::dynamic("value > 1000").with_scope("Rep*");
        let result = Evaluator::default().evaluate(&rule, &sheet()).unwrap();
        assert_eq!(result.violations.len(), 2);
        assert!(result
            .violations
            .iter()
            .all(|v| v.location.sheet == "Report"));
    }

    #[test]
    fn test_invalid_condition() {
        let rule = PolicyRule::dynamic("colour > 3").with_name("broken");
        let err = Evaluator::default().evaluate(&rule, &sheet()).unwrap_err();
        assert!(matches!(
            err,
            EvaluationError::InvalidCondition { ref rule, .. } if rule == "broken"
        ));
    }

    #[test]
    fn test_invalid_scope() {
        let rule = PolicyRule::dynamic("value > 1").with_scope("[unclosed");
        let err = Evaluator::default().evaluate(&rule, &sheet()).unwrap_err();
        assert!(matches!(err, EvaluationError::InvalidScope { .. }));
    }
}
