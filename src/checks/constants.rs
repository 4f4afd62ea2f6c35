//! Constant literals inside formulas

use super::formula::{numeric_constants, tokenize};
use super::{Check, Finding};
use crate::configuration::RuleConfiguration;
use crate::rule::CheckKind;
use crate::spreadsheet::Spreadsheet;

/// Constants tolerated when no `ignored_constants` are configured
pub const DEFAULT_IGNORED_CONSTANTS: &[f64] = &[0.0, 1.0];

/// Flags formulas that embed numeric constants instead of referencing input cells.
///
/// Configuration: `ignored_constants` (list of numbers).
pub struct NoConstantsInFormulasCheck;

impl Check for NoConstantsInFormulasCheck {
    fn kind(&self) -> CheckKind {
        CheckKind::NoConstantsInFormulas
    }

    fn description(&self) -> &str {
        "Formulas must not contain constant values"
    }

    fn run(&self, sheet: &Spreadsheet, config: Option<&RuleConfiguration>) -> Vec<Finding> {
        let ignored = config
            .and_then(|c| c.get_f64_list("ignored_constants"))
            .unwrap_or_else(|| DEFAULT_IGNORED_CONSTANTS.to_vec());

        let mut findings = Vec::new();
        for cell in sheet.formula_cells() {
            let Some(formula) = cell.cell.formula.as_deref() else {
                continue;
            };
            let constants: Vec<String> = numeric_constants(&tokenize(formula))
                .into_iter()
                .filter(|n| !ignored.contains(n))
                .map(|n| n.to_string())
                .collect();

            if !constants.is_empty() {
                findings.push(Finding::new(
                    cell.location(),
                    &format!("Formula contains constant value(s): {}", constants.join(", ")),
                ));
            }
        }
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::{Cell, CellValue, Worksheet};

    fn sheet() -> Spreadsheet {
        Spreadsheet::new().with_sheet(
            Worksheet::new("Calc")
                .with_cell("A1", Cell::number(100.0))
                .unwrap()
                .with_cell("A2", Cell::formula("=A1*1.19", CellValue::Number(119.0)))
                .unwrap()
                .with_cell("A3", Cell::formula("=A1-1", CellValue::Number(99.0)))
                .unwrap(),
        )
    }

    #[test]
    fn test_constants_detected() {
        let findings = NoConstantsInFormulasCheck.run(&sheet(), None);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].location.a1(), "A2");
        assert!(findings[0].message.ends_with("1.19"));
    }

    #[test]
    fn test_ignored_constants_configured() {
        let config = RuleConfiguration::new().with("ignored_constants", vec![1.19]);
        let findings = NoConstantsInFormulasCheck.run(&sheet(), Some(&config));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].location.a1(), "A3");
    }
}
