//! Checks over cell values

use super::formula::{referenced_cells, tokenize};
use super::{Check, Finding};
use crate::configuration::RuleConfiguration;
use crate::rule::CheckKind;
use crate::spreadsheet::{CellLocation, CellValue, Spreadsheet};
use std::collections::HashSet;

/// Flags cells holding a spreadsheet error value (`#DIV/0!`, `#REF!`, ...)
pub struct ErrorContainingCellCheck;

impl Check for ErrorContainingCellCheck {
    fn kind(&self) -> CheckKind {
        CheckKind::ErrorContainingCell
    }

    fn description(&self) -> &str {
        "Cells must not contain error values"
    }

    fn run(&self, sheet: &Spreadsheet, _config: Option<&RuleConfiguration>) -> Vec<Finding> {
        sheet
            .cells()
            .filter_map(|cell| match &cell.cell.value {
                CellValue::Error(error) => Some(Finding::new(
                    cell.location(),
                    &format!("Cell contains error value {}", error),
                )),
                _ => None,
            })
            .collect()
    }
}

/// Flags input values (numbers and booleans without a formula) that no formula uses
pub struct NonConsideredValuesCheck;

impl Check for NonConsideredValuesCheck {
    fn kind(&self) -> CheckKind {
        CheckKind::NonConsideredValues
    }

    fn description(&self) -> &str {
        "Every input value must be used by at least one formula"
    }

    fn run(&self, sheet: &Spreadsheet, _config: Option<&RuleConfiguration>) -> Vec<Finding> {
        let mut used: HashSet<CellLocation> = HashSet::new();
        for cell in sheet.formula_cells() {
            if let Some(formula) = cell.cell.formula.as_deref() {
                used.extend(referenced_cells(&tokenize(formula), cell.sheet));
            }
        }

        sheet
            .cells()
            .filter(|cell| !cell.cell.has_formula())
            .filter(|cell| matches!(cell.cell.value, CellValue::Number(_) | CellValue::Bool(_)))
            .filter(|cell| !used.contains(&cell.location()))
            .map(|cell| {
                Finding::new(
                    cell.location(),
                    &format!("Value {} is not considered by any formula", cell.cell.value),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::{Cell, Worksheet};

    fn sheet() -> Spreadsheet {
        Spreadsheet::new().with_sheet(
            Worksheet::new("Data")
                .with_cell("A1", Cell::text("Price"))
                .unwrap()
                .with_cell("B1", Cell::number(10.0))
                .unwrap()
                .with_cell("B2", Cell::number(20.0))
                .unwrap()
                .with_cell("B3", Cell::number(99.0))
                .unwrap()
                .with_cell("C1", Cell::formula("=SUM(B1:B2)", CellValue::Number(30.0)))
                .unwrap()
                .with_cell(
                    "C2",
                    Cell::formula("=B1/0", CellValue::Error("#DIV/0!".to_string())),
                )
                .unwrap(),
        )
    }

    #[test]
    fn test_error_cells() {
        let findings = ErrorContainingCellCheck.run(&sheet(), None);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].location.a1(), "C2");
        assert_eq!(findings[0].message, "Cell contains error value #DIV/0!");
    }

    #[test]
    fn test_non_considered_values() {
        let findings = NonConsideredValuesCheck.run(&sheet(), None);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].location.a1(), "B3");
        assert_eq!(findings[0].message, "Value 99 is not considered by any formula");
    }
}
