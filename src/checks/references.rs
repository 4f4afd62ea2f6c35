//! Checks over the cell references a formula makes

use super::formula::{references, tokenize};
use super::{Check, Finding};
use crate::configuration::RuleConfiguration;
use crate::rule::CheckKind;
use crate::spreadsheet::{CellLocation, Spreadsheet};
use std::collections::HashSet;

/// Flags formulas that reference empty or missing cells.
///
/// Only single-cell references are inspected; ranges routinely span blanks.
pub struct RefToNullCheck;

impl Check for RefToNullCheck {
    fn kind(&self) -> CheckKind {
        CheckKind::RefToNull
    }

    fn description(&self) -> &str {
        "Formulas must not reference empty cells"
    }

    fn run(&self, sheet: &Spreadsheet, _config: Option<&RuleConfiguration>) -> Vec<Finding> {
        let mut findings = Vec::new();
        for cell in sheet.formula_cells() {
            let Some(formula) = cell.cell.formula.as_deref() else {
                continue;
            };
            let tokens = tokenize(formula);
            let empty: Vec<String> = references(&tokens)
                .into_iter()
                .map(|r| r.resolve(cell.sheet))
                .filter(|loc| {
                    sheet
                        .cell(loc)
                        .map_or(true, |c| c.value.is_empty() && !c.has_formula())
                })
                .map(|loc| display_reference(&loc, cell.sheet))
                .collect();

            if !empty.is_empty() {
                findings.push(Finding::new(
                    cell.location(),
                    &format!("Formula references empty cell(s): {}", empty.join(", ")),
                ));
            }
        }
        findings
    }
}

/// Flags references that point against the reading direction
/// (right of or below the formula cell on the same sheet).
///
/// Configuration: `left_to_right` (default true), `top_to_bottom` (default true).
pub struct ReadingDirectionCheck;

impl Check for ReadingDirectionCheck {
    fn kind(&self) -> CheckKind {
        CheckKind::ReadingDirection
    }

    fn description(&self) -> &str {
        "Formulas must only reference cells above or left of themselves"
    }

    fn run(&self, sheet: &Spreadsheet, config: Option<&RuleConfiguration>) -> Vec<Finding> {
        let left_to_right = config
            .and_then(|c| c.get_bool("left_to_right"))
            .unwrap_or(true);
        let top_to_bottom = config
            .and_then(|c| c.get_bool("top_to_bottom"))
            .unwrap_or(true);

        let mut findings = Vec::new();
        for cell in sheet.formula_cells() {
            let Some(formula) = cell.cell.formula.as_deref() else {
                continue;
            };
            let tokens = tokenize(formula);
            let against: Vec<String> = references(&tokens)
                .into_iter()
                .map(|r| r.resolve(cell.sheet))
                .filter(|loc| loc.sheet == cell.sheet)
                .filter(|loc| {
                    (left_to_right && loc.column > cell.column)
                        || (top_to_bottom && loc.row > cell.row)
                })
                .map(|loc| loc.a1())
                .collect();

            if !against.is_empty() {
                findings.push(Finding::new(
                    cell.location(),
                    &format!(
                        "Formula references cell(s) against the reading direction: {}",
                        against.join(", ")
                    ),
                ));
            }
        }
        findings
    }
}

/// Flags formulas that reference the same cell more than once
pub struct MultipleSameRefCheck;

impl Check for MultipleSameRefCheck {
    fn kind(&self) -> CheckKind {
        CheckKind::MultipleSameRef
    }

    fn description(&self) -> &str {
        "Formulas should reference each cell only once"
    }

    fn run(&self, sheet: &Spreadsheet, _config: Option<&RuleConfiguration>) -> Vec<Finding> {
        let mut findings = Vec::new();
        for cell in sheet.formula_cells() {
            let Some(formula) = cell.cell.formula.as_deref() else {
                continue;
            };
            let tokens = tokenize(formula);
            let mut seen = HashSet::new();
            let mut repeated: Vec<CellLocation> = Vec::new();
            for loc in references(&tokens).into_iter().map(|r| r.resolve(cell.sheet)) {
                if !seen.insert(loc.clone()) && !repeated.contains(&loc) {
                    repeated.push(loc);
                }
            }

            if !repeated.is_empty() {
                let names: Vec<String> = repeated
                    .iter()
                    .map(|loc| display_reference(loc, cell.sheet))
                    .collect();
                findings.push(Finding::new(
                    cell.location(),
                    &format!("Formula references cell(s) more than once: {}", names.join(", ")),
                ));
            }
        }
        findings
    }
}

/// `A1` for the formula's own sheet, `Sheet!A1` otherwise
fn display_reference(loc: &CellLocation, own_sheet: &str) -> String {
    if loc.sheet == own_sheet {
        loc.a1()
    } else {
        loc.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::{Cell, CellValue, Worksheet};

    fn sheet() -> Spreadsheet {
        Spreadsheet::new()
            .with_sheet(
                Worksheet::new("Calc")
                    .with_cell("A1", Cell::number(1.0))
                    .unwrap()
                    .with_cell("B1", Cell::formula("=A1+C1", CellValue::Number(1.0)))
                    .unwrap()
                    .with_cell("B2", Cell::formula("=A1*A1+B1", CellValue::Number(2.0)))
                    .unwrap()
                    .with_cell("B3", Cell::formula("=Input!A1+B4", CellValue::Number(5.0)))
                    .unwrap(),
            )
            .with_sheet(
                Worksheet::new("Input")
                    .with_cell("A1", Cell::number(4.0))
                    .unwrap(),
            )
    }

    #[test]
    fn test_ref_to_null() {
        let findings = RefToNullCheck.run(&sheet(), None);
        let at: Vec<String> = findings.iter().map(|f| f.location.a1()).collect();
        assert_eq!(at, vec!["B1", "B3"]);
        assert!(findings[0].message.ends_with("C1"));
        assert!(findings[1].message.ends_with("B4"));
    }

    #[test]
    fn test_formula_cell_is_not_null() {
        // B2 references B1, which holds a formula
        let findings = RefToNullCheck.run(&sheet(), None);
        assert!(findings.iter().all(|f| f.location.a1() != "B2"));
    }

    #[test]
    fn test_reading_direction() {
        let findings = ReadingDirectionCheck.run(&sheet(), None);
        let at: Vec<String> = findings.iter().map(|f| f.location.a1()).collect();
        // B1 -> C1 (right), B3 -> B4 (below); Input!A1 is on another sheet
        assert_eq!(at, vec!["B1", "B3"]);
    }

    #[test]
    fn test_reading_direction_columns_only() {
        let config = RuleConfiguration::new().with("top_to_bottom", false);
        let findings = ReadingDirectionCheck.run(&sheet(), Some(&config));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].location.a1(), "B1");
    }

    #[test]
    fn test_multiple_same_ref() {
        let findings = MultipleSameRefCheck.run(&sheet(), None);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].location.a1(), "B2");
        assert!(findings[0].message.ends_with("A1"));
    }
}
