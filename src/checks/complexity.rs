//! Formula complexity limits

use super::formula::{max_nesting, operation_count, tokenize};
use super::{Check, Finding};
use crate::configuration::RuleConfiguration;
use crate::rule::CheckKind;
use crate::spreadsheet::Spreadsheet;

/// Default maximum parenthesis nesting
pub const DEFAULT_MAX_NESTING: usize = 3;

/// Default maximum number of operators and function calls
pub const DEFAULT_MAX_OPERATIONS: usize = 10;

/// Flags formulas that nest too deeply or chain too many operations.
///
/// Configuration: `max_nesting`, `max_operations`.
pub struct FormulaComplexityCheck;

impl Check for FormulaComplexityCheck {
    fn kind(&self) -> CheckKind {
        CheckKind::FormulaComplexity
    }

    fn description(&self) -> &str {
        "Formulas must stay below a nesting and operation limit"
    }

    fn run(&self, sheet: &Spreadsheet, config: Option<&RuleConfiguration>) -> Vec<Finding> {
        let max_depth = config
            .and_then(|c| c.get_usize("max_nesting"))
            .unwrap_or(DEFAULT_MAX_NESTING);
        let max_ops = config
            .and_then(|c| c.get_usize("max_operations"))
            .unwrap_or(DEFAULT_MAX_OPERATIONS);

        let mut findings = Vec::new();
        for cell in sheet.formula_cells() {
            let Some(formula) = cell.cell.formula.as_deref() else {
                continue;
            };
            let tokens = tokenize(formula);
            let depth = max_nesting(&tokens);
            let ops = operation_count(&tokens);

            let mut problems = Vec::new();
            if depth > max_depth {
                problems.push(format!("nesting depth {} exceeds {}", depth, max_depth));
            }
            if ops > max_ops {
                problems.push(format!("{} operations exceed {}", ops, max_ops));
            }

            if !problems.is_empty() {
                findings.push(Finding::new(
                    cell.location(),
                    &format!("Formula too complex: {}", problems.join(", ")),
                ));
            }
        }
        findings
    }
}
