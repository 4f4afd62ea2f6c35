//! Violation types produced by rule evaluation

use crate::category::LeafCategory;
use crate::spreadsheet::CellLocation;
use serde::{Deserialize, Serialize};

/// A recorded instance of non-conformance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Name of the rule that produced this violation
    pub rule: String,
    /// Index path from the evaluated top-level rule to the originating rule
    #[serde(default)]
    pub rule_path: Vec<usize>,
    /// Category of the originating rule
    #[serde(default)]
    pub category: Option<LeafCategory>,
    /// Where in the spreadsheet
    pub location: CellLocation,
    /// Human-readable message
    pub message: String,
    /// Weighted contribution (the originating rule's severity weight)
    pub contribution: f64,
}

impl Violation {
    pub fn new(rule: &str, location: CellLocation, message: &str, contribution: f64) -> Self {
        Self {
            rule: rule.to_string(),
            rule_path: Vec::new(),
            category: None,
            location,
            message: message.to_string(),
            contribution,
        }
    }

    pub fn with_category(mut self, category: Option<LeafCategory>) -> Self {
        self.category = category;
        self
    }

    /// Prefix the rule path with the index of the enclosing sub-rule
    pub fn nested_under(mut self, index: usize) -> Self {
        self.rule_path.insert(0, index);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_creation() {
        let loc = CellLocation::new("Sheet1", 2, 3);
        let violation = Violation::new("no-constants", loc.clone(), "Constant 42", 2.0)
            .with_category(Some(LeafCategory::new("Formulas")));

        assert_eq!(violation.rule, "no-constants");
        assert_eq!(violation.location, loc);
        assert_eq!(violation.contribution, 2.0);
        assert_eq!(violation.category.as_ref().map(|c| c.label()), Some("Formulas"));
        assert!(violation.rule_path.is_empty());
    }

    #[test]
    fn test_nested_path() {
        let violation = Violation::new("r", CellLocation::new("S", 1, 1), "m", 1.0)
            .nested_under(2)
            .nested_under(0);
        assert_eq!(violation.rule_path, vec![0, 2]);
    }
}
