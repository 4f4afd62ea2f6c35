//! Human-readable text output formatter

use super::OutputFormatter;
use crate::aggregate::{PolicyReport, ViolationReport};
use crate::violation::Violation;
use colored::*;

/// Text formatter with optional color support
pub struct TextFormatter {
    /// Enable colored output
    pub colored: bool,

    /// List every violation under its category
    pub show_violations: bool,

    /// Show statistics
    pub show_stats: bool,
}

impl Default for TextFormatter {
    fn default() -> Self {
        Self {
            colored: true,
            show_violations: true,
            show_stats: true,
        }
    }
}

impl TextFormatter {
    /// Create a new text formatter
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable colors
    pub fn without_color(mut self) -> Self {
        self.colored = false;
        self
    }

    /// Only print per-category summaries
    pub fn summary_only(mut self) -> Self {
        self.show_violations = false;
        self
    }

    fn paint(&self, text: String, style: fn(ColoredString) -> ColoredString) -> String {
        if self.colored {
            style(text.normal()).to_string()
        } else {
            text
        }
    }

    fn format_rule(&self, report: &ViolationReport) -> String {
        let mut output = String::new();

        let status = if report.violated {
            self.paint("violated".to_string(), |s| s.red().bold())
        } else {
            self.paint("conforms".to_string(), |s| s.green())
        };
        let name = self.paint(report.rule.clone(), |s| s.underline());
        output.push_str(&format!("{}: {}", name, status));
        if report.violated {
            output.push_str(&format!(" (severity {:.2})", report.aggregate_severity));
        }
        output.push('\n');

        for group in &report.groups {
            output.push_str(&format!(
                "  {} - {} {}, weight {:.2}\n",
                self.paint(group.category.clone(), |s| s.cyan()),
                group.violations.len(),
                if group.violations.len() == 1 {
                    "violation"
                } else {
                    "violations"
                },
                group.total_contribution
            ));

            if self.show_violations {
                for violation in &group.violations {
                    output.push_str("    ");
                    output.push_str(&self.format_violation(violation));
                    output.push('\n');
                }
            }
        }

        output
    }
}

impl OutputFormatter for TextFormatter {
    fn format(&self, report: &PolicyReport) -> String {
        let mut output = String::new();

        for rule in &report.reports {
            output.push_str(&self.format_rule(rule));
        }

        if self.show_stats {
            let rules = report.reports.len();
            output.push_str(&format!(
                "\n{} {} evaluated",
                rules,
                if rules == 1 { "rule" } else { "rules" }
            ));

            let violated = report.violated_count();
            if violated > 0 {
                let counts = format!(
                    ": {} violated, {} {}, total severity {:.2}",
                    violated,
                    report.violation_count(),
                    if report.violation_count() == 1 {
                        "violation"
                    } else {
                        "violations"
                    },
                    report.total_severity()
                );
                output.push_str(&self.paint(counts, |s| s.red()));
            }
            output.push('\n');

            output.push_str(&format!(
                "Finished in {:.2}s\n",
                report.duration.as_secs_f64()
            ));
        }

        output
    }

    fn format_violation(&self, violation: &Violation) -> String {
        format!(
            "{}: [{}] {} (+{:.2})",
            self.paint(violation.location.to_string(), |s| s.bold()),
            self.paint(violation.rule.clone(), |s| s.cyan()),
            violation.message,
            violation.contribution
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::LeafCategory;
    use crate::facility::Evaluation;
    use crate::spreadsheet::CellLocation;
    use std::time::Duration;

    fn report() -> PolicyReport {
        let evaluation = Evaluation {
            rule: "formulas".to_string(),
            violated: true,
            violations: vec![Violation::new(
                "no-constants",
                CellLocation::new("Calc", 2, 2),
                "Formula contains constant value(s): 12",
                2.0,
            )
            .with_category(Some(LeafCategory::new("Formulas")))],
            aggregate_severity: 2.0,
        };
        PolicyReport::new(
            "budget",
            &[evaluation, Evaluation::conforming("errors")],
            Duration::from_millis(3),
        )
    }

    #[test]
    fn test_format_violation() {
        let formatter = TextFormatter::new().without_color();
        let violation = Violation::new("r", CellLocation::new("S", 1, 3), "Bad", 1.5);
        assert_eq!(formatter.format_violation(&violation), "S!C1: [r] Bad (+1.50)");
    }

    #[test]
    fn test_format_report() {
        let output = TextFormatter::new().without_color().format(&report());
        assert!(output.contains("formulas: violated (severity 2.00)"));
        assert!(output.contains("Formulas - 1 violation, weight 2.00"));
        assert!(output.contains("Calc!B2: [no-constants]"));
        assert!(output.contains("errors: conforms"));
        assert!(output.contains("2 rules evaluated: 1 violated, 1 violation, total severity 2.00"));
    }

    #[test]
    fn test_summary_only() {
        let output = TextFormatter::new()
            .without_color()
            .summary_only()
            .format(&report());
        assert!(output.contains("Formulas - 1 violation"));
        assert!(!output.contains("Calc!B2"));
    }
}
