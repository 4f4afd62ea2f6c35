//! JSON output formatter

use super::OutputFormatter;
use crate::aggregate::PolicyReport;
use crate::violation::Violation;
use serde::Serialize;

/// JSON formatter for machine-readable output
#[derive(Default)]
pub struct JsonFormatter {
    /// Pretty print with indentation
    pub pretty: bool,
}

impl JsonFormatter {
    /// Create a new JSON formatter
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable pretty printing
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    fn render<T: Serialize>(&self, value: &T) -> String {
        if self.pretty {
            serde_json::to_string_pretty(value).unwrap_or_default()
        } else {
            serde_json::to_string(value).unwrap_or_default()
        }
    }
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    policy: &'a str,
    rules: Vec<JsonRule<'a>>,
    summary: JsonSummary,
}

#[derive(Serialize)]
struct JsonRule<'a> {
    rule: &'a str,
    violated: bool,
    aggregate_severity: f64,
    categories: Vec<JsonCategory<'a>>,
    totals: Vec<JsonRuleTotal<'a>>,
}

#[derive(Serialize)]
struct JsonCategory<'a> {
    category: &'a str,
    total_contribution: f64,
    violations: Vec<JsonViolation<'a>>,
}

#[derive(Serialize)]
struct JsonRuleTotal<'a> {
    rule: &'a str,
    violations: usize,
    total_contribution: f64,
}

#[derive(Serialize)]
struct JsonViolation<'a> {
    rule: &'a str,
    #[serde(skip_serializing_if = "is_top_level")]
    rule_path: &'a [usize],
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<&'a str>,
    sheet: &'a str,
    cell: String,
    message: &'a str,
    contribution: f64,
}

#[derive(Serialize)]
struct JsonSummary {
    rules_evaluated: usize,
    rules_violated: usize,
    violation_count: usize,
    total_severity: f64,
    duration_ms: u128,
}

fn is_top_level(path: &&[usize]) -> bool {
    path.is_empty()
}

fn json_violation(violation: &Violation) -> JsonViolation<'_> {
    JsonViolation {
        rule: &violation.rule,
        rule_path: &violation.rule_path,
        category: violation.category.as_ref().map(|c| c.label()),
        sheet: &violation.location.sheet,
        cell: violation.location.a1(),
        message: &violation.message,
        contribution: violation.contribution,
    }
}

impl OutputFormatter for JsonFormatter {
    fn format(&self, report: &PolicyReport) -> String {
        let rules = report
            .reports
            .iter()
            .map(|r| JsonRule {
                rule: &r.rule,
                violated: r.violated,
                aggregate_severity: r.aggregate_severity,
                categories: r
                    .groups
                    .iter()
                    .map(|g| JsonCategory {
                        category: &g.category,
                        total_contribution: g.total_contribution,
                        violations: g.violations.iter().map(json_violation).collect(),
                    })
                    .collect(),
                totals: r
                    .rules
                    .iter()
                    .map(|t| JsonRuleTotal {
                        rule: &t.rule,
                        violations: t.violations,
                        total_contribution: t.total_contribution,
                    })
                    .collect(),
            })
            .collect();

        let output = JsonOutput {
            policy: &report.policy,
            rules,
            summary: JsonSummary {
                rules_evaluated: report.reports.len(),
                rules_violated: report.violated_count(),
                violation_count: report.violation_count(),
                total_severity: report.total_severity(),
                duration_ms: report.duration.as_millis(),
            },
        };

        self.render(&output)
    }

    fn format_violation(&self, violation: &Violation) -> String {
        self.render(&json_violation(violation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facility::Evaluation;
    use crate::spreadsheet::CellLocation;
    use std::time::Duration;

    #[test]
    fn test_json_format_violation() {
        let formatter = JsonFormatter::new();
        let violation = Violation::new("refs", CellLocation::new("Calc", 4, 2), "Empty", 1.0)
            .nested_under(1);

        let output = formatter.format_violation(&violation);
        assert!(output.contains("\"rule\":\"refs\""));
        assert!(output.contains("\"rule_path\":[1]"));
        assert!(output.contains("\"cell\":\"B4\""));
        assert!(!output.contains("\"category\""));
    }

    #[test]
    fn test_json_format_report() {
        let evaluation = Evaluation {
            rule: "policy".to_string(),
            violated: true,
            violations: vec![Violation::new("a", CellLocation::new("S", 1, 1), "m", 2.0)],
            aggregate_severity: 2.0,
        };
        let report = PolicyReport::new("budget", &[evaluation], Duration::ZERO);

        let output = JsonFormatter::new().format(&report);
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["policy"], "budget");
        assert_eq!(value["summary"]["rules_violated"], 1);
        assert_eq!(value["summary"]["violation_count"], 1);
        assert_eq!(value["rules"][0]["categories"][0]["category"], "uncategorized");
        assert_eq!(value["rules"][0]["totals"][0]["violations"], 1);
    }

    #[test]
    fn test_json_pretty() {
        let formatter = JsonFormatter::new().pretty();
        let violation = Violation::new("r", CellLocation::new("S", 1, 1), "m", 1.0);
        assert!(formatter.format_violation(&violation).contains('\n'));
    }
}
