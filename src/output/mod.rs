//! Output formatters for policy reports

mod json;
mod text;

pub use json::JsonFormatter;
pub use text::TextFormatter;

use crate::aggregate::PolicyReport;
use crate::violation::Violation;

/// Output formatter trait
pub trait OutputFormatter: Send + Sync {
    /// Format the whole report
    fn format(&self, report: &PolicyReport) -> String;

    /// Format a single violation
    fn format_violation(&self, violation: &Violation) -> String;
}
