//! Sif - spreadsheet policy rules
//!
//! Models the regulations a spreadsheet must satisfy as a tree of weighted
//! policy rules, evaluates rule trees against a spreadsheet snapshot and
//! aggregates the resulting violations by category and rule.
//!
//! # Architecture
//!
//! ```text
//! CLI/API -> definition (YAML/JSON/XML) -> PolicyRule tree
//!         -> Config::bind -> Evaluator -> facilities -> checks
//!         -> ViolationReport -> OutputFormatter
//! ```
//!
//! Three rule variants exist: monolithic rules run one atomic check,
//! composite rules merge their sub-rules with a combinator, and dynamic
//! rules evaluate a user-authored condition against every cell:
//!
//! ```yaml
//! name: budget-policy
//! rules:
//!   - kind: composite
//!     name: formulas
//!     combinator: one-among-others
//!     rules:
//!       - kind: formula-complexity
//!       - kind: no-constants-in-formulas
//!       - kind: dynamic
//!         condition: "formula =~ /INDIRECT/"
//! ```

pub mod aggregate;
pub mod category;
pub mod checks;
pub mod config;
pub mod configuration;
pub mod definition;
pub mod facility;
pub mod output;
pub mod rule;
pub mod spreadsheet;
pub mod violation;

// Re-export main types
pub use aggregate::{CategoryGroup, PolicyReport, RuleTotal, ViolationReport};
pub use category::LeafCategory;
pub use checks::{Check, CheckRegistry, Finding};
pub use config::Config;
pub use configuration::RuleConfiguration;
pub use definition::{load_policy, DefinitionError, PolicyDocument, RuleDefinition};
pub use facility::{Evaluation, EvaluationError, EvaluationStats, Evaluator, TestFacility};
pub use output::{JsonFormatter, OutputFormatter, TextFormatter};
pub use rule::{
    CheckKind, Combinator, CompositeRule, DynamicRule, MonolithicRule, PolicyRule,
    PolicyRuleType, RuleKind, RuleVariant,
};
pub use spreadsheet::{Cell, CellLocation, CellValue, Spreadsheet, Worksheet};
pub use violation::Violation;
