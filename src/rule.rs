//! Policy rule definition
//!
//! A policy rule is a named, weighted regulation a spreadsheet must satisfy.
//! Every rule carries the same base attributes; what it checks depends on
//! its variant:
//!
//! - [`MonolithicRule`] applies one atomic check directly to spreadsheet content
//! - [`CompositeRule`] combines an ordered list of sub-rules with a [`Combinator`]
//! - [`DynamicRule`] evaluates a user-authored condition against each cell

use crate::category::LeafCategory;
use crate::configuration::RuleConfiguration;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default value of every descriptive string attribute
pub const NOT_AVAILABLE: &str = "N.A.";

/// Default severity weight
pub const DEFAULT_SEVERITY_WEIGHT: f64 = 1.0;

/// Apply the severity-weight clamp: negative (or NaN) proposals keep the current weight
pub fn clamp_severity_weight(current: f64, proposed: f64) -> f64 {
    if proposed >= 0.0 {
        proposed
    } else {
        current
    }
}

/// Author-declared kind of a rule.
///
/// This is metadata: it does not have to agree with the variant the rule
/// is actually built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyRuleType {
    FormulaComplexity,
    NoConstantsInFormulas,
    Sanity,
    ReadingDirection,
    Dynamic,
    StringDistance,
    MultipleSameRef,
    NonConsideredValues,
    OneAmongOthers,
    RefToNull,
    ErrorContainingCell,
    Monolithic,
    Composite,
}

impl PolicyRuleType {
    /// Every known tag
    pub const ALL: &'static [PolicyRuleType] = &[
        PolicyRuleType::FormulaComplexity,
        PolicyRuleType::NoConstantsInFormulas,
        PolicyRuleType::Sanity,
        PolicyRuleType::ReadingDirection,
        PolicyRuleType::Dynamic,
        PolicyRuleType::StringDistance,
        PolicyRuleType::MultipleSameRef,
        PolicyRuleType::NonConsideredValues,
        PolicyRuleType::OneAmongOthers,
        PolicyRuleType::RefToNull,
        PolicyRuleType::ErrorContainingCell,
        PolicyRuleType::Monolithic,
        PolicyRuleType::Composite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyRuleType::FormulaComplexity => "formula-complexity",
            PolicyRuleType::NoConstantsInFormulas => "no-constants-in-formulas",
            PolicyRuleType::Sanity => "sanity",
            PolicyRuleType::ReadingDirection => "reading-direction",
            PolicyRuleType::Dynamic => "dynamic",
            PolicyRuleType::StringDistance => "string-distance",
            PolicyRuleType::MultipleSameRef => "multiple-same-ref",
            PolicyRuleType::NonConsideredValues => "non-considered-values",
            PolicyRuleType::OneAmongOthers => "one-among-others",
            PolicyRuleType::RefToNull => "ref-to-null",
            PolicyRuleType::ErrorContainingCell => "error-containing-cell",
            PolicyRuleType::Monolithic => "monolithic",
            PolicyRuleType::Composite => "composite",
        }
    }
}

impl fmt::Display for PolicyRuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PolicyRuleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        PolicyRuleType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| format!("Unknown rule type: {}", s))
    }
}

/// Identifies the atomic check behind a monolithic rule
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CheckKind {
    FormulaComplexity,
    NoConstantsInFormulas,
    Sanity,
    ReadingDirection,
    StringDistance,
    MultipleSameRef,
    NonConsideredValues,
    RefToNull,
    ErrorContainingCell,
    /// Externally registered check, referenced by name
    Custom(String),
}

impl CheckKind {
    /// Check kind for a rule tag, if that tag names an atomic check
    pub fn from_rule_type(rule_type: PolicyRuleType) -> Option<Self> {
        match rule_type {
            PolicyRuleType::FormulaComplexity => Some(CheckKind::FormulaComplexity),
            PolicyRuleType::NoConstantsInFormulas => Some(CheckKind::NoConstantsInFormulas),
            PolicyRuleType::Sanity => Some(CheckKind::Sanity),
            PolicyRuleType::ReadingDirection => Some(CheckKind::ReadingDirection),
            PolicyRuleType::StringDistance => Some(CheckKind::StringDistance),
            PolicyRuleType::MultipleSameRef => Some(CheckKind::MultipleSameRef),
            PolicyRuleType::NonConsideredValues => Some(CheckKind::NonConsideredValues),
            PolicyRuleType::RefToNull => Some(CheckKind::RefToNull),
            PolicyRuleType::ErrorContainingCell => Some(CheckKind::ErrorContainingCell),
            PolicyRuleType::Dynamic
            | PolicyRuleType::OneAmongOthers
            | PolicyRuleType::Monolithic
            | PolicyRuleType::Composite => None,
        }
    }

    /// The rule tag a built-in check is persisted under
    pub fn rule_type(&self) -> PolicyRuleType {
        match self {
            CheckKind::FormulaComplexity => PolicyRuleType::FormulaComplexity,
            CheckKind::NoConstantsInFormulas => PolicyRuleType::NoConstantsInFormulas,
            CheckKind::Sanity => PolicyRuleType::Sanity,
            CheckKind::ReadingDirection => PolicyRuleType::ReadingDirection,
            CheckKind::StringDistance => PolicyRuleType::StringDistance,
            CheckKind::MultipleSameRef => PolicyRuleType::MultipleSameRef,
            CheckKind::NonConsideredValues => PolicyRuleType::NonConsideredValues,
            CheckKind::RefToNull => PolicyRuleType::RefToNull,
            CheckKind::ErrorContainingCell => PolicyRuleType::ErrorContainingCell,
            CheckKind::Custom(_) => PolicyRuleType::Monolithic,
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckKind::Custom(name) => write!(f, "{}", name),
            other => write!(f, "{}", other.rule_type()),
        }
    }
}

/// How the results of a composite's sub-rules merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Combinator {
    /// Every sub-rule must hold
    #[default]
    And,
    /// At least one sub-rule must hold
    Or,
    /// At most one sub-rule may be violated
    OneAmongOthers,
}

impl Combinator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Combinator::And => "and",
            Combinator::Or => "or",
            Combinator::OneAmongOthers => "one-among-others",
        }
    }

    /// Whether the composite is violated given how many of `total` sub-rules were violated
    pub fn is_violated(&self, violated: usize, total: usize) -> bool {
        match self {
            Combinator::And => violated > 0,
            Combinator::Or => total > 0 && violated == total,
            Combinator::OneAmongOthers => violated > 1,
        }
    }
}

impl fmt::Display for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Combinator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "and" | "all" => Ok(Combinator::And),
            "or" | "any" => Ok(Combinator::Or),
            "one-among-others" | "oneamongothers" => Ok(Combinator::OneAmongOthers),
            _ => Err(format!("Unknown combinator: {}", s)),
        }
    }
}

/// Runtime variant of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleVariant {
    Monolithic,
    Composite,
    Dynamic,
}

impl fmt::Display for RuleVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleVariant::Monolithic => write!(f, "monolithic"),
            RuleVariant::Composite => write!(f, "composite"),
            RuleVariant::Dynamic => write!(f, "dynamic"),
        }
    }
}

/// An atomic rule backed by a single check
#[derive(Debug, Clone, PartialEq)]
pub struct MonolithicRule {
    pub check: CheckKind,
}

/// A rule composed of uniquely owned sub-rules
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeRule {
    pub combinator: Combinator,
    pub rules: Vec<PolicyRule>,
}

/// A user-authored rule: cells where `condition` holds are violations
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicRule {
    pub condition: String,
    /// Sheet-name glob restricting which sheets are inspected (None = all)
    pub scope: Option<String>,
}

/// Variant-specific part of a rule
#[derive(Debug, Clone, PartialEq)]
pub enum RuleKind {
    Monolithic(MonolithicRule),
    Composite(CompositeRule),
    Dynamic(DynamicRule),
}

/// A policy rule
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyRule {
    name: String,
    description: String,
    background: String,
    author: String,
    possible_solution: String,
    rule_type: Option<PolicyRuleType>,
    category: Option<LeafCategory>,
    severity_weight: f64,
    configuration: Option<RuleConfiguration>,
    kind: RuleKind,
}

impl PolicyRule {
    /// Create a rule of the given kind with every attribute at its default
    pub fn new(kind: RuleKind) -> Self {
        Self {
            name: NOT_AVAILABLE.to_string(),
            description: NOT_AVAILABLE.to_string(),
            background: NOT_AVAILABLE.to_string(),
            author: NOT_AVAILABLE.to_string(),
            possible_solution: NOT_AVAILABLE.to_string(),
            rule_type: None,
            category: None,
            severity_weight: DEFAULT_SEVERITY_WEIGHT,
            configuration: None,
            kind,
        }
    }

    /// Monolithic rule applying `check`
    pub fn monolithic(check: CheckKind) -> Self {
        Self::new(RuleKind::Monolithic(MonolithicRule { check }))
    }

    /// Composite rule over `rules` in the given order
    pub fn composite(combinator: Combinator, rules: Vec<PolicyRule>) -> Self {
        Self::new(RuleKind::Composite(CompositeRule { combinator, rules }))
    }

    /// Dynamic rule with a condition over cells
    pub fn dynamic(condition: &str) -> Self {
        Self::new(RuleKind::Dynamic(DynamicRule {
            condition: condition.to_string(),
            scope: None,
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn background(&self) -> &str {
        &self.background
    }

    /// The author that created the rule
    pub fn author(&self) -> &str {
        &self.author
    }

    /// How violations of this rule can be solved
    pub fn possible_solution(&self) -> &str {
        &self.possible_solution
    }

    /// The declared type tag (not necessarily the runtime variant)
    pub fn rule_type(&self) -> Option<PolicyRuleType> {
        self.rule_type
    }

    pub fn category(&self) -> Option<&LeafCategory> {
        self.category.as_ref()
    }

    pub fn severity_weight(&self) -> f64 {
        self.severity_weight
    }

    pub fn configuration(&self) -> Option<&RuleConfiguration> {
        self.configuration.as_ref()
    }

    pub fn kind(&self) -> &RuleKind {
        &self.kind
    }

    pub fn variant(&self) -> RuleVariant {
        match self.kind {
            RuleKind::Monolithic(_) => RuleVariant::Monolithic,
            RuleKind::Composite(_) => RuleVariant::Composite,
            RuleKind::Dynamic(_) => RuleVariant::Dynamic,
        }
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn set_description(&mut self, description: &str) {
        self.description = description.to_string();
    }

    pub fn set_background(&mut self, background: &str) {
        self.background = background.to_string();
    }

    pub fn set_author(&mut self, author: &str) {
        self.author = author.to_string();
    }

    pub fn set_possible_solution(&mut self, possible_solution: &str) {
        self.possible_solution = possible_solution.to_string();
    }

    pub fn set_rule_type(&mut self, rule_type: Option<PolicyRuleType>) {
        self.rule_type = rule_type;
    }

    pub fn set_category(&mut self, category: Option<LeafCategory>) {
        self.category = category;
    }

    pub fn set_configuration(&mut self, configuration: Option<RuleConfiguration>) {
        self.configuration = configuration;
    }

    /// Set the severity weight. Negative values are ignored.
    pub fn set_severity_weight(&mut self, severity_weight: f64) {
        self.severity_weight = clamp_severity_weight(self.severity_weight, severity_weight);
    }

    /// Set the name
    pub fn with_name(mut self, name: &str) -> Self {
        self.set_name(name);
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.set_description(description);
        self
    }

    pub fn with_background(mut self, background: &str) -> Self {
        self.set_background(background);
        self
    }

    pub fn with_author(mut self, author: &str) -> Self {
        self.set_author(author);
        self
    }

    pub fn with_possible_solution(mut self, possible_solution: &str) -> Self {
        self.set_possible_solution(possible_solution);
        self
    }

    pub fn with_rule_type(mut self, rule_type: PolicyRuleType) -> Self {
        self.rule_type = Some(rule_type);
        self
    }

    pub fn with_category(mut self, category: LeafCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Set the severity weight (negative values are ignored)
    pub fn with_severity_weight(mut self, severity_weight: f64) -> Self {
        self.set_severity_weight(severity_weight);
        self
    }

    pub fn with_configuration(mut self, configuration: RuleConfiguration) -> Self {
        self.configuration = Some(configuration);
        self
    }

    /// Restrict a dynamic rule to sheets matching `pattern`; no effect on other variants
    pub fn with_scope(mut self, pattern: &str) -> Self {
        if let RuleKind::Dynamic(dynamic) = &mut self.kind {
            dynamic.scope = Some(pattern.to_string());
        }
        self
    }

    /// Sub-rules in declaration order (empty for non-composites)
    pub fn sub_rules(&self) -> &[PolicyRule] {
        match &self.kind {
            RuleKind::Composite(composite) => &composite.rules,
            _ => &[],
        }
    }

    /// Mutable sub-rules, used while the rule graph is assembled
    pub fn sub_rules_mut(&mut self) -> Option<&mut Vec<PolicyRule>> {
        match &mut self.kind {
            RuleKind::Composite(composite) => Some(&mut composite.rules),
            _ => None,
        }
    }

    /// Visit this rule and all descendants depth-first in declaration order
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a PolicyRule, usize)) {
        self.walk_at(0, visit);
    }

    fn walk_at<'a>(&'a self, depth: usize, visit: &mut dyn FnMut(&'a PolicyRule, usize)) {
        visit(self, depth);
        for sub in self.sub_rules() {
            sub.walk_at(depth + 1, visit);
        }
    }

    /// Mutable depth-first visit, used for late binding of category and configuration
    pub fn walk_mut(&mut self, visit: &mut dyn FnMut(&mut PolicyRule)) {
        visit(self);
        if let Some(subs) = self.sub_rules_mut() {
            for sub in subs {
                sub.walk_mut(visit);
            }
        }
    }

    /// Number of rules in this tree, including this one
    pub fn rule_count(&self) -> usize {
        1 + self.sub_rules().iter().map(PolicyRule::rule_count).sum::<usize>()
    }
}
