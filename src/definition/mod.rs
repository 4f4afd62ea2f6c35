//! Policy documents - load and store rule trees as YAML, JSON or XML
//!
//! A document is a list of rule definitions. The element kind (`kind` in
//! YAML/JSON, the element tag in XML) selects the variant:
//!
//! ```yaml
//! name: budget-policy
//! version: "1.0"
//! rules:
//!   - kind: composite
//!     name: formulas
//!     combinator: and
//!     severity_weight: 2
//!     rules:
//!       - kind: formula-complexity
//!         name: complexity
//!       - kind: dynamic
//!         name: large-values
//!         condition: "value > 1000"
//!         scope: "Input*"
//! ```

mod xml;

use crate::rule::{
    clamp_severity_weight, CheckKind, Combinator, PolicyRule, PolicyRuleType, RuleKind,
    DEFAULT_SEVERITY_WEIGHT, NOT_AVAILABLE,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Document format version written by this crate
pub const DOCUMENT_VERSION: &str = "1.0";

/// Error loading or storing a policy document
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML error at line {line}: {message}")]
    Xml { line: usize, message: String },

    #[error("Schema violation at {path}: {message}")]
    SchemaViolation { path: String, message: String },

    #[error("Unsupported policy format: {0}")]
    UnsupportedFormat(String),
}

impl DefinitionError {
    fn schema(path: &str, message: impl Into<String>) -> Self {
        DefinitionError::SchemaViolation {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

/// Serialized form of one rule
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDefinition {
    /// Element kind: any rule type tag
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub possible_solution: Option<String>,

    /// Declared rule type tag, independent of `kind`
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub rule_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity_weight: Option<f64>,

    /// Composite only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combinator: Option<String>,

    /// Composite only
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<RuleDefinition>,

    /// Dynamic only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    /// Dynamic only: sheet-name glob
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Generic monolithic only: check name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<String>,
}

/// A named, versioned list of rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

fn default_version() -> String {
    DOCUMENT_VERSION.to_string()
}

impl Default for PolicyDocument {
    fn default() -> Self {
        Self {
            version: default_version(),
            name: String::new(),
            rules: Vec::new(),
        }
    }
}

impl PolicyDocument {
    /// Build a document from rule trees
    pub fn from_rules(name: &str, rules: &[PolicyRule]) -> Self {
        Self {
            version: default_version(),
            name: name.to_string(),
            rules: rules.iter().map(RuleDefinition::from_rule).collect(),
        }
    }

    /// Materialize the rule trees, validating every definition
    pub fn to_rules(&self) -> Result<Vec<PolicyRule>, DefinitionError> {
        let rules = self
            .rules
            .iter()
            .enumerate()
            .map(|(i, def)| def.to_rule(&format!("rules[{}]", i)))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            "Loaded policy '{}' with {} top-level rule(s), {} in total",
            self.name,
            rules.len(),
            rules.iter().map(PolicyRule::rule_count).sum::<usize>()
        );
        Ok(rules)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, DefinitionError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_json_str(content: &str) -> Result<Self, DefinitionError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn from_xml_str(content: &str) -> Result<Self, DefinitionError> {
        xml::parse_document(content)
    }

    pub fn to_yaml(&self) -> Result<String, DefinitionError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// JSON has no infinity; a non-finite weight is refused rather than written as `null`
    pub fn to_json(&self) -> Result<String, DefinitionError> {
        for (i, def) in self.rules.iter().enumerate() {
            def.check_finite_weights(&format!("rules[{}]", i))?;
        }
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_xml(&self) -> String {
        xml::write_document(self)
    }

    /// Load a document, picking the format by file extension
    pub fn load(path: &Path) -> Result<Self, DefinitionError> {
        let content = std::fs::read_to_string(path)?;
        match PolicyFormat::from_path(path)? {
            PolicyFormat::Yaml => Self::from_yaml_str(&content),
            PolicyFormat::Json => Self::from_json_str(&content),
            PolicyFormat::Xml => Self::from_xml_str(&content),
        }
    }

    /// Write a document, picking the format by file extension
    pub fn save(&self, path: &Path) -> Result<(), DefinitionError> {
        let content = match PolicyFormat::from_path(path)? {
            PolicyFormat::Yaml => self.to_yaml()?,
            PolicyFormat::Json => self.to_json()?,
            PolicyFormat::Xml => self.to_xml(),
        };
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Serialization format of a policy document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyFormat {
    Yaml,
    Json,
    Xml,
}

impl PolicyFormat {
    pub fn from_path(path: &Path) -> Result<Self, DefinitionError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "yaml" | "yml" => Ok(PolicyFormat::Yaml),
            "json" => Ok(PolicyFormat::Json),
            "xml" => Ok(PolicyFormat::Xml),
            _ => Err(DefinitionError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Load a policy file and materialize its rules
pub fn load_policy(path: &Path) -> Result<(PolicyDocument, Vec<PolicyRule>), DefinitionError> {
    let document = PolicyDocument::load(path)?;
    let rules = document.to_rules()?;
    Ok((document, rules))
}

impl RuleDefinition {
    /// Serialized form of a rule tree
    pub fn from_rule(rule: &PolicyRule) -> Self {
        let mut def = RuleDefinition {
            name: Some(rule.name().to_string()),
            description: attribute(rule.description()),
            background: attribute(rule.background()),
            author: attribute(rule.author()),
            possible_solution: attribute(rule.possible_solution()),
            rule_type: rule.rule_type().map(|t| t.as_str().to_string()),
            severity_weight: Some(rule.severity_weight()),
            ..Default::default()
        };

        match rule.kind() {
            RuleKind::Monolithic(m) => match &m.check {
                CheckKind::Custom(name) => {
                    def.kind = PolicyRuleType::Monolithic.as_str().to_string();
                    def.check = Some(name.clone());
                }
                builtin => def.kind = builtin.rule_type().as_str().to_string(),
            },
            RuleKind::Composite(c) => {
                def.kind = PolicyRuleType::Composite.as_str().to_string();
                def.combinator = Some(c.combinator.as_str().to_string());
                def.rules = c.rules.iter().map(RuleDefinition::from_rule).collect();
            }
            RuleKind::Dynamic(d) => {
                def.kind = PolicyRuleType::Dynamic.as_str().to_string();
                def.condition = Some(d.condition.clone());
                def.scope = d.scope.clone();
            }
        }

        def
    }

    /// Materialize the rule tree; `path` locates this definition in error messages
    pub fn to_rule(&self, path: &str) -> Result<PolicyRule, DefinitionError> {
        let kind: PolicyRuleType = self
            .kind
            .parse()
            .map_err(|_| DefinitionError::schema(path, format!("unknown kind '{}'", self.kind)))?;

        let mut rule = match kind {
            PolicyRuleType::Composite | PolicyRuleType::OneAmongOthers => {
                self.reject(path, "condition", self.condition.is_some())?;
                self.reject(path, "scope", self.scope.is_some())?;
                self.reject(path, "check", self.check.is_some())?;

                let combinator = match (kind, self.combinator.as_deref()) {
                    (PolicyRuleType::OneAmongOthers, None) => Combinator::OneAmongOthers,
                    (_, Some(raw)) => {
                        let combinator: Combinator = raw.parse().map_err(|_| {
                            DefinitionError::schema(path, format!("unknown combinator '{}'", raw))
                        })?;
                        if kind == PolicyRuleType::OneAmongOthers
                            && combinator != Combinator::OneAmongOthers
                        {
                            return Err(DefinitionError::schema(
                                path,
                                format!("combinator '{}' conflicts with kind '{}'", raw, kind),
                            ));
                        }
                        combinator
                    }
                    (_, None) => {
                        return Err(DefinitionError::schema(
                            path,
                            "composite rule requires 'combinator'",
                        ))
                    }
                };

                let rules = self
                    .rules
                    .iter()
                    .enumerate()
                    .map(|(i, def)| def.to_rule(&format!("{}.rules[{}]", path, i)))
                    .collect::<Result<Vec<_>, _>>()?;
                PolicyRule::composite(combinator, rules)
            }
            PolicyRuleType::Dynamic => {
                self.reject_sub_rules(path)?;
                self.reject(path, "combinator", self.combinator.is_some())?;
                self.reject(path, "check", self.check.is_some())?;

                let condition = self.condition.as_deref().ok_or_else(|| {
                    DefinitionError::schema(path, "dynamic rule requires 'condition'")
                })?;
                let rule = PolicyRule::dynamic(condition);
                match self.scope.as_deref() {
                    Some(scope) => rule.with_scope(scope),
                    None => rule,
                }
            }
            PolicyRuleType::Monolithic => {
                self.reject_leaf_fields(path)?;
                let check = self.check.as_deref().ok_or_else(|| {
                    DefinitionError::schema(path, "monolithic rule requires 'check'")
                })?;
                let check = check
                    .parse::<PolicyRuleType>()
                    .ok()
                    .and_then(CheckKind::from_rule_type)
                    .unwrap_or_else(|| CheckKind::Custom(check.to_string()));
                PolicyRule::monolithic(check)
            }
            concrete => {
                self.reject_leaf_fields(path)?;
                self.reject(path, "check", self.check.is_some())?;
                let check = CheckKind::from_rule_type(concrete).ok_or_else(|| {
                    DefinitionError::schema(path, format!("unknown kind '{}'", self.kind))
                })?;
                PolicyRule::monolithic(check)
            }
        };

        if let Some(name) = &self.name {
            rule.set_name(name);
        }
        if let Some(description) = &self.description {
            rule.set_description(description);
        }
        if let Some(background) = &self.background {
            rule.set_background(background);
        }
        if let Some(author) = &self.author {
            rule.set_author(author);
        }
        if let Some(solution) = &self.possible_solution {
            rule.set_possible_solution(solution);
        }
        if let Some(raw) = &self.rule_type {
            let rule_type: PolicyRuleType = raw
                .parse()
                .map_err(|_| DefinitionError::schema(path, format!("unknown type '{}'", raw)))?;
            rule.set_rule_type(Some(rule_type));
        }
        if let Some(weight) = self.severity_weight {
            if clamp_severity_weight(DEFAULT_SEVERITY_WEIGHT, weight) != weight {
                warn!(
                    "Ignoring severity weight {} of rule '{}' at {}",
                    weight,
                    rule.name(),
                    path
                );
            }
            rule.set_severity_weight(weight);
        }

        Ok(rule)
    }

    fn check_finite_weights(&self, path: &str) -> Result<(), DefinitionError> {
        if let Some(weight) = self.severity_weight.filter(|w| !w.is_finite()) {
            return Err(DefinitionError::schema(
                path,
                format!("severity weight {} cannot be written as JSON", weight),
            ));
        }
        for (i, def) in self.rules.iter().enumerate() {
            def.check_finite_weights(&format!("{}.rules[{}]", path, i))?;
        }
        Ok(())
    }

    fn reject(&self, path: &str, field: &str, present: bool) -> Result<(), DefinitionError> {
        if present {
            return Err(DefinitionError::schema(
                path,
                format!("'{}' is not valid for kind '{}'", field, self.kind),
            ));
        }
        Ok(())
    }

    fn reject_sub_rules(&self, path: &str) -> Result<(), DefinitionError> {
        self.reject(path, "rules", !self.rules.is_empty())
    }

    fn reject_leaf_fields(&self, path: &str) -> Result<(), DefinitionError> {
        self.reject_sub_rules(path)?;
        self.reject(path, "combinator", self.combinator.is_some())?;
        self.reject(path, "condition", self.condition.is_some())?;
        self.reject(path, "scope", self.scope.is_some())
    }
}

/// Descriptive attributes are only written when set
fn attribute(value: &str) -> Option<String> {
    (value != NOT_AVAILABLE).then(|| value.to_string())
}
