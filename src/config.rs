//! Configuration for the policy checker
//!
//! Reads configuration from:
//! - `.sifrc.yaml` / `.sifrc.json` / `sif.yaml` (project-level)
//! - `~/.sifrc.yaml` (user-level)
//!
//! Besides engine and output settings, a configuration binds categories,
//! severity weights and check configurations to rules by name.

use crate::category::LeafCategory;
use crate::configuration::RuleConfiguration;
use crate::rule::PolicyRule;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Evaluate composite sub-rules in parallel
    pub parallel: bool,

    /// Number of parallel jobs (0 = auto-detect)
    pub jobs: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            jobs: 0,
        }
    }
}

/// Output settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output format
    pub format: OutputFormat,

    /// Color mode
    pub color: ColorMode,

    /// List every violation instead of per-category summaries
    pub verbose: bool,
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

/// Color mode options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    #[default]
    Auto,
    Always,
    Never,
}

/// Classification and tuning bound to one rule
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleBinding {
    /// Category the rule's violations are grouped under
    pub category: Option<String>,

    /// Severity weight override (negative values are ignored)
    pub severity_weight: Option<f64>,

    /// Parameters handed to the rule's check
    pub configuration: Option<RuleConfiguration>,
}

/// Rule configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Top-level rules to skip
    pub disabled: Vec<String>,

    /// Bindings by rule name
    pub bindings: HashMap<String, RuleBinding>,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Extend from other configuration files or presets
    pub extends: Vec<String>,

    /// Engine settings
    pub engine: EngineConfig,

    /// Output settings
    pub output: OutputConfig,

    /// Rule configuration
    pub rules: RulesConfig,
}

impl Config {
    /// Create default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a preset configuration by name
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "default" => Some(Self::default()),
            "sequential" => Some(Self::preset_sequential()),
            "ci" => Some(Self::preset_ci()),
            _ => None,
        }
    }

    /// Single-threaded evaluation
    fn preset_sequential() -> Self {
        Self {
            engine: EngineConfig {
                parallel: false,
                jobs: 1,
            },
            ..Self::default()
        }
    }

    /// Machine-readable, uncolored output
    fn preset_ci() -> Self {
        Self {
            output: OutputConfig {
                format: OutputFormat::Json,
                color: ColorMode::Never,
                verbose: true,
            },
            ..Self::default()
        }
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with_depth(path, 0)
    }

    /// Load with recursion depth limit (to prevent infinite loops)
    fn load_with_depth(path: &Path, depth: usize) -> Result<Self, ConfigError> {
        const MAX_DEPTH: usize = 10;
        if depth >= MAX_DEPTH {
            return Err(ConfigError::Invalid(
                "Maximum config inheritance depth exceeded".to_string(),
            ));
        }

        let content = std::fs::read_to_string(path)?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let mut config: Self = match ext {
            "yaml" | "yml" => serde_yaml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "Unknown config file format: {}",
                    ext
                )))
            }
        };

        if !config.extends.is_empty() {
            let base_dir = path.parent().unwrap_or(Path::new("."));
            let mut base_config = Self::default();

            for extend in &config.extends.clone() {
                let extended = if let Some(preset) = Self::preset(extend) {
                    preset
                } else {
                    let extend_path = if Path::new(extend).is_absolute() {
                        PathBuf::from(extend)
                    } else {
                        base_dir.join(extend)
                    };
                    Self::load_with_depth(&extend_path, depth + 1)?
                };
                base_config.merge(extended);
            }

            // Current file wins over everything it extends
            base_config.merge(config);
            config = base_config;
        }

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: Self) {
        // Extends are not inherited

        if other.engine.jobs != 0 {
            self.engine.jobs = other.engine.jobs;
        }
        self.engine.parallel = other.engine.parallel;

        if other.output.format != OutputFormat::Text {
            self.output.format = other.output.format;
        }
        if other.output.verbose {
            self.output.verbose = true;
        }
        if other.output.color != ColorMode::Auto {
            self.output.color = other.output.color;
        }

        for name in other.rules.disabled {
            if !self.rules.disabled.contains(&name) {
                self.rules.disabled.push(name);
            }
        }
        for (name, binding) in other.rules.bindings {
            let merged = self.rules.bindings.entry(name).or_default();
            if binding.category.is_some() {
                merged.category = binding.category;
            }
            if binding.severity_weight.is_some() {
                merged.severity_weight = binding.severity_weight;
            }
            if binding.configuration.is_some() {
                merged.configuration = binding.configuration;
            }
        }
    }

    /// Load configuration from default locations
    pub fn load_default() -> Result<Self, ConfigError> {
        let config_names = [
            ".sifrc.yaml",
            ".sifrc.yml",
            ".sifrc.json",
            "sif.yaml",
            "sif.json",
        ];

        for name in &config_names {
            let path = PathBuf::from(name);
            if path.exists() {
                return Self::load(&path);
            }
        }

        if let Some(home) = dirs::home_dir() {
            for name in &config_names {
                let path = home.join(name);
                if path.exists() {
                    return Self::load(&path);
                }
            }
        }

        Ok(Self::default())
    }

    /// Merge CLI arguments into configuration
    pub fn merge_cli(
        &mut self,
        format: Option<OutputFormat>,
        color: Option<ColorMode>,
        verbose: Option<bool>,
        jobs: Option<usize>,
        parallel: Option<bool>,
    ) {
        if let Some(f) = format {
            self.output.format = f;
        }
        if let Some(c) = color {
            self.output.color = c;
        }
        if let Some(v) = verbose {
            self.output.verbose = v;
        }
        if let Some(j) = jobs {
            self.engine.jobs = j;
        }
        if let Some(p) = parallel {
            self.engine.parallel = p;
        }
    }

    /// Check if a top-level rule is enabled
    pub fn is_rule_enabled(&self, name: &str) -> bool {
        !self.rules.disabled.iter().any(|d| d == name)
    }

    /// Drop disabled top-level rules
    pub fn enabled_rules(&self, rules: Vec<PolicyRule>) -> Vec<PolicyRule> {
        rules
            .into_iter()
            .filter(|rule| {
                let enabled = self.is_rule_enabled(rule.name());
                if !enabled {
                    debug!("Rule '{}' disabled by configuration", rule.name());
                }
                enabled
            })
            .collect()
    }

    /// Binding for a rule name
    pub fn binding(&self, name: &str) -> Option<&RuleBinding> {
        self.rules.bindings.get(name)
    }

    /// Apply bindings to every rule of a tree
    pub fn bind(&self, rule: &mut PolicyRule) {
        if self.rules.bindings.is_empty() {
            return;
        }

        rule.walk_mut(&mut |node| {
            let Some(binding) = self.rules.bindings.get(node.name()) else {
                return;
            };
            if let Some(category) = &binding.category {
                node.set_category(Some(LeafCategory::new(category)));
            }
            if let Some(configuration) = &binding.configuration {
                node.set_configuration(Some(configuration.clone()));
            }
            if let Some(weight) = binding.severity_weight {
                if weight < 0.0 || weight.is_nan() {
                    warn!(
                        "Ignoring severity weight {} bound to rule '{}'",
                        weight,
                        node.name()
                    );
                }
                node.set_severity_weight(weight);
            }
        });
    }
}
