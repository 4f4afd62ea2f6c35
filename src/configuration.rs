//! Rule-specific parameters bound to a rule instance

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;

/// A bag of rule parameters (thresholds, reference sets, ...).
///
/// Bound once by the driver while the rule graph is assembled and read by
/// checks during evaluation. Absent keys mean "use the check's default".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleConfiguration {
    params: BTreeMap<String, Value>,
}

impl RuleConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter (builder style)
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// Set a parameter
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.params.insert(key.to_string(), value.into());
    }

    /// Raw parameter value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.params.get(key).and_then(Value::as_f64)
    }

    /// Non-negative integer parameter
    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.params
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|v| usize::try_from(v).ok())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.params.get(key).and_then(Value::as_bool)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    /// List of strings; non-string entries are skipped
    pub fn get_str_list(&self, key: &str) -> Option<Vec<String>> {
        let seq = self.params.get(key)?.as_sequence()?;
        Some(
            seq.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
        )
    }

    /// List of numbers; non-numeric entries are skipped
    pub fn get_f64_list(&self, key: &str) -> Option<Vec<f64>> {
        let seq = self.params.get(key)?.as_sequence()?;
        Some(seq.iter().filter_map(Value::as_f64).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_getters() {
        let config = RuleConfiguration::new()
            .with("max_nesting", 4)
            .with("ratio", 0.5)
            .with("strict", true)
            .with("label", "inputs");

        assert_eq!(config.get_usize("max_nesting"), Some(4));
        assert_eq!(config.get_f64("ratio"), Some(0.5));
        assert_eq!(config.get_bool("strict"), Some(true));
        assert_eq!(config.get_str("label"), Some("inputs"));
        assert_eq!(config.get_usize("missing"), None);
    }

    #[test]
    fn test_negative_is_not_usize() {
        let config = RuleConfiguration::new().with("max_nesting", -2);
        assert_eq!(config.get_usize("max_nesting"), None);
        assert_eq!(config.get_f64("max_nesting"), Some(-2.0));
    }

    #[test]
    fn test_lists_from_yaml() {
        let yaml = r#"
ignored_constants: [0, 1, 100, "x"]
sheets: ["Input", "Output", 3]
"#;
        let config: RuleConfiguration = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            config.get_f64_list("ignored_constants"),
            Some(vec![0.0, 1.0, 100.0])
        );
        assert_eq!(
            config.get_str_list("sheets"),
            Some(vec!["Input".to_string(), "Output".to_string()])
        );
        assert!(config.contains("sheets"));
        assert_eq!(config.keys().count(), 2);
    }
}
