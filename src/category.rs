//! Classification leaf attached to a policy rule

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque category label a rule belongs to.
///
/// The category taxonomy lives outside this crate; a rule only ever sees the
/// leaf it was assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeafCategory(String);

impl LeafCategory {
    pub fn new(label: &str) -> Self {
        Self(label.to_string())
    }

    pub fn label(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LeafCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for LeafCategory {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_display() {
        let category = LeafCategory::new("Formulas");
        assert_eq!(category.label(), "Formulas");
        assert_eq!(format!("{}", category), "Formulas");
    }

    #[test]
    fn test_category_deserialize_transparent() {
        let category: LeafCategory = serde_yaml::from_str("\"Input values\"").unwrap();
        assert_eq!(category, LeafCategory::from("Input values"));
    }
}
