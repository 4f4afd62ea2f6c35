//! Atomic checks behind monolithic rules
//!
//! A [`Check`] inspects a spreadsheet snapshot and reports findings. Checks
//! are looked up by [`CheckKind`] in a [`CheckRegistry`]; a monolithic rule
//! whose check is not registered cannot be evaluated.

mod cells;
mod complexity;
mod constants;
pub mod formula;
mod references;

pub use cells::{ErrorContainingCellCheck, NonConsideredValuesCheck};
pub use complexity::FormulaComplexityCheck;
pub use constants::NoConstantsInFormulasCheck;
pub use references::{MultipleSameRefCheck, ReadingDirectionCheck, RefToNullCheck};

use crate::configuration::RuleConfiguration;
use crate::rule::CheckKind;
use crate::spreadsheet::{CellLocation, Spreadsheet};
use std::collections::HashMap;
use std::sync::Arc;

/// A single non-conforming spot found by a check
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub location: CellLocation,
    pub message: String,
}

impl Finding {
    pub fn new(location: CellLocation, message: &str) -> Self {
        Self {
            location,
            message: message.to_string(),
        }
    }
}

/// An atomic check applied directly to spreadsheet content
pub trait Check: Send + Sync {
    /// Which rule kind this check implements
    fn kind(&self) -> CheckKind;

    /// Human-readable description
    fn description(&self) -> &str;

    /// Inspect the snapshot. `config` is `None` when no configuration was
    /// bound; the check then applies its defaults.
    fn run(&self, sheet: &Spreadsheet, config: Option<&RuleConfiguration>) -> Vec<Finding>;
}

/// Checks available to the monolithic test facility
#[derive(Clone, Default)]
pub struct CheckRegistry {
    checks: HashMap<CheckKind, Arc<dyn Check>>,
}

impl CheckRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in check
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(FormulaComplexityCheck));
        registry.register(Arc::new(NoConstantsInFormulasCheck));
        registry.register(Arc::new(ErrorContainingCellCheck));
        registry.register(Arc::new(RefToNullCheck));
        registry.register(Arc::new(ReadingDirectionCheck));
        registry.register(Arc::new(MultipleSameRefCheck));
        registry.register(Arc::new(NonConsideredValuesCheck));
        registry
    }

    /// Register a check, replacing any check of the same kind
    pub fn register(&mut self, check: Arc<dyn Check>) {
        self.checks.insert(check.kind(), check);
    }

    pub fn get(&self, kind: &CheckKind) -> Option<Arc<dyn Check>> {
        self.checks.get(kind).cloned()
    }

    pub fn contains(&self, kind: &CheckKind) -> bool {
        self.checks.contains_key(kind)
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<&CheckKind> {
        let mut kinds: Vec<_> = self.checks.keys().collect();
        kinds.sort();
        kinds
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

impl std::fmt::Debug for CheckRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
