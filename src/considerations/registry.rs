//! Name-to-checker resolution.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::Config;
use crate::considerations::checkers::{
    CiStatusChecker, CompactionChecker, InputFlagChecker, TodosCompleteChecker,
};
use crate::considerations::{Checker, CheckerRef};

/// Checkers available to consideration configuration, by name.
#[derive(Clone, Default)]
pub struct CheckerRegistry {
    checkers: BTreeMap<String, Arc<dyn Checker>>,
}

impl CheckerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in checkers.
    pub fn with_builtins(config: &Config) -> Self {
        let mut registry = Self::new();
        registry.register(TodosCompleteChecker::NAME, Arc::new(TodosCompleteChecker));
        registry.register(CiStatusChecker::NAME, Arc::new(CiStatusChecker));
        registry.register(
            CompactionChecker::NAME,
            Arc::new(CompactionChecker::new(config.compaction.clone())),
        );
        registry.register(InputFlagChecker::NAME, Arc::new(InputFlagChecker));
        registry
    }

    /// Register a checker, replacing any previous one with the same name.
    pub fn register(&mut self, name: impl Into<String>, checker: Arc<dyn Checker>) {
        self.checkers.insert(name.into(), checker);
    }

    pub fn resolve(&self, name: &str) -> Option<CheckerRef> {
        self.checkers
            .get(name)
            .map(|c| CheckerRef::new(name, Arc::clone(c)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.checkers.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.checkers.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for CheckerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckerRegistry")
            .field("checkers", &self.names())
            .finish()
    }
}
