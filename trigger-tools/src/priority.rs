//! Observational priority lookup for tools.

use std::collections::HashMap;
use std::sync::RwLock;

/// Priority reported for tools that were never registered.
pub const DEFAULT_PRIORITY: u32 = 0;

/// Maps tool names to priorities.
///
/// Purely observational: nothing in dispatch or execution consults it.
#[derive(Debug, Default)]
pub struct PriorityToolRegistry {
    priorities: RwLock<HashMap<String, u32>>,
}

impl PriorityToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `priority` for `name`, replacing any previous value.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn register(&self, name: impl Into<String>, priority: u32) {
        self.priorities
            .write()
            .expect("priority registry poisoned")
            .insert(name.into(), priority);
    }

    /// Returns the priority recorded for `name`, or [`DEFAULT_PRIORITY`].
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn priority_of(&self, name: &str) -> u32 {
        self.priorities
            .read()
            .expect("priority registry poisoned")
            .get(name)
            .copied()
            .unwrap_or(DEFAULT_PRIORITY)
    }

    /// Returns every recorded tool, highest priority first, ties by name.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn ranked(&self) -> Vec<(String, u32)> {
        let priorities = self.priorities.read().expect("priority registry poisoned");
        let mut ranked: Vec<_> = priorities
            .iter()
            .map(|(name, priority)| (name.clone(), *priority))
            .collect();
        ranked.sort_by(|(a_name, a), (b_name, b)| b.cmp(a).then_with(|| a_name.cmp(b_name)));
        ranked
    }
}
