//! Collision-free id allocation
//!
//! Used for client-side control names inside a form render, for client ids,
//! and for the ids of anonymous components while a page is assembled.

use std::collections::{HashMap, HashSet};

/// Allocates unique ids from a base name: `name`, `name_0`, `name_1`, ...
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    /// Next numeric suffix per base name
    generators: HashMap<String, usize>,
    /// Every id handed out (or reserved), to avoid clashes across base names
    allocated: HashSet<String>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a unique id derived from `base`
    ///
    /// The first request for a base returns the base itself. Subsequent
    /// requests append `_0`, `_1`, ... skipping anything already taken
    /// (for instance an explicitly reserved `foo_0`).
    pub fn allocate(&mut self, base: &str) -> String {
        let base = sanitize(base);

        if !self.generators.contains_key(&base) {
            self.generators.insert(base.clone(), 0);
            if self.allocated.insert(base.clone()) {
                return base;
            }
        }

        loop {
            let counter = self.generators.entry(base.clone()).or_insert(0);
            let next = *counter;
            *counter += 1;

            let candidate = format!("{}_{}", base, next);
            if self.allocated.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    /// Mark an id as taken without allocating it through a base name
    pub fn reserve(&mut self, id: &str) {
        self.allocated.insert(id.to_string());
    }

    /// Check whether an id has already been handed out or reserved
    pub fn is_allocated(&self, id: &str) -> bool {
        self.allocated.contains(id)
    }
}

/// Reduce a requested name to characters that are safe in element names and
/// ids. Anything else collapses to `_`; an empty name becomes `id`.
fn sanitize(base: &str) -> String {
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    if cleaned.is_empty() {
        "id".to_string()
    } else {
        cleaned
    }
}
