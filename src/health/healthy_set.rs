//! The ordered set of backends eligible for selection.
//!
//! Kept separately from the per-backend flags so selection scans only the
//! backends currently in rotation. Order is insertion order; removal keeps
//! the relative order of the remaining entries, which makes tie-breaking in
//! selection deterministic.

use crate::load_balancer::backend::Backend;

/// Backends currently in rotation, each at most once.
#[derive(Debug, Default, Clone)]
pub struct HealthySet {
    backends: Vec<Backend>,
}

impl HealthySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the backend unless it is already present.
    /// Returns true if it was added.
    pub fn insert(&mut self, backend: &Backend) -> bool {
        if self.contains(backend) {
            return false;
        }
        self.backends.push(backend.clone());
        true
    }

    /// Remove the backend, preserving the order of the others.
    /// Returns true if it was present.
    pub fn remove(&mut self, backend: &Backend) -> bool {
        match self.backends.iter().position(|b| b == backend) {
            Some(index) => {
                self.backends.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, backend: &Backend) -> bool {
        self.backends.contains(backend)
    }

    pub fn as_slice(&self) -> &[Backend] {
        &self.backends
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
