//! Per-backend health flags.
//!
//! # States
//! - `true`: the last probe succeeded (or no probe has run yet)
//! - `false`: the last probe failed
//!
//! # Design Decisions
//! - Keyed concurrent map, no global lock: each key has exactly one writer,
//!   the monitor task for that backend
//! - Flags start optimistic so a fresh balancer can serve before the first probe

use dashmap::DashMap;

use crate::load_balancer::backend::Backend;

/// Last known probe result per backend.
#[derive(Debug, Default)]
pub struct HealthStatus {
    flags: DashMap<Backend, bool>,
}

impl HealthStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a probe result. Returns the previous flag, if any.
    pub fn set(&self, backend: &Backend, healthy: bool) -> Option<bool> {
        self.flags.insert(backend.clone(), healthy)
    }

    /// Last recorded flag, or `None` for a backend never seeded.
    pub fn get(&self, backend: &Backend) -> Option<bool> {
        self.flags.get(backend).map(|flag| *flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_returns_previous() {
        let status = HealthStatus::new();
        let a = Backend::new("a:1");

        assert_eq!(status.get(&a), None);
        assert_eq!(status.set(&a, true), None);
        assert_eq!(status.set(&a, false), Some(true));
        assert_eq!(status.get(&a), Some(false));
    }
}
