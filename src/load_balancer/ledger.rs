//! Per-backend traffic accounting.
//!
//! Counts the response-body bytes successfully relayed from each backend.
//! Counters only grow; they reset when the process restarts.

use std::collections::HashMap;

use crate::load_balancer::backend::Backend;

/// Cumulative bytes forwarded, keyed by backend.
///
/// Not synchronized on its own: it lives inside the shared pool lock.
#[derive(Debug, Default, Clone)]
pub struct TrafficLedger {
    counters: HashMap<Backend, u64>,
}

impl TrafficLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `bytes` to the backend's counter. Saturates instead of wrapping.
    pub fn credit(&mut self, backend: &Backend, bytes: u64) {
        let counter = self.counters.entry(backend.clone()).or_insert(0);
        *counter = counter.saturating_add(bytes);
    }

    /// Bytes forwarded from the backend so far; zero if it never served.
    pub fn bytes_for(&self, backend: &Backend) -> u64 {
        self.counters.get(backend).copied().unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn set(&mut self, backend: &Backend, bytes: u64) {
        self.counters.insert(backend.clone(), bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credit_is_additive() {
        let a = Backend::new("a:1");
        let mut ledger = TrafficLedger::new();
        assert_eq!(ledger.bytes_for(&a), 0);

        ledger.credit(&a, 10);
        ledger.credit(&a, 32);
        ledger.credit(&a, 0);
        assert_eq!(ledger.bytes_for(&a), 42);
        assert_eq!(ledger.bytes_for(&Backend::new("b:1")), 0);
    }

    #[test]
    fn test_credit_saturates() {
        let a = Backend::new("a:1");
        let mut ledger = TrafficLedger::new();
        ledger.set(&a, u64::MAX - 1);
        ledger.credit(&a, 5);
        assert_eq!(ledger.bytes_for(&a), u64::MAX);
    }
}
