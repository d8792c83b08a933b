//! Shared balancer state.
//!
//! # Responsibilities
//! - Own the healthy set and the traffic ledger behind one lock
//! - Own the per-backend health flags
//! - Keep every tracked backend a member of the server pool
//!
//! # Design Decisions
//! - The healthy set and the traffic counters are read together by selection,
//!   so they share a single mutex and are never observed half-updated
//! - The lock is never held across an await point
//! - Health flags sit outside the lock (see `health::state`)

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::health::healthy_set::HealthySet;
use crate::health::state::HealthStatus;
use crate::load_balancer::backend::Backend;
use crate::load_balancer::ledger::TrafficLedger;
use crate::load_balancer::pool::ServerPool;

/// Data guarded by the shared lock.
#[derive(Debug, Default)]
pub struct PoolState {
    pub healthy: HealthySet,
    pub traffic: TrafficLedger,
}

/// What a probe result did to healthy-set membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Membership unchanged.
    Unchanged,
    /// Backend re-entered rotation.
    Admitted,
    /// Backend left rotation.
    Evicted,
}

/// Point-in-time view of one backend, for observers.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BackendStatus {
    pub address: Backend,
    pub healthy: bool,
    pub in_rotation: bool,
    pub bytes_forwarded: u64,
}

/// State shared between the health monitor, the forwarding path and observers.
#[derive(Debug)]
pub struct SharedState {
    pool: ServerPool,
    health: HealthStatus,
    locked: Mutex<PoolState>,
}

impl SharedState {
    /// Empty state for a pool: no flags, nothing in rotation, zero traffic.
    pub fn new(pool: ServerPool) -> Self {
        Self {
            pool,
            health: HealthStatus::new(),
            locked: Mutex::new(PoolState::default()),
        }
    }

    pub fn pool(&self) -> &ServerPool {
        &self.pool
    }

    pub fn health(&self) -> &HealthStatus {
        &self.health
    }

    /// Acquire the shared lock.
    pub fn lock(&self) -> MutexGuard<'_, PoolState> {
        // Critical sections are single collection updates; poisoned data is
        // still consistent.
        self.locked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark every pool member healthy and put it in rotation.
    pub fn seed(&self) {
        let mut state = self.lock();
        for backend in self.pool.iter() {
            self.health.set(backend, true);
            state.healthy.insert(backend);
        }
    }

    /// Apply one probe result for a pool member.
    pub fn record_probe(&self, backend: &Backend, healthy: bool) -> Transition {
        if !self.pool.contains(backend) {
            tracing::warn!(backend = %backend, "Ignoring probe result for backend outside the pool");
            return Transition::Unchanged;
        }

        let mut state = self.lock();
        self.health.set(backend, healthy);
        if healthy {
            if state.healthy.insert(backend) {
                return Transition::Admitted;
            }
        } else if state.healthy.remove(backend) {
            return Transition::Evicted;
        }
        Transition::Unchanged
    }

    /// Add relayed bytes to a pool member's counter.
    pub fn credit(&self, backend: &Backend, bytes: u64) {
        if !self.pool.contains(backend) {
            tracing::warn!(backend = %backend, "Ignoring traffic for backend outside the pool");
            return;
        }
        self.lock().traffic.credit(backend, bytes);
    }

    /// Current view of every pool member, in pool order.
    pub fn snapshot(&self) -> Vec<BackendStatus> {
        let state = self.lock();
        self.pool
            .iter()
            .map(|backend| BackendStatus {
                address: backend.clone(),
                healthy: self.health.get(backend).unwrap_or(false),
                in_rotation: state.healthy.contains(backend),
                bytes_forwarded: state.traffic.bytes_for(backend),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SharedState {
        SharedState::new(ServerPool::new(["a:1", "b:1", "c:1"]))
    }

    #[test]
    fn test_seed_is_optimistic_and_idempotent() {
        let state = state();
        state.seed();
        state.seed();

        let healthy: Vec<_> = state.lock().healthy.as_slice().to_vec();
        assert_eq!(healthy, state.pool().as_slice());
        for backend in state.pool().iter() {
            assert_eq!(state.health().get(backend), Some(true));
        }
    }

    #[test]
    fn test_record_probe_transitions() {
        let state = state();
        state.seed();
        let b = Backend::new("b:1");

        assert_eq!(state.record_probe(&b, true), Transition::Unchanged);
        assert_eq!(state.record_probe(&b, false), Transition::Evicted);
        assert_eq!(state.record_probe(&b, false), Transition::Unchanged);
        assert_eq!(state.health().get(&b), Some(false));
        assert_eq!(state.record_probe(&b, true), Transition::Admitted);
        assert_eq!(state.health().get(&b), Some(true));
    }

    #[test]
    fn test_foreign_backends_are_ignored() {
        let state = state();
        let stranger = Backend::new("z:1");

        assert_eq!(state.record_probe(&stranger, true), Transition::Unchanged);
        state.credit(&stranger, 10);

        assert!(!state.lock().healthy.contains(&stranger));
        assert_eq!(state.lock().traffic.bytes_for(&stranger), 0);
        assert_eq!(state.health().get(&stranger), None);
    }

    #[test]
    fn test_snapshot() {
        let state = state();
        state.seed();
        state.record_probe(&Backend::new("c:1"), false);
        state.credit(&Backend::new("a:1"), 7);

        let snapshot = state.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(
            snapshot[0],
            BackendStatus {
                address: Backend::new("a:1"),
                healthy: true,
                in_rotation: true,
                bytes_forwarded: 7,
            }
        );
        assert!(!snapshot[2].healthy);
        assert!(!snapshot[2].in_rotation);
    }
}
