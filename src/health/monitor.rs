//! Active health checking.
//!
//! # Responsibilities
//! - Seed every backend as healthy and in rotation
//! - Probe each backend on its own fixed-period task
//! - Apply each result to the health flags and the healthy set
//! - Stop every task when the lifetime token fires

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinSet;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::health::probe::Probe;
use crate::lifecycle::ShutdownSignal;
use crate::load_balancer::backend::Backend;
use crate::load_balancer::state::{SharedState, Transition};
use crate::observability::metrics;

/// Periodically probes every backend of the pool.
pub struct HealthMonitor {
    state: Arc<SharedState>,
    probe: Arc<dyn Probe>,
    interval: Duration,
    jitter: Duration,
}

impl HealthMonitor {
    /// `jitter` bounds a random extra delay before each backend's first probe;
    /// it never exceeds one interval.
    pub fn new(
        state: Arc<SharedState>,
        probe: Arc<dyn Probe>,
        interval: Duration,
        jitter: Duration,
    ) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        Self {
            state,
            probe,
            interval,
            jitter: jitter.min(interval),
        }
    }

    /// Seed the pool as healthy, then return the future that runs one polling
    /// task per backend.
    ///
    /// Seeding happens before this call returns. The future resolves once
    /// `shutdown` fires and every task has exited; run it on its own task to
    /// keep monitoring in the background.
    pub fn start(self, shutdown: ShutdownSignal) -> impl Future<Output = ()> + Send + 'static {
        self.state.seed();

        tracing::info!(
            backends = self.state.pool().len(),
            interval = ?self.interval,
            "Health monitor starting"
        );

        async move {
            let mut tasks = JoinSet::new();
            for backend in self.state.pool().iter().cloned() {
                let first_tick = Instant::now() + self.interval + random_delay(self.jitter);
                tasks.spawn(poll_backend(
                    backend,
                    self.state.clone(),
                    self.probe.clone(),
                    first_tick,
                    self.interval,
                    shutdown.clone(),
                ));
            }

            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Health check task failed");
                }
            }

            tracing::info!("Health monitor stopped");
        }
    }
}

fn random_delay(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    let bound = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    let millis = rand::thread_rng().gen_range(0..=bound);
    Duration::from_millis(millis)
}

async fn poll_backend(
    backend: Backend,
    state: Arc<SharedState>,
    probe: Arc<dyn Probe>,
    first_tick: Instant,
    interval: Duration,
    mut shutdown: ShutdownSignal,
) {
    let mut ticker = time::interval_at(first_tick, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            _ = ticker.tick() => {}
        }

        let healthy = tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            healthy = probe.check(&backend) => healthy,
        };

        match state.record_probe(&backend, healthy) {
            Transition::Evicted => {
                tracing::warn!(backend = %backend, "Backend unhealthy, removed from rotation");
            }
            Transition::Admitted => {
                tracing::info!(backend = %backend, "Backend healthy, back in rotation");
            }
            Transition::Unchanged => {
                tracing::debug!(backend = %backend, healthy, "Health check");
            }
        }
        metrics::record_backend_health(&backend, healthy);
    }

    tracing::debug!(backend = %backend, "Health check task exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Shutdown;
    use crate::load_balancer::pool::ServerPool;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Healthy unless the backend is listed as down; counts calls.
    struct Scripted {
        down: Vec<Backend>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Probe for Scripted {
        async fn check(&self, backend: &Backend) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            !self.down.contains(backend)
        }
    }

    fn monitor(probe: Arc<Scripted>, interval: Duration) -> (HealthMonitor, Arc<SharedState>) {
        let state = Arc::new(SharedState::new(ServerPool::new(["a:1", "b:1", "c:1"])));
        (
            HealthMonitor::new(state.clone(), probe, interval, Duration::ZERO),
            state,
        )
    }

    #[tokio::test]
    async fn test_seeds_before_first_probe() {
        let probe = Arc::new(Scripted {
            down: vec![Backend::new("b:1")],
            calls: AtomicUsize::new(0),
        });
        let (monitor, state) = monitor(probe.clone(), Duration::from_secs(3600));
        let shutdown = Shutdown::new();

        let running = tokio::spawn(monitor.start(shutdown.subscribe()));
        assert_eq!(state.lock().healthy.len(), 3);

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), running)
            .await
            .expect("monitor should stop")
            .unwrap();
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_evicts_failing_backend() {
        let probe = Arc::new(Scripted {
            down: vec![Backend::new("b:1")],
            calls: AtomicUsize::new(0),
        });
        let (monitor, state) = monitor(probe.clone(), Duration::from_millis(20));
        let shutdown = Shutdown::new();

        let running = tokio::spawn(monitor.start(shutdown.subscribe()));
        tokio::time::sleep(Duration::from_millis(150)).await;

        let healthy: Vec<_> = state.lock().healthy.as_slice().to_vec();
        assert_eq!(healthy, vec![Backend::new("a:1"), Backend::new("c:1")]);
        assert_eq!(state.health().get(&Backend::new("b:1")), Some(false));

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), running)
            .await
            .expect("monitor should stop")
            .unwrap();

        // No probes after shutdown.
        let calls = probe.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), calls);
    }

    #[test]
    fn test_random_delay_bounds() {
        assert_eq!(random_delay(Duration::ZERO), Duration::ZERO);
        for _ in 0..100 {
            assert!(random_delay(Duration::from_millis(5)) <= Duration::from_millis(5));
        }
    }

    #[test]
    fn test_huge_jitter_is_bounded() {
        // Does not truncate or overflow.
        let _ = random_delay(Duration::MAX);

        let state = Arc::new(SharedState::new(ServerPool::new(["a:1"])));
        let probe = Arc::new(Scripted {
            down: Vec::new(),
            calls: AtomicUsize::new(0),
        });
        let monitor = HealthMonitor::new(state, probe, Duration::from_secs(10), Duration::MAX);
        assert_eq!(monitor.jitter, Duration::from_secs(10));
    }
}
