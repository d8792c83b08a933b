//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → Balancer::select_backend (shared lock: healthy set + traffic ledger)
//!         → least_traffic.rs (smallest byte counter, first in order wins ties)
//!     → Balancer::forward
//!         → proxy::Forwarder (rewrite, send, relay)
//!         → ledger.rs (credit relayed bytes, shared lock)
//!
//! Background:
//!     health::HealthMonitor → state.rs (flags + healthy set)
//! ```
//!
//! # Design Decisions
//! - Selection and forwarding each take the lock on their own; a backend may
//!   turn unhealthy in between and still receive that one request
//! - Forwarding never re-checks health
//! - Traffic is credited only once the whole body has been relayed

pub mod backend;
pub mod ledger;
pub mod least_traffic;
pub mod pool;
pub mod state;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;

use crate::config::BalancerConfig;
use crate::health::monitor::HealthMonitor;
use crate::health::probe::{HttpProbe, Probe};
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;
use crate::proxy::forward::{write_unavailable, ForwardError, Forwarder};
use crate::proxy::transport::{http_client, HyperTransport, Transport};
use crate::proxy::writer::ResponseWriter;
use state::SharedState;

pub use backend::Backend;
pub use pool::ServerPool;
pub use state::BackendStatus;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_HEALTH_PATH: &str = "/health";

/// Least-traffic balancer over a fixed server pool.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct Balancer {
    inner: Arc<Inner>,
}

struct Inner {
    state: Arc<SharedState>,
    forwarder: Forwarder,
    probe: Arc<dyn Probe>,
    health_interval: Duration,
    health_jitter: Duration,
}

impl Balancer {
    pub fn builder(pool: ServerPool) -> BalancerBuilder {
        BalancerBuilder::new(pool)
    }

    /// Wire a balancer with network probe and transport from configuration.
    pub fn from_config(config: &BalancerConfig) -> Self {
        let client = http_client();
        let probe = HttpProbe::new(
            client.clone(),
            config.pool.https,
            config.health_check.path.clone(),
            config.health_check.timeout(),
        );

        Self::builder(ServerPool::new(config.pool.servers.iter().map(String::as_str)))
            .probe(Arc::new(probe))
            .transport(Arc::new(HyperTransport::new(client)))
            .https(config.pool.https)
            .timeout(config.forwarding.timeout())
            .trace(config.forwarding.trace)
            .health_interval(config.health_check.interval())
            .health_jitter(config.health_check.jitter())
            .build()
    }

    /// Pick the healthy backend with the fewest bytes forwarded so far.
    ///
    /// `None` means no backend is healthy; callers answer 503.
    pub fn select_backend(&self) -> Option<Backend> {
        least_traffic::least_traffic(&self.inner.state.lock())
    }

    /// Proxy one request to `dst` and relay the response into `rw`.
    ///
    /// On success the relayed body length is credited to `dst` and returned.
    /// A failure before the response head answers 503; no failure credits
    /// any traffic.
    pub async fn forward<W>(
        &self,
        dst: &Backend,
        request: Request<Body>,
        rw: &mut W,
    ) -> Result<u64, ForwardError>
    where
        W: ResponseWriter + ?Sized,
    {
        if !self.inner.state.pool().contains(dst) {
            tracing::warn!(backend = %dst, "Refusing to forward to backend outside the pool");
            write_unavailable(rw, "Backend unavailable").await;
            return Err(ForwardError::UnknownBackend(dst.clone()));
        }

        match self.inner.forwarder.forward(dst, request, rw).await {
            Ok(bytes) => {
                self.inner.state.credit(dst, bytes);
                metrics::record_forwarded_bytes(dst, bytes);
                tracing::debug!(backend = %dst, bytes, "Response relayed");
                Ok(bytes)
            }
            Err(e) => {
                if e.is_copy_failure() {
                    tracing::warn!(backend = %dst, error = %e, "Response copy failed");
                }
                Err(e)
            }
        }
    }

    /// Health monitor bound to this balancer's state and probe.
    pub fn health_monitor(&self) -> HealthMonitor {
        HealthMonitor::new(
            self.inner.state.clone(),
            self.inner.probe.clone(),
            self.inner.health_interval,
            self.inner.health_jitter,
        )
    }

    /// Seed the pool as healthy and return the monitoring future.
    ///
    /// See [`HealthMonitor::start`].
    pub fn start_health_monitor(
        &self,
        shutdown: ShutdownSignal,
    ) -> impl Future<Output = ()> + Send + 'static {
        self.health_monitor().start(shutdown)
    }

    pub fn pool(&self) -> &ServerPool {
        self.inner.state.pool()
    }

    /// Last probe result for `backend`, `None` before seeding or outside the pool.
    pub fn is_healthy(&self, backend: &Backend) -> Option<bool> {
        self.inner.state.health().get(backend)
    }

    /// Backends currently in rotation, in selection order.
    pub fn healthy_backends(&self) -> Vec<Backend> {
        self.inner.state.lock().healthy.as_slice().to_vec()
    }

    pub fn bytes_forwarded(&self, backend: &Backend) -> u64 {
        self.inner.state.lock().traffic.bytes_for(backend)
    }

    pub fn snapshot(&self) -> Vec<BackendStatus> {
        self.inner.state.snapshot()
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> &Arc<SharedState> {
        &self.inner.state
    }
}

/// Builder for [`Balancer`]. Unset strategies default to the network ones.
pub struct BalancerBuilder {
    pool: ServerPool,
    probe: Option<Arc<dyn Probe>>,
    transport: Option<Arc<dyn Transport>>,
    https: bool,
    timeout: Duration,
    trace: bool,
    health_interval: Duration,
    health_jitter: Duration,
}

impl BalancerBuilder {
    fn new(pool: ServerPool) -> Self {
        Self {
            pool,
            probe: None,
            transport: None,
            https: false,
            timeout: DEFAULT_TIMEOUT,
            trace: false,
            health_interval: DEFAULT_HEALTH_INTERVAL,
            health_jitter: Duration::ZERO,
        }
    }

    pub fn probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Reach backends (and their health path) over HTTPS.
    pub fn https(mut self, https: bool) -> Self {
        self.https = https;
        self
    }

    /// Deadline for a backend's response head.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add `lb-from` to every relayed response.
    pub fn trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }

    /// Upper bound of the random delay before each backend's first probe.
    pub fn health_jitter(mut self, jitter: Duration) -> Self {
        self.health_jitter = jitter;
        self
    }

    pub fn build(self) -> Balancer {
        let https = self.https;
        let timeout = self.timeout;

        let probe = self.probe.unwrap_or_else(|| {
            Arc::new(HttpProbe::with_defaults(https, DEFAULT_HEALTH_PATH, timeout))
        });
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(HyperTransport::default()));

        Balancer {
            inner: Arc::new(Inner {
                state: Arc::new(SharedState::new(self.pool)),
                forwarder: Forwarder::new(transport, https, timeout, self.trace),
                probe,
                health_interval: self.health_interval,
                health_jitter: self.health_jitter,
            }),
        }
    }
}
