//! Health probes.
//!
//! # Responsibilities
//! - Perform one reachability check against one backend
//! - Collapse every failure mode to "unhealthy"

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::uri::Scheme;
use axum::http::{Request, StatusCode};
use tokio::time;

use crate::load_balancer::backend::Backend;
use crate::proxy::transport::{http_client, HttpClient};

/// A single health check.
#[async_trait]
pub trait Probe: Send + Sync {
    /// True iff the backend answered the check successfully.
    async fn check(&self, backend: &Backend) -> bool;
}

/// `GET <scheme>://<backend><path>`, healthy on `200 OK` within the timeout.
pub struct HttpProbe {
    client: HttpClient,
    scheme: Scheme,
    path: String,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(client: HttpClient, https: bool, path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            scheme: if https { Scheme::HTTPS } else { Scheme::HTTP },
            path: path.into(),
            timeout,
        }
    }

    /// Probe with a fresh client.
    pub fn with_defaults(https: bool, path: impl Into<String>, timeout: Duration) -> Self {
        Self::new(http_client(), https, path, timeout)
    }

    fn url(&self, backend: &Backend) -> String {
        format!("{}://{}{}", self.scheme, backend, self.path)
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn check(&self, backend: &Backend) -> bool {
        let request = match Request::builder()
            .method("GET")
            .uri(self.url(backend))
            .header("user-agent", "traffic-balancer-health-check")
            .body(Body::empty())
        {
            Ok(req) => req,
            Err(e) => {
                tracing::error!(backend = %backend, error = %e, "Failed to build health check request");
                return false;
            }
        };

        match time::timeout(self.timeout, self.client.request(request)).await {
            Ok(Ok(response)) => {
                let healthy = response.status() == StatusCode::OK;
                if !healthy {
                    tracing::warn!(backend = %backend, status = %response.status(), "Health check failed: non-OK status");
                }
                healthy
            }
            Ok(Err(e)) => {
                tracing::warn!(backend = %backend, error = %e, "Health check failed: connection error");
                false
            }
            Err(_) => {
                tracing::warn!(backend = %backend, "Health check failed: timeout");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_follows_scheme() {
        let backend = Backend::new("server1:8080");

        let probe = HttpProbe::with_defaults(false, "/health", Duration::from_secs(1));
        assert_eq!(probe.url(&backend), "http://server1:8080/health");

        let probe = HttpProbe::with_defaults(true, "/health", Duration::from_secs(1));
        assert_eq!(probe.url(&backend), "https://server1:8080/health");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_unhealthy() {
        // Port 1 on loopback refuses connections.
        let probe = HttpProbe::with_defaults(false, "/health", Duration::from_secs(1));
        assert!(!probe.check(&Backend::new("127.0.0.1:1")).await);
    }
}
