//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router that sends every method and path to the balancer
//! - Wire up middleware (tracing, request ID)
//! - Serve until the shutdown signal fires
//!
//! Per request: select a backend, run the forward on its own task writing into
//! a streaming channel, and answer as soon as the response head is available.
//! Dropping the response closes the channel, which ends the forward task.

use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::BalancerConfig;
use crate::lifecycle::ShutdownSignal;
use crate::load_balancer::Balancer;
use crate::observability::metrics;
use crate::proxy;

/// Body chunks buffered between the forward task and the client.
const BODY_BUFFER: usize = 16;

const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub balancer: Balancer,
}

/// Front-end HTTP server of the balancer.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(balancer: Balancer, config: &BalancerConfig) -> Self {
        tracing::debug!(
            backends = balancer.pool().len(),
            trace = config.forwarding.trace,
            timeout = ?config.forwarding.timeout(),
            "Building HTTP server"
        );

        let router = Self::build_router(AppState { balancer });
        Self { router }
    }

    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/", any(proxy_handler))
            .route("/{*path}", any(proxy_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::new(X_REQUEST_ID)),
            )
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: ShutdownSignal,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.recv().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let method = request.method().to_string();
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let Some(backend) = state.balancer.select_backend() else {
        tracing::warn!(request_id = %request_id, "No healthy servers available");
        metrics::record_request(&method, 503, "none", start_time);
        return (StatusCode::SERVICE_UNAVAILABLE, "No healthy servers available").into_response();
    };

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %request.uri().path(),
        backend = %backend,
        "Proxying request"
    );

    let (mut writer, pending) = proxy::channel(BODY_BUFFER);
    let balancer = state.balancer.clone();
    let dst = backend.clone();
    tokio::spawn(async move {
        if let Err(e) = balancer.forward(&dst, request, &mut writer).await {
            tracing::debug!(request_id = %request_id, backend = %dst, error = %e, "Forward failed");
        }
    });

    match pending.into_response().await {
        Some(response) => {
            metrics::record_request(&method, response.status().as_u16(), backend.as_str(), start_time);
            response
        }
        None => {
            metrics::record_request(&method, 503, backend.as_str(), start_time);
            (StatusCode::SERVICE_UNAVAILABLE, "Backend unavailable").into_response()
        }
    }
}
