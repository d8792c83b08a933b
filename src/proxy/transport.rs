//! Outbound HTTP transport.
//!
//! # Responsibilities
//! - Build the pooled HTTP/HTTPS client shared by probes and forwarding
//! - Issue one request and hand back the raw response
//!
//! # Design Decisions
//! - No retries, no header rewriting, no timeout of its own: callers bound
//!   the call and decide what the response means
//! - Plain HTTP and HTTPS (rustls, webpki roots) through one connector, so the
//!   scheme is picked purely by the request URI

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::BoxError;
use hyper::body::Incoming;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

/// Pooled client used for every outbound request.
pub type HttpClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Build the shared outbound client.
pub fn http_client() -> HttpClient {
    let connector = HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .build();

    Client::builder(TokioExecutor::new()).build(connector)
}

/// Sends a fully prepared request to a backend.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue the request and return the backend's response, or the
    /// transport-level failure.
    async fn send(&self, request: Request<Body>) -> Result<Response<Body>, BoxError>;
}

/// Network transport backed by the pooled hyper client.
#[derive(Clone)]
pub struct HyperTransport {
    client: HttpClient,
}

impl HyperTransport {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new(http_client())
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(&self, request: Request<Body>) -> Result<Response<Body>, BoxError> {
        let response: Response<Incoming> = self.client.request(request).await?;
        let (parts, body) = response.into_parts();
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}
